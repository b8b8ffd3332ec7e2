//! Attributes untriaged digests to the commits that most likely introduced them.
//!
//! For every trace whose head digest is untriaged, the commit at which the
//! trace's final run of that digest began is blamed. Missing slots do not break
//! a run. Per (test, digest) the blame is kept as a frequency per commit.

use std::collections::BTreeMap;

use crate::error::{ModelError, Result};
use crate::expectations::{Expectations, Label};
use crate::tile::Tile;
use crate::types::{Commit, Digest, TestName};

/// How many traces blame each commit for one (test, digest).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlameDistribution {
	/// `freq[i]` counts traces blaming the `i`th commit of the window passed to
	/// [`Blamer::get_blame`].
	pub freq: Vec<usize>,
	/// True when at least one trace already showed the digest at the first
	/// commit of the tile, so the culprit may predate the window.
	pub old: bool,
}

#[derive(Debug, Clone, Default)]
struct DigestBlame {
	/// Indexed by tile commit index.
	freq: Vec<usize>,
	old: bool,
}

/// Blame for every untriaged head digest of a tile.
#[derive(Debug, Clone, Default)]
pub struct Blamer {
	commits: Vec<Commit>,
	blame: BTreeMap<TestName, BTreeMap<Digest, DigestBlame>>,
}

impl Blamer {
	/// A tile without commits yields an empty blamer.
	pub fn new(tile: &Tile, exps: &Expectations) -> Result<Self> {
		let n = tile.commits.len();
		let mut blame: BTreeMap<TestName, BTreeMap<Digest, DigestBlame>> = BTreeMap::new();

		for (id, trace) in &tile.traces {
			if trace.digests.len() != n {
				return Err(ModelError::TraceLength {
					trace: id.clone(),
					expected: n,
					got: trace.digests.len(),
				});
			}
			let (Some(test), Some((head, digest))) = (trace.test_name(), trace.head()) else {
				continue;
			};
			if exps.classification(&test, digest) != Label::Untriaged {
				continue;
			}

			let mut start = head;
			for (i, slot) in trace.digests[..head].iter().enumerate().rev() {
				match slot {
					Some(d) if d == digest => start = i,
					Some(_) => break,
					None => {}
				}
			}

			let entry = blame.entry(test).or_default().entry(digest.clone()).or_insert_with(|| DigestBlame {
				freq: vec![0; n],
				old: false,
			});
			entry.freq[start] += 1;
			entry.old |= start == 0;
		}

		Ok(Self {
			commits: tile.commits.clone(),
			blame,
		})
	}

	/// Commits of the tile this blamer was computed from.
	pub fn commits(&self) -> &[Commit] {
		&self.commits
	}

	/// Blame for `(test, digest)` aligned to `commits`.
	///
	/// Commits outside the tile get zero. Unknown pairs yield an all-zero distribution.
	pub fn get_blame(&self, test: &TestName, digest: &Digest, commits: &[Commit]) -> BlameDistribution {
		let Some(entry) = self.blame.get(test).and_then(|by_digest| by_digest.get(digest)) else {
			return BlameDistribution {
				freq: vec![0; commits.len()],
				old: false,
			};
		};
		let by_hash: BTreeMap<&str, usize> = self.commits.iter().enumerate().map(|(i, c)| (c.hash.as_str(), i)).collect();
		let freq = commits
			.iter()
			.map(|c| by_hash.get(c.hash.as_str()).map_or(0, |&i| entry.freq[i]))
			.collect();
		BlameDistribution { freq, old: entry.old }
	}
}
