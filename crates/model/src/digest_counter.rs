use std::collections::{BTreeMap, BTreeSet};

use crate::query::Query;
use crate::tile::Tile;
use crate::types::{Digest, TestName, TraceId};

/// Occurrences of each digest.
pub type DigestCount = BTreeMap<Digest, usize>;

/// Digest occurrence counts over one tile variant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestCounter {
	by_trace: BTreeMap<TraceId, DigestCount>,
	by_test: BTreeMap<TestName, DigestCount>,
	max_by_test: BTreeMap<TestName, BTreeSet<Digest>>,
}

impl DigestCounter {
	/// Counts every non-missing digest of every trace in `tile`.
	///
	/// Traces without a test name contribute to per-trace counts only.
	pub fn new(tile: &Tile) -> Self {
		let mut by_trace = BTreeMap::new();
		let mut by_test: BTreeMap<TestName, DigestCount> = BTreeMap::new();

		for (id, trace) in &tile.traces {
			let mut counts = DigestCount::new();
			for digest in trace.digests.iter().flatten() {
				*counts.entry(digest.clone()).or_default() += 1;
			}
			if let Some(test) = trace.test_name() {
				let test_counts = by_test.entry(test).or_default();
				for (digest, n) in &counts {
					*test_counts.entry(digest.clone()).or_default() += n;
				}
			}
			by_trace.insert(id.clone(), counts);
		}

		let max_by_test = by_test
			.iter()
			.map(|(test, counts)| {
				let max = counts.values().copied().max().unwrap_or(0);
				let digests = counts.iter().filter(|(_, n)| **n == max).map(|(d, _)| d.clone()).collect();
				(test.clone(), digests)
			})
			.collect();

		Self {
			by_trace,
			by_test,
			max_by_test,
		}
	}

	pub fn by_trace(&self) -> &BTreeMap<TraceId, DigestCount> {
		&self.by_trace
	}

	pub fn by_test(&self) -> &BTreeMap<TestName, DigestCount> {
		&self.by_test
	}

	/// Per test, the digests seen most often (ties included).
	pub fn max_digests_by_test(&self) -> &BTreeMap<TestName, BTreeSet<Digest>> {
		&self.max_by_test
	}

	/// Aggregated counts over the traces of `tile` that match `query`.
	pub fn by_query(&self, tile: &Tile, query: &Query) -> DigestCount {
		let mut out = DigestCount::new();
		for (id, trace) in &tile.traces {
			if !trace.matches(query) {
				continue;
			}
			if let Some(counts) = self.by_trace.get(id) {
				for (digest, n) in counts {
					*out.entry(digest.clone()).or_default() += n;
				}
			}
		}
		out
	}
}
