//! Per-test triage-status summaries.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::blame::{BlameDistribution, Blamer};
use crate::digest_counter::DigestCount;
use crate::expectations::{Expectations, Label};
use crate::query::Query;
use crate::types::{Digest, TestName, TraceId, TracePair};

/// Triage counts for one test.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TriageStatus {
	pub name: TestName,
	pub corpus: String,
	pub pos: usize,
	pub neg: usize,
	pub untriaged: usize,
	/// Untriaged digests, sorted.
	pub untriaged_hashes: Vec<Digest>,
	/// Distinct digests considered.
	pub num: usize,
	/// Blame per untriaged digest, parallel to `untriaged_hashes`. Empty when
	/// no blamer was available.
	pub blame: Vec<BlameDistribution>,
}

/// Inputs shared by every summary computed over one set of traces.
#[derive(Clone, Copy)]
pub struct SummaryInput<'a> {
	pub traces: &'a [TracePair],
	pub expectations: &'a Expectations,
	pub by_trace: &'a BTreeMap<TraceId, DigestCount>,
	pub blamer: Option<&'a Blamer>,
}

#[derive(Default)]
struct TestAccum {
	corpus: String,
	digests: BTreeSet<Digest>,
}

impl SummaryInput<'_> {
	/// Computes one summary per test present in the input traces.
	///
	/// Traces not matching `query` are skipped. A non-empty `test_names`
	/// restricts the output to those tests. With `head_only` only each trace's
	/// most recent digest counts. The result is sorted by test name.
	pub fn calculate(&self, query: Option<&Query>, test_names: &BTreeSet<TestName>, head_only: bool) -> Vec<Arc<TriageStatus>> {
		let mut by_test: BTreeMap<TestName, TestAccum> = BTreeMap::new();

		for pair in self.traces {
			let trace = &pair.trace;
			let Some(test) = trace.test_name() else {
				continue;
			};
			if !test_names.is_empty() && !test_names.contains(&test) {
				continue;
			}
			if query.is_some_and(|q| !trace.matches(q)) {
				continue;
			}

			let accum = by_test.entry(test).or_default();
			if accum.corpus.is_empty() {
				accum.corpus = trace.corpus().unwrap_or_default().to_string();
			}
			if head_only {
				if let Some((_, digest)) = trace.head() {
					accum.digests.insert(digest.clone());
				}
			} else if let Some(counts) = self.by_trace.get(&pair.id) {
				accum.digests.extend(counts.keys().cloned());
			} else {
				accum.digests.extend(trace.digests.iter().flatten().cloned());
			}
		}

		by_test
			.into_iter()
			.map(|(name, accum)| Arc::new(self.status(name, accum)))
			.collect()
	}

	fn status(&self, name: TestName, accum: TestAccum) -> TriageStatus {
		let mut status = TriageStatus {
			num: accum.digests.len(),
			corpus: accum.corpus,
			..TriageStatus::default()
		};
		for digest in accum.digests {
			match self.expectations.classification(&name, &digest) {
				Label::Positive => status.pos += 1,
				Label::Negative => status.neg += 1,
				Label::Untriaged => {
					status.untriaged += 1;
					status.untriaged_hashes.push(digest);
				}
			}
		}
		if let Some(blamer) = self.blamer {
			status.blame = status
				.untriaged_hashes
				.iter()
				.map(|digest| blamer.get_blame(&name, digest, blamer.commits()))
				.collect();
		}
		status.name = name;
		status
	}
}

/// Merges name-sorted `updated` into name-sorted `existing`.
///
/// Entries of `updated` replace same-named entries; unmatched entries of both
/// sides are kept. Kept entries are the same `Arc`s as before.
pub fn merge_sorted(existing: &[Arc<TriageStatus>], updated: Vec<Arc<TriageStatus>>) -> Vec<Arc<TriageStatus>> {
	let mut out = Vec::with_capacity(existing.len() + updated.len());
	let mut old = existing.iter().peekable();
	let mut new = updated.into_iter().peekable();

	loop {
		match (old.peek(), new.peek()) {
			(Some(o), Some(n)) => match o.name.cmp(&n.name) {
				std::cmp::Ordering::Less => out.extend(old.next().cloned()),
				std::cmp::Ordering::Greater => out.extend(new.next()),
				std::cmp::Ordering::Equal => {
					old.next();
					out.extend(new.next());
				}
			},
			(Some(_), None) => out.extend(old.next().cloned()),
			(None, Some(_)) => out.extend(new.next()),
			(None, None) => break,
		}
	}
	out
}
