//! Pre-sliced trace partitions.
//!
//! Every trace of both tile variants is filed under three keys of increasing
//! specificity: the ignore state alone, plus its corpus, plus its test name.
//! Lookups never scan the tile.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use gild_model::{ComplexTile, IgnoreState, Query, TestName, TracePair};

/// Partition key; `None` components widen the bucket.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SliceKey {
	pub is: IgnoreState,
	pub corpus: Option<String>,
	pub test: Option<TestName>,
}

impl SliceKey {
	pub fn all(is: IgnoreState) -> Self {
		Self { is, corpus: None, test: None }
	}

	pub fn corpus(is: IgnoreState, corpus: impl Into<String>) -> Self {
		Self {
			is,
			corpus: Some(corpus.into()),
			test: None,
		}
	}

	pub fn test(is: IgnoreState, corpus: impl Into<String>, test: TestName) -> Self {
		Self {
			is,
			corpus: Some(corpus.into()),
			test: Some(test),
		}
	}
}

/// Trace partitions for one complex tile. Immutable once built.
#[derive(Debug, Default)]
pub struct PreSliced {
	slices: BTreeMap<SliceKey, Arc<[TracePair]>>,
}

impl PreSliced {
	/// Partitions every trace of both tile variants.
	///
	/// Traces lacking a corpus or test name are skipped with a warning.
	pub fn new(cpx: &ComplexTile) -> Self {
		let mut building: BTreeMap<SliceKey, Vec<TracePair>> = BTreeMap::new();
		let mut skipped = 0usize;

		for is in IgnoreState::ALL {
			// The whole-state bucket exists even for an empty tile.
			building.entry(SliceKey::all(is)).or_default();
			for (id, trace) in &cpx.tile(is).traces {
				let (Some(corpus), Some(test)) = (trace.corpus(), trace.test_name()) else {
					skipped += 1;
					tracing::warn!(trace = %id, ignore_state = is.as_str(), "indexer.preslice.malformed_trace");
					continue;
				};
				let pair = TracePair {
					id: id.clone(),
					trace: Arc::clone(trace),
				};
				for key in [SliceKey::all(is), SliceKey::corpus(is, corpus), SliceKey::test(is, corpus, test.clone())] {
					building.entry(key).or_default().push(pair.clone());
				}
			}
		}

		tracing::debug!(slices = building.len(), skipped, "indexer.preslice.done");
		Self {
			slices: building.into_iter().map(|(key, traces)| (key, traces.into())).collect(),
		}
	}

	/// Exact bucket lookup; empty when nothing was filed under `key`.
	pub fn get(&self, key: &SliceKey) -> Arc<[TracePair]> {
		self.slices.get(key).cloned().unwrap_or_else(|| Arc::from(Vec::new()))
	}

	/// Test names filed under `(is, corpus)`, ascending.
	pub fn tests_in_corpus(&self, is: IgnoreState, corpus: &str) -> Vec<TestName> {
		let start = SliceKey::corpus(is, corpus);
		self.slices
			.range(start.clone()..)
			.take_while(|(key, _)| key.is == is && key.corpus.as_deref() == Some(corpus))
			.filter_map(|(key, _)| key.test.clone())
			.collect()
	}

	/// Traces selected by the corpus and test filters of `query`.
	///
	/// No corpus filter yields the whole `is` bucket. A corpus without test
	/// filters yields the corpus bucket. Corpus plus tests yields the union of
	/// the per-test buckets. Other clauses of `query` are not applied.
	pub fn select(&self, is: IgnoreState, query: &Query) -> Vec<TracePair> {
		let corpora: Vec<&str> = query.corpora().collect();
		if corpora.is_empty() {
			return self.get(&SliceKey::all(is)).to_vec();
		}
		let tests: BTreeSet<TestName> = query.test_names().collect();

		let mut out = Vec::new();
		for corpus in corpora {
			if tests.is_empty() {
				out.extend(self.get(&SliceKey::corpus(is, corpus)).iter().cloned());
				continue;
			}
			for test in &tests {
				out.extend(self.get(&SliceKey::test(is, corpus, test.clone())).iter().cloned());
			}
		}
		out
	}

	/// Number of buckets.
	pub fn len(&self) -> usize {
		self.slices.len()
	}

	pub fn is_empty(&self) -> bool {
		self.slices.is_empty()
	}
}
