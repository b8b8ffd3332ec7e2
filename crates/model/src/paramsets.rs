use std::collections::BTreeMap;

use crate::digest_counter::DigestCounter;
use crate::query::ParamSet;
use crate::tile::Tile;
use crate::types::{Digest, TestName};

/// For each (test, digest), the union of the params of the traces that drew it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamSummary {
	by_test: BTreeMap<TestName, BTreeMap<Digest, ParamSet>>,
}

impl ParamSummary {
	/// Builds the summary from a tile and the counter computed over the same tile.
	pub fn new(tile: &Tile, counter: &DigestCounter) -> Self {
		let mut by_test: BTreeMap<TestName, BTreeMap<Digest, ParamSet>> = BTreeMap::new();
		for (id, counts) in counter.by_trace() {
			let Some(trace) = tile.traces.get(id) else {
				continue;
			};
			let Some(test) = trace.test_name() else {
				continue;
			};
			let by_digest = by_test.entry(test).or_default();
			for digest in counts.keys() {
				by_digest.entry(digest.clone()).or_default().add_params(&trace.keys);
			}
		}
		Self { by_test }
	}

	pub fn get(&self, test: &TestName, digest: &Digest) -> Option<&ParamSet> {
		self.by_test.get(test)?.get(digest)
	}

	pub fn by_test(&self) -> &BTreeMap<TestName, BTreeMap<Digest, ParamSet>> {
		&self.by_test
	}
}
