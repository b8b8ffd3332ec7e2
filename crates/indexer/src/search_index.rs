//! The queryable snapshot of one tile and expectations state.
//!
//! A [`SearchIndex`] handed out by [`crate::Indexer::get_index`] is frozen:
//! every field is an `Arc` to data that is never written again. Partial runs
//! clone the previous snapshot (pointer copies) and replace only blame and
//! summaries, so digest counts, parameter sets and pre-sliced partitions are
//! shared by reference across generations of the same tile.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use gild_model::{
	BlameDistribution, Blamer, Commit, ComplexTile, Digest, DigestCount, DigestCounter, IgnoreMatcher, IgnoreState, Label, ParamSet,
	ParamSummary, PerIgnoreState, Query, SummaryInput, TestName, TraceId, TracePair, TriageStatus,
};
use gild_worker::{TaskClass, WorkerJoinSet};

use crate::error::{IndexError, Result};
use crate::slices::{PreSliced, SliceKey};
use crate::sources::ExpectationsStore;

/// One consistent view over a complex tile and the views derived from it.
#[derive(Clone)]
pub struct SearchIndex {
	pub(crate) expectations: Arc<dyn ExpectationsStore>,
	pub(crate) cpx_tile: Arc<ComplexTile>,
	pub(crate) dcounters: PerIgnoreState<Arc<DigestCounter>>,
	pub(crate) summaries: PerIgnoreState<Arc<[Arc<TriageStatus>]>>,
	pub(crate) paramset_summaries: PerIgnoreState<Arc<ParamSummary>>,
	pub(crate) blamer: Option<Arc<Blamer>>,
	pub(crate) pre_sliced: Arc<PreSliced>,
	/// Tests recomputed by the run that built this snapshot; empty after a full run.
	pub(crate) test_names: Arc<BTreeSet<TestName>>,
	pub(crate) generation: u64,
}

impl fmt::Debug for SearchIndex {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SearchIndex")
			.field("generation", &self.generation)
			.field("commits", &self.cpx_tile.commits().len())
			.field("traces", &self.cpx_tile.tile(IgnoreState::IncludeIgnoredTraces).traces.len())
			.field("summaries", &self.summaries[IgnoreState::ExcludeIgnoredTraces].len())
			.field("has_blame", &self.blamer.is_some())
			.field("test_names", &self.test_names)
			.finish()
	}
}

impl SearchIndex {
	/// Empty snapshot for a full run over `cpx_tile`.
	pub(crate) fn new(cpx_tile: Arc<ComplexTile>, expectations: Arc<dyn ExpectationsStore>) -> Self {
		Self {
			expectations,
			cpx_tile,
			dcounters: PerIgnoreState::from_fn(|_| Arc::default()),
			summaries: PerIgnoreState::from_fn(|_| Arc::from(Vec::new())),
			paramset_summaries: PerIgnoreState::from_fn(|_| Arc::default()),
			blamer: None,
			pre_sliced: Arc::default(),
			test_names: Arc::default(),
			generation: 0,
		}
	}

	/// Assembles a snapshot from precomputed parts; partitions are derived from `cpx_tile`.
	pub fn for_testing(
		expectations: Arc<dyn ExpectationsStore>,
		cpx_tile: Arc<ComplexTile>,
		dcounters: PerIgnoreState<DigestCounter>,
		summaries: PerIgnoreState<Vec<Arc<TriageStatus>>>,
		paramset_summaries: PerIgnoreState<ParamSummary>,
		blamer: Option<Blamer>,
	) -> Self {
		let pre_sliced = Arc::new(PreSliced::new(&cpx_tile));
		Self {
			expectations,
			cpx_tile,
			dcounters: PerIgnoreState::from_fn(|is| Arc::new(dcounters[is].clone())),
			summaries: PerIgnoreState::from_fn(|is| Arc::from(summaries[is].clone())),
			paramset_summaries: PerIgnoreState::from_fn(|is| Arc::new(paramset_summaries[is].clone())),
			blamer: blamer.map(Arc::new),
			pre_sliced,
			test_names: Arc::default(),
			generation: 0,
		}
	}

	/// Shallow copy for an expectations-only run over `test_names`.
	///
	/// Blame is cleared; summaries are carried so the run can merge into them.
	pub(crate) fn clone_for_partial(&self, test_names: BTreeSet<TestName>) -> Self {
		Self {
			blamer: None,
			test_names: Arc::new(test_names),
			..self.clone()
		}
	}

	pub fn tile(&self) -> &Arc<ComplexTile> {
		&self.cpx_tile
	}

	pub fn ignore_matcher(&self) -> &Arc<IgnoreMatcher> {
		self.cpx_tile.ignore_matcher()
	}

	/// Publication counter; increases by one per published snapshot.
	pub fn generation(&self) -> u64 {
		self.generation
	}

	/// Tests the building run was restricted to; empty for a full run.
	pub fn test_names(&self) -> &Arc<BTreeSet<TestName>> {
		&self.test_names
	}

	pub fn digest_counter(&self, is: IgnoreState) -> &Arc<DigestCounter> {
		&self.dcounters[is]
	}

	pub fn digest_counts_by_test(&self, is: IgnoreState) -> &BTreeMap<TestName, DigestCount> {
		self.dcounters[is].by_test()
	}

	pub fn digest_counts_by_trace(&self, is: IgnoreState) -> &BTreeMap<TraceId, DigestCount> {
		self.dcounters[is].by_trace()
	}

	pub fn max_digests_by_test(&self, is: IgnoreState) -> &BTreeMap<TestName, BTreeSet<Digest>> {
		self.dcounters[is].max_digests_by_test()
	}

	pub fn digest_counts_by_query(&self, query: &Query, is: IgnoreState) -> DigestCount {
		self.dcounters[is].by_query(self.cpx_tile.tile(is), query)
	}

	/// Every summary of the `is` view, ordered by test name.
	pub fn summaries(&self, is: IgnoreState) -> &Arc<[Arc<TriageStatus>]> {
		&self.summaries[is]
	}

	pub fn paramsets(&self, is: IgnoreState) -> &Arc<ParamSummary> {
		&self.paramset_summaries[is]
	}

	pub fn paramset_summary(&self, test: &TestName, digest: &Digest, is: IgnoreState) -> Option<&ParamSet> {
		self.paramset_summaries[is].get(test, digest)
	}

	pub fn paramset_summary_by_test(&self, is: IgnoreState) -> &BTreeMap<TestName, BTreeMap<Digest, ParamSet>> {
		self.paramset_summaries[is].by_test()
	}

	/// Blame for `(test, digest)` aligned to `commits`.
	///
	/// All zeros when this snapshot carries no blame.
	pub fn blame(&self, test: &TestName, digest: &Digest, commits: &[Commit]) -> BlameDistribution {
		match &self.blamer {
			Some(blamer) => blamer.get_blame(test, digest, commits),
			None => BlameDistribution {
				freq: vec![0; commits.len()],
				old: false,
			},
		}
	}

	pub fn pre_sliced(&self) -> &Arc<PreSliced> {
		&self.pre_sliced
	}

	/// Traces selected by the corpus and test-name clauses of `query`.
	pub fn sliced_traces(&self, is: IgnoreState, query: &Query) -> Vec<TracePair> {
		self.pre_sliced.select(is, query)
	}

	/// Summaries for one corpus, computed per test partition in parallel.
	///
	/// Tests whose traces all fail `query` produce no entry. Result ordered by
	/// test name.
	pub async fn summarize_by_grouping(&self, corpus: &str, query: &Query, is: IgnoreState, head_only: bool) -> Result<Vec<Arc<TriageStatus>>> {
		let exps = self.expectations.get().await.map_err(IndexError::Expectations)?;
		let mut tasks = WorkerJoinSet::new(TaskClass::CpuBlocking);

		for test in self.pre_sliced.tests_in_corpus(is, corpus) {
			let traces = self.pre_sliced.get(&SliceKey::test(is, corpus, test.clone()));
			let exps = Arc::clone(&exps);
			let counter = Arc::clone(&self.dcounters[is]);
			let blamer = self.blamer.clone();
			let query = query.clone();
			tasks.spawn_blocking(move || {
				let input = SummaryInput {
					traces: &traces,
					expectations: &exps,
					by_trace: counter.by_trace(),
					blamer: blamer.as_deref(),
				};
				(test, input.calculate(Some(&query), &BTreeSet::new(), head_only))
			});
		}

		let (results, failures) = tasks.join_all().await;
		if let Some(err) = failures.into_iter().next() {
			return Err(IndexError::Worker {
				task: "summarize_by_grouping",
				message: gild_worker::join_error_panic_message(err).unwrap_or_else(|| "cancelled".to_string()),
			});
		}

		let mut out = Vec::with_capacity(results.len());
		for (test, sums) in results {
			if sums.len() > 1 {
				tracing::warn!(%test, corpus, count = sums.len(), "indexer.summarize.multiple_per_test");
			}
			out.extend(sums);
		}
		out.sort_by(|a, b| a.name.cmp(&b.name));
		Ok(out)
	}

	/// Newest digest of `trace_id` that current expectations label positive.
	pub async fn most_recent_positive_digest(&self, trace_id: &TraceId) -> Result<Option<Digest>> {
		let Some(trace) = self.cpx_tile.tile(IgnoreState::IncludeIgnoredTraces).traces.get(trace_id) else {
			return Ok(None);
		};
		let Some(test) = trace.test_name() else {
			return Ok(None);
		};
		let exps = self.expectations.get().await.map_err(IndexError::Expectations)?;
		Ok(trace
			.digests
			.iter()
			.rev()
			.flatten()
			.find(|digest| exps.classification(&test, digest) == Label::Positive)
			.cloned())
	}
}
