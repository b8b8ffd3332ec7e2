//! The indexing task graph and its node functions.
//!
//! ```text
//! root ─┬─ counts_include ─┬─ paramsets_include ──────────────┐
//!       │                  └─ write_known_hashes              │
//!       ├─ counts_exclude ─── paramsets_exclude ──────────────┤
//!       └─ pre_slice                                          │
//! [counts_*, pre_slice] ─ exp_changed ─ blame ─┐              │
//!                         exp_changed ─────────┴─ summaries ─┬┴─ set_index
//!                                                            └── run_warmer
//! ```
//!
//! A full run starts at `root` over a fresh [`SearchIndex`]. A partial run
//! starts at `exp_changed` over a clone of the published snapshot, so only
//! blame, summaries and their dependents execute.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use gild_model::{Blamer, DigestCounter, IgnoreState, ParamSummary, PerIgnoreState, SummaryInput, TriageStatus, summary::merge_sorted};
use gild_worker::TaskClass;
use parking_lot::Mutex;

use crate::dag::{NodeId, TaskGraph};
use crate::error::{IndexError, Result};
use crate::events::{IndexWork, TestScope};
use crate::indexer::IndexerCore;
use crate::search_index::SearchIndex;
use crate::slices::{PreSliced, SliceKey};
use crate::sources::WarmerInput;

/// The snapshot under construction during one run.
///
/// Nodes copy out the `Arc`s they need, compute without holding the lock,
/// then store their result.
pub(crate) struct IndexBuild {
	index: Mutex<SearchIndex>,
}

impl IndexBuild {
	fn new(index: SearchIndex) -> Self {
		Self { index: Mutex::new(index) }
	}

	fn read<R>(&self, f: impl FnOnce(&SearchIndex) -> R) -> R {
		f(&self.index.lock())
	}

	fn write(&self, f: impl FnOnce(&mut SearchIndex)) {
		f(&mut self.index.lock());
	}

	/// Frozen copy of the current state.
	fn finish(&self) -> SearchIndex {
		self.index.lock().clone()
	}
}

/// The wired graph plus its two entry points.
pub(crate) struct Pipeline {
	graph: TaskGraph<IndexBuild, IndexError>,
	root: NodeId,
	exp_changed: NodeId,
}

impl Pipeline {
	pub(crate) fn new(core: &Arc<IndexerCore>) -> Self {
		let mut graph: TaskGraph<IndexBuild, IndexError> = TaskGraph::new();
		let root = graph.barrier("root", &[]);

		let counts_include = graph.child(root, "counts_include", |b| calc_digest_counts(b, IgnoreState::IncludeIgnoredTraces));
		let counts_exclude = graph.child(root, "counts_exclude", |b| calc_digest_counts(b, IgnoreState::ExcludeIgnoredTraces));
		let pre_slice = graph.child(root, "pre_slice", pre_slice_data);

		let paramsets_include = graph.child(counts_include, "paramsets_include", |b| calc_paramsets(b, IgnoreState::IncludeIgnoredTraces));
		let paramsets_exclude = graph.child(counts_exclude, "paramsets_exclude", |b| calc_paramsets(b, IgnoreState::ExcludeIgnoredTraces));

		let known = Arc::clone(core);
		graph.child(counts_include, "write_known_hashes", move |b| write_known_hashes(b, Arc::clone(&known)));

		let exp_changed = graph.barrier("exp_changed", &[counts_include, counts_exclude, pre_slice]);
		let blame = graph.child(exp_changed, "calc_blame", calc_blame);
		let summaries = graph.node_with_parents("calc_summaries", calc_summaries, &[exp_changed, blame]);

		let warm = Arc::clone(core);
		graph.child(summaries, "run_warmer", move |b| run_warmer(b, Arc::clone(&warm)));

		let publish = Arc::clone(core);
		graph.node_with_parents(
			"set_index",
			move |b| set_index(b, Arc::clone(&publish)),
			&[summaries, paramsets_include, paramsets_exclude],
		);

		Self { graph, root, exp_changed }
	}

	/// Executes one unit of work; publishes only if every node succeeded.
	pub(crate) async fn run(&self, core: &IndexerCore, work: IndexWork) -> Result<()> {
		let (kind, start, index) = match work {
			IndexWork::Full(tile) => ("full", self.root, SearchIndex::new(tile, Arc::clone(&core.expectations))),
			IndexWork::Partial(scope) => {
				let tests = match scope {
					TestScope::All => BTreeSet::new(),
					TestScope::Only(tests) => tests,
				};
				("partial", self.exp_changed, core.current().clone_for_partial(tests))
			}
		};

		let started = Instant::now();
		tracing::info!(kind, tests = index.test_names.len(), "indexer.run.start");
		self.graph.trigger(start, Arc::new(IndexBuild::new(index))).await?;
		tracing::info!(kind, elapsed_ms = started.elapsed().as_millis() as u64, "indexer.run.done");
		Ok(())
	}
}

/// Runs CPU-bound model work off the async workers.
async fn cpu<T, F>(task: &'static str, f: F) -> Result<T>
where
	F: FnOnce() -> T + Send + 'static,
	T: Send + 'static,
{
	gild_worker::spawn_blocking(TaskClass::CpuBlocking, f)
		.await
		.map_err(|err| IndexError::Worker {
			task,
			message: gild_worker::join_error_panic_message(err).unwrap_or_else(|| "cancelled".to_string()),
		})
}

async fn pre_slice_data(build: Arc<IndexBuild>) -> Result<()> {
	let cpx = build.read(|idx| Arc::clone(&idx.cpx_tile));
	let sliced = cpu("pre_slice", move || PreSliced::new(&cpx)).await?;
	build.write(|idx| idx.pre_sliced = Arc::new(sliced));
	Ok(())
}

async fn calc_digest_counts(build: Arc<IndexBuild>, is: IgnoreState) -> Result<()> {
	let cpx = build.read(|idx| Arc::clone(&idx.cpx_tile));
	let counter = cpu("calc_digest_counts", move || DigestCounter::new(cpx.tile(is))).await?;
	build.write(|idx| idx.dcounters[is] = Arc::new(counter));
	Ok(())
}

async fn calc_paramsets(build: Arc<IndexBuild>, is: IgnoreState) -> Result<()> {
	let (cpx, counter) = build.read(|idx| (Arc::clone(&idx.cpx_tile), Arc::clone(&idx.dcounters[is])));
	let summary = cpu("calc_paramsets", move || ParamSummary::new(cpx.tile(is), &counter)).await?;
	build.write(|idx| idx.paramset_summaries[is] = Arc::new(summary));
	Ok(())
}

async fn calc_blame(build: Arc<IndexBuild>) -> Result<()> {
	let (store, cpx) = build.read(|idx| (Arc::clone(&idx.expectations), Arc::clone(&idx.cpx_tile)));
	let exps = store.get().await.map_err(IndexError::Expectations)?;
	let blamer = cpu("calc_blame", move || Blamer::new(cpx.tile(IgnoreState::ExcludeIgnoredTraces), &exps)).await??;
	build.write(|idx| idx.blamer = Some(Arc::new(blamer)));
	Ok(())
}

async fn calc_summaries(build: Arc<IndexBuild>) -> Result<()> {
	let (store, pre_sliced, dcounters, blamer, tests, previous) = build.read(|idx| {
		(
			Arc::clone(&idx.expectations),
			Arc::clone(&idx.pre_sliced),
			idx.dcounters.clone(),
			idx.blamer.clone(),
			Arc::clone(&idx.test_names),
			idx.summaries.clone(),
		)
	});
	let exps = store.get().await.map_err(IndexError::Expectations)?;

	let summaries: PerIgnoreState<Arc<[Arc<TriageStatus>]>> = cpu("calc_summaries", move || {
		PerIgnoreState::from_fn(|is| {
			let traces = pre_sliced.get(&SliceKey::all(is));
			let input = SummaryInput {
				traces: &traces,
				expectations: &exps,
				by_trace: dcounters[is].by_trace(),
				blamer: blamer.as_deref(),
			};
			let fresh = input.calculate(None, &tests, true);
			if tests.is_empty() {
				Arc::from(fresh)
			} else {
				Arc::from(merge_sorted(&previous[is], fresh))
			}
		})
	})
	.await?;

	build.write(|idx| idx.summaries = summaries);
	Ok(())
}

async fn write_known_hashes(build: Arc<IndexBuild>, core: Arc<IndexerCore>) -> Result<()> {
	let counter = build.read(|idx| Arc::clone(&idx.dcounters[IgnoreState::IncludeIgnoredTraces]));
	core.side_effects
		.write_known_hashes(Arc::clone(&core.diff_store), counter, core.config.known_hashes_timeout);
	Ok(())
}

async fn run_warmer(build: Arc<IndexBuild>, core: Arc<IndexerCore>) -> Result<()> {
	let input = build.read(|idx| WarmerInput {
		summaries: Arc::clone(&idx.summaries[IgnoreState::IncludeIgnoredTraces]),
		digests: Arc::clone(&idx.dcounters[IgnoreState::IncludeIgnoredTraces]),
		test_names: Arc::clone(&idx.test_names),
	});
	core.side_effects.run_warmer(
		Arc::clone(&core.warmer),
		Arc::clone(&core.diff_finder),
		input,
		core.config.warmer_timeout,
	);
	Ok(())
}

async fn set_index(build: Arc<IndexBuild>, core: Arc<IndexerCore>) -> Result<()> {
	core.publish(build.finish());
	Ok(())
}
