use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use gild_indexer::{DagError, IndexError, Indexer, IndexerStats};
use gild_model::{ComplexTile, Expectations, IgnoreState, Label, Query, Tile, Trace};
use pretty_assertions::assert_eq;

use crate::common::*;

#[tokio::test]
async fn tile_fetch_failure_fails_construction() {
	let fakes = Fakes::new(three_devices_tile(), baseline_expectations());
	fakes.tiles.fail.store(true, Ordering::SeqCst);

	let err = Indexer::new(loop_config(), fakes.deps()).await.unwrap_err();
	assert!(matches!(err, IndexError::Tile(_)), "{err}");
}

#[tokio::test]
async fn failing_first_run_fails_construction() {
	let fakes = Fakes::new(three_devices_tile(), baseline_expectations());
	fakes.expectations.fail.store(true, Ordering::SeqCst);

	let err = Indexer::new(loop_config(), fakes.deps()).await.unwrap_err();
	let IndexError::Run(dag) = err else {
		panic!("expected a run failure, got {err}");
	};
	assert!(matches!(*dag, DagError::Node { source: IndexError::Expectations(_), .. }));
	assert!(["calc_blame", "calc_summaries"].contains(&dag.node()));
}

#[tokio::test]
async fn zero_interval_runs_once_and_ignores_changes() {
	let fakes = Fakes::new(three_devices_tile(), baseline_expectations());
	let indexer = fakes.start(no_refresh_config()).await;
	assert_eq!(fakes.tiles.calls.load(Ordering::SeqCst), 1);

	let idx = indexer.get_index();
	assert_eq!(idx.generation(), 1);
	assert_eq!(idx.summaries(IgnoreState::ExcludeIgnoredTraces).len(), 2);
	assert!(format!("{indexer:?}").contains("running: false"));

	fakes.triage(ALPHA, "a_new", Label::Positive);
	tokio::time::sleep(Duration::from_millis(100)).await;
	assert!(Arc::ptr_eq(&indexer.get_index(), &idx));
	assert_eq!(
		indexer.stats(),
		IndexerStats {
			full_runs: 1,
			generation: 1,
			..IndexerStats::default()
		}
	);
}

#[tokio::test]
async fn empty_tile_publishes_an_empty_snapshot() {
	let fakes = Fakes::new(ComplexTile::new(Tile::default(), vec![]), Expectations::new());
	let indexer = fakes.start(no_refresh_config()).await;

	let idx = indexer.get_index();
	assert_eq!(idx.generation(), 1);
	for is in [IgnoreState::IncludeIgnoredTraces, IgnoreState::ExcludeIgnoredTraces] {
		assert!(idx.summaries(is).is_empty());
		assert!(idx.digest_counts_by_test(is).is_empty());
		assert!(idx.sliced_traces(is, &Query::new()).is_empty());
	}
	assert_eq!(idx.blame(&ALPHA.into(), &"a_new".into(), &commits()).freq, vec![0; commits().len()]);
}

#[tokio::test]
async fn shutdown_stops_reacting_to_changes() {
	let fakes = Fakes::new(three_devices_tile(), baseline_expectations());
	let indexer = fakes.start(loop_config()).await;
	indexer.shutdown().await;

	fakes.triage(ALPHA, "a_new", Label::Positive);
	tokio::time::sleep(Duration::from_millis(100)).await;
	assert_eq!(indexer.get_index().generation(), 1);
	assert_eq!(indexer.stats().partial_runs, 0);
}

#[tokio::test]
async fn new_tile_replaces_every_view() {
	let fakes = Fakes::new(three_devices_tile(), baseline_expectations());
	let indexer = fakes.start(loop_config().with_interval(Duration::from_millis(50))).await;
	let before = indexer.get_index();
	let mut rx = indexer.subscribe();

	let mut traces: Vec<Trace> = before.tile().tile(IgnoreState::IncludeIgnoredTraces).traces.values().map(|t| Trace::clone(t)).collect();
	traces.push(trace("GammaTest", CORPUS, "alpha", &[Some("g1"), Some("g1"), Some("g2")]));
	fakes.tiles.set(ComplexTile::new(Tile::new(commits(), traces), vec![crosshatch_rule()]));

	loop {
		next_generation(&mut rx).await;
		if indexer.get_index().summaries(IgnoreState::ExcludeIgnoredTraces).len() == 3 {
			break;
		}
	}
	let after = indexer.get_index();
	assert!(!Arc::ptr_eq(after.pre_sliced(), before.pre_sliced()));
	assert!(!Arc::ptr_eq(
		after.digest_counter(IgnoreState::IncludeIgnoredTraces),
		before.digest_counter(IgnoreState::IncludeIgnoredTraces)
	));
	assert!(after.test_names().is_empty());
	assert!(indexer.stats().full_runs >= 2);
	indexer.shutdown().await;
}
