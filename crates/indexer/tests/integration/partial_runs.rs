use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use gild_model::{Digest, IgnoreState, Label, TestName};
use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::common::*;

#[rstest]
#[case::exclude(IgnoreState::ExcludeIgnoredTraces, 1)]
#[case::include(IgnoreState::IncludeIgnoredTraces, 2)]
#[tokio::test]
async fn full_run_summarizes_every_test(#[case] is: IgnoreState, #[case] untriaged: usize) {
	let fakes = Fakes::new(three_devices_tile(), baseline_expectations());
	let indexer = fakes.start(no_refresh_config()).await;
	let idx = indexer.get_index();

	let sums = idx.summaries(is);
	let names: Vec<_> = sums.iter().map(|s| s.name.as_str()).collect();
	assert_eq!(names, vec![ALPHA, BETA]);
	for status in sums.iter() {
		assert_eq!(status.corpus, CORPUS);
		assert_eq!(status.pos, 1);
		assert_eq!(status.untriaged, untriaged);
		assert_eq!(status.blame.len(), untriaged);
	}
	assert!(sums[0].untriaged_hashes.contains(&Digest::from("a_new")));
}

#[tokio::test]
async fn triage_recomputes_only_the_affected_test() {
	let fakes = Fakes::new(three_devices_tile(), baseline_expectations());
	let indexer = fakes.start(loop_config()).await;
	let before = indexer.get_index();
	let mut rx = indexer.subscribe();

	fakes.triage(ALPHA, "a_new", Label::Positive);
	assert_eq!(next_generation(&mut rx).await, 2);
	let after = indexer.get_index();

	let is = IgnoreState::ExcludeIgnoredTraces;
	let (old_alpha, new_alpha) = (&before.summaries(is)[0], &after.summaries(is)[0]);
	assert_eq!((old_alpha.pos, old_alpha.untriaged), (1, 1));
	assert_eq!((new_alpha.pos, new_alpha.untriaged), (2, 0));
	assert!(new_alpha.untriaged_hashes.is_empty());

	for is in IgnoreState::ALL {
		assert!(Arc::ptr_eq(&before.summaries(is)[1], &after.summaries(is)[1]), "BetaTest summary replaced");
		assert!(Arc::ptr_eq(before.digest_counter(is), after.digest_counter(is)));
		assert!(Arc::ptr_eq(before.paramsets(is), after.paramsets(is)));
	}
	assert!(Arc::ptr_eq(before.pre_sliced(), after.pre_sliced()));
	assert!(Arc::ptr_eq(before.tile(), after.tile()));
	assert_eq!(after.test_names().as_ref(), &BTreeSet::from([TestName::from(ALPHA)]));

	// The published snapshot carries freshly computed blame again.
	let commits = after.tile().commits().to_vec();
	let blame = after.blame(&BETA.into(), &"b_new".into(), &commits);
	assert_eq!(blame.freq, vec![0, 1, 0]);

	let stats = indexer.stats();
	assert_eq!((stats.full_runs, stats.partial_runs, stats.failed_runs), (1, 1, 0));
	indexer.shutdown().await;
}

#[tokio::test]
async fn warmer_sees_the_partial_scope() {
	let fakes = Fakes::new(three_devices_tile(), baseline_expectations());
	let indexer = fakes.start(loop_config()).await;
	let mut rx = indexer.subscribe();

	fakes.triage(BETA, "b_new", Label::Negative);
	next_generation(&mut rx).await;
	eventually(|| fakes.warmer.inputs.lock().len() == 2).await;

	let inputs = fakes.warmer.inputs.lock().clone();
	assert!(inputs[0].test_names.is_empty());
	assert_eq!(inputs[1].test_names.as_ref(), &BTreeSet::from([TestName::from(BETA)]));
	let beta = &inputs[1].summaries[1];
	assert_eq!((beta.neg, beta.untriaged), (1, 1), "ignore-inclusive view keeps b_cross untriaged");
	assert!(fakes.finder.calls.load(Ordering::SeqCst) > 0);
	indexer.shutdown().await;
}

#[tokio::test]
async fn failed_partial_run_keeps_the_previous_snapshot() {
	let fakes = Fakes::new(three_devices_tile(), baseline_expectations());
	let indexer = fakes.start(loop_config()).await;
	let before = indexer.get_index();

	fakes.expectations.fail.store(true, Ordering::SeqCst);
	fakes.triage(ALPHA, "a_new", Label::Positive);
	eventually(|| indexer.stats().failed_runs == 1).await;
	assert!(Arc::ptr_eq(&indexer.get_index(), &before));

	// The next change retries naturally.
	let mut rx = indexer.subscribe();
	fakes.expectations.fail.store(false, Ordering::SeqCst);
	fakes.triage(BETA, "b_new", Label::Positive);
	next_generation(&mut rx).await;

	let after = indexer.get_index();
	let is = IgnoreState::ExcludeIgnoredTraces;
	assert_eq!(after.summaries(is)[1].untriaged, 0);
	// AlphaTest was not in this run's scope; its summary still predates the failed triage.
	assert!(Arc::ptr_eq(&after.summaries(is)[0], &before.summaries(is)[0]));
	indexer.shutdown().await;
}

#[tokio::test]
async fn every_event_runs_or_is_coalesced() {
	let fakes = Fakes::new(three_devices_tile(), baseline_expectations());
	let indexer = fakes.start(loop_config()).await;

	fakes.triage(ALPHA, "a_new", Label::Positive);
	fakes.triage(BETA, "b_new", Label::Positive);
	fakes.triage(ALPHA, "a_cross", Label::Negative);

	eventually(|| {
		let stats = indexer.stats();
		stats.partial_runs + stats.coalesced_events == 3
	})
	.await;
	let idx = indexer.get_index();
	for status in idx.summaries(IgnoreState::ExcludeIgnoredTraces).iter() {
		assert_eq!(status.untriaged, 0, "{}", status.name);
	}
	assert_eq!(indexer.stats().full_runs, 1);
	indexer.shutdown().await;
}

#[tokio::test]
async fn lagging_feed_recomputes_every_test() {
	let fakes = Fakes::with_feed_capacity(three_devices_tile(), baseline_expectations(), 1);
	let indexer = fakes.start(loop_config()).await;
	let mut rx = indexer.subscribe();

	fakes.triage(ALPHA, "a_new", Label::Positive);
	fakes.triage(BETA, "b_new", Label::Positive);
	fakes.triage(BETA, "b_cross", Label::Positive);
	next_generation(&mut rx).await;

	let idx = indexer.get_index();
	assert!(idx.test_names().is_empty(), "lag must widen the run to every test");
	let include = idx.summaries(IgnoreState::IncludeIgnoredTraces);
	assert_eq!(include[1].untriaged, 0);
	indexer.shutdown().await;
}
