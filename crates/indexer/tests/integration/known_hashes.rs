use std::collections::BTreeSet;

use gild_model::{Digest, IgnoreState, Label};
use pretty_assertions::assert_eq;

use crate::common::*;

fn all_digests() -> Vec<Digest> {
	["a_cross", "a_good", "a_new", "b_cross", "b_good", "b_new"].into_iter().map(Digest::from).collect()
}

#[tokio::test]
async fn written_set_excludes_unavailable_digests() {
	let fakes = Fakes::new(three_devices_tile(), baseline_expectations());
	fakes.diff_store.unavailable.lock().insert(Digest::from("b_cross"));

	let indexer = fakes.start(no_refresh_config()).await;
	indexer.wait_for_side_effects().await;
	assert_eq!(indexer.pending_side_effects(), 0);

	let written = fakes.diff_store.written.lock().clone();
	assert_eq!(written.len(), 1);
	let expected: Vec<Digest> = all_digests().into_iter().filter(|d| d.as_str() != "b_cross").collect();
	assert_eq!(written[0], expected);

	// Everything written is drawn from the ignore-inclusive counts.
	let idx = indexer.get_index();
	let counted: BTreeSet<&Digest> = idx
		.digest_counts_by_test(IgnoreState::IncludeIgnoredTraces)
		.values()
		.flat_map(|c| c.keys())
		.collect();
	assert_eq!(counted.len(), all_digests().len());
}

#[tokio::test]
async fn partial_runs_do_not_republish_known_hashes() {
	let fakes = Fakes::new(three_devices_tile(), baseline_expectations());
	let indexer = fakes.start(loop_config()).await;
	let mut rx = indexer.subscribe();

	fakes.triage(ALPHA, "a_new", Label::Positive);
	next_generation(&mut rx).await;
	eventually(|| fakes.warmer.inputs.lock().len() == 2).await;
	indexer.wait_for_side_effects().await;

	assert_eq!(fakes.diff_store.written.lock().len(), 1);
	indexer.shutdown().await;
}
