use std::collections::BTreeSet;

use gild_model::{CORPUS_FIELD, ComplexTile, IgnoreState, PRIMARY_KEY_FIELD, Query, Tile, TraceId};
use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::common::*;

/// The three-device fixture plus a second corpus with two more tests.
fn two_corpora_tile() -> ComplexTile {
	let mut traces: Vec<_> = three_devices_tile()
		.tile(IgnoreState::IncludeIgnoredTraces)
		.traces
		.values()
		.map(|t| t.as_ref().clone())
		.collect();
	traces.extend([
		trace("SvgA", "svg", "alpha", &[Some("s1"), Some("s1"), Some("s1")]),
		trace("SvgA", "svg", "crosshatch", &[Some("s1"), None, Some("s2")]),
		trace("SvgB", "svg", "beta", &[None, None, Some("s3")]),
	]);
	ComplexTile::new(Tile::new(commits(), traces), vec![crosshatch_rule()])
}

fn ids(pairs: Vec<gild_model::TracePair>) -> BTreeSet<TraceId> {
	pairs.into_iter().map(|p| p.id).collect()
}

fn expected(cpx: &ComplexTile, is: IgnoreState, keep: impl Fn(&str, &str) -> bool) -> BTreeSet<TraceId> {
	cpx.tile(is)
		.traces
		.iter()
		.filter(|(_, t)| keep(t.corpus().unwrap_or_default(), t.test_name().as_ref().map_or("", |n| n.as_str())))
		.map(|(id, _)| id.clone())
		.collect()
}

#[tokio::test]
async fn excluding_ignores_drops_exactly_the_crosshatch_traces() {
	let fakes = Fakes::new(three_devices_tile(), baseline_expectations());
	let indexer = fakes.start(no_refresh_config()).await;
	let idx = indexer.get_index();

	let all = idx.sliced_traces(IgnoreState::IncludeIgnoredTraces, &Query::new());
	let kept = idx.sliced_traces(IgnoreState::ExcludeIgnoredTraces, &Query::new());
	assert_eq!((all.len(), kept.len()), (6, 4));

	let dropped: BTreeSet<_> = ids(all).difference(&ids(kept)).cloned().collect();
	assert_eq!(dropped.len(), 2);
	assert!(dropped.iter().all(|id| id.as_str().contains("device=crosshatch")));
}

#[rstest]
#[case::include(IgnoreState::IncludeIgnoredTraces)]
#[case::exclude(IgnoreState::ExcludeIgnoredTraces)]
#[tokio::test]
async fn partitions_match_a_brute_force_filter(#[case] is: IgnoreState) {
	let cpx = two_corpora_tile();
	let fakes = Fakes::new(cpx.clone(), baseline_expectations());
	let indexer = fakes.start(no_refresh_config()).await;
	let idx = indexer.get_index();

	assert_eq!(ids(idx.sliced_traces(is, &Query::new())), expected(&cpx, is, |_, _| true));
	assert_eq!(
		ids(idx.sliced_traces(is, &Query::new().with(CORPUS_FIELD, ["svg"]))),
		expected(&cpx, is, |corpus, _| corpus == "svg")
	);
	assert_eq!(
		ids(idx.sliced_traces(is, &Query::new().with(CORPUS_FIELD, ["gm"]).with(PRIMARY_KEY_FIELD, [ALPHA, BETA]))),
		expected(&cpx, is, |corpus, _| corpus == "gm")
	);
	assert_eq!(
		ids(idx.sliced_traces(is, &Query::new().with(CORPUS_FIELD, ["svg"]).with(PRIMARY_KEY_FIELD, ["SvgA"]))),
		expected(&cpx, is, |_, test| test == "SvgA")
	);
	assert!(
		idx.sliced_traces(is, &Query::new().with(CORPUS_FIELD, ["gm"]).with(PRIMARY_KEY_FIELD, ["SvgA"]))
			.is_empty()
	);
}

#[tokio::test]
async fn summarize_by_grouping_stays_inside_the_corpus() {
	let fakes = Fakes::new(two_corpora_tile(), baseline_expectations());
	let indexer = fakes.start(no_refresh_config()).await;
	let idx = indexer.get_index();

	let svg = idx
		.summarize_by_grouping("svg", &Query::new(), IgnoreState::IncludeIgnoredTraces, false)
		.await
		.unwrap();
	let names: Vec<_> = svg.iter().map(|s| s.name.as_str()).collect();
	assert_eq!(names, vec!["SvgA", "SvgB"]);
	assert_eq!(svg[0].num, 2);

	let only_alpha = Query::new().with("device", ["alpha"]);
	let svg_alpha = idx
		.summarize_by_grouping("svg", &only_alpha, IgnoreState::ExcludeIgnoredTraces, false)
		.await
		.unwrap();
	assert_eq!(svg_alpha.len(), 1, "SvgB has no alpha trace and yields no entry");
	assert_eq!(svg_alpha[0].num, 1);
}
