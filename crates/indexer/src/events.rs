//! Events feeding the indexer loop and the planner that folds a burst of them
//! into one unit of work.

use std::collections::BTreeSet;
use std::sync::Arc;

use gild_model::{ComplexTile, Digest, ExpectationDelta, TestName};

/// Something the indexer must react to.
#[derive(Debug, Clone)]
pub enum IndexEvent {
	/// A new tile arrived.
	Tile(Arc<ComplexTile>),
	/// One triage change.
	Delta(ExpectationDelta),
	/// The change feed dropped this many events; affected tests are unknown.
	ExpectationsLagged(u64),
}

/// Mailbox coalescing identity. Queued events with equal keys are replaced by
/// the newer one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EventKey {
	Tile,
	Delta(TestName, Digest),
	Lagged,
}

impl IndexEvent {
	pub(crate) fn coalesce_key(&self) -> EventKey {
		match self {
			Self::Tile(_) => EventKey::Tile,
			Self::Delta(delta) => EventKey::Delta(delta.grouping.clone(), delta.digest.clone()),
			Self::ExpectationsLagged(_) => EventKey::Lagged,
		}
	}
}

/// Which tests an expectations-only run recomputes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestScope {
	/// Every test; summaries are replaced wholesale.
	All,
	/// Only these tests; their summaries are merged into the previous ones.
	Only(BTreeSet<TestName>),
}

/// One run of the pipeline.
#[derive(Debug, Clone)]
pub enum IndexWork {
	/// Recompute everything from this tile.
	Full(Arc<ComplexTile>),
	/// Recompute blame and summaries over the current tile.
	Partial(TestScope),
}

/// Folds a burst of events into at most one run.
///
/// Any tile wins and the newest one is used; pending deltas are subsumed. Without
/// a tile, the groupings named by deltas form the partial scope, widened to
/// every test if the change feed lagged.
pub fn plan_work(events: impl IntoIterator<Item = IndexEvent>) -> Option<IndexWork> {
	let mut tile = None;
	let mut tests = BTreeSet::new();
	let mut lagged = false;
	let mut saw_delta = false;

	for event in events {
		match event {
			IndexEvent::Tile(t) => tile = Some(t),
			IndexEvent::Delta(delta) => {
				saw_delta = true;
				tests.insert(delta.grouping);
			}
			IndexEvent::ExpectationsLagged(_) => lagged = true,
		}
	}

	if let Some(tile) = tile {
		return Some(IndexWork::Full(tile));
	}
	if lagged {
		return Some(IndexWork::Partial(TestScope::All));
	}
	saw_delta.then_some(IndexWork::Partial(TestScope::Only(tests)))
}
