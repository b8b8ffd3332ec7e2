//! Detached, deadline-bound work fired at the end of a pipeline run.
//!
//! Each trigger receives only the projection of the snapshot it needs, so a
//! superseded snapshot is not kept alive by a slow side effect.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use gild_model::{Digest, DigestCounter};
use gild_worker::{BoundedExit, BoundedTask, TaskClass};
use parking_lot::Mutex;

use crate::error::StoreError;
use crate::sources::{ClosestDiffFinder, DiffStore, DiffWarmer, WarmerInput};

/// Keeps handles of in-flight side effects; finished ones are pruned on insert.
#[derive(Default)]
pub(crate) struct SideEffects {
	tasks: Mutex<Vec<BoundedTask<()>>>,
}

impl SideEffects {
	fn track(&self, task: BoundedTask<()>) {
		let mut tasks = self.tasks.lock();
		tasks.retain(|t| !t.is_finished());
		tasks.push(task);
	}

	/// Number of side effects not yet finished.
	pub(crate) fn pending(&self) -> usize {
		self.tasks.lock().iter().filter(|t| !t.is_finished()).count()
	}

	/// Waits for every tracked side effect to end.
	pub(crate) async fn wait_all(&self) {
		let tasks = std::mem::take(&mut *self.tasks.lock());
		for task in tasks {
			let name = task.name();
			match task.join().await {
				BoundedExit::Completed(()) => {}
				exit => tracing::debug!(task = name, ?exit, "indexer.side_effect.ended_early"),
			}
		}
	}

	/// Publishes every digest of `counter` that the diff store can serve.
	///
	/// Digests come from per-trace counts, so traces without a test name are covered too.
	pub(crate) fn write_known_hashes(&self, store: Arc<dyn DiffStore>, counter: Arc<DigestCounter>, timeout: Duration) {
		let task = gild_worker::spawn_bounded(TaskClass::Background, "write_known_hashes", timeout, async move {
			if let Err(error) = write_known_hashes(store.as_ref(), &counter).await {
				tracing::warn!(%error, "indexer.known_hashes.failed");
			}
		});
		self.track(task);
	}

	/// Asks the warmer to precompute diffs for `input`.
	pub(crate) fn run_warmer(&self, warmer: Arc<dyn DiffWarmer>, finder: Arc<dyn ClosestDiffFinder>, input: WarmerInput, timeout: Duration) {
		let task = gild_worker::spawn_bounded(TaskClass::Background, "run_warmer", timeout, async move {
			let tests = input.test_names.len();
			match warmer.precompute_diffs(input, finder).await {
				Ok(()) => tracing::debug!(tests, "indexer.warmer.done"),
				Err(error) => tracing::warn!(%error, "indexer.warmer.failed"),
			}
		});
		self.track(task);
	}
}

async fn write_known_hashes(store: &dyn DiffStore, counter: &DigestCounter) -> Result<(), StoreError> {
	let unavailable = store.unavailable_digests().await?;
	let known: BTreeSet<&Digest> = counter
		.by_trace()
		.values()
		.flat_map(|counts| counts.keys())
		.filter(|digest| !unavailable.contains(*digest))
		.collect();
	let known: Vec<Digest> = known.into_iter().cloned().collect();
	store.write_known_digests(&known).await?;
	tracing::info!(count = known.len(), skipped = unavailable.len(), "indexer.known_hashes.written");
	Ok(())
}
