//! Collaborator interfaces consumed by the indexer.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gild_model::{ComplexTile, Digest, DigestCounter, Expectations, TestName, TriageStatus};
use gild_worker::TaskClass;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;

/// Produces the latest complex tile.
#[async_trait]
pub trait TileSource: Send + Sync {
	async fn get_tile(&self) -> Result<Arc<ComplexTile>, StoreError>;
}

/// Current triage expectations.
#[async_trait]
pub trait ExpectationsStore: Send + Sync {
	async fn get(&self) -> Result<Arc<Expectations>, StoreError>;
}

/// Diff storage: which digests cannot be diffed and where known digests are published.
#[async_trait]
pub trait DiffStore: Send + Sync {
	/// Digests known to be permanently unavailable.
	async fn unavailable_digests(&self) -> Result<BTreeSet<Digest>, StoreError>;

	/// Publishes the list of digests that can be diffed.
	async fn write_known_digests(&self, digests: &[Digest]) -> Result<(), StoreError>;
}

/// Finds and caches the closest reference image for one digest.
#[async_trait]
pub trait ClosestDiffFinder: Send + Sync {
	async fn precompute(&self, test: &TestName, digest: &Digest) -> Result<(), StoreError>;
}

/// The projection of a snapshot handed to the diff warmer.
#[derive(Clone)]
pub struct WarmerInput {
	/// Ignore-inclusive summaries, ordered by test name.
	pub summaries: Arc<[Arc<TriageStatus>]>,
	/// Ignore-inclusive digest counts; consult `by_test()`.
	pub digests: Arc<DigestCounter>,
	/// Tests recomputed by the run; empty after a full run.
	pub test_names: Arc<BTreeSet<TestName>>,
}

/// Precomputes visual diffs for freshly summarised digests.
#[async_trait]
pub trait DiffWarmer: Send + Sync {
	async fn precompute_diffs(&self, input: WarmerInput, finder: Arc<dyn ClosestDiffFinder>) -> Result<(), StoreError>;
}

/// Polls `source` every `interval` and forwards each tile.
///
/// The first poll happens one `interval` after the call; callers fetch the
/// initial tile themselves. Fetch failures are logged and skipped. The stream
/// ends when `cancel` fires or the receiver is dropped.
pub fn tile_stream(source: Arc<dyn TileSource>, interval: Duration, cancel: CancellationToken) -> mpsc::Receiver<Arc<ComplexTile>> {
	let (tx, rx) = mpsc::channel(1);
	gild_worker::spawn(TaskClass::Background, async move {
		let start = tokio::time::Instant::now() + interval;
		let mut ticker = tokio::time::interval_at(start, interval);
		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
		loop {
			tokio::select! {
				biased;
				_ = cancel.cancelled() => break,
				_ = ticker.tick() => {}
			}
			match source.get_tile().await {
				Ok(tile) => {
					if tx.send(tile).await.is_err() {
						break;
					}
				}
				Err(error) => tracing::warn!(%error, "indexer.tile_stream.fetch_failed"),
			}
		}
		tracing::debug!("indexer.tile_stream.stopped");
	});
	rx
}
