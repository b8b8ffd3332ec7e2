//! The long-lived orchestrator: owns the pipeline, the published snapshot and
//! the event loop that decides between full and partial runs.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use gild_model::{ComplexTile, ExpectationDelta};
use gild_worker::{Mailbox, MailboxReceiver, MailboxSendOutcome, MailboxSender, TaskClass};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::IndexerConfig;
use crate::error::{IndexError, Result};
use crate::events::{IndexEvent, IndexWork, plan_work};
use crate::pipeline::Pipeline;
use crate::search_index::SearchIndex;
use crate::side_effects::SideEffects;
use crate::sources::{ClosestDiffFinder, DiffStore, DiffWarmer, ExpectationsStore, TileSource, tile_stream};

/// Collaborators the indexer is built from.
pub struct IndexerDeps {
	pub tile_source: Arc<dyn TileSource>,
	pub expectations: Arc<dyn ExpectationsStore>,
	pub diff_store: Arc<dyn DiffStore>,
	pub warmer: Arc<dyn DiffWarmer>,
	pub diff_finder: Arc<dyn ClosestDiffFinder>,
	/// Feed of triage changes.
	pub expectation_changes: broadcast::Receiver<ExpectationDelta>,
}

/// Point-in-time run counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexerStats {
	pub full_runs: u64,
	pub partial_runs: u64,
	pub failed_runs: u64,
	/// Events folded into another event's run instead of causing their own.
	pub coalesced_events: u64,
	/// Generation of the published snapshot.
	pub generation: u64,
}

#[derive(Default)]
struct RunCounters {
	full_runs: AtomicU64,
	partial_runs: AtomicU64,
	failed_runs: AtomicU64,
	coalesced_events: AtomicU64,
	generation: AtomicU64,
}

/// State shared by the indexer handle, its event loop and the pipeline nodes.
pub(crate) struct IndexerCore {
	pub(crate) config: IndexerConfig,
	pub(crate) expectations: Arc<dyn ExpectationsStore>,
	pub(crate) diff_store: Arc<dyn DiffStore>,
	pub(crate) warmer: Arc<dyn DiffWarmer>,
	pub(crate) diff_finder: Arc<dyn ClosestDiffFinder>,
	pub(crate) side_effects: SideEffects,
	current: ArcSwap<SearchIndex>,
	generation_tx: watch::Sender<u64>,
	counters: RunCounters,
}

impl IndexerCore {
	pub(crate) fn current(&self) -> Arc<SearchIndex> {
		self.current.load_full()
	}

	/// Makes `index` the current snapshot. Only the `set_index` node calls this.
	pub(crate) fn publish(&self, mut index: SearchIndex) {
		let generation = self.counters.generation.fetch_add(1, Ordering::AcqRel) + 1;
		index.generation = generation;
		let partial_tests = index.test_names.len();
		self.current.store(Arc::new(index));
		self.generation_tx.send_replace(generation);
		tracing::info!(generation, partial_tests, "indexer.publish");
	}

	async fn execute(&self, pipeline: &Pipeline, work: IndexWork) -> Result<()> {
		let counter = match work {
			IndexWork::Full(_) => &self.counters.full_runs,
			IndexWork::Partial(_) => &self.counters.partial_runs,
		};
		match pipeline.run(self, work).await {
			Ok(()) => {
				counter.fetch_add(1, Ordering::Relaxed);
				Ok(())
			}
			Err(err) => {
				self.counters.failed_runs.fetch_add(1, Ordering::Relaxed);
				Err(err)
			}
		}
	}

	fn record_coalesced(&self, n: u64) {
		if n > 0 {
			self.counters.coalesced_events.fetch_add(n, Ordering::Relaxed);
		}
	}
}

/// Maintains the current [`SearchIndex`] over a stream of tiles and triage changes.
///
/// Readers call [`Indexer::get_index`] and keep the returned `Arc` for the
/// whole request; a concurrent publication never changes what they see.
pub struct Indexer {
	core: Arc<IndexerCore>,
	cancel: CancellationToken,
	event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Indexer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Indexer")
			.field("config", &self.core.config)
			.field("stats", &self.stats())
			.field("running", &self.event_loop.lock().is_some())
			.finish()
	}
}

impl Indexer {
	/// Fetches the current tile, runs the full pipeline once and, if refresh is
	/// enabled, starts the event loop.
	///
	/// Fails if the tile cannot be fetched or the first run fails; the event
	/// loop is not started in that case.
	pub async fn new(config: IndexerConfig, deps: IndexerDeps) -> Result<Self> {
		let IndexerDeps {
			tile_source,
			expectations,
			diff_store,
			warmer,
			diff_finder,
			expectation_changes,
		} = deps;

		let tile = tile_source.get_tile().await.map_err(IndexError::Tile)?;
		let (generation_tx, _) = watch::channel(0);
		let core = Arc::new(IndexerCore {
			// Placeholder until the first run publishes; never returned to callers.
			current: ArcSwap::from_pointee(SearchIndex::new(Arc::clone(&tile), Arc::clone(&expectations))),
			config,
			expectations,
			diff_store,
			warmer,
			diff_finder,
			side_effects: SideEffects::default(),
			generation_tx,
			counters: RunCounters::default(),
		});
		let pipeline = Pipeline::new(&core);

		if let Err(error) = core.execute(&pipeline, IndexWork::Full(tile)).await {
			tracing::error!(%error, "indexer.init.failed");
			return Err(error);
		}

		let cancel = CancellationToken::new();
		let event_loop = if core.config.refresh_enabled() {
			let mailbox = Mailbox::with_coalesce_key(core.config.mailbox_capacity, IndexEvent::coalesce_key);
			let tx = mailbox.sender();
			let tiles = tile_stream(tile_source, core.config.interval, cancel.child_token());
			gild_worker::spawn(TaskClass::Background, pump_tiles(tiles, tx.clone(), Arc::clone(&core), cancel.child_token()));
			gild_worker::spawn(
				TaskClass::Background,
				pump_expectations(expectation_changes, tx, Arc::clone(&core), cancel.child_token()),
			);
			let rx = mailbox.into_receiver();
			Some(gild_worker::spawn(
				TaskClass::Pipeline,
				event_loop(Arc::clone(&core), pipeline, rx, cancel.clone()),
			))
		} else {
			tracing::info!("indexer.refresh.disabled");
			None
		};

		Ok(Self {
			core,
			cancel,
			event_loop: Mutex::new(event_loop),
		})
	}

	/// The published snapshot.
	pub fn get_index(&self) -> Arc<SearchIndex> {
		self.core.current()
	}

	/// Watches the published generation; changes once per publication.
	pub fn subscribe(&self) -> watch::Receiver<u64> {
		self.core.generation_tx.subscribe()
	}

	pub fn stats(&self) -> IndexerStats {
		let c = &self.core.counters;
		IndexerStats {
			full_runs: c.full_runs.load(Ordering::Relaxed),
			partial_runs: c.partial_runs.load(Ordering::Relaxed),
			failed_runs: c.failed_runs.load(Ordering::Relaxed),
			coalesced_events: c.coalesced_events.load(Ordering::Relaxed),
			generation: c.generation.load(Ordering::Acquire),
		}
	}

	pub fn config(&self) -> &IndexerConfig {
		&self.core.config
	}

	/// Side effects started by past runs that have not finished yet.
	pub fn pending_side_effects(&self) -> usize {
		self.core.side_effects.pending()
	}

	/// Waits until every side effect started so far has ended.
	pub async fn wait_for_side_effects(&self) {
		self.core.side_effects.wait_all().await;
	}

	/// Stops the event loop, letting an in-flight run finish first.
	pub async fn shutdown(&self) {
		self.cancel.cancel();
		let handle = self.event_loop.lock().take();
		if let Some(handle) = handle
			&& let Err(err) = handle.await
		{
			tracing::error!(error = %err, "indexer.loop.join_failed");
		}
	}
}

impl Drop for Indexer {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}

/// Returns false once the mailbox is closed.
async fn forward(tx: &MailboxSender<IndexEvent>, event: IndexEvent, core: &IndexerCore) -> bool {
	match tx.send(event).await {
		Ok(MailboxSendOutcome::Enqueued) => true,
		Ok(MailboxSendOutcome::Coalesced) => {
			core.record_coalesced(1);
			true
		}
		Err(_) => false,
	}
}

async fn pump_tiles(mut tiles: mpsc::Receiver<Arc<ComplexTile>>, tx: MailboxSender<IndexEvent>, core: Arc<IndexerCore>, cancel: CancellationToken) {
	loop {
		let tile = tokio::select! {
			biased;
			_ = cancel.cancelled() => break,
			tile = tiles.recv() => match tile {
				Some(tile) => tile,
				None => break,
			},
		};
		if !forward(&tx, IndexEvent::Tile(tile), &core).await {
			break;
		}
	}
	tracing::debug!("indexer.pump.tiles.stopped");
}

async fn pump_expectations(
	mut changes: broadcast::Receiver<ExpectationDelta>,
	tx: MailboxSender<IndexEvent>,
	core: Arc<IndexerCore>,
	cancel: CancellationToken,
) {
	loop {
		let event = tokio::select! {
			biased;
			_ = cancel.cancelled() => break,
			change = changes.recv() => match change {
				Ok(delta) => IndexEvent::Delta(delta),
				Err(broadcast::error::RecvError::Lagged(missed)) => {
					tracing::warn!(missed, "indexer.pump.expectations.lagged");
					IndexEvent::ExpectationsLagged(missed)
				}
				Err(broadcast::error::RecvError::Closed) => break,
			},
		};
		if !forward(&tx, event, &core).await {
			break;
		}
	}
	tracing::debug!("indexer.pump.expectations.stopped");
}

async fn event_loop(core: Arc<IndexerCore>, pipeline: Pipeline, rx: MailboxReceiver<IndexEvent>, cancel: CancellationToken) {
	tracing::debug!("indexer.loop.start");
	loop {
		let first = tokio::select! {
			biased;
			_ = cancel.cancelled() => break,
			event = rx.recv() => match event {
				Some(event) => event,
				None => break,
			},
		};

		let mut burst = vec![first];
		burst.extend(rx.drain().await);
		if burst.len() > 1 {
			tracing::debug!(events = burst.len(), "indexer.loop.coalesced");
			core.record_coalesced(burst.len() as u64 - 1);
		}

		let Some(work) = plan_work(burst) else {
			continue;
		};
		if let Err(error) = core.execute(&pipeline, work).await {
			tracing::error!(%error, "indexer.run.failed");
		}
	}
	tracing::debug!("indexer.loop.stopped");
}
