//! Fakes and fixtures shared by the indexer integration tests.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gild_indexer::{
	ClosestDiffFinder, DiffStore, DiffWarmer, ExpectationsStore, Indexer, IndexerConfig, IndexerDeps, StoreError, TileSource, WarmerInput,
};
use gild_model::{Commit, ComplexTile, Digest, ExpectationDelta, Expectations, IgnoreRule, Label, Params, Query, TestName, Tile, Trace};
use parking_lot::Mutex;
use tokio::sync::broadcast;

pub const CORPUS: &str = "gm";
pub const ALPHA: &str = "AlphaTest";
pub const BETA: &str = "BetaTest";

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn unavailable(store: &'static str) -> StoreError {
	StoreError::Unavailable {
		store,
		message: "injected".to_string(),
	}
}

pub struct FakeTiles {
	tile: Mutex<Arc<ComplexTile>>,
	pub fail: AtomicBool,
	pub calls: AtomicUsize,
}

impl FakeTiles {
	pub fn new(tile: ComplexTile) -> Self {
		Self {
			tile: Mutex::new(Arc::new(tile)),
			fail: AtomicBool::new(false),
			calls: AtomicUsize::new(0),
		}
	}

	pub fn set(&self, tile: ComplexTile) {
		*self.tile.lock() = Arc::new(tile);
	}
}

#[async_trait]
impl TileSource for FakeTiles {
	async fn get_tile(&self) -> Result<Arc<ComplexTile>, StoreError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		if self.fail.load(Ordering::SeqCst) {
			return Err(unavailable("tiles"));
		}
		Ok(Arc::clone(&self.tile.lock()))
	}
}

pub struct FakeExpectations {
	exps: Mutex<Arc<Expectations>>,
	pub fail: AtomicBool,
}

impl FakeExpectations {
	pub fn new(exps: Expectations) -> Self {
		Self {
			exps: Mutex::new(Arc::new(exps)),
			fail: AtomicBool::new(false),
		}
	}

	pub fn apply(&self, delta: &ExpectationDelta) {
		let mut guard = self.exps.lock();
		let mut next = Expectations::clone(&guard);
		next.apply(delta);
		*guard = Arc::new(next);
	}
}

#[async_trait]
impl ExpectationsStore for FakeExpectations {
	async fn get(&self) -> Result<Arc<Expectations>, StoreError> {
		if self.fail.load(Ordering::SeqCst) {
			return Err(unavailable("expectations"));
		}
		Ok(Arc::clone(&self.exps.lock()))
	}
}

#[derive(Default)]
pub struct FakeDiffStore {
	pub unavailable: Mutex<BTreeSet<Digest>>,
	pub written: Mutex<Vec<Vec<Digest>>>,
}

#[async_trait]
impl DiffStore for FakeDiffStore {
	async fn unavailable_digests(&self) -> Result<BTreeSet<Digest>, StoreError> {
		Ok(self.unavailable.lock().clone())
	}

	async fn write_known_digests(&self, digests: &[Digest]) -> Result<(), StoreError> {
		self.written.lock().push(digests.to_vec());
		Ok(())
	}
}

#[derive(Default)]
pub struct RecordingWarmer {
	pub inputs: Mutex<Vec<WarmerInput>>,
}

#[async_trait]
impl DiffWarmer for RecordingWarmer {
	async fn precompute_diffs(&self, input: WarmerInput, finder: Arc<dyn ClosestDiffFinder>) -> Result<(), StoreError> {
		for status in input.summaries.iter() {
			for digest in &status.untriaged_hashes {
				finder.precompute(&status.name, digest).await?;
			}
		}
		self.inputs.lock().push(input);
		Ok(())
	}
}

#[derive(Default)]
pub struct CountingFinder {
	pub calls: AtomicUsize,
}

#[async_trait]
impl ClosestDiffFinder for CountingFinder {
	async fn precompute(&self, _test: &TestName, _digest: &Digest) -> Result<(), StoreError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

pub fn trace(test: &str, corpus: &str, device: &str, digests: &[Option<&str>]) -> Trace {
	let keys: Params = [("name", test), ("source_type", corpus), ("device", device)]
		.into_iter()
		.map(|(k, v)| (k.to_string(), v.to_string()))
		.collect();
	Trace::new(keys, digests.iter().map(|d| d.map(Digest::from)).collect())
}

pub fn commits() -> Vec<Commit> {
	(0..3).map(|i| Commit::new(format!("c{i}"), "dev@example.com", 1_700_000_000 + i)).collect()
}

pub fn crosshatch_rule() -> IgnoreRule {
	IgnoreRule::new("rule-1", Query::new().with("device", ["crosshatch"]), "crosshatch is flaky")
}

/// Two tests on three devices in one corpus; the crosshatch device is ignored.
///
/// With `ALPHA:a_good` and `BETA:b_good` positive, each test has exactly one
/// untriaged head digest on a non-ignored device: `a_new` and `b_new`.
pub fn three_devices_tile() -> ComplexTile {
	let tile = Tile::new(
		commits(),
		[
			trace(ALPHA, CORPUS, "alpha", &[Some("a_good"), Some("a_good"), Some("a_new")]),
			trace(ALPHA, CORPUS, "beta", &[Some("a_good"), None, Some("a_good")]),
			trace(ALPHA, CORPUS, "crosshatch", &[Some("a_cross"), Some("a_cross"), Some("a_cross")]),
			trace(BETA, CORPUS, "alpha", &[Some("b_good"), Some("b_good"), Some("b_good")]),
			trace(BETA, CORPUS, "beta", &[None, Some("b_new"), Some("b_new")]),
			trace(BETA, CORPUS, "crosshatch", &[Some("b_cross"), None, None]),
		],
	);
	ComplexTile::new(tile, vec![crosshatch_rule()])
}

pub fn baseline_expectations() -> Expectations {
	let mut exps = Expectations::new();
	exps.set(ALPHA, "a_good", Label::Positive);
	exps.set(BETA, "b_good", Label::Positive);
	exps
}

pub struct Fakes {
	pub tiles: Arc<FakeTiles>,
	pub expectations: Arc<FakeExpectations>,
	pub diff_store: Arc<FakeDiffStore>,
	pub warmer: Arc<RecordingWarmer>,
	pub finder: Arc<CountingFinder>,
	pub changes: broadcast::Sender<ExpectationDelta>,
}

impl Fakes {
	pub fn new(tile: ComplexTile, exps: Expectations) -> Self {
		Self::with_feed_capacity(tile, exps, 64)
	}

	pub fn with_feed_capacity(tile: ComplexTile, exps: Expectations, capacity: usize) -> Self {
		init_tracing();
		let (changes, _) = broadcast::channel(capacity);
		Self {
			tiles: Arc::new(FakeTiles::new(tile)),
			expectations: Arc::new(FakeExpectations::new(exps)),
			diff_store: Arc::new(FakeDiffStore::default()),
			warmer: Arc::new(RecordingWarmer::default()),
			finder: Arc::new(CountingFinder::default()),
			changes,
		}
	}

	pub fn deps(&self) -> IndexerDeps {
		IndexerDeps {
			tile_source: self.tiles.clone(),
			expectations: self.expectations.clone(),
			diff_store: self.diff_store.clone(),
			warmer: self.warmer.clone(),
			diff_finder: self.finder.clone(),
			expectation_changes: self.changes.subscribe(),
		}
	}

	pub async fn start(&self, config: IndexerConfig) -> Indexer {
		Indexer::new(config, self.deps()).await.expect("initial index run")
	}

	/// Records a triage decision in the store and announces it on the feed.
	pub fn triage(&self, test: &str, digest: &str, label: Label) {
		let delta = ExpectationDelta::new(test, digest, label);
		self.expectations.apply(&delta);
		let _ = self.changes.send(delta);
	}
}

/// A configuration with the event loop running but no tile refresh during the test.
pub fn loop_config() -> IndexerConfig {
	IndexerConfig::default().with_interval(Duration::from_secs(3600))
}

pub fn no_refresh_config() -> IndexerConfig {
	IndexerConfig::default().with_interval(Duration::ZERO)
}

/// Waits for the next publication after `rx` was last marked seen.
pub async fn next_generation(rx: &mut tokio::sync::watch::Receiver<u64>) -> u64 {
	tokio::time::timeout(Duration::from_secs(10), rx.changed())
		.await
		.expect("publication within deadline")
		.expect("indexer alive");
	*rx.borrow_and_update()
}

/// Polls `cond` until it holds or the deadline passes.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
	let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
	while !cond() {
		assert!(tokio::time::Instant::now() < deadline, "condition not reached within deadline");
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
}
