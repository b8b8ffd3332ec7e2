//! Incremental search-index pipeline over test-result tiles.
//!
//! The [`Indexer`] keeps one immutable [`SearchIndex`] published at a time and
//! recomputes it as inputs change:
//!
//! - **New tile**: every view is rebuilt from scratch.
//! - **Triage change**: only blame and the summaries of the affected tests are
//!   recomputed; digest counts, parameter sets and trace partitions are shared
//!   with the previous snapshot.
//!
//! # Pipeline
//!
//! The work is a static [`TaskGraph`] whose nodes run with dependency ordering
//! and sibling parallelism. A failing node stops only its descendants; the run
//! is then reported and nothing is published, so readers keep the previous
//! snapshot.
//!
//! # Event loop
//!
//! Tiles and triage changes are funnelled through a coalescing mailbox. After
//! each wake-up the loop drains whatever else is queued and asks
//! [`plan_work`] for at most one run: any tile wins over any number of deltas.
//!
//! Failed runs are not retried. The tests of a failed partial run keep their
//! previous summaries until a later triage of the same test or the next tile
//! recomputes them.
//!
//! # Side effects
//!
//! Publishing the list of known digests and warming diffs run detached under
//! their own deadlines and never delay publication.
//!
//! # Configuration
//!
//! See [`IndexerConfig`]; a zero interval skips the event loop but still
//! requires the initial full run to succeed.

pub mod config;
pub mod dag;
pub mod error;
pub mod events;
mod indexer;
mod pipeline;
pub mod search_index;
mod side_effects;
pub mod slices;
pub mod sources;

pub use config::IndexerConfig;
pub use dag::{DagError, NodeId, TaskGraph};
pub use error::{ConfigError, IndexError, Result, StoreError};
pub use events::{IndexEvent, IndexWork, TestScope, plan_work};
pub use indexer::{Indexer, IndexerDeps, IndexerStats};
pub use search_index::SearchIndex;
pub use slices::{PreSliced, SliceKey};
pub use sources::{ClosestDiffFinder, DiffStore, DiffWarmer, ExpectationsStore, TileSource, WarmerInput, tile_stream};
