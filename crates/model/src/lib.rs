//! Data model for test-result tiles and the pure calculators run over them.
//!
//! Nothing in this crate performs I/O or spawns work; every calculator is a
//! constructor over an immutable [`Tile`] (plus expectations where relevant)
//! so the indexer can run them on any thread and share the results freely.

/// Blame attribution of untriaged digests to commits.
pub mod blame;
/// Per-trace and per-test digest occurrence counts.
pub mod digest_counter;
/// Model construction errors.
pub mod error;
/// Triage labels, expectation sets and change deltas.
pub mod expectations;
/// Ignore rules and the matcher derived from them.
pub mod ignore;
/// Parameter-set summaries per (test, digest).
pub mod paramsets;
/// Parameter sets and trace queries.
pub mod query;
/// Triage-status summaries per test.
pub mod summary;
/// Tiles, the complex tile, and ignore-state indexed slots.
pub mod tile;
/// Identifier and trace types.
pub mod types;

pub use blame::{BlameDistribution, Blamer};
pub use digest_counter::{DigestCount, DigestCounter};
pub use error::{ModelError, Result};
pub use expectations::{ExpectationDelta, Expectations, Label};
pub use ignore::{IgnoreMatcher, IgnoreRule};
pub use paramsets::ParamSummary;
pub use query::{ParamSet, Query};
pub use summary::{SummaryInput, TriageStatus};
pub use tile::{ComplexTile, IgnoreState, PerIgnoreState, Tile};
pub use types::{CORPUS_FIELD, Commit, Digest, PRIMARY_KEY_FIELD, Params, TestName, Trace, TraceId, TracePair};
