//! Error types for model construction.

use thiserror::Error;

use crate::TraceId;

/// Errors raised while building derived model data from a tile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
	/// A trace does not have exactly one digest slot per commit.
	#[error("trace {trace} has {got} digest slots, expected {expected}")]
	TraceLength {
		/// Offending trace.
		trace: TraceId,
		/// Number of commits in the tile.
		expected: usize,
		/// Number of digest slots in the trace.
		got: usize,
	},
}

/// Result type for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
