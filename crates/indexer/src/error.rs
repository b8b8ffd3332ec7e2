//! Error taxonomy for the indexing pipeline.

use std::path::PathBuf;

use gild_model::ModelError;
use thiserror::Error;

use crate::dag::DagError;

/// Failure reported by an external collaborator (tile source, stores, warmer).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
	/// The backing service could not be reached or refused the request.
	#[error("{store} unavailable: {message}")]
	Unavailable { store: &'static str, message: String },

	/// The request reached the service but failed.
	#[error("{store} request failed: {message}")]
	Request { store: &'static str, message: String },
}

/// Errors raised by index runs, snapshot queries and indexer construction.
#[derive(Debug, Error)]
pub enum IndexError {
	/// Fetching the current expectations failed.
	#[error("fetching expectations failed: {0}")]
	Expectations(#[source] StoreError),

	/// Fetching a tile failed.
	#[error("fetching tile failed: {0}")]
	Tile(#[source] StoreError),

	/// Derived model data could not be computed.
	#[error("model computation failed: {0}")]
	Model(#[from] ModelError),

	/// A worker task died before producing a result.
	#[error("worker task `{task}` failed: {message}")]
	Worker { task: &'static str, message: String },

	/// A pipeline run failed; nothing was published.
	#[error("index run failed: {0}")]
	Run(#[source] Box<DagError<IndexError>>),
}

impl From<DagError<IndexError>> for IndexError {
	fn from(err: DagError<IndexError>) -> Self {
		Self::Run(Box::new(err))
	}
}

/// Errors raised while loading [`crate::IndexerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error parsing TOML syntax or field types.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// A field holds a value outside its accepted range.
	#[error("invalid value for `{field}`: {reason}")]
	Invalid { field: &'static str, reason: String },
}

/// Result type for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;
