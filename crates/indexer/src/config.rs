//! Indexer configuration.
//!
//! Written in TOML; every field is optional:
//!
//! ```toml
//! # Tile refresh period. 0 disables the background loop entirely.
//! interval_ms = 300000
//! # Pending events buffered between the sources and the event loop.
//! mailbox_capacity = 1024
//! # Upper bound on one known-hashes write.
//! known_hashes_timeout_secs = 300
//! # Upper bound on one diff-warming pass.
//! warmer_timeout_secs = 600
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Runtime knobs for [`crate::Indexer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerConfig {
	/// Period between tile refreshes. Zero disables background refresh.
	pub interval: Duration,
	/// Capacity of the event mailbox feeding the run loop.
	pub mailbox_capacity: usize,
	/// Deadline for one known-hashes publication.
	pub known_hashes_timeout: Duration,
	/// Deadline for one diff-warming pass.
	pub warmer_timeout: Duration,
}

impl Default for IndexerConfig {
	fn default() -> Self {
		Self {
			interval: Duration::from_secs(5 * 60),
			mailbox_capacity: 1024,
			known_hashes_timeout: Duration::from_secs(5 * 60),
			warmer_timeout: Duration::from_secs(10 * 60),
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawIndexerConfig {
	interval_ms: u64,
	mailbox_capacity: usize,
	known_hashes_timeout_secs: u64,
	warmer_timeout_secs: u64,
}

impl Default for RawIndexerConfig {
	fn default() -> Self {
		let defaults = IndexerConfig::default();
		Self {
			interval_ms: defaults.interval.as_millis() as u64,
			mailbox_capacity: defaults.mailbox_capacity,
			known_hashes_timeout_secs: defaults.known_hashes_timeout.as_secs(),
			warmer_timeout_secs: defaults.warmer_timeout.as_secs(),
		}
	}
}

impl TryFrom<RawIndexerConfig> for IndexerConfig {
	type Error = ConfigError;

	fn try_from(raw: RawIndexerConfig) -> Result<Self, Self::Error> {
		if raw.mailbox_capacity == 0 {
			return Err(ConfigError::Invalid {
				field: "mailbox_capacity",
				reason: "must be > 0".to_string(),
			});
		}
		for (field, secs) in [
			("known_hashes_timeout_secs", raw.known_hashes_timeout_secs),
			("warmer_timeout_secs", raw.warmer_timeout_secs),
		] {
			if secs == 0 {
				return Err(ConfigError::Invalid {
					field,
					reason: "must be > 0".to_string(),
				});
			}
		}
		Ok(Self {
			interval: Duration::from_millis(raw.interval_ms),
			mailbox_capacity: raw.mailbox_capacity,
			known_hashes_timeout: Duration::from_secs(raw.known_hashes_timeout_secs),
			warmer_timeout: Duration::from_secs(raw.warmer_timeout_secs),
		})
	}
}

impl IndexerConfig {
	/// Parses a TOML document.
	pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
		let raw: RawIndexerConfig = toml::from_str(input)?;
		raw.try_into()
	}

	/// Reads and parses a TOML file.
	pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let input = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml_str(&input)
	}

	/// Returns a copy with a different refresh interval.
	pub fn with_interval(mut self, interval: Duration) -> Self {
		self.interval = interval;
		self
	}

	/// True when background refresh is enabled.
	pub fn refresh_enabled(&self) -> bool {
		!self.interval.is_zero()
	}
}
