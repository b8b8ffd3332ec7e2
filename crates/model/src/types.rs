use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::query::Query;

/// Param key holding the test (grouping) name of a trace.
pub const PRIMARY_KEY_FIELD: &str = "name";
/// Param key holding the corpus of a trace.
pub const CORPUS_FIELD: &str = "source_type";

macro_rules! string_id {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
		pub struct $name(Arc<str>);

		impl $name {
			pub fn new(value: impl AsRef<str>) -> Self {
				Self(Arc::from(value.as_ref()))
			}

			pub fn as_str(&self) -> &str {
				&self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str(&self.0)
			}
		}

		impl From<&str> for $name {
			fn from(value: &str) -> Self {
				Self::new(value)
			}
		}

		impl From<String> for $name {
			fn from(value: String) -> Self {
				Self(Arc::from(value))
			}
		}
	};
}

string_id!(
	/// Hash of one rendered image.
	Digest
);
string_id!(
	/// Name of a test, the unit of triage grouping.
	TestName
);
string_id!(
	/// Stable identifier of one trace, derived from its params.
	TraceId
);

/// Key/value labels describing one trace.
pub type Params = BTreeMap<String, String>;

/// One commit in the tested window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
	pub hash: String,
	pub author: String,
	/// Seconds since the epoch.
	pub timestamp: i64,
}

impl Commit {
	pub fn new(hash: impl Into<String>, author: impl Into<String>, timestamp: i64) -> Self {
		Self {
			hash: hash.into(),
			author: author.into(),
			timestamp,
		}
	}
}

/// The digests one configuration produced across the commit window.
///
/// `digests[i]` is the digest observed at commit `i`, `None` when the
/// configuration did not run there.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Trace {
	pub keys: Params,
	pub digests: Vec<Option<Digest>>,
}

impl Trace {
	pub fn new(keys: Params, digests: Vec<Option<Digest>>) -> Self {
		Self { keys, digests }
	}

	/// Builds the canonical id `,k1=v1,k2=v2,` from the params.
	pub fn id(&self) -> TraceId {
		let mut id = String::from(",");
		for (k, v) in &self.keys {
			id.push_str(k);
			id.push('=');
			id.push_str(v);
			id.push(',');
		}
		TraceId::from(id)
	}

	pub fn test_name(&self) -> Option<TestName> {
		self.keys.get(PRIMARY_KEY_FIELD).map(TestName::new)
	}

	pub fn corpus(&self) -> Option<&str> {
		self.keys.get(CORPUS_FIELD).map(String::as_str)
	}

	/// Most recent non-missing digest and its commit index.
	pub fn head(&self) -> Option<(usize, &Digest)> {
		self.digests.iter().enumerate().rev().find_map(|(i, d)| d.as_ref().map(|d| (i, d)))
	}

	pub fn matches(&self, query: &Query) -> bool {
		query.matches(&self.keys)
	}
}

/// A trace together with its id, as handed out by partition lookups.
#[derive(Debug, Clone)]
pub struct TracePair {
	pub id: TraceId,
	pub trace: Arc<Trace>,
}

impl PartialEq for TracePair {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

impl Eq for TracePair {}
