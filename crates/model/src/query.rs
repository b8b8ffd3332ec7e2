use std::collections::{BTreeMap, BTreeSet};

use crate::types::{CORPUS_FIELD, PRIMARY_KEY_FIELD, Params, TestName};

/// Every value observed per param key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParamSet(BTreeMap<String, BTreeSet<String>>);

impl ParamSet {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add_params(&mut self, params: &Params) {
		for (k, v) in params {
			self.0.entry(k.clone()).or_default().insert(v.clone());
		}
	}

	pub fn merge(&mut self, other: &ParamSet) {
		for (k, values) in &other.0 {
			self.0.entry(k.clone()).or_default().extend(values.iter().cloned());
		}
	}

	pub fn get(&self, key: &str) -> Option<&BTreeSet<String>> {
		self.0.get(key)
	}

	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.0.keys().map(String::as_str)
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

/// A conjunction of `key in {values}` clauses over trace params.
///
/// An empty query matches every trace.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Query(BTreeMap<String, BTreeSet<String>>);

impl Query {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a clause; values for a key already present are unioned.
	pub fn with<I, V>(mut self, key: impl Into<String>, values: I) -> Self
	where
		I: IntoIterator<Item = V>,
		V: Into<String>,
	{
		self.0.entry(key.into()).or_default().extend(values.into_iter().map(Into::into));
		self
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn matches(&self, params: &Params) -> bool {
		self.0
			.iter()
			.all(|(key, allowed)| params.get(key).is_some_and(|value| allowed.contains(value)))
	}

	/// Allowed values for `key`, `None` when the query does not restrict it.
	pub fn values(&self, key: &str) -> Option<&BTreeSet<String>> {
		self.0.get(key).filter(|values| !values.is_empty())
	}

	/// Corpora this query is restricted to; empty when unrestricted.
	pub fn corpora(&self) -> impl Iterator<Item = &str> {
		self.values(CORPUS_FIELD).into_iter().flatten().map(String::as_str)
	}

	/// Test names this query is restricted to; empty when unrestricted.
	pub fn test_names(&self) -> impl Iterator<Item = TestName> + '_ {
		self.values(PRIMARY_KEY_FIELD).into_iter().flatten().map(TestName::new)
	}
}
