use crate::query::Query;
use crate::types::Params;

/// One ignore rule: traces matching `query` are hidden from ignore-excluding views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreRule {
	pub id: String,
	pub query: Query,
	pub note: String,
}

impl IgnoreRule {
	pub fn new(id: impl Into<String>, query: Query, note: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			query,
			note: note.into(),
		}
	}
}

/// Matches trace params against a set of ignore rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreMatcher {
	queries: Vec<Query>,
}

impl IgnoreMatcher {
	pub fn new(rules: &[IgnoreRule]) -> Self {
		Self {
			queries: rules.iter().map(|rule| rule.query.clone()).collect(),
		}
	}

	/// True when any rule matches. A matcher without rules matches nothing.
	pub fn matches(&self, params: &Params) -> bool {
		self.queries.iter().any(|q| q.matches(params))
	}

	pub fn is_empty(&self) -> bool {
		self.queries.is_empty()
	}
}
