use std::collections::BTreeMap;

use crate::types::{Digest, TestName};

/// Triage label of one (test, digest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Label {
	#[default]
	Untriaged,
	Positive,
	Negative,
}

/// One triage event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectationDelta {
	pub grouping: TestName,
	pub digest: Digest,
	pub label: Label,
}

impl ExpectationDelta {
	pub fn new(grouping: impl Into<TestName>, digest: impl Into<Digest>, label: Label) -> Self {
		Self {
			grouping: grouping.into(),
			digest: digest.into(),
			label,
		}
	}
}

/// Triage labels keyed by test then digest. Absent entries are untriaged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Expectations {
	labels: BTreeMap<TestName, BTreeMap<Digest, Label>>,
}

impl Expectations {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn classification(&self, test: &TestName, digest: &Digest) -> Label {
		self.labels
			.get(test)
			.and_then(|by_digest| by_digest.get(digest))
			.copied()
			.unwrap_or_default()
	}

	/// Sets a label; setting [`Label::Untriaged`] removes the entry.
	pub fn set(&mut self, test: impl Into<TestName>, digest: impl Into<Digest>, label: Label) {
		let test = test.into();
		let digest = digest.into();
		if label == Label::Untriaged {
			if let Some(by_digest) = self.labels.get_mut(&test) {
				by_digest.remove(&digest);
				if by_digest.is_empty() {
					self.labels.remove(&test);
				}
			}
			return;
		}
		self.labels.entry(test).or_default().insert(digest, label);
	}

	pub fn apply(&mut self, delta: &ExpectationDelta) {
		self.set(delta.grouping.clone(), delta.digest.clone(), delta.label);
	}

	/// Number of labelled (non-untriaged) entries.
	pub fn len(&self) -> usize {
		self.labels.values().map(BTreeMap::len).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.labels.is_empty()
	}
}
