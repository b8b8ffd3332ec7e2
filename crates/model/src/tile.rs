use std::collections::BTreeMap;
use std::ops::{Index, IndexMut};
use std::sync::Arc;

use crate::ignore::{IgnoreMatcher, IgnoreRule};
use crate::query::ParamSet;
use crate::types::{Commit, Trace, TraceId};

/// Whether ignore-matched traces take part in a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IgnoreState {
	ExcludeIgnoredTraces,
	IncludeIgnoredTraces,
}

impl IgnoreState {
	/// Both states, in slot order.
	pub const ALL: [IgnoreState; 2] = [IgnoreState::ExcludeIgnoredTraces, IgnoreState::IncludeIgnoredTraces];

	pub const fn index(self) -> usize {
		match self {
			Self::ExcludeIgnoredTraces => 0,
			Self::IncludeIgnoredTraces => 1,
		}
	}

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::ExcludeIgnoredTraces => "exclude_ignored",
			Self::IncludeIgnoredTraces => "include_ignored",
		}
	}
}

/// Exactly one `T` per [`IgnoreState`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PerIgnoreState<T>([T; 2]);

impl<T> PerIgnoreState<T> {
	pub fn from_fn(mut f: impl FnMut(IgnoreState) -> T) -> Self {
		Self([f(IgnoreState::ExcludeIgnoredTraces), f(IgnoreState::IncludeIgnoredTraces)])
	}

	pub fn iter(&self) -> impl Iterator<Item = (IgnoreState, &T)> {
		IgnoreState::ALL.into_iter().zip(self.0.iter())
	}
}

impl<T> Index<IgnoreState> for PerIgnoreState<T> {
	type Output = T;

	fn index(&self, is: IgnoreState) -> &T {
		&self.0[is.index()]
	}
}

impl<T> IndexMut<IgnoreState> for PerIgnoreState<T> {
	fn index_mut(&mut self, is: IgnoreState) -> &mut T {
		&mut self.0[is.index()]
	}
}

/// Traces over a window of commits.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tile {
	pub commits: Vec<Commit>,
	pub traces: BTreeMap<TraceId, Arc<Trace>>,
	pub param_set: ParamSet,
}

impl Tile {
	/// Builds a tile, keying each trace by [`Trace::id`].
	pub fn new(commits: Vec<Commit>, traces: impl IntoIterator<Item = Trace>) -> Self {
		let mut param_set = ParamSet::new();
		let traces = traces
			.into_iter()
			.map(|trace| {
				param_set.add_params(&trace.keys);
				(trace.id(), Arc::new(trace))
			})
			.collect();
		Self { commits, traces, param_set }
	}

	/// Copy of this tile without the traces `matcher` matches.
	pub fn without_ignored(&self, matcher: &IgnoreMatcher) -> Tile {
		let mut param_set = ParamSet::new();
		let traces = self
			.traces
			.iter()
			.filter(|(_, trace)| !matcher.matches(&trace.keys))
			.map(|(id, trace)| {
				param_set.add_params(&trace.keys);
				(id.clone(), Arc::clone(trace))
			})
			.collect();
		Tile {
			commits: self.commits.clone(),
			traces,
			param_set,
		}
	}
}

/// The tested window with and without ignore filtering, plus the rules used.
#[derive(Debug, Clone)]
pub struct ComplexTile {
	all: Arc<Tile>,
	filtered: Arc<Tile>,
	ignore_rules: Arc<[IgnoreRule]>,
	matcher: Arc<IgnoreMatcher>,
}

impl ComplexTile {
	pub fn new(tile: Tile, ignore_rules: Vec<IgnoreRule>) -> Self {
		let matcher = IgnoreMatcher::new(&ignore_rules);
		let filtered = tile.without_ignored(&matcher);
		Self {
			all: Arc::new(tile),
			filtered: Arc::new(filtered),
			ignore_rules: ignore_rules.into(),
			matcher: Arc::new(matcher),
		}
	}

	/// The tile variant for `is`.
	pub fn tile(&self, is: IgnoreState) -> &Arc<Tile> {
		match is {
			IgnoreState::ExcludeIgnoredTraces => &self.filtered,
			IgnoreState::IncludeIgnoredTraces => &self.all,
		}
	}

	pub fn commits(&self) -> &[Commit] {
		&self.all.commits
	}

	pub fn ignore_rules(&self) -> &[IgnoreRule] {
		&self.ignore_rules
	}

	pub fn ignore_matcher(&self) -> &Arc<IgnoreMatcher> {
		&self.matcher
	}
}
