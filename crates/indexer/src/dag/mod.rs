//! Static task graph executed with dependency ordering and per-level parallelism.
//!
//! # Model
//!
//! A [`TaskGraph`] is wired once (roots, children, joins) and then triggered any
//! number of times. Each node holds an async function over a shared state `S`;
//! nodes without a function are barriers that complete inline.
//!
//! # Invariants
//!
//! * Acyclic by construction: a node can only name parents that already exist.
//! * A node runs only after every parent reachable from the trigger node finished
//!   successfully in the same run. Parents outside the triggered sub-graph count
//!   as satisfied; their results are expected to already live in the state.
//! * A failed or panicking node never releases its descendants. Independent
//!   branches keep running; there is no global cancellation.
//! * `trigger` returns only after every started node has finished, and reports
//!   the first failure observed.
//!
//! Per-run bookkeeping lives in the `trigger` call, so the graph itself is
//! never mutated after wiring.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use gild_worker::{TaskClass, WorkerJoinSet};
use thiserror::Error;

/// Boxed future returned by node functions.
pub type NodeFuture<E> = Pin<Box<dyn Future<Output = Result<(), E>> + Send + 'static>>;

type NodeFn<S, E> = Arc<dyn Fn(Arc<S>) -> NodeFuture<E> + Send + Sync>;

/// Handle to a node of one [`TaskGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Failure of one graph run.
#[derive(Debug, Error)]
pub enum DagError<E: std::error::Error + 'static> {
	/// A node function returned an error.
	#[error("node `{node}` failed: {source}")]
	Node {
		node: &'static str,
		#[source]
		source: E,
	},

	/// A node function panicked.
	#[error("node `{node}` panicked: {message}")]
	Panicked { node: &'static str, message: String },
}

impl<E: std::error::Error + 'static> DagError<E> {
	/// Label of the node that failed.
	pub fn node(&self) -> &'static str {
		match self {
			Self::Node { node, .. } | Self::Panicked { node, .. } => node,
		}
	}
}

struct Node<S, E> {
	name: &'static str,
	func: Option<NodeFn<S, E>>,
	parents: Vec<NodeId>,
	children: Vec<NodeId>,
}

/// Directed acyclic graph of async computation steps over a shared state `S`.
pub struct TaskGraph<S, E> {
	nodes: Vec<Node<S, E>>,
}

impl<S, E> Default for TaskGraph<S, E> {
	fn default() -> Self {
		Self { nodes: Vec::new() }
	}
}

impl<S, E> TaskGraph<S, E>
where
	S: Send + Sync + 'static,
	E: std::error::Error + Send + 'static,
{
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a node without parents.
	pub fn root<F, Fut>(&mut self, name: &'static str, func: F) -> NodeId
	where
		F: Fn(Arc<S>) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<(), E>> + Send + 'static,
	{
		self.push(name, Some(boxed(func)), &[])
	}

	/// Adds a node whose sole parent is `parent`.
	pub fn child<F, Fut>(&mut self, parent: NodeId, name: &'static str, func: F) -> NodeId
	where
		F: Fn(Arc<S>) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<(), E>> + Send + 'static,
	{
		self.push(name, Some(boxed(func)), &[parent])
	}

	/// Adds a join node depending on every node in `parents`.
	pub fn node_with_parents<F, Fut>(&mut self, name: &'static str, func: F, parents: &[NodeId]) -> NodeId
	where
		F: Fn(Arc<S>) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<(), E>> + Send + 'static,
	{
		self.push(name, Some(boxed(func)), parents)
	}

	/// Adds a no-op synchronisation node.
	pub fn barrier(&mut self, name: &'static str, parents: &[NodeId]) -> NodeId {
		self.push(name, None, parents)
	}

	/// Number of nodes in the graph.
	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	/// Label of `id`.
	pub fn name(&self, id: NodeId) -> &'static str {
		self.nodes[id.0].name
	}

	fn push(&mut self, name: &'static str, func: Option<NodeFn<S, E>>, parents: &[NodeId]) -> NodeId {
		assert!(
			parents.iter().all(|p| p.0 < self.nodes.len()),
			"task graph node `{name}` names a parent from another graph"
		);
		let id = NodeId(self.nodes.len());
		let mut unique = parents.to_vec();
		unique.sort_unstable();
		unique.dedup();
		for parent in &unique {
			self.nodes[parent.0].children.push(id);
		}
		self.nodes.push(Node {
			name,
			func,
			parents: unique,
			children: Vec::new(),
		});
		id
	}

	fn reachable_from(&self, start: NodeId) -> Vec<bool> {
		let mut seen = vec![false; self.nodes.len()];
		let mut stack = vec![start];
		while let Some(id) = stack.pop() {
			if std::mem::replace(&mut seen[id.0], true) {
				continue;
			}
			stack.extend(self.nodes[id.0].children.iter().copied());
		}
		seen
	}

	/// Runs `start` and every node reachable from it against `state`.
	///
	/// Blocks until all started nodes have finished and returns the first
	/// failure, if any.
	pub async fn trigger(&self, start: NodeId, state: Arc<S>) -> Result<(), DagError<E>> {
		let started = Instant::now();
		let reachable = self.reachable_from(start);
		let mut waiting: Vec<usize> = self
			.nodes
			.iter()
			.map(|node| node.parents.iter().filter(|p| reachable[p.0]).count())
			.collect();

		let mut tasks = WorkerJoinSet::new(TaskClass::Pipeline);
		let mut running = HashMap::new();
		let mut ready = vec![start];
		let mut first_error: Option<DagError<E>> = None;
		let mut completed = 0usize;

		loop {
			while let Some(id) = ready.pop() {
				let node = &self.nodes[id.0];
				match &node.func {
					None => {
						tracing::trace!(node = node.name, "dag.barrier");
						completed += 1;
						self.release(id, &reachable, &mut waiting, &mut ready);
					}
					Some(func) => {
						tracing::trace!(node = node.name, "dag.node.start");
						let func = Arc::clone(func);
						let state = Arc::clone(&state);
						let handle = tasks.spawn(async move { func(state).await });
						running.insert(handle.id(), id);
					}
				}
			}

			let Some(joined) = tasks.join_next_with_id().await else {
				break;
			};
			match joined {
				Ok((task, Ok(()))) => {
					let Some(id) = running.remove(&task) else { continue };
					completed += 1;
					tracing::trace!(node = self.nodes[id.0].name, "dag.node.done");
					self.release(id, &reachable, &mut waiting, &mut ready);
				}
				Ok((task, Err(source))) => {
					let Some(id) = running.remove(&task) else { continue };
					let node = self.nodes[id.0].name;
					tracing::warn!(node, error = %source, "dag.node.failed");
					first_error.get_or_insert(DagError::Node { node, source });
				}
				Err(err) => {
					let Some(id) = running.remove(&err.id()) else { continue };
					let node = self.nodes[id.0].name;
					let message = gild_worker::join_error_panic_message(err).unwrap_or_else(|| "cancelled".to_string());
					tracing::error!(node, panic = %message, "dag.node.panicked");
					first_error.get_or_insert(DagError::Panicked { node, message });
				}
			}
		}

		tracing::debug!(
			start = self.nodes[start.0].name,
			completed,
			reachable = reachable.iter().filter(|r| **r).count(),
			elapsed_ms = started.elapsed().as_millis() as u64,
			failed = first_error.is_some(),
			"dag.trigger.done"
		);
		match first_error {
			Some(err) => Err(err),
			None => Ok(()),
		}
	}

	fn release(&self, id: NodeId, reachable: &[bool], waiting: &mut [usize], ready: &mut Vec<NodeId>) {
		for child in &self.nodes[id.0].children {
			if !reachable[child.0] {
				continue;
			}
			waiting[child.0] -= 1;
			if waiting[child.0] == 0 {
				ready.push(*child);
			}
		}
	}
}

fn boxed<S, E, F, Fut>(func: F) -> NodeFn<S, E>
where
	F: Fn(Arc<S>) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Result<(), E>> + Send + 'static,
{
	Arc::new(move |state| Box::pin(func(state)) as NodeFuture<E>)
}
