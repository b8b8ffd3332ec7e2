use std::future::Future;

use tokio::task::{AbortHandle, Id, JoinError, JoinSet};

use crate::TaskClass;

/// Classified wrapper for a Tokio [`JoinSet`].
///
/// Task spawning is routed through the worker runtime handle so tasks are
/// attached to the active runtime context, and every spawn is traced with the
/// owning task class.
#[derive(Debug)]
pub struct WorkerJoinSet<T> {
	class: TaskClass,
	inner: JoinSet<T>,
}

impl<T> WorkerJoinSet<T>
where
	T: Send + 'static,
{
	/// Creates an empty worker join set for the given task class.
	pub fn new(class: TaskClass) -> Self {
		Self { class, inner: JoinSet::new() }
	}

	/// Returns the number of tasks currently in the set.
	pub fn len(&self) -> usize {
		self.inner.len()
	}

	/// Returns `true` if the set is empty.
	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}

	/// Spawns a future into the set on the current worker runtime handle.
	pub fn spawn<F>(&mut self, fut: F) -> AbortHandle
	where
		F: Future<Output = T> + Send + 'static,
	{
		tracing::trace!(worker_class = self.class.as_str(), pending = self.inner.len(), "worker.join_set.spawn");
		let handle = crate::spawn::current_handle();
		self.inner.spawn_on(fut, &handle)
	}

	/// Spawns blocking work into the set on the current worker runtime handle.
	pub fn spawn_blocking<F>(&mut self, f: F) -> AbortHandle
	where
		F: FnOnce() -> T + Send + 'static,
	{
		tracing::trace!(worker_class = self.class.as_str(), pending = self.inner.len(), "worker.join_set.spawn_blocking");
		let handle = crate::spawn::current_handle();
		self.inner.spawn_blocking_on(f, &handle)
	}

	/// Waits for the next completed task.
	pub async fn join_next(&mut self) -> Option<Result<T, JoinError>> {
		self.inner.join_next().await
	}

	/// Waits for the next completed task, reporting the task id alongside the output.
	///
	/// A failed join carries the id via [`JoinError::id`].
	pub async fn join_next_with_id(&mut self) -> Option<Result<(Id, T), JoinError>> {
		self.inner.join_next_with_id().await
	}

	/// Waits for every task and collects successful outputs in completion order.
	///
	/// Failed joins are returned separately so callers decide whether a panic
	/// is fatal for them.
	pub async fn join_all(mut self) -> (Vec<T>, Vec<JoinError>) {
		let mut done = Vec::with_capacity(self.inner.len());
		let mut failed = Vec::new();
		while let Some(res) = self.inner.join_next().await {
			match res {
				Ok(value) => done.push(value),
				Err(err) => failed.push(err),
			}
		}
		(done, failed)
	}
}
