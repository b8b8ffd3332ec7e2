use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::TaskClass;

/// How a time-bounded task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundedExit<T> {
	/// The future resolved before its deadline.
	Completed(T),
	/// The deadline elapsed first; the future was dropped.
	TimedOut,
	/// [`BoundedTask::cancel`] was requested first; the future was dropped.
	Cancelled,
	/// The future panicked.
	Panicked(String),
}

/// Handle to a detached task that is guaranteed to end within its deadline.
///
/// Dropping the handle does not stop the task; the deadline does.
#[derive(Debug)]
pub struct BoundedTask<T> {
	name: &'static str,
	cancel: CancellationToken,
	join: JoinHandle<BoundedExit<T>>,
}

/// Spawns `fut` detached, racing it against `timeout` and a cancellation token.
///
/// Every exit path is logged under `name`.
pub fn spawn_bounded<F>(class: TaskClass, name: &'static str, timeout: Duration, fut: F) -> BoundedTask<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	let cancel = CancellationToken::new();
	let token = cancel.clone();
	let join = crate::spawn(class, async move {
		tokio::select! {
			biased;
			_ = token.cancelled() => {
				tracing::debug!(task = name, "worker.bounded.cancelled");
				BoundedExit::Cancelled
			}
			res = tokio::time::timeout(timeout, fut) => match res {
				Ok(value) => BoundedExit::Completed(value),
				Err(_) => {
					tracing::warn!(task = name, timeout_ms = timeout.as_millis() as u64, "worker.bounded.timed_out");
					BoundedExit::TimedOut
				}
			},
		}
	});
	BoundedTask { name, cancel, join }
}

impl<T> BoundedTask<T> {
	/// Returns the task label.
	pub fn name(&self) -> &'static str {
		self.name
	}

	/// Returns true once the task has ended.
	pub fn is_finished(&self) -> bool {
		self.join.is_finished()
	}

	/// Requests early cancellation.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	/// Waits for the task to end.
	pub async fn join(self) -> BoundedExit<T> {
		match self.join.await {
			Ok(exit) => exit,
			Err(err) => match crate::join_error_panic_message(err) {
				Some(msg) => {
					tracing::error!(task = self.name, panic = %msg, "worker.bounded.panicked");
					BoundedExit::Panicked(msg)
				}
				None => BoundedExit::Cancelled,
			},
		}
	}
}
