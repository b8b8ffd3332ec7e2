use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

/// Enqueue policy for a bounded mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxPolicy {
	/// Wait for capacity when full.
	Backpressure,
	/// Replace an existing queued message with the same key, otherwise behave
	/// like [`MailboxPolicy::Backpressure`].
	CoalesceByKey,
}

/// Outcome from enqueueing a mailbox message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxSendOutcome {
	/// Message was enqueued without replacement.
	Enqueued,
	/// Existing keyed queued message was replaced in place.
	Coalesced,
}

/// Mailbox send error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxSendError {
	/// Mailbox is closed.
	Closed,
	/// Queue is full and non-blocking send was used.
	Full,
}

type CoalesceEq<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

struct MailboxState<T> {
	queue: VecDeque<T>,
	closed: bool,
}

struct MailboxInner<T> {
	capacity: usize,
	policy: MailboxPolicy,
	coalesce_eq: Option<CoalesceEq<T>>,
	state: Mutex<MailboxState<T>>,
	notify_recv: Notify,
	notify_send: Notify,
}

/// Multi-producer mailbox sender.
pub struct MailboxSender<T> {
	inner: Arc<MailboxInner<T>>,
}

/// Mailbox receiver.
pub struct MailboxReceiver<T> {
	inner: Arc<MailboxInner<T>>,
}

/// Bounded mailbox feeding one consumer loop.
///
/// Besides blocking [`MailboxReceiver::recv`], the receiver can take everything
/// queued at once with [`MailboxReceiver::drain`], which is how event loops
/// coalesce bursts into a single unit of work.
pub struct Mailbox<T> {
	inner: Arc<MailboxInner<T>>,
}

impl<T> Clone for MailboxSender<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T> Mailbox<T> {
	/// Creates a bounded mailbox that applies backpressure when full.
	pub fn new(capacity: usize) -> Self {
		Self::build(capacity, MailboxPolicy::Backpressure, None)
	}

	/// Creates a bounded mailbox with key-based coalescing.
	pub fn with_coalesce_key<K>(capacity: usize, key_fn: impl Fn(&T) -> K + Send + Sync + 'static) -> Self
	where
		K: Eq + Send + Sync + 'static,
	{
		let cmp = move |lhs: &T, rhs: &T| key_fn(lhs) == key_fn(rhs);
		Self::build(capacity, MailboxPolicy::CoalesceByKey, Some(Arc::new(cmp)))
	}

	fn build(capacity: usize, policy: MailboxPolicy, coalesce_eq: Option<CoalesceEq<T>>) -> Self {
		assert!(capacity > 0, "mailbox capacity must be > 0");
		Self {
			inner: Arc::new(MailboxInner {
				capacity,
				policy,
				coalesce_eq,
				state: Mutex::new(MailboxState {
					queue: VecDeque::with_capacity(capacity),
					closed: false,
				}),
				notify_recv: Notify::new(),
				notify_send: Notify::new(),
			}),
		}
	}

	/// Returns a sender handle.
	pub fn sender(&self) -> MailboxSender<T> {
		MailboxSender {
			inner: Arc::clone(&self.inner),
		}
	}

	/// Consumes the mailbox into its single receiver.
	pub fn into_receiver(self) -> MailboxReceiver<T> {
		MailboxReceiver { inner: self.inner }
	}

	/// Returns mailbox policy.
	pub fn policy(&self) -> MailboxPolicy {
		self.inner.policy
	}
}

impl<T> MailboxSender<T> {
	/// Requests mailbox closure. The receiver drains existing items then sees `None`.
	pub async fn close(&self) {
		let mut state = self.inner.state.lock().await;
		state.closed = true;
		drop(state);
		self.inner.notify_recv.notify_waiters();
		self.inner.notify_send.notify_waiters();
	}

	/// Non-blocking enqueue. Returns [`MailboxSendError::Full`] instead of waiting.
	pub async fn try_send(&self, msg: T) -> Result<MailboxSendOutcome, MailboxSendError> {
		let mut state = self.inner.state.lock().await;
		match enqueue(&self.inner, &mut state, msg) {
			Ok(outcome) => Ok(outcome),
			Err((err, _)) => Err(err),
		}
	}

	/// Enqueue honoring policy, waiting for capacity when the queue is full.
	///
	/// Coalescing replacements never wait because they do not grow the queue.
	pub async fn send(&self, mut msg: T) -> Result<MailboxSendOutcome, MailboxSendError> {
		loop {
			// Register before checking capacity to avoid a lost wakeup between
			// dropping the lock and awaiting.
			let notified = self.inner.notify_send.notified();

			let mut state = self.inner.state.lock().await;
			match enqueue(&self.inner, &mut state, msg) {
				Ok(outcome) => return Ok(outcome),
				Err((MailboxSendError::Full, Some(rejected))) => msg = rejected,
				Err((err, _)) => return Err(err),
			}
			drop(state);
			notified.await;
		}
	}

	/// Returns current queue length.
	pub async fn len(&self) -> usize {
		self.inner.state.lock().await.queue.len()
	}

	/// Returns queue capacity.
	pub fn capacity(&self) -> usize {
		self.inner.capacity
	}
}

impl<T> MailboxReceiver<T> {
	/// Receives one message. Returns `None` once the mailbox is closed and drained.
	pub async fn recv(&self) -> Option<T> {
		loop {
			let notified = self.inner.notify_recv.notified();
			let mut state = self.inner.state.lock().await;
			if let Some(msg) = state.queue.pop_front() {
				drop(state);
				self.inner.notify_send.notify_one();
				return Some(msg);
			}
			if state.closed {
				return None;
			}
			drop(state);
			notified.await;
		}
	}

	/// Takes every queued message without waiting, in enqueue order.
	pub async fn drain(&self) -> Vec<T> {
		let mut state = self.inner.state.lock().await;
		let drained: Vec<T> = state.queue.drain(..).collect();
		drop(state);
		if !drained.is_empty() {
			self.inner.notify_send.notify_waiters();
		}
		drained
	}

	/// Returns current queue length.
	pub async fn len(&self) -> usize {
		self.inner.state.lock().await.queue.len()
	}
}

/// Non-blocking enqueue. A `Full` rejection hands the message back so the
/// blocking path can retry without cloning.
fn enqueue<T>(inner: &MailboxInner<T>, state: &mut MailboxState<T>, msg: T) -> Result<MailboxSendOutcome, (MailboxSendError, Option<T>)> {
	if state.closed {
		return Err((MailboxSendError::Closed, None));
	}

	if let Some(eq_fn) = inner.coalesce_eq.as_ref()
		&& let Some(existing) = state.queue.iter_mut().find(|it| eq_fn(it, &msg))
	{
		*existing = msg;
		inner.notify_recv.notify_one();
		return Ok(MailboxSendOutcome::Coalesced);
	}

	if state.queue.len() >= inner.capacity {
		return Err((MailboxSendError::Full, Some(msg)));
	}
	state.queue.push_back(msg);
	inner.notify_recv.notify_one();
	Ok(MailboxSendOutcome::Enqueued)
}
