//! Shared worker primitives for the indexing pipeline.
//!
//! * [`TaskClass`] tags every spawn for tracing.
//! * [`WorkerJoinSet`] fans work out and collects it back.
//! * [`Mailbox`] is the bounded, coalescing ingress for event loops.
//! * [`spawn_bounded`] detaches side-effect work under a hard deadline.

mod bounded;
mod class;
mod join_set;
pub mod mailbox;
mod spawn;

pub use bounded::{BoundedExit, BoundedTask, spawn_bounded};
pub use class::TaskClass;
pub use join_set::WorkerJoinSet;
pub use mailbox::{Mailbox, MailboxPolicy, MailboxReceiver, MailboxSendError, MailboxSendOutcome, MailboxSender};
pub use spawn::{join_error_panic_message, spawn, spawn_blocking};
