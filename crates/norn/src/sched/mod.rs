//! # Cooperative Task Scheduling
//!
//! Everything long-lived in a stage script — an enemy's movement, a stream of
//! projectiles, a boss attack — is a [task](TaskBody): a resumable
//! computation the [`Scheduler`] advances at most once per tick. Tasks form
//! trees via subtasks, bind to entities so they die with them, and
//! synchronize through [event sources](crate::events).
//!
//! See [`scheduler`] for the tick algorithm and ordering guarantees, and
//! [`task`] for the body contract.

mod context;
mod scheduler;
mod task;

pub use context::TaskCx;
pub use scheduler::Scheduler;
pub use task::{Flow, TaskBody, TaskId, TaskState};

// Raises PoolStats to crate visibility so `Scheduler::pool_stats` (pub(crate))
// doesn't leak a type from a private module.
#[cfg(any(feature = "diagnostics", test))]
pub(crate) use scheduler::PoolStats;
