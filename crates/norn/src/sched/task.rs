//! # Tasks — Resumable Units of Scripted Logic
//!
//! A task is a long-lived computation that the [`Scheduler`](super::Scheduler)
//! advances at most once per tick. Its body is an explicit state machine
//! behind the [`TaskBody`] trait: each resumption runs until the body reports
//! which suspend point it hit ([`Flow`]), or that it is done. A closure
//! capturing its own loop state is the common form; larger scripts (like the
//! attack [`Director`](crate::driver::Director)) implement the trait on a
//! struct.
//!
//! ```ignore
//! let mut t = 0u32;
//! scheduler.spawn(move |cx: &mut TaskCx| {
//!     t += 1;
//!     if t == 60 {
//!         cx.fire(volley_done);
//!         return Flow::Done;
//!     }
//!     Flow::Yield
//! });
//! ```
//!
//! The contract: a resumed body must reach a suspend point or finish within
//! the tick. A body that loops without suspending stalls the whole scheduler;
//! that is an authoring defect the runtime does not guard against.

use crate::events::EventId;
use crate::registry::AnyBox;
use crate::sched::TaskCx;

/// Identifies a task. Generational: once the task retires and its slot is
/// recycled, old ids go permanently stale and all queries return `None`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl std::fmt::Debug for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TaskId({}v{})", self.index, self.generation)
    }
}

/// Where a task currently stands in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Spawned but never resumed.
    Pending,
    /// Being resumed right now.
    Running,
    /// Parked at a suspend point (sleeping or waiting on an event).
    Suspended,
    /// Cancelled; will never resume.
    Cancelled,
    /// Body completed; will never resume.
    Finished,
}

impl TaskState {
    /// Cancelled or Finished — the task will never resume.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Cancelled | TaskState::Finished)
    }
}

/// What a task body reports at the end of a resumption: the suspend point it
/// reached, or completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Resume again next tick.
    Yield,
    /// Resume again after this many ticks. `Sleep(1)` is `Yield`; `Sleep(0)`
    /// is clamped to one tick (a resumption must end at a suspend point).
    Sleep(u32),
    /// Resume once the source fires again (strictly after this tick), or
    /// immediately next tick if the source is already closed.
    WaitEvent(EventId),
    /// The body is complete. Still-live subtasks are cancelled.
    Done,
}

/// A resumable task body.
///
/// Implemented for free by any `FnMut(&mut TaskCx) -> Flow` closure. Each
/// call must eventually return; returning is how the body suspends.
pub trait TaskBody {
    fn resume(&mut self, cx: &mut TaskCx<'_>) -> Flow;
}

impl<F> TaskBody for F
where
    F: FnMut(&mut TaskCx<'_>) -> Flow,
{
    fn resume(&mut self, cx: &mut TaskCx<'_>) -> Flow {
        self(cx)
    }
}

/// A suspended wait on an event source: the source and the fire count the
/// task observed when it suspended. The task wakes once the source's count
/// exceeds `seen`, or the source closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WaitRecord {
    pub(crate) source: EventId,
    pub(crate) seen: u64,
}

/// Scheduler-internal task record.
pub(crate) struct Task {
    pub(crate) state: TaskState,
    /// Taken out of the slot during resumption, restored after — unless the
    /// task retired mid-resumption.
    pub(crate) body: Option<Box<dyn TaskBody>>,
    /// Earliest tick the task may resume (pending spawns and timed sleeps).
    pub(crate) wake_tick: Option<u64>,
    /// Set while parked on an event.
    pub(crate) wait: Option<WaitRecord>,
    /// Entity binding: the task is cancelled instead of resumed once this
    /// entity is gone.
    pub(crate) bound: Option<AnyBox>,
    pub(crate) parent: Option<TaskId>,
    /// Live subtasks, in spawn order. Always exactly the spawned subtasks
    /// that have not yet finished or been independently cancelled.
    pub(crate) children: Vec<TaskId>,
}

impl Task {
    pub(crate) fn new(parent: Option<TaskId>, body: Box<dyn TaskBody>, wake_tick: u64) -> Self {
        Self {
            state: TaskState::Pending,
            body: Some(body),
            wake_tick: Some(wake_tick),
            wait: None,
            bound: None,
            parent,
            children: Vec::new(),
        }
    }
}
