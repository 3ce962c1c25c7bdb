//! Task context — everything a body may touch during a resumption.
//!
//! Game scripts habitually reach for globals ("current stage", "current
//! boss"). Here the scheduler hands every resumption an explicit [`TaskCx`]
//! instead: the registry and event pool as public fields, plus delegating
//! methods for the spawn family, cancellation, binding, and timing. Same
//! ergonomics at the call site, no ambient state.

use crate::events::{EventId, Events};
use crate::registry::{AnyBox, Boxed, EntityGone, Registry};
use crate::sched::task::{TaskBody, TaskId, TaskState};
use crate::sched::Scheduler;

/// Handed to [`TaskBody::resume`](crate::sched::TaskBody::resume); borrows
/// the whole core for the duration of one resumption.
pub struct TaskCx<'a> {
    /// Entity payload storage.
    pub registry: &'a mut Registry,
    /// Event source pool.
    pub events: &'a mut Events,
    sched: &'a mut Scheduler,
    current: TaskId,
    now: u64,
}

impl<'a> TaskCx<'a> {
    pub(crate) fn new(
        sched: &'a mut Scheduler,
        registry: &'a mut Registry,
        events: &'a mut Events,
        current: TaskId,
        now: u64,
    ) -> Self {
        Self {
            registry,
            events,
            sched,
            current,
            now,
        }
    }

    /// The current tick number.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// The id of the task being resumed.
    pub fn id(&self) -> TaskId {
        self.current
    }

    // ── Spawning ─────────────────────────────────────────────────────

    /// Spawn a new top-level task. It becomes eligible to run starting next
    /// tick — never within the current resumption pass.
    pub fn spawn(&mut self, body: impl TaskBody + 'static) -> TaskId {
        self.sched.spawn(body)
    }

    /// Spawn a top-level task whose first resumption happens `delay` ticks
    /// from now.
    pub fn spawn_delayed(&mut self, body: impl TaskBody + 'static, delay: u32) -> TaskId {
        self.sched.spawn_delayed(body, delay)
    }

    /// Spawn a subtask of the current task. It is cancelled along with this
    /// task, and cancelled immediately if this task is already retired.
    pub fn spawn_subtask(&mut self, body: impl TaskBody + 'static) -> TaskId {
        self.sched.spawn_subtask(self.current, body)
    }

    /// Spawn a subtask under an explicit parent.
    pub fn spawn_subtask_of(&mut self, parent: TaskId, body: impl TaskBody + 'static) -> TaskId {
        self.sched.spawn_subtask(parent, body)
    }

    // ── Task control ─────────────────────────────────────────────────

    /// Cancel a task and, synchronously, its whole subtask tree. Cancelling
    /// the current task is allowed; the returned [`Flow`](crate::sched::Flow)
    /// of the in-progress resumption is then ignored.
    pub fn cancel(&mut self, task: TaskId) {
        self.sched.cancel(task);
    }

    /// The state of a task, or `None` once its id has gone stale.
    pub fn state(&self, task: TaskId) -> Option<TaskState> {
        self.sched.state(task)
    }

    /// Bind the current task to an entity and unbox it in one step, the usual
    /// opening move of an entity-driving script. After a successful bind the
    /// task is cancelled instead of resumed once the entity dies.
    ///
    /// On a stale handle the current task is cancelled and `EntityGone` is
    /// returned; the body should bail out with `Flow::Done`.
    pub fn bind<T: 'static>(&mut self, entity: Boxed<T>) -> Result<&mut T, EntityGone> {
        self.sched.bind(self.current, entity, self.registry)?;
        self.registry.unbox_mut(entity).ok_or(EntityGone)
    }

    // ── Entities & events ────────────────────────────────────────────

    /// Insert an entity payload, opening its "destroyed" source.
    pub fn insert<T: 'static>(&mut self, payload: T) -> Boxed<T> {
        self.registry.insert(self.events, payload)
    }

    /// Destroy an entity. No-op on a stale handle.
    pub fn destroy(&mut self, handle: impl Into<AnyBox>) -> bool {
        self.registry.destroy(self.events, handle)
    }

    /// Shared access to an entity payload. `None` once the entity is gone.
    pub fn unbox<T: 'static>(&self, handle: Boxed<T>) -> Option<&T> {
        self.registry.unbox(handle)
    }

    /// Mutable access to an entity payload. `None` once the entity is gone.
    pub fn unbox_mut<T: 'static>(&mut self, handle: Boxed<T>) -> Option<&mut T> {
        self.registry.unbox_mut(handle)
    }

    /// Open a fresh event source.
    pub fn open_event(&mut self) -> EventId {
        self.events.open()
    }

    /// Fire an event source. Waiters wake next tick.
    pub fn fire(&mut self, source: EventId) -> bool {
        self.events.fire(source)
    }
}
