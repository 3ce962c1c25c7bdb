//! # Scheduler — One Resumption Per Due Task Per Tick
//!
//! The [`Scheduler`] owns every task and advances the whole population with a
//! single [`tick`](Scheduler::tick) call per fixed simulation step. Execution
//! is cooperative and single-threaded: logical concurrency comes from
//! interleaving resumptions, never from parallelism, so task bodies touch
//! entity payloads and event counters without any locking.
//!
//! ## Tick anatomy
//!
//! ```text
//! tick(registry, events):
//!   1. reap      — free slots of tasks that retired last tick
//!   2. sweep     — cancel tasks whose bound entity died since last tick
//!   3. snapshot  — collect the due set, as of the start of this tick:
//!                    · timed wakes (pending spawns, elapsed sleeps),
//!                      in stable task-creation order
//!                    · event wakes, per source in wait-registration
//!                      order (FIFO), sources in id order
//!   4. resume    — run each due body to its next suspend point
//! ```
//!
//! Tasks spawned during step 4 are not in the snapshot: they become eligible
//! next tick. Likewise an event fired during step 4 is only compared against
//! wait records at the start of the *next* tick. Both rules bound same-tick
//! cascades and make a run reproducible from its input sequence.
//!
//! ## Cancellation
//!
//! [`cancel`](Scheduler::cancel) is synchronous: it walks the subtask tree
//! with an explicit worklist (no recursion, no native call-stack nesting) and
//! marks every live descendant before returning. Afterwards none of them will
//! ever resume. Cancelling a child never affects its parent. A task that
//! *finishes* retires the same way, taking its still-live subtasks with it.
//!
//! ## Slot reuse
//!
//! Task slots follow the registry's generational scheme: retired slots are
//! reaped at the start of the next tick and recycled under a bumped
//! generation, so a stored [`TaskId`] can never alias a newer task.

use std::collections::{BTreeMap, VecDeque};

use crate::events::{EventId, Events};
use crate::registry::{AnyBox, EntityGone, Registry};
use crate::sched::context::TaskCx;
use crate::sched::task::{Flow, Task, TaskBody, TaskId, TaskState, WaitRecord};

struct TaskSlot {
    generation: u32,
    task: Option<Task>,
}

/// A parked waiter on one event source.
struct Waiter {
    task: TaskId,
    seen: u64,
}

pub struct Scheduler {
    slots: Vec<TaskSlot>,
    free_list: Vec<u32>,
    /// Live (and not-yet-reaped) task ids in creation order.
    order: Vec<TaskId>,
    /// FIFO waiter queues per source. BTreeMap so the drain order over
    /// sources is deterministic.
    waiters: BTreeMap<EventId, VecDeque<Waiter>>,
    /// Tasks retired this tick; slots freed by the next tick's reap so state
    /// queries keep answering until then.
    graveyard: Vec<TaskId>,
    now: u64,
    shutting_down: bool,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            order: Vec::new(),
            waiters: BTreeMap::new(),
            graveyard: Vec::new(),
            now: 0,
            shutting_down: false,
        }
    }

    /// The tick the next `tick()` call will execute.
    pub fn current_tick(&self) -> u64 {
        self.now
    }

    // ── Spawning ─────────────────────────────────────────────────────

    /// Register a new top-level task. It first resumes on the next tick
    /// boundary — never within an in-progress resumption pass.
    pub fn spawn(&mut self, body: impl TaskBody + 'static) -> TaskId {
        self.spawn_delayed(body, 0)
    }

    /// Register a top-level task whose first resumption is `delay` ticks
    /// away. Until then it costs nothing beyond its queue slot.
    pub fn spawn_delayed(&mut self, body: impl TaskBody + 'static, delay: u32) -> TaskId {
        self.spawn_inner(None, Box::new(body), delay)
    }

    /// Register a subtask of `parent`. The subtask is cancelled whenever the
    /// parent retires (cancel or finish). If the parent is already retired or
    /// stale, the subtask is created already-cancelled and never runs.
    pub fn spawn_subtask(&mut self, parent: TaskId, body: impl TaskBody + 'static) -> TaskId {
        if self
            .task(parent)
            .is_some_and(|task| !task.state.is_terminal())
        {
            let id = self.spawn_inner(Some(parent), Box::new(body), 0);
            self.task_mut(parent)
                .expect("parent checked live above")
                .children
                .push(id);
            id
        } else {
            // Dead parent: the child is born cancelled.
            let id = self.spawn_inner(None, Box::new(|_: &mut TaskCx| Flow::Done), 0);
            let task = self.task_mut(id).expect("slot just allocated");
            task.state = TaskState::Cancelled;
            task.body = None;
            self.graveyard.push(id);
            id
        }
    }

    fn spawn_inner(&mut self, parent: Option<TaskId>, body: Box<dyn TaskBody>, delay: u32) -> TaskId {
        assert!(
            !self.shutting_down,
            "Cannot spawn a task after Scheduler::shutdown(). \
             Fix the caller's teardown ordering."
        );
        let task = Task::new(parent, body, self.now + u64::from(delay));
        let id = if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.task = Some(task);
            TaskId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(TaskSlot {
                generation: 0,
                task: Some(task),
            });
            TaskId {
                index,
                generation: 0,
            }
        };
        self.order.push(id);
        id
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// The task's state, or `None` once the id has gone stale. Retired tasks
    /// keep answering `Cancelled`/`Finished` until their slot is reaped at
    /// the next tick boundary.
    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.task(id).map(|task| task.state)
    }

    /// Whether the task can still resume.
    pub fn is_live(&self, id: TaskId) -> bool {
        self.task(id).is_some_and(|task| !task.state.is_terminal())
    }

    /// The task's live subtasks, in spawn order.
    pub fn children(&self, id: TaskId) -> Option<&[TaskId]> {
        self.task(id).map(|task| task.children.as_slice())
    }

    /// Number of tasks that can still resume.
    pub fn live_count(&self) -> usize {
        self.order
            .iter()
            .filter(|&&id| self.is_live(id))
            .count()
    }

    // ── Binding ──────────────────────────────────────────────────────

    /// Attach an entity binding: from now on the task is cancelled instead of
    /// resumed once the entity dies. A stale handle cancels the task
    /// immediately and reports [`EntityGone`].
    pub fn bind(
        &mut self,
        task: TaskId,
        entity: impl Into<AnyBox>,
        registry: &Registry,
    ) -> Result<(), EntityGone> {
        let entity = entity.into();
        if !registry.contains(entity) {
            self.cancel(task);
            return Err(EntityGone);
        }
        if let Some(task) = self.task_mut(task) {
            task.bound = Some(entity);
        }
        Ok(())
    }

    // ── Cancellation ─────────────────────────────────────────────────

    /// Cancel a task and every live descendant, depth-first, before
    /// returning. Afterwards none of them will ever resume. Cancelling an
    /// already-retired or stale task is a no-op.
    pub fn cancel(&mut self, id: TaskId) {
        if !self.is_live(id) {
            return;
        }
        self.detach_from_parent(id);
        let mut worklist = vec![id];
        while let Some(id) = worklist.pop() {
            let Some(task) = self.task_mut(id) else { continue };
            if task.state.is_terminal() {
                continue; // independently retired earlier
            }
            task.state = TaskState::Cancelled;
            task.body = None;
            task.wait = None;
            task.wake_tick = None;
            worklist.append(&mut task.children);
            self.graveyard.push(id);
        }
    }

    /// Cancel every live task and refuse all further spawns.
    pub fn shutdown(&mut self) {
        let live: Vec<TaskId> = self.order.clone();
        let mut cancelled = 0usize;
        for id in live {
            if self.is_live(id) {
                self.cancel(id);
                cancelled += 1;
            }
        }
        self.shutting_down = true;
        log::info!("scheduler shutdown: cancelled {cancelled} live tasks");
    }

    // ── Tick ─────────────────────────────────────────────────────────

    /// Advance the simulation by one tick: resume every due task exactly once,
    /// in the documented order. The outer loop calls this once per fixed step,
    /// after world-state integration and before rendering.
    pub fn tick(&mut self, registry: &mut Registry, events: &mut Events) {
        let now = self.now;
        self.reap();

        // Sweep: a bound task whose entity died since last tick is cancelled
        // this tick, whether or not it was due.
        let ids: Vec<TaskId> = self.order.clone();
        for id in ids {
            let dead_binding = self
                .task(id)
                .filter(|task| !task.state.is_terminal())
                .and_then(|task| task.bound)
                .is_some_and(|bound| !registry.contains(bound));
            if dead_binding {
                log::debug!("{id:?}: bound entity gone, cancelling");
                self.cancel(id);
            }
        }

        let ready = self.collect_ready(events, now);

        for id in ready {
            // Due at snapshot time, but may have been cancelled mid-pass.
            let Some(task) = self.task(id) else { continue };
            if task.state.is_terminal() {
                continue;
            }
            // Entities can also die mid-pass; check again before resuming.
            if let Some(bound) = task.bound {
                if !registry.contains(bound) {
                    log::debug!("{id:?}: bound entity gone, cancelling");
                    self.cancel(id);
                    continue;
                }
            }

            let task = self
                .task_mut(id)
                .expect("task checked live above");
            task.state = TaskState::Running;
            task.wake_tick = None;
            task.wait = None;
            let Some(mut body) = task.body.take() else { continue };

            let flow = {
                let mut cx = TaskCx::new(self, registry, events, id, now);
                body.resume(&mut cx)
            };
            self.settle(id, body, flow, events);
        }

        self.now += 1;
    }

    /// The due set as of the start of this tick: timed wakes in creation
    /// order, then event wakes per source in registration order.
    fn collect_ready(&mut self, events: &Events, now: u64) -> Vec<TaskId> {
        let mut ready = Vec::new();

        for &id in &self.order {
            let Some(task) = self.task(id) else { continue };
            let due = matches!(task.state, TaskState::Pending | TaskState::Suspended)
                && task.wake_tick.is_some_and(|wake| wake <= now);
            if due {
                ready.push(id);
            }
        }

        let sources: Vec<EventId> = self.waiters.keys().copied().collect();
        for source in sources {
            let Some(queue) = self.waiters.remove(&source) else { continue };
            let fires = events.fires(source);
            let mut parked = VecDeque::with_capacity(queue.len());
            for waiter in queue {
                let valid = self.task(waiter.task).is_some_and(|task| {
                    task.state == TaskState::Suspended
                        && task.wait
                            == Some(WaitRecord {
                                source,
                                seen: waiter.seen,
                            })
                });
                if !valid {
                    continue; // waiter cancelled or retired since parking
                }
                // A closed source can never fire again; wake rather than
                // leave the task sleeping forever.
                let woken = match fires {
                    Some(count) => count > waiter.seen,
                    None => true,
                };
                if woken {
                    ready.push(waiter.task);
                } else {
                    parked.push_back(waiter);
                }
            }
            if !parked.is_empty() {
                self.waiters.insert(source, parked);
            }
        }

        ready
    }

    /// Park or retire a task after its body returned.
    fn settle(&mut self, id: TaskId, body: Box<dyn TaskBody>, flow: Flow, events: &Events) {
        let now = self.now;
        let Some(task) = self.task_mut(id) else { return };
        if task.state.is_terminal() {
            return; // cancelled itself (or an ancestor did) mid-resumption
        }
        match flow {
            Flow::Yield => {
                task.state = TaskState::Suspended;
                task.wake_tick = Some(now + 1);
                task.body = Some(body);
            }
            Flow::Sleep(ticks) => {
                task.state = TaskState::Suspended;
                task.wake_tick = Some(now + u64::from(ticks.max(1)));
                task.body = Some(body);
            }
            Flow::WaitEvent(source) => {
                // Capture the count at suspension; the task wakes once the
                // source has fired strictly after this.
                let seen = events.fires(source).unwrap_or(0);
                task.state = TaskState::Suspended;
                task.wait = Some(WaitRecord { source, seen });
                task.body = Some(body);
                self.waiters
                    .entry(source)
                    .or_default()
                    .push_back(Waiter { task: id, seen });
            }
            Flow::Done => {
                drop(body);
                self.finish(id);
            }
        }
    }

    /// Retire a completed task: its still-live subtasks are cancelled, the
    /// parent's children list is updated, and the slot awaits reaping.
    fn finish(&mut self, id: TaskId) {
        let Some(task) = self.task_mut(id) else { return };
        let children = std::mem::take(&mut task.children);
        for child in children {
            self.cancel(child);
        }
        self.detach_from_parent(id);
        if let Some(task) = self.task_mut(id) {
            task.state = TaskState::Finished;
            task.body = None;
            self.graveyard.push(id);
        }
    }

    fn detach_from_parent(&mut self, id: TaskId) {
        let Some(parent) = self.task(id).and_then(|task| task.parent) else {
            return;
        };
        if let Some(parent) = self.task_mut(parent) {
            parent.children.retain(|&child| child != id);
        }
    }

    /// Free the slots of tasks retired last tick. Ids go stale here.
    fn reap(&mut self) {
        if self.graveyard.is_empty() {
            return;
        }
        for id in std::mem::take(&mut self.graveyard) {
            let idx = id.index as usize;
            let slot = &mut self.slots[idx];
            if slot.generation != id.generation {
                continue;
            }
            slot.task = None;
            slot.generation += 1;
            self.free_list.push(id.index);
        }
        let mut order = std::mem::take(&mut self.order);
        order.retain(|&id| self.task(id).is_some());
        self.order = order;
    }

    fn task(&self, id: TaskId) -> Option<&Task> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation == id.generation {
            slot.task.as_ref()
        } else {
            None
        }
    }

    fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation == id.generation {
            slot.task.as_mut()
        } else {
            None
        }
    }

    /// Task-pool statistics for the diagnostics stream.
    #[cfg(any(feature = "diagnostics", test))]
    pub(crate) fn pool_stats(&self) -> PoolStats {
        let mut stats = PoolStats {
            total_slots: self.slots.len() as u32,
            free_slots: self.free_list.len(),
            ..PoolStats::default()
        };
        for &id in &self.order {
            let Some(task) = self.task(id) else { continue };
            match task.state {
                TaskState::Pending => stats.pending += 1,
                TaskState::Suspended if task.wait.is_some() => stats.waiting += 1,
                TaskState::Suspended | TaskState::Running => stats.sleeping += 1,
                TaskState::Cancelled | TaskState::Finished => stats.retired += 1,
            }
        }
        stats
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the task pool, by state.
#[cfg(any(feature = "diagnostics", test))]
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct PoolStats {
    pub pending: usize,
    pub sleeping: usize,
    pub waiting: usize,
    pub retired: usize,
    pub total_slots: u32,
    pub free_slots: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Probe;

    fn setup() -> (Scheduler, Registry, Events) {
        (Scheduler::new(), Registry::new(), Events::new())
    }

    /// Shared tick log for observing resumption order from inside bodies.
    fn trace() -> Rc<RefCell<Vec<(&'static str, u64)>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn spawned_task_runs_on_next_tick() {
        let (mut sched, mut reg, mut events) = setup();
        let log = trace();

        let l = log.clone();
        sched.spawn(move |cx: &mut TaskCx| {
            l.borrow_mut().push(("a", cx.now()));
            Flow::Done
        });

        assert!(log.borrow().is_empty());
        sched.tick(&mut reg, &mut events);
        assert_eq!(*log.borrow(), vec![("a", 0)]);
    }

    #[test]
    fn one_resumption_per_tick() {
        let (mut sched, mut reg, mut events) = setup();
        let log = trace();

        let l = log.clone();
        sched.spawn(move |cx: &mut TaskCx| {
            l.borrow_mut().push(("a", cx.now()));
            Flow::Yield
        });

        for _ in 0..3 {
            sched.tick(&mut reg, &mut events);
        }
        assert_eq!(*log.borrow(), vec![("a", 0), ("a", 1), ("a", 2)]);
    }

    #[test]
    fn resumption_follows_creation_order() {
        let (mut sched, mut reg, mut events) = setup();
        let log = trace();

        for name in ["first", "second", "third"] {
            let l = log.clone();
            sched.spawn(move |cx: &mut TaskCx| {
                l.borrow_mut().push((name, cx.now()));
                Flow::Done
            });
        }

        sched.tick(&mut reg, &mut events);
        assert_eq!(
            *log.borrow(),
            vec![("first", 0), ("second", 0), ("third", 0)]
        );
    }

    #[test]
    fn mid_tick_spawn_defers_to_next_tick() {
        let (mut sched, mut reg, mut events) = setup();
        let log = trace();

        let l = log.clone();
        sched.spawn(move |cx: &mut TaskCx| {
            l.borrow_mut().push(("outer", cx.now()));
            let l2 = l.clone();
            cx.spawn(move |cx: &mut TaskCx| {
                l2.borrow_mut().push(("inner", cx.now()));
                Flow::Done
            });
            Flow::Done
        });

        sched.tick(&mut reg, &mut events);
        assert_eq!(*log.borrow(), vec![("outer", 0)]);
        sched.tick(&mut reg, &mut events);
        assert_eq!(*log.borrow(), vec![("outer", 0), ("inner", 1)]);
    }

    #[test]
    fn sleep_resumes_exactly_on_schedule() {
        // spawn at tick 0, sleep 3 → resumed at tick 3, not before.
        let (mut sched, mut reg, mut events) = setup();
        let log = trace();

        let l = log.clone();
        sched.spawn(move |cx: &mut TaskCx| {
            l.borrow_mut().push(("t", cx.now()));
            Flow::Sleep(3)
        });

        for _ in 0..5 {
            sched.tick(&mut reg, &mut events);
        }
        assert_eq!(*log.borrow(), vec![("t", 0), ("t", 3)]);
    }

    #[test]
    fn sleep_zero_still_suspends_for_a_tick() {
        let (mut sched, mut reg, mut events) = setup();
        let log = trace();

        let l = log.clone();
        sched.spawn(move |cx: &mut TaskCx| {
            l.borrow_mut().push(("t", cx.now()));
            Flow::Sleep(0)
        });

        sched.tick(&mut reg, &mut events);
        sched.tick(&mut reg, &mut events);
        assert_eq!(*log.borrow(), vec![("t", 0), ("t", 1)]);
    }

    #[test]
    fn delayed_spawn_first_runs_at_spawn_plus_delay() {
        let (mut sched, mut reg, mut events) = setup();
        let log = trace();

        let l = log.clone();
        sched.spawn_delayed(
            move |cx: &mut TaskCx| {
                l.borrow_mut().push(("d", cx.now()));
                Flow::Done
            },
            4,
        );

        for _ in 0..6 {
            sched.tick(&mut reg, &mut events);
        }
        assert_eq!(*log.borrow(), vec![("d", 4)]);
    }

    #[test]
    fn event_fire_wakes_waiter_next_tick() {
        // W waits at tick 5, the source fires at tick 7 → W resumes at 8.
        let (mut sched, mut reg, mut events) = setup();
        let log = trace();
        let source = events.open();

        let l = log.clone();
        let mut started = false;
        sched.spawn_delayed(
            move |cx: &mut TaskCx| {
                if !started {
                    started = true;
                    return Flow::WaitEvent(source);
                }
                l.borrow_mut().push(("w", cx.now()));
                Flow::Done
            },
            5,
        );

        let l = log.clone();
        sched.spawn_delayed(
            move |cx: &mut TaskCx| {
                l.borrow_mut().push(("fire", cx.now()));
                cx.fire(source);
                Flow::Done
            },
            7,
        );

        for _ in 0..10 {
            sched.tick(&mut reg, &mut events);
        }
        assert_eq!(*log.borrow(), vec![("fire", 7), ("w", 8)]);
    }

    #[test]
    fn same_tick_fire_then_wait_does_not_wake() {
        // The waiter records the count at suspension, so a fire earlier in
        // the same tick is already included and does not wake it.
        let (mut sched, mut reg, mut events) = setup();
        let log = trace();
        let source = events.open();

        // Creation order puts the firer before the waiter in the pass.
        sched.spawn(move |cx: &mut TaskCx| {
            cx.fire(source);
            Flow::Done
        });

        let l = log.clone();
        let mut started = false;
        sched.spawn(move |cx: &mut TaskCx| {
            if !started {
                started = true;
                return Flow::WaitEvent(source);
            }
            l.borrow_mut().push(("w", cx.now()));
            Flow::Done
        });

        for _ in 0..4 {
            sched.tick(&mut reg, &mut events);
        }
        // Only the pre-wait fire happened; the waiter never woke.
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn waiters_wake_in_registration_order() {
        // "late" is created first but registers its wait *after* "early", so
        // FIFO order must wake early before late.
        let (mut sched, mut reg, mut events) = setup();
        let log = trace();
        let source = events.open();

        let l = log.clone();
        let mut phase = 0u32;
        sched.spawn(move |cx: &mut TaskCx| {
            phase += 1;
            match phase {
                1 => Flow::Yield,                 // tick 0: not waiting yet
                2 => Flow::WaitEvent(source),     // tick 1: registers second
                _ => {
                    l.borrow_mut().push(("late", cx.now()));
                    Flow::Done
                }
            }
        });

        let l = log.clone();
        let mut started = false;
        sched.spawn(move |cx: &mut TaskCx| {
            if !started {
                started = true;
                return Flow::WaitEvent(source); // tick 0: registers first
            }
            l.borrow_mut().push(("early", cx.now()));
            Flow::Done
        });

        sched.tick(&mut reg, &mut events); // tick 0
        sched.tick(&mut reg, &mut events); // tick 1
        events.fire(source);
        sched.tick(&mut reg, &mut events); // tick 2: both wake
        assert_eq!(*log.borrow(), vec![("early", 2), ("late", 2)]);
    }

    #[test]
    fn wait_on_closed_source_wakes_next_tick() {
        let (mut sched, mut reg, mut events) = setup();
        let log = trace();
        let source = events.open();
        events.close(source);

        let l = log.clone();
        let mut started = false;
        sched.spawn(move |cx: &mut TaskCx| {
            if !started {
                started = true;
                return Flow::WaitEvent(source);
            }
            l.borrow_mut().push(("w", cx.now()));
            Flow::Done
        });

        sched.tick(&mut reg, &mut events);
        sched.tick(&mut reg, &mut events);
        assert_eq!(*log.borrow(), vec![("w", 1)]);
    }

    #[test]
    fn cancel_cascades_before_returning() {
        let (mut sched, mut reg, mut events) = setup();

        let parent = sched.spawn(|_: &mut TaskCx| Flow::Yield);
        let child = sched.spawn_subtask(parent, |_: &mut TaskCx| Flow::Yield);
        let grandchild = sched.spawn_subtask(child, |_: &mut TaskCx| Flow::Yield);

        sched.cancel(parent);

        // Synchronous: all three are cancelled before any tick runs.
        assert_eq!(sched.state(parent), Some(TaskState::Cancelled));
        assert_eq!(sched.state(child), Some(TaskState::Cancelled));
        assert_eq!(sched.state(grandchild), Some(TaskState::Cancelled));
    }

    #[test]
    fn cancelled_tasks_never_resume() {
        let (mut sched, mut reg, mut events) = setup();
        let log = trace();

        let l = log.clone();
        let parent = sched.spawn(move |_: &mut TaskCx| {
            l.borrow_mut().push(("parent", 0));
            Flow::Yield
        });
        let l = log.clone();
        sched.spawn_subtask(parent, move |_: &mut TaskCx| {
            l.borrow_mut().push(("child", 0));
            Flow::Yield
        });

        sched.cancel(parent);
        for _ in 0..3 {
            sched.tick(&mut reg, &mut events);
        }
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn cancelling_child_leaves_parent_running() {
        let (mut sched, mut reg, mut events) = setup();

        let parent = sched.spawn(|_: &mut TaskCx| Flow::Yield);
        let child = sched.spawn_subtask(parent, |_: &mut TaskCx| Flow::Yield);

        sched.cancel(child);
        assert_eq!(sched.state(child), Some(TaskState::Cancelled));
        assert!(sched.is_live(parent));
        // The parent's children list no longer mentions the child.
        assert_eq!(sched.children(parent), Some(&[][..]));

        sched.tick(&mut reg, &mut events);
        assert!(sched.is_live(parent));
    }

    #[test]
    fn finish_retires_remaining_subtasks() {
        let (mut sched, mut reg, mut events) = setup();

        let child_id = Rc::new(RefCell::new(None));
        let c = child_id.clone();
        let parent = sched.spawn(move |cx: &mut TaskCx| {
            let id = cx.spawn_subtask(|_: &mut TaskCx| Flow::Yield);
            *c.borrow_mut() = Some(id);
            Flow::Done // finishing cancels the subtask it just spawned
        });

        sched.tick(&mut reg, &mut events);
        let child = child_id.borrow().unwrap();
        assert_eq!(sched.state(parent), Some(TaskState::Finished));
        assert_eq!(sched.state(child), Some(TaskState::Cancelled));
    }

    #[test]
    fn finished_subtask_leaves_parents_children_list() {
        let (mut sched, mut reg, mut events) = setup();

        let parent = sched.spawn(|_: &mut TaskCx| Flow::Yield);
        let one_shot = sched.spawn_subtask(parent, |_: &mut TaskCx| Flow::Done);
        let long_lived = sched.spawn_subtask(parent, |_: &mut TaskCx| Flow::Yield);

        assert_eq!(sched.children(parent), Some(&[one_shot, long_lived][..]));
        sched.tick(&mut reg, &mut events);
        assert_eq!(sched.children(parent), Some(&[long_lived][..]));
    }

    #[test]
    fn subtask_of_retired_parent_is_born_cancelled() {
        let (mut sched, mut reg, mut events) = setup();
        let log = trace();

        let parent = sched.spawn(|_: &mut TaskCx| Flow::Done);
        sched.tick(&mut reg, &mut events); // parent finishes

        let l = log.clone();
        let child = sched.spawn_subtask(parent, move |_: &mut TaskCx| {
            l.borrow_mut().push(("child", 0));
            Flow::Done
        });
        assert_eq!(sched.state(child), Some(TaskState::Cancelled));

        for _ in 0..3 {
            sched.tick(&mut reg, &mut events);
        }
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn binding_cancels_task_when_entity_dies() {
        // E destroyed at tick t → the bound task is cancelled by t+1's pass,
        // even though it was sleeping far in the future.
        let (mut sched, mut reg, mut events) = setup();

        let enemy = reg.insert(&mut events, Probe);
        let mut started = false;
        let task = sched.spawn(move |_: &mut TaskCx| {
            if !started {
                started = true;
                return Flow::Sleep(100);
            }
            Flow::Done
        });
        sched.bind(task, enemy, &reg).unwrap();

        sched.tick(&mut reg, &mut events); // tick 0: task sleeps
        reg.destroy(&mut events, enemy); // dies at tick 1
        sched.tick(&mut reg, &mut events); // tick 1's pass sweeps it
        assert_eq!(sched.state(task), Some(TaskState::Cancelled));
    }

    #[test]
    fn binding_cancellation_cascades_to_subtasks() {
        let (mut sched, mut reg, mut events) = setup();

        let enemy = reg.insert(&mut events, Probe);
        let child_id = Rc::new(RefCell::new(None));
        let c = child_id.clone();
        let task = sched.spawn(move |cx: &mut TaskCx| {
            if c.borrow().is_none() {
                *c.borrow_mut() = Some(cx.spawn_subtask(|_: &mut TaskCx| Flow::Yield));
            }
            Flow::Yield
        });
        sched.bind(task, enemy, &reg).unwrap();

        sched.tick(&mut reg, &mut events);
        reg.destroy(&mut events, enemy);
        sched.tick(&mut reg, &mut events);

        assert_eq!(sched.state(task), Some(TaskState::Cancelled));
        let child = child_id.borrow().unwrap();
        assert_eq!(sched.state(child), Some(TaskState::Cancelled));
    }

    #[test]
    fn bind_to_dead_entity_cancels_and_reports() {
        let (mut sched, mut reg, mut events) = setup();

        let enemy = reg.insert(&mut events, Probe);
        reg.destroy(&mut events, enemy);

        let task = sched.spawn(|_: &mut TaskCx| Flow::Yield);
        assert_eq!(sched.bind(task, enemy, &reg), Err(EntityGone));
        assert_eq!(sched.state(task), Some(TaskState::Cancelled));
    }

    #[test]
    fn in_body_bind_gives_payload_access() {
        let (mut sched, mut reg, mut events) = setup();

        struct Counter(u32);
        let counter = reg.insert(&mut events, Counter(0));

        sched.spawn(move |cx: &mut TaskCx| {
            let Ok(c) = cx.bind(counter) else {
                return Flow::Done;
            };
            c.0 += 1;
            Flow::Yield
        });

        for _ in 0..3 {
            sched.tick(&mut reg, &mut events);
        }
        assert_eq!(reg.unbox(counter).unwrap().0, 3);
    }

    #[test]
    fn self_cancel_mid_resumption_sticks() {
        let (mut sched, mut reg, mut events) = setup();
        let log = trace();

        let l = log.clone();
        sched.spawn(move |cx: &mut TaskCx| {
            l.borrow_mut().push(("ran", cx.now()));
            let me = cx.id();
            cx.cancel(me);
            Flow::Yield // ignored: the task is already retired
        });

        for _ in 0..3 {
            sched.tick(&mut reg, &mut events);
        }
        assert_eq!(*log.borrow(), vec![("ran", 0)]);
    }

    #[test]
    fn retired_ids_go_stale_after_reap() {
        let (mut sched, mut reg, mut events) = setup();

        let task = sched.spawn(|_: &mut TaskCx| Flow::Done);
        sched.tick(&mut reg, &mut events);
        // Terminal state still visible until the next tick's reap.
        assert_eq!(sched.state(task), Some(TaskState::Finished));
        sched.tick(&mut reg, &mut events);
        assert_eq!(sched.state(task), None);
    }

    #[test]
    fn recycled_task_slot_does_not_alias() {
        let (mut sched, mut reg, mut events) = setup();

        let old = sched.spawn(|_: &mut TaskCx| Flow::Done);
        sched.tick(&mut reg, &mut events);
        sched.tick(&mut reg, &mut events); // reap

        let new = sched.spawn(|_: &mut TaskCx| Flow::Yield);
        assert_eq!(new.index, old.index); // same slot
        assert_ne!(new, old);
        assert_eq!(sched.state(old), None);
        assert!(sched.is_live(new));
    }

    #[test]
    fn shutdown_cancels_everything() {
        let (mut sched, mut reg, mut events) = setup();
        let log = trace();

        let l = log.clone();
        let a = sched.spawn(move |_: &mut TaskCx| {
            l.borrow_mut().push(("a", 0));
            Flow::Yield
        });
        let b = sched.spawn_subtask(a, |_: &mut TaskCx| Flow::Yield);

        sched.shutdown();
        assert_eq!(sched.state(a), Some(TaskState::Cancelled));
        assert_eq!(sched.state(b), Some(TaskState::Cancelled));

        sched.tick(&mut reg, &mut events);
        assert!(log.borrow().is_empty());
    }

    #[test]
    #[should_panic(expected = "after Scheduler::shutdown")]
    fn spawn_after_shutdown_panics() {
        let (mut sched, _, _) = setup();
        sched.shutdown();
        sched.spawn(|_: &mut TaskCx| Flow::Done);
    }

    #[test]
    fn live_count_and_pool_stats() {
        let (mut sched, mut reg, mut events) = setup();
        let source = events.open();

        sched.spawn(|_: &mut TaskCx| Flow::Sleep(10));
        let mut started = false;
        sched.spawn(move |_: &mut TaskCx| {
            if !started {
                started = true;
                return Flow::WaitEvent(source);
            }
            Flow::Done
        });
        sched.spawn_delayed(|_: &mut TaskCx| Flow::Done, 5);

        assert_eq!(sched.live_count(), 3);
        sched.tick(&mut reg, &mut events);

        let stats = sched.pool_stats();
        assert_eq!(stats.pending, 1); // the delayed spawn
        assert_eq!(stats.sleeping, 1);
        assert_eq!(stats.waiting, 1);
    }
}
