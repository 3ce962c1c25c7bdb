//! # Stage — The Per-Run Simulation Context
//!
//! A [`Stage`] bundles the three core subsystems — entity [`Registry`],
//! [`Events`] pool, and [`Scheduler`] — into the single context object a
//! running stage owns. There is deliberately no global "current stage" or
//! "current boss": whoever drives the simulation holds the `Stage`, and task
//! bodies receive the same pieces through their [`TaskCx`](crate::sched::TaskCx).
//!
//! The outer loop integrates world state, calls [`tick`](Stage::tick) exactly
//! once per fixed step, then renders. Nothing else may call `tick`.

use crate::events::Events;
use crate::registry::{AnyBox, Boxed, Registry};
use crate::sched::{Scheduler, TaskBody, TaskId};

/// Owns one simulation run's entities, event sources, and tasks.
pub struct Stage {
    pub registry: Registry,
    pub events: Events,
    pub scheduler: Scheduler,
}

impl Stage {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            events: Events::new(),
            scheduler: Scheduler::new(),
        }
    }

    /// Advance the simulation by one tick. Call once per fixed step.
    pub fn tick(&mut self) {
        self.scheduler.tick(&mut self.registry, &mut self.events);
    }

    /// The tick the next [`tick`](Stage::tick) call will execute.
    pub fn now(&self) -> u64 {
        self.scheduler.current_tick()
    }

    /// Insert an entity payload, opening its "destroyed" event source.
    pub fn insert<T: 'static>(&mut self, payload: T) -> Boxed<T> {
        self.registry.insert(&mut self.events, payload)
    }

    /// Destroy an entity. No-op on a stale handle.
    pub fn destroy(&mut self, handle: impl Into<AnyBox>) -> bool {
        self.registry.destroy(&mut self.events, handle)
    }

    /// Spawn a top-level task.
    pub fn spawn(&mut self, body: impl TaskBody + 'static) -> TaskId {
        self.scheduler.spawn(body)
    }

    /// Spawn a top-level task that first resumes `delay` ticks from now.
    pub fn spawn_delayed(&mut self, body: impl TaskBody + 'static, delay: u32) -> TaskId {
        self.scheduler.spawn_delayed(body, delay)
    }

    /// Cancel every task and refuse further spawns; call before dropping the
    /// stage if content code might still hold task handles.
    pub fn shutdown(&mut self) {
        self.scheduler.shutdown();
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::new()
    }
}
