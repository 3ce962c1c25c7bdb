//! # Norn — Cooperative Task Core for Fixed-Timestep Games
//!
//! Hundreds of long-lived behaviors — enemy movement, projectile streams,
//! boss attack phases — run as cooperatively scheduled tasks inside a single
//! fixed-timestep simulation thread. Norn provides the three pieces every
//! stage script is built on:
//!
//! - a [`Registry`](registry::Registry) of generation-checked entity slots,
//!   so tasks reference game objects through weak [`Boxed`](registry::Boxed)
//!   handles that can never dangle;
//! - an [`Events`](events::Events) pool of fire-counters for cross-task
//!   signaling with exact ordering guarantees;
//! - a [`Scheduler`](sched::Scheduler) that resumes every due task exactly
//!   once per tick, with subtask trees, entity bindings, and synchronous
//!   cascading cancellation.
//!
//! The [`Director`](driver::Director) composes all three into a boss-attack
//! timeline; a [`Stage`](stage::Stage) bundles one run's worth of state.
//! Start with `use norn::prelude::*` and see `examples/` for full scripts.

pub mod clock;
pub mod driver;
pub mod events;
pub mod prelude;
pub mod registry;
pub mod sched;
pub mod stage;

#[cfg(feature = "diagnostics")]
pub mod diag;
