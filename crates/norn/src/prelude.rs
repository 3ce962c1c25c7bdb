//! Convenience re-exports — `use norn::prelude::*` for the common items.

pub use crate::clock::TickClock;
pub use crate::driver::{AttackFn, AttackPlan, AttackSpec, Director, Vitality};
pub use crate::events::{EventId, Events};
pub use crate::registry::{AnyBox, Boxed, EntityGone, Registry};
pub use crate::sched::{Flow, Scheduler, TaskBody, TaskCx, TaskId, TaskState};
pub use crate::stage::Stage;
#[cfg(feature = "diagnostics")]
pub use crate::diag::DiagSender;
