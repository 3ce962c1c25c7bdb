//! # Attack Director — Sequencing a Boss's Attack List
//!
//! A thin composition layer over the registry, the event pool, and the
//! scheduler; it contains no scheduling machinery of its own. The
//! [`Director`] is itself a task body bound to its boss: spawn it like any
//! other task and it walks the boss through
//!
//! ```text
//! Idle → Intro → Attack(0) → Attack(1) → … → Defeated → Cleanup
//! ```
//!
//! Each attack is authored as an ordinary task with one fixed invocation
//! shape — a spawn function taking the context and the owning boss handle —
//! plus metadata (name, timeout, health goal). The director advances to the
//! next attack when the current attack's task finishes, its timeout elapses,
//! or the boss's health falls to the attack's goal, whichever happens first,
//! cancelling the attack's remaining task tree before spawning the next.
//! Polymorphism is over that one invocation shape, not a type hierarchy: the
//! director never learns what an attack actually does.
//!
//! Attack metadata is serde-friendly ([`AttackPlan`]), so an attack list can
//! be authored as JSON and joined to spawn functions by name.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::events::{EventId, Events};
use crate::registry::Boxed;
use crate::sched::{Flow, TaskBody, TaskCx, TaskId};

/// What the director needs to know about a boss payload.
pub trait Vitality {
    /// Remaining health as a fraction of full, in `0.0..=1.0`.
    fn health_fraction(&self) -> f32;
}

/// Spawns one attack's task tree. Called with the director as the current
/// task, so `cx.spawn_subtask` hangs the attack under the director and dies
/// with it.
pub type AttackFn<B> = Box<dyn FnMut(&mut TaskCx<'_>, Boxed<B>) -> TaskId>;

/// One entry in the boss's ordered attack list.
pub struct AttackSpec<B> {
    pub name: String,
    /// Ticks before the attack is cut off. `0` means no timeout.
    pub timeout: u32,
    /// The attack ends once the boss's health fraction falls to this value.
    pub goal: f32,
    pub spawn: AttackFn<B>,
}

/// Serializable attack metadata; joined to spawn functions by name via
/// [`Director::from_plan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackPlan {
    pub name: String,
    #[serde(default)]
    pub timeout: u32,
    #[serde(default)]
    pub goal: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Intro,
    Attack(usize),
    Defeated,
    Cleanup,
}

/// Boss timeline state machine. Implements [`TaskBody`]; spawn it into the
/// scheduler to run the fight.
pub struct Director<B> {
    boss: Boxed<B>,
    attacks: Vec<AttackSpec<B>>,
    intro_ticks: u32,
    defeated: EventId,
    phase: Phase,
    current: Option<TaskId>,
    deadline: Option<u64>,
}

impl<B: Vitality + 'static> Director<B> {
    /// Create a director for `boss` with an empty attack list. Opens the
    /// "defeated" event source; grab it with
    /// [`defeated_event`](Self::defeated_event) before spawning the director.
    pub fn new(boss: Boxed<B>, events: &mut Events) -> Self {
        Self {
            boss,
            attacks: Vec::new(),
            intro_ticks: 0,
            defeated: events.open(),
            phase: Phase::Idle,
            current: None,
            deadline: None,
        }
    }

    /// Ticks to wait between binding the boss and the first attack.
    pub fn intro(mut self, ticks: u32) -> Self {
        self.intro_ticks = ticks;
        self
    }

    /// Append an attack to the list.
    pub fn attack(
        mut self,
        name: impl Into<String>,
        timeout: u32,
        goal: f32,
        spawn: impl FnMut(&mut TaskCx<'_>, Boxed<B>) -> TaskId + 'static,
    ) -> Self {
        self.attacks.push(AttackSpec {
            name: name.into(),
            timeout,
            goal,
            spawn: Box::new(spawn),
        });
        self
    }

    /// Build a director from serialized metadata plus a bank of spawn
    /// functions keyed by attack name. Plan entries with no matching spawn
    /// function are skipped with a warning.
    pub fn from_plan(
        boss: Boxed<B>,
        events: &mut Events,
        plans: &[AttackPlan],
        bank: &mut HashMap<String, AttackFn<B>>,
    ) -> Self {
        let mut director = Self::new(boss, events);
        for plan in plans {
            match bank.remove(&plan.name) {
                Some(spawn) => director.attacks.push(AttackSpec {
                    name: plan.name.clone(),
                    timeout: plan.timeout,
                    goal: plan.goal,
                    spawn,
                }),
                None => log::warn!("attack plan '{}' has no spawn function, skipping", plan.name),
            }
        }
        director
    }

    /// Fired exactly once when the attack list is exhausted.
    pub fn defeated_event(&self) -> EventId {
        self.defeated
    }

    fn begin_attack(&mut self, cx: &mut TaskCx<'_>, index: usize) -> Flow {
        let Some(spec) = self.attacks.get_mut(index) else {
            self.phase = Phase::Defeated;
            return Flow::Yield;
        };
        log::debug!("attack '{}' begins at tick {}", spec.name, cx.now());
        self.current = Some((spec.spawn)(cx, self.boss));
        self.deadline = (spec.timeout > 0).then(|| cx.now() + u64::from(spec.timeout));
        self.phase = Phase::Attack(index);
        Flow::Yield
    }

    fn attack_over(&self, cx: &TaskCx<'_>, index: usize) -> bool {
        let running = self
            .current
            .is_some_and(|task| cx.state(task).is_some_and(|state| !state.is_terminal()));
        if !running {
            return true;
        }
        if self.deadline.is_some_and(|deadline| cx.now() >= deadline) {
            return true;
        }
        let goal = self.attacks[index].goal;
        cx.unbox(self.boss)
            .is_some_and(|boss| boss.health_fraction() <= goal)
    }
}

impl<B: Vitality + 'static> TaskBody for Director<B> {
    fn resume(&mut self, cx: &mut TaskCx<'_>) -> Flow {
        match self.phase {
            Phase::Idle => {
                // Bind first: if the boss dies mid-fight the whole fight —
                // director and attack tasks — is torn down by the scheduler.
                if cx.bind(self.boss).is_err() {
                    return Flow::Done;
                }
                self.phase = Phase::Intro;
                if self.intro_ticks > 0 {
                    Flow::Sleep(self.intro_ticks)
                } else {
                    Flow::Yield
                }
            }
            Phase::Intro => self.begin_attack(cx, 0),
            Phase::Attack(index) => {
                if self.attack_over(cx, index) {
                    if let Some(task) = self.current.take() {
                        cx.cancel(task);
                    }
                    self.begin_attack(cx, index + 1)
                } else {
                    Flow::Yield
                }
            }
            Phase::Defeated => {
                log::info!("boss defeated at tick {}", cx.now());
                cx.fire(self.defeated);
                self.phase = Phase::Cleanup;
                Flow::Yield
            }
            Phase::Cleanup => {
                cx.destroy(self.boss);
                Flow::Done
            }
        }
    }
}
