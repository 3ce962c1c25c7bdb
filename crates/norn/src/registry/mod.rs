//! # Entity Registry — Generation-Indexed Payload Storage
//!
//! The [`Registry`] is the single owner of every game-object payload. Nothing
//! else in the system holds a strong reference to an entity: tasks, the
//! driver, and content code all hold [`Boxed`] handles and must unbox them
//! each tick. This removes ownership cycles (boss ↔ attack task ↔ spawned
//! projectiles) and use-after-free by construction — there is nothing to
//! trace and nothing to collect.
//!
//! ## Storage layout
//!
//! ```text
//! slots: [ {gen: 0, payload: Some(Boss),   destroyed: e0},
//!          {gen: 2, payload: None,         destroyed: —  },   ← free
//!          {gen: 1, payload: Some(Bullet), destroyed: e7} ]
//! free_list: [1]
//! ```
//!
//! Inserting pops a free slot if one is available, otherwise grows the vec.
//! Destroying clears the payload, bumps the generation (stale handles are now
//! detectable forever), and recycles the index.
//!
//! ## The "destroyed" event
//!
//! Every live slot owns an implicit event source. `destroy` fires it exactly
//! once, then closes it, so a task waiting solely on an entity's death is
//! guaranteed to wake even if game logic never signals anything else.
//!
//! ## Payloads
//!
//! Payloads are stored type-erased (`Box<dyn Any>`), so one registry holds
//! bosses, enemies, and projectiles side by side; [`Boxed<T>`] carries the
//! payload type and unboxing downcasts back. An unboxed reference is only
//! good for the current tick — the borrow checker already prevents holding
//! one across `tick()`, which takes the registry mutably.

mod handle;

pub use handle::{AnyBox, Boxed};

use std::any::Any;
use std::fmt;

use crate::events::{EventId, Events};

/// Error returned when a handle refers to an entity that no longer exists.
///
/// Always recovered locally: the caller cancels the dependent task or treats
/// the call site as a no-op. It never propagates across tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityGone;

impl fmt::Display for EntityGone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity is gone (stale handle)")
    }
}

impl std::error::Error for EntityGone {}

/// One storage slot. The generation survives payload churn; the payload and
/// destroyed-event only exist while the slot is live.
struct Slot {
    generation: u32,
    payload: Option<Box<dyn Any>>,
    destroyed: Option<EventId>,
}

/// Owns all entity payloads and issues [`Boxed`] handles for them.
pub struct Registry {
    slots: Vec<Slot>,
    /// Indices of destroyed entities, available for reuse.
    free_list: Vec<u32>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
        }
    }

    /// Store a payload, returning a handle capturing the slot's current
    /// generation. Reuses a freed slot if one is available. Also opens the
    /// slot's "destroyed" event source in `events`.
    pub fn insert<T: 'static>(&mut self, events: &mut Events, payload: T) -> Boxed<T> {
        let destroyed = events.open();
        if let Some(index) = self.free_list.pop() {
            // Recycled slot — generation was already bumped on destroy.
            let slot = &mut self.slots[index as usize];
            slot.payload = Some(Box::new(payload));
            slot.destroyed = Some(destroyed);
            Boxed::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                payload: Some(Box::new(payload)),
                destroyed: Some(destroyed),
            });
            Boxed::new(index, 0)
        }
    }

    /// Destroy the entity behind a handle.
    ///
    /// If the handle is valid: drops the payload, bumps the generation so
    /// every outstanding handle goes stale, fires the slot's "destroyed"
    /// source exactly once, closes it, and recycles the index. Returns `true`.
    ///
    /// If the handle is already stale this is a no-op returning `false` —
    /// double-destroy is not an error.
    pub fn destroy(&mut self, events: &mut Events, handle: impl Into<AnyBox>) -> bool {
        let handle = handle.into();
        let idx = handle.index as usize;
        if idx >= self.slots.len() || self.slots[idx].generation != handle.generation {
            return false;
        }
        let slot = &mut self.slots[idx];
        slot.payload = None;
        slot.generation += 1;
        if let Some(destroyed) = slot.destroyed.take() {
            events.fire(destroyed);
            events.close(destroyed);
        }
        self.free_list.push(handle.index);
        true
    }

    /// Get a shared reference to the payload behind a handle.
    ///
    /// Returns `None` if the entity has been destroyed (the generation no
    /// longer matches). The reference must not be retained past the current
    /// tick.
    pub fn unbox<T: 'static>(&self, handle: Boxed<T>) -> Option<&T> {
        let slot = self.live_slot(handle.erased())?;
        slot.payload.as_ref()?.downcast_ref::<T>()
    }

    /// Get a mutable reference to the payload behind a handle.
    ///
    /// Returns `None` if the entity has been destroyed.
    pub fn unbox_mut<T: 'static>(&mut self, handle: Boxed<T>) -> Option<&mut T> {
        let idx = handle.index as usize;
        if idx >= self.slots.len() || self.slots[idx].generation != handle.generation {
            return None;
        }
        self.slots[idx].payload.as_mut()?.downcast_mut::<T>()
    }

    /// Check whether the entity behind a handle is still alive.
    pub fn contains(&self, handle: impl Into<AnyBox>) -> bool {
        self.live_slot(handle.into()).is_some()
    }

    /// The entity's "destroyed" event source, fired exactly once when the
    /// entity dies. `None` if the entity is already gone.
    pub fn destroyed_event(&self, handle: impl Into<AnyBox>) -> Option<EventId> {
        self.live_slot(handle.into())?.destroyed
    }

    /// Returns the number of currently alive entities.
    pub fn alive_count(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    fn live_slot(&self, handle: AnyBox) -> Option<&Slot> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation == handle.generation && slot.payload.is_some() {
            Some(slot)
        } else {
            None
        }
    }

    /// Returns the number of free (recyclable) slots.
    #[cfg(any(feature = "diagnostics", test))]
    pub(crate) fn free_count(&self) -> usize {
        self.free_list.len()
    }

    /// Returns the total number of slots ever allocated.
    #[cfg(any(feature = "diagnostics", test))]
    pub(crate) fn total_slots(&self) -> u32 {
        self.slots.len() as u32
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Enemy {
        hp: i32,
    }
    #[derive(Debug, PartialEq)]
    struct Bullet {
        speed: f32,
    }

    fn setup() -> (Registry, Events) {
        (Registry::new(), Events::new())
    }

    #[test]
    fn insert_and_unbox() {
        let (mut reg, mut events) = setup();
        let e = reg.insert(&mut events, Enemy { hp: 100 });
        assert_eq!(reg.unbox(e), Some(&Enemy { hp: 100 }));
        assert!(reg.contains(e));
    }

    #[test]
    fn unbox_mut_mutates_payload() {
        let (mut reg, mut events) = setup();
        let e = reg.insert(&mut events, Enemy { hp: 100 });
        reg.unbox_mut(e).unwrap().hp -= 30;
        assert_eq!(reg.unbox(e).unwrap().hp, 70);
    }

    #[test]
    fn destroy_invalidates_every_copy() {
        let (mut reg, mut events) = setup();
        let e = reg.insert(&mut events, Enemy { hp: 1 });
        let copy = e;
        assert!(reg.destroy(&mut events, e));
        assert_eq!(reg.unbox(copy), None);
        assert!(!reg.contains(copy));
    }

    #[test]
    fn double_destroy_is_a_noop() {
        let (mut reg, mut events) = setup();
        let e = reg.insert(&mut events, Enemy { hp: 1 });
        assert!(reg.destroy(&mut events, e));
        assert!(!reg.destroy(&mut events, e));
    }

    #[test]
    fn slot_reuse_bumps_generation() {
        // allocate → destroy → reallocate reuses the slot; the old handle
        // stays stale, the new one is live.
        let (mut reg, mut events) = setup();
        let b0 = reg.insert(&mut events, Enemy { hp: 1 });
        reg.destroy(&mut events, b0);
        let b1 = reg.insert(&mut events, Enemy { hp: 2 });

        assert_eq!(b1.index(), b0.index()); // same slot
        assert_eq!(b1.generation(), b0.generation() + 1); // bumped

        assert_eq!(reg.unbox(b0), None);
        assert_eq!(reg.unbox(b1), Some(&Enemy { hp: 2 }));
    }

    #[test]
    fn stale_handle_survives_many_reuses() {
        let (mut reg, mut events) = setup();
        let b0 = reg.insert(&mut events, Enemy { hp: 1 });
        reg.destroy(&mut events, b0);
        for i in 0..10 {
            let b = reg.insert(&mut events, Enemy { hp: i });
            reg.destroy(&mut events, b);
        }
        assert_eq!(reg.unbox(b0), None);
    }

    #[test]
    fn mixed_payload_types_coexist() {
        let (mut reg, mut events) = setup();
        let e = reg.insert(&mut events, Enemy { hp: 5 });
        let p = reg.insert(&mut events, Bullet { speed: 3.5 });
        assert_eq!(reg.unbox(e).unwrap().hp, 5);
        assert_eq!(reg.unbox(p).unwrap().speed, 3.5);
    }

    #[test]
    fn destroy_fires_destroyed_event_once() {
        let (mut reg, mut events) = setup();
        let e = reg.insert(&mut events, Enemy { hp: 1 });
        let src = reg.destroyed_event(e).unwrap();
        assert_eq!(events.fires(src), Some(0));

        reg.destroy(&mut events, e);
        // Fired once, then closed.
        assert_eq!(events.fires(src), None);
        assert!(!events.fire(src));

        // Double destroy must not touch the source again.
        reg.destroy(&mut events, e);
        assert_eq!(events.fires(src), None);
    }

    #[test]
    fn alive_and_free_counts() {
        let (mut reg, mut events) = setup();
        assert_eq!(reg.alive_count(), 0);
        let a = reg.insert(&mut events, Enemy { hp: 1 });
        let _b = reg.insert(&mut events, Enemy { hp: 2 });
        assert_eq!(reg.alive_count(), 2);
        assert_eq!(reg.total_slots(), 2);

        reg.destroy(&mut events, a);
        assert_eq!(reg.alive_count(), 1);
        assert_eq!(reg.free_count(), 1);
        assert_eq!(reg.total_slots(), 2);
    }
}
