//! # Boxed Handles — Weak References to Registry Slots
//!
//! A [`Boxed<T>`] is just a pair of numbers — it doesn't "contain" the entity.
//! The [`Registry`](super::Registry) maps handles to their payloads. Holding a
//! handle never keeps an entity alive, and a handle to a dead entity is
//! harmless: unboxing it simply returns nothing.
//!
//! ## Design: Generational Indices
//!
//! A naive approach would hand out bare slot indices, but this breaks when
//! entities are destroyed and their slots recycled. Consider:
//!
//! ```text
//! 1. Insert a projectile — slot #5
//! 2. A task stores the handle: saved = 5
//! 3. The projectile is destroyed
//! 4. A new enemy is inserted — gets recycled slot #5
//! 5. The task uses `saved` — oops, it now steers the wrong entity!
//! ```
//!
//! The fix: pair each index with a **generation** counter. When a slot is
//! recycled, its generation increments. Any stale handle with an old
//! generation is detected as invalid:
//!
//! ```text
//! Boxed { index: 5, generation: 0 }  ← projectile
//! Boxed { index: 5, generation: 1 }  ← enemy, after recycle
//! ```
//!
//! The stale handle still says `generation: 0`, so lookups fail safely. The
//! generation check is the *only* validity mechanism — within one session a
//! slot's generations are never reused, so a stale handle stays stale forever.
//!
//! Handles are typed by payload (`Boxed<Enemy>` vs. `Boxed<Projectile>`), but
//! the scheduler stores them type-erased as [`AnyBox`] so one binding check
//! covers every payload kind.

use std::fmt;
use std::marker::PhantomData;

/// A typed weak handle to an entity in the [`Registry`](super::Registry).
///
/// Obtained from [`Registry::insert`](super::Registry::insert). Valid only
/// while the slot's generation matches; after the entity is destroyed, every
/// copy of the handle is permanently stale.
pub struct Boxed<T> {
    /// Slot index in the registry. Recycled when the entity is destroyed.
    pub(crate) index: u32,
    /// Generation at issue time. Compared against the slot's current
    /// generation on every unbox.
    pub(crate) generation: u32,
    /// `fn() -> T` keeps the handle `Copy + Send + Sync` regardless of `T`.
    pub(crate) _payload: PhantomData<fn() -> T>,
}

impl<T> Boxed<T> {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _payload: PhantomData,
        }
    }

    /// Returns the raw slot index. Useful for diagnostics, not for general use.
    pub fn index(self) -> u32 {
        self.index
    }

    /// Returns the generation captured when the handle was issued.
    pub fn generation(self) -> u32 {
        self.generation
    }

    /// Discard the payload type, e.g. for scheduler bindings that only care
    /// about liveness.
    pub fn erased(self) -> AnyBox {
        AnyBox {
            index: self.index,
            generation: self.generation,
        }
    }
}

// Manual impls: derive would bound them on `T`, but the handle is plain data.
impl<T> Clone for Boxed<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Boxed<T> {}

impl<T> PartialEq for Boxed<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Boxed<T> {}

impl<T> std::hash::Hash for Boxed<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Boxed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Boxed({}v{})", self.index, self.generation)
    }
}

impl<T> fmt::Display for Boxed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// A type-erased [`Boxed`] handle.
///
/// Carries the same `(index, generation)` pair without the payload type. The
/// scheduler stores these for entity bindings; the registry can answer
/// liveness queries for them without knowing the payload.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnyBox {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl AnyBox {
    /// Returns the raw slot index.
    pub fn index(self) -> u32 {
        self.index
    }

    /// Returns the captured generation.
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl<T> From<Boxed<T>> for AnyBox {
    fn from(boxed: Boxed<T>) -> Self {
        boxed.erased()
    }
}

impl fmt::Debug for AnyBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnyBox({}v{})", self.index, self.generation)
    }
}
