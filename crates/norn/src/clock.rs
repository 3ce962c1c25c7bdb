//! Fixed-timestep pacing for the outer loop.
//!
//! The scheduler counts ticks and knows nothing about wall time. The
//! [`TickClock`] sits in the outer loop and converts real frame deltas into
//! whole simulation ticks: accumulate, then step as many times as fit.
//!
//! ```ignore
//! let mut clock = TickClock::new(60.0);
//! loop {
//!     let dt = frame_delta();
//!     for _ in 0..clock.advance(dt) {
//!         stage.tick();
//!     }
//!     render();
//! }
//! ```

use std::time::Duration;

/// Default bound on catch-up ticks per frame. A long stall (debugger,
/// laptop lid) would otherwise make the next frame simulate the entire gap.
const DEFAULT_MAX_CATCHUP: u32 = 8;

/// Converts wall-clock frame deltas into whole simulation ticks.
pub struct TickClock {
    step: Duration,
    accumulated: Duration,
    max_catchup: u32,
}

impl TickClock {
    /// A clock stepping at `hz` ticks per second.
    pub fn new(hz: f64) -> Self {
        assert!(hz > 0.0, "tick rate must be positive, got {hz}");
        Self {
            step: Duration::from_secs_f64(1.0 / hz),
            accumulated: Duration::ZERO,
            max_catchup: DEFAULT_MAX_CATCHUP,
        }
    }

    /// Cap on ticks returned by a single [`advance`](Self::advance) call.
    pub fn with_max_catchup(mut self, ticks: u32) -> Self {
        assert!(ticks > 0, "max catch-up must be at least 1");
        self.max_catchup = ticks;
        self
    }

    /// The fixed step duration.
    pub fn step(&self) -> Duration {
        self.step
    }

    /// Feed one frame's delta; returns how many ticks to run now.
    ///
    /// If the frame fell further behind than the catch-up cap allows, the
    /// excess backlog is dropped (with a warning) instead of being simulated:
    /// the simulation slows down rather than spiraling.
    pub fn advance(&mut self, delta: Duration) -> u32 {
        self.accumulated += delta;
        let mut ticks = 0;
        while self.accumulated >= self.step && ticks < self.max_catchup {
            self.accumulated -= self.step;
            ticks += 1;
        }
        if self.accumulated >= self.step {
            let dropped = self.accumulated.as_secs_f64() / self.step.as_secs_f64();
            log::warn!("tick clock {dropped:.0} steps behind, dropping backlog");
            self.accumulated = Duration::ZERO;
        }
        ticks
    }
}
