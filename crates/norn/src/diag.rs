//! Diagnostics sender — ships real-time metrics to `norn-telemetry` over UDP.
//!
//! Enabled by the `diagnostics` feature flag. Create a [`DiagSender`] next to
//! your [`Stage`] and call [`send`](DiagSender::send) once per frame; it
//! throttles itself to 10 Hz, serializes a JSON snapshot, and sends it to
//! `127.0.0.1:9400`. Everything is best-effort: no listener, no error — run
//! `cargo run -p norn-telemetry` to watch the stream.

use std::net::UdpSocket;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::stage::Stage;

/// Where the telemetry TUI listens.
const TELEMETRY_ADDR: &str = "127.0.0.1:9400";
/// Send throttle — 10 Hz is plenty for a dashboard.
const SEND_INTERVAL: Duration = Duration::from_millis(100);

/// Owns the outbound UDP socket and throttling state.
pub struct DiagSender {
    socket: UdpSocket,
    last_send: Instant,
}

impl DiagSender {
    /// Create a new sender on an ephemeral port. Returns `None` if the
    /// socket can't be set up; diagnostics then just stay off.
    pub fn new() -> Option<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0").ok()?;
        socket.connect(TELEMETRY_ADDR).ok()?;
        socket.set_nonblocking(true).ok()?;
        Some(Self {
            socket,
            // Send immediately on the first frame.
            last_send: Instant::now() - Duration::from_secs(1),
        })
    }

    /// Snapshot the stage and send it, at most once per 100ms.
    pub fn send(&mut self, stage: &Stage) {
        if self.last_send.elapsed() < SEND_INTERVAL {
            return;
        }
        self.last_send = Instant::now();

        let tasks = stage.scheduler.pool_stats();
        let snapshot = DiagSnapshot {
            tick: stage.now(),
            tasks: TaskPoolSnapshot {
                pending: tasks.pending,
                sleeping: tasks.sleeping,
                waiting: tasks.waiting,
                retired: tasks.retired,
                total_slots: tasks.total_slots,
                free_slots: tasks.free_slots,
            },
            entities: EntityPoolSnapshot {
                alive: stage.registry.alive_count(),
                free_slots: stage.registry.free_count(),
                total_slots: stage.registry.total_slots(),
            },
            open_sources: stage.events.open_count(),
        };

        match serde_json::to_vec(&snapshot) {
            Ok(bytes) => {
                // Best effort: if nobody is listening, drop it silently.
                let _ = self.socket.send(&bytes);
            }
            Err(e) => log::warn!("failed to serialize diagnostics snapshot: {e}"),
        }
    }
}

// ── Snapshot types (wire format) ────────────────────────────────────────

#[derive(Serialize)]
struct DiagSnapshot {
    tick: u64,
    tasks: TaskPoolSnapshot,
    entities: EntityPoolSnapshot,
    open_sources: usize,
}

#[derive(Serialize)]
struct TaskPoolSnapshot {
    pending: usize,
    sleeping: usize,
    waiting: usize,
    retired: usize,
    total_slots: u32,
    free_slots: usize,
}

#[derive(Serialize)]
struct EntityPoolSnapshot {
    alive: usize,
    free_slots: usize,
    total_slots: u32,
}
