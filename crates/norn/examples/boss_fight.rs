//! Boss fight — a three-attack timeline sequenced by the [`Director`].
//!
//! Headless: simulates a full fight at 60 ticks per second of simulated time
//! and logs phase transitions. The boss is chipped down by a stand-in
//! "player damage" task; each attack ends on its own finish, its timeout, or
//! the boss's health goal — whichever comes first.
//!
//! Run with: `RUST_LOG=debug cargo run -p norn --example boss_fight`

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use glam::Vec2;
use norn::prelude::*;

// ── Payloads ────────────────────────────────────────────────────────────

struct Boss {
    pos: Vec2,
    hp: f32,
    max_hp: f32,
}

impl Vitality for Boss {
    fn health_fraction(&self) -> f32 {
        self.hp / self.max_hp
    }
}

struct Bullet {
    pos: Vec2,
    vel: Vec2,
}

const VIEW: Vec2 = Vec2::new(480.0, 560.0);
const PLAYER_POS: Vec2 = Vec2::new(240.0, 420.0);

fn main() {
    env_logger::init();

    let mut stage = Stage::new();
    let boss = stage.insert(Boss {
        pos: Vec2::new(240.0, 120.0),
        hp: 1000.0,
        max_hp: 1000.0,
    });

    let director = Director::new(boss, &mut stage.events)
        .intro(30)
        .attack("fan volley", 240, 0.66, fan_volley)
        .attack("bullet rings", 240, 0.33, bullet_rings)
        .attack("last word", 600, 0.0, last_word);
    let defeated = director.defeated_event();
    stage.spawn(director);

    // Stand-in for player damage: chip the boss every tick, never below 1 hp
    // so only attack finishes and goals drive the timeline's last phase.
    stage.spawn(move |cx: &mut TaskCx| {
        let Ok(b) = cx.bind(boss) else {
            return Flow::Done;
        };
        b.hp = (b.hp - 1.2).max(1.0);
        Flow::Yield
    });

    let fight_over = Rc::new(Cell::new(false));
    let flag = fight_over.clone();
    let mut started = false;
    stage.spawn(move |cx: &mut TaskCx| {
        if !started {
            started = true;
            return Flow::WaitEvent(defeated);
        }
        log::info!("defeated observed at tick {}", cx.now());
        flag.set(true);
        Flow::Done
    });

    // Outer loop: fixed 60 Hz steps fed with synthetic frame deltas.
    let mut clock = TickClock::new(60.0);
    #[cfg(feature = "diagnostics")]
    let mut diag = norn::diag::DiagSender::new();
    let frame = Duration::from_micros(16_667);

    // Bounded at ten simulated minutes in case a script change stalls the fight.
    'fight: for _ in 0..36_000 {
        for _ in 0..clock.advance(frame) {
            stage.tick();
            if fight_over.get() {
                break 'fight;
            }
        }
        #[cfg(feature = "diagnostics")]
        if let Some(diag) = diag.as_mut() {
            diag.send(&stage);
        }
    }

    log::info!(
        "fight over at tick {}: {} bullets still flying, {} tasks live",
        stage.now(),
        stage.registry.alive_count(),
        stage.scheduler.live_count(),
    );
    stage.shutdown();
}

// ── Attacks ─────────────────────────────────────────────────────────────

/// Aimed 5-way fans, one volley every 12 ticks.
fn fan_volley(cx: &mut TaskCx, boss: Boxed<Boss>) -> TaskId {
    cx.spawn_subtask(move |cx: &mut TaskCx| {
        let Some(b) = cx.unbox(boss) else {
            return Flow::Done;
        };
        let origin = b.pos;
        let aim = (PLAYER_POS - origin).normalize_or(Vec2::Y);
        for lane in 0..5 {
            let spread = (lane as f32 - 2.0) * 0.15;
            let dir = Vec2::from_angle(spread).rotate(aim);
            spawn_bullet(cx, origin, dir * 3.0);
        }
        Flow::Sleep(12)
    })
}

/// Expanding rings with a slowly rotating seam.
fn bullet_rings(cx: &mut TaskCx, boss: Boxed<Boss>) -> TaskId {
    cx.spawn_subtask(move |cx: &mut TaskCx| {
        let Some(b) = cx.unbox(boss) else {
            return Flow::Done;
        };
        let origin = b.pos;
        let phase = cx.now() as f32 * 0.05;
        for i in 0..12 {
            let angle = phase + std::f32::consts::TAU * i as f32 / 12.0;
            spawn_bullet(cx, origin, Vec2::from_angle(angle) * 2.2);
        }
        Flow::Sleep(20)
    })
}

/// Dense spiral for a fixed duration, then the attack finishes on its own.
fn last_word(cx: &mut TaskCx, boss: Boxed<Boss>) -> TaskId {
    let mut bursts = 0u32;
    cx.spawn_subtask(move |cx: &mut TaskCx| {
        bursts += 1;
        if bursts > 60 {
            return Flow::Done;
        }
        let Some(b) = cx.unbox(boss) else {
            return Flow::Done;
        };
        let origin = b.pos;
        for arm in 0..3 {
            let angle = bursts as f32 * 0.37 + std::f32::consts::TAU * arm as f32 / 3.0;
            spawn_bullet(cx, origin, Vec2::from_angle(angle) * 2.8);
        }
        Flow::Sleep(5)
    })
}

/// A bullet is an entity plus a top-level mover task bound to it. Top-level
/// on purpose: bullets outlive the attack that fired them.
fn spawn_bullet(cx: &mut TaskCx, pos: Vec2, vel: Vec2) {
    let bullet = cx.insert(Bullet { pos, vel });
    cx.spawn(move |cx: &mut TaskCx| {
        let Ok(b) = cx.bind(bullet) else {
            return Flow::Done;
        };
        b.pos += b.vel;
        let off_screen = !(0.0..=VIEW.x).contains(&b.pos.x) || !(0.0..=VIEW.y).contains(&b.pos.y);
        if off_screen {
            cx.destroy(bullet);
            return Flow::Done;
        }
        Flow::Yield
    });
}
