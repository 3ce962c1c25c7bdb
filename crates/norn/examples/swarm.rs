//! Wave swarm — spawner waves, companion shots, and death-event scoring.
//!
//! A stage-opening without the stage: a spawner emits a wave of fairies;
//! each fairy drifts, fires trail shots whose "head" companion is steered by
//! unboxing it every tick, and eventually burns out. A watcher per fairy
//! waits on its destroyed event and tallies the kill on a scoreboard entity.
//!
//! Run with: `RUST_LOG=info cargo run -p norn --example swarm`

use glam::Vec2;
use norn::prelude::*;

struct Fairy {
    pos: Vec2,
    vel: Vec2,
    hp: i32,
}

struct Shot {
    pos: Vec2,
    vel: Vec2,
}

struct Scoreboard {
    kills: u32,
}

const VIEW: Vec2 = Vec2::new(480.0, 560.0);

fn main() {
    env_logger::init();

    let mut stage = Stage::new();
    let board = stage.insert(Scoreboard { kills: 0 });

    // Spawner: six fairies, one every 30 ticks, fanned across the top.
    let mut wave = 0u32;
    stage.spawn(move |cx: &mut TaskCx| {
        if wave == 6 {
            return Flow::Done;
        }
        let lane = wave as f32 / 5.0 - 0.5;
        let pos = Vec2::new(VIEW.x * 0.5 + lane * 300.0, -20.0);
        let vel = Vec2::new(-lane, 2.0);
        spawn_fairy(cx, board, pos, vel);
        wave += 1;
        Flow::Sleep(30)
    });

    for second in 0..12 {
        for _ in 0..60 {
            stage.tick();
        }
        log::info!(
            "t={:>3}s entities={:<3} tasks={}",
            second + 1,
            stage.registry.alive_count(),
            stage.scheduler.live_count(),
        );
    }

    let kills = stage.registry.unbox(board).map_or(0, |b| b.kills);
    println!("swarm cleared: {kills} fairies downed");
    stage.shutdown();
}

fn spawn_fairy(cx: &mut TaskCx, board: Boxed<Scoreboard>, pos: Vec2, vel: Vec2) {
    let fairy = cx.insert(Fairy { pos, vel, hp: 80 });

    // Watcher: waits solely on the fairy's death, then scores it. The
    // destroyed event fires exactly once no matter how the fairy dies.
    let died = cx
        .registry
        .destroyed_event(fairy)
        .expect("fairy was just inserted");
    let mut started = false;
    cx.spawn(move |cx: &mut TaskCx| {
        if !started {
            started = true;
            return Flow::WaitEvent(died);
        }
        if let Some(b) = cx.unbox_mut(board) {
            b.kills += 1;
        }
        Flow::Done
    });

    // The fairy itself: drift in, volley every 15 ticks, burn out.
    cx.spawn(move |cx: &mut TaskCx| {
        let Ok(f) = cx.bind(fairy) else {
            return Flow::Done;
        };
        f.pos += f.vel;
        f.vel *= 0.98;
        f.hp -= 1;
        let (pos, vel, dead) = (f.pos, f.vel, f.hp <= 0);
        if dead {
            cx.destroy(fairy);
            return Flow::Done;
        }
        if cx.now() % 15 == 0 {
            spawn_trail_shot(cx, pos, vel + Vec2::new(0.0, 2.5));
        }
        Flow::Yield
    });
}

/// A two-entity shot: the body flies, the head is repositioned each tick by
/// unboxing it. If the head somehow dies first, the body just flies on.
fn spawn_trail_shot(cx: &mut TaskCx, pos: Vec2, vel: Vec2) {
    let head = cx.insert(Shot { pos, vel });
    let body = cx.insert(Shot { pos, vel });

    cx.spawn(move |cx: &mut TaskCx| {
        let Ok(b) = cx.bind(body) else {
            return Flow::Done;
        };
        b.pos += b.vel;
        let (pos, vel) = (b.pos, b.vel);
        if let Some(h) = cx.unbox_mut(head) {
            h.pos = pos + vel.normalize_or(Vec2::Y) * 8.0;
        }
        let off_screen = !(-40.0..=VIEW.y + 40.0).contains(&pos.y);
        if off_screen {
            cx.destroy(body);
            cx.destroy(head);
            return Flow::Done;
        }
        Flow::Yield
    });
}
