//! Performance benchmarks for critical game systems
//!
//! Bounds are loose enough for unoptimised test builds; they catch
//! accidental quadratic blowups, not small regressions.

use shared::bot::{danger_map, escape_path};
use shared::protocol::{Cmd, OutQueue, RecvBuffer};
use shared::snapshot::{decode_simulation, decode_tiles, encode_simulation, encode_tiles};
use shared::{
    Action, Bomb, Dir, Simulation, TilePos, BOT_HOP_BUDGET, MAP_SIZE, MAX_BOMBS, MAX_STEP,
};
use std::time::Instant;

fn full_simulation(seed: u64) -> Simulation {
    let mut sim = Simulation::new(seed);
    sim.set_roster(["alice", "bot_0", "bot_1", "bot_2"]);
    sim.set_new_game();
    sim
}

/// Benchmarks the simulation step with a full roster of bots
#[test]
fn benchmark_simulation_step() {
    let mut sim = full_simulation(1);
    let bots = ["bot_0", "bot_1", "bot_2"];
    let mut events = Vec::new();

    let iterations = 10_000;
    let start = Instant::now();

    for i in 0..iterations {
        let dir = [Dir::Right, Dir::Down, Dir::Left, Dir::Up][(i / 50) % 4];
        let mut action = Action::moving(dir);
        action.drop = i % 97 == 0;
        sim.process_player_input(&action, "alice").unwrap();

        for bot in bots {
            sim.update_and_process_bot_input(bot, MAX_STEP).unwrap();
        }

        events.clear();
        sim.update(MAX_STEP, &mut events);
    }

    let duration = start.elapsed();
    println!(
        "Simulation step: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 5000);
}

/// Benchmarks a chain of bombs going off at once
#[test]
fn benchmark_bomb_chain() {
    let iterations = 200;
    let start = Instant::now();

    for seed in 0..iterations {
        let mut sim = full_simulation(seed);
        sim.grid.clear_crates();

        let size = MAP_SIZE as i32;
        for y in (1..size - 1).step_by(2) {
            for x in 1..size - 1 {
                if sim.bombs.len() < MAX_BOMBS {
                    sim.bombs.push(Bomb::new(TilePos::new(x, y)));
                }
            }
        }

        let mut events = Vec::new();
        for _ in 0..200 {
            sim.update(MAX_STEP, &mut events);
        }
        assert!(sim.bombs.is_empty());
    }

    let duration = start.elapsed();
    println!(
        "Bomb chain: {} rounds in {:?} ({:.2} μs/round)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 5000);
}

/// Benchmarks danger mapping plus escape search from a bomb tile
#[test]
fn benchmark_escape_path() {
    let sim = full_simulation(2);
    let bombs: Vec<Bomb> = [(1, 1), (5, 5), (11, 11), (3, 9)]
        .iter()
        .map(|&(x, y)| Bomb::new(TilePos::new(x, y)))
        .collect();
    let start_tile = sim.grid.index_of(TilePos::new(1, 1)).unwrap();

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let cells = danger_map(&sim.grid, &bombs);
        let (path, _) = escape_path(&cells, MAP_SIZE, start_tile, BOT_HOP_BUDGET);
        assert!(path.len() <= BOT_HOP_BUDGET as usize);
    }

    let duration = start.elapsed();
    println!(
        "Escape path: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks snapshot and tile encoding/decoding
#[test]
fn benchmark_snapshot_codec() {
    let mut sim = full_simulation(3);
    for x in 1..MAP_SIZE as i32 - 1 {
        sim.bombs.push(Bomb::new(TilePos::new(x, 3)));
    }

    let iterations = 5_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let payload = encode_simulation(&sim, &[]);
        let snapshot = decode_simulation(&payload).unwrap();
        assert_eq!(snapshot.players.len(), 4);

        let tiles = encode_tiles(&sim.grid);
        let grid = decode_tiles(&tiles, MAP_SIZE).unwrap();
        assert_eq!(grid.size(), MAP_SIZE);
    }

    let duration = start.elapsed();
    println!(
        "Snapshot codec: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 5000);
}

/// Benchmarks framing many small messages through the buffers
#[test]
fn benchmark_message_framing() {
    let mut out = OutQueue::new();
    let messages = 10_000;
    for i in 0..messages {
        out.push(Cmd::PlayerInput, if i % 2 == 0 { "1 0 0 0 0" } else { "0 0 0 1 1" });
    }
    let bytes = out.as_bytes().to_vec();

    let start = Instant::now();

    let mut recv = RecvBuffer::new(500, bytes.len() * 2);
    let mut reader = bytes.as_slice();
    let mut frames = 0;
    loop {
        let report = recv.fill_from(&mut reader).unwrap();
        frames += recv.drain_frames().into_iter().filter(|f| f.is_ok()).count();
        if report.closed {
            break;
        }
    }

    let duration = start.elapsed();
    println!(
        "Message framing: {} frames in {:?} ({:.2} ns/frame)",
        frames,
        duration,
        duration.as_nanos() as f64 / frames.max(1) as f64
    );

    assert_eq!(frames, messages);
    assert!(duration.as_millis() < 1000);
}
