//! # Example: online_analytics
//!
//! A self-updating random walk, processed as it streams in.
//!
//! - a producer draws a gaussian sample every 2 seconds into a channel of capacity 2;
//! - `walk` keeps the last 20 positions: `next = prev + update * sqrt(variance) + shift`;
//! - `shift` and `variance` are controls, changed by a scripted "user" below;
//! - `run` gates the walk, pausing it without stopping the producer;
//! - `plot` renders the walk each time it moves;
//! - a timer aligned on full 10 seconds samples the engine's cached memory into a
//!   400-sample window.
//!
//! ## Flow
//! ```text
//! gaussian ──► [update, cap 2] ──► walk (window 20) ──► plot
//!               shift ──────────────┤
//!               variance ───────────┤
//!               run (gate) ─────────┘
//! timer (every full 10s) ──► memory_sample ──► memory_tracking (window 400)
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example online_analytics --features logging
//! ```
//! Stop with Ctrl-C.

use std::f64::consts::TAU;
use std::sync::Arc;
use std::time::Duration;

use cellvisor::{
    CellHandle, Engine, EngineConfig, Generate, GenerateFn, Graph, Inputs, LogWriter, ProducerError,
    RollingWindow, Schedule, Subscribe, Value, next_boundary,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

const WALK_LEN: usize = 20;
const MEMORY_SAMPLES: usize = 400;
const SPARKS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Standard normal samples (Box-Muller).
fn gaussian() -> impl Generate {
    let mut rng = StdRng::from_os_rng();
    GenerateFn::new(move || {
        let u1 = 1.0 - rng.random::<f64>();
        let u2 = rng.random::<f64>();
        Ok::<_, ProducerError>((-2.0 * u1.ln()).sqrt() * (TAU * u2).cos())
    })
}

fn sparkline(values: &[f64]) -> String {
    let (lo, hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = (hi - lo).max(f64::EPSILON);
    values
        .iter()
        .map(|v| {
            let level = ((v - lo) / span * (SPARKS.len() - 1) as f64).round() as usize;
            SPARKS[level.min(SPARKS.len() - 1)]
        })
        .collect()
}

/// Prints every new version of `cell` until the engine goes away.
async fn follow(cell: CellHandle, label: &'static str) {
    let mut version = 0;
    while let Ok(snapshot) = cell.wait_version(version + 1).await {
        version = snapshot.version;
        println!("[{label} v{version}] {}", snapshot.value);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut graph = Graph::new();

    let (_update, producer) =
        graph.register_producer("update", gaussian(), 2, Duration::from_secs(2))?;
    let shift = graph.declare_control("shift", 0)?;
    let variance = graph.declare_control("variance", 1)?;
    let run = graph.declare_control("run", true)?;

    let mut positions = RollingWindow::with_seed(WALK_LEN, 0.0)?;
    let walk = graph.declare_cell("walk", &["update", "shift", "variance"], move |i: &Inputs| {
        let noise = i.f64("update")? * i.f64("variance")?.sqrt() + i.f64("shift")?;
        let prev = positions.last().copied().unwrap_or(0.0);
        positions.append(prev + noise);
        Ok(Value::from(positions.snapshot()))
    })?;
    graph.gate(&walk, &run)?;

    let plot = graph.declare_cell("plot", &["update", "walk"], |i: &Inputs| {
        let walk = i.get("walk")?.floats().unwrap_or_default();
        let last = walk.last().copied().unwrap_or(0.0);
        Ok(Value::from(format!("{} {last:+.2}", sparkline(&walk))))
    })?;

    let period = Duration::from_secs(10);
    graph.declare_timer("memory_tick", next_boundary(period), Schedule::aligned(period))?;
    let stats = graph.stats();
    graph.declare_cell("memory_sample", &["memory_tick"], move |_: &Inputs| {
        Ok(Value::Float(stats.snapshot().cached_megabytes()))
    })?;
    let memory = graph.declare_window("memory_tracking", "memory_sample", MEMORY_SAMPLES, None)?;

    tokio::spawn(follow(plot, "walk"));
    tokio::spawn(async move {
        while let Ok(snapshot) = memory.wait_version(memory.version() + 1).await {
            let samples = snapshot.value.floats().unwrap_or_default();
            let last = samples.last().copied().unwrap_or(0.0);
            println!("[memory] {} {last:.4} MB", sparkline(&samples));
        }
    });

    // A scripted user moving the sliders.
    tokio::spawn(async move {
        let steps: [(u64, &str, Value); 5] = [
            (9, "shift", Value::Int(1)),
            (17, "variance", Value::Int(10)),
            (25, "shift", Value::Int(-3)),
            (33, "run", Value::Bool(false)),
            (45, "run", Value::Bool(true)),
        ];
        let mut elapsed = 0;
        for (at, name, value) in steps {
            tokio::time::sleep(Duration::from_secs(at - elapsed)).await;
            elapsed = at;
            println!("[user] {name} = {value}");
            match name {
                "shift" => shift.set(value),
                "variance" => variance.set(value),
                _ => run.set(value),
            }
        }
    });

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let engine = Engine::builder(EngineConfig::default())
        .with_subscribers(subs)
        .build();

    engine.run_until_signal(graph).await?;
    println!("producer status: {:?}", producer.status());
    println!("stats: {:?}", engine.stats());
    Ok(())
}
