//! # MaskRing Demo
//!
//! Streams a seeded workload of masked fills through a small ring while a
//! background drainer plays a slow executor, then checks every mask the
//! executor read against what the producer wrote.
//!
//! ## Running
//!
//! ```bash
//! cargo run -p maskring-sim --bin demo --release
//!
//! # More jobs, slower executor, with per-crossing traces
//! RUST_LOG=maskring=trace cargo run -p maskring-sim --bin demo -- --jobs 50000 --latency-us 20
//! ```

use anyhow::{bail, Context, Result};
use maskring::{MaskRing, SMALL_CONFIG};
use maskring_sim::{Drainer, Executor, Job, RenderQueue, Workload};
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

struct Options {
    jobs: usize,
    latency: Duration,
    seed: u64,
}

fn parse_args() -> Result<Options> {
    let mut options = Options {
        jobs: 10_000,
        latency: Duration::from_micros(5),
        seed: 2024,
    };
    let mut args = std::env::args().skip(1);
    while let Some(flag) = args.next() {
        let value = args.next().with_context(|| format!("{flag} needs a value"))?;
        match flag.as_str() {
            "--jobs" => options.jobs = value.parse().context("--jobs")?,
            "--latency-us" => options.latency = Duration::from_micros(value.parse().context("--latency-us")?),
            "--seed" => options.seed = value.parse().context("--seed")?,
            other => bail!("unknown flag {other}"),
        }
    }
    Ok(options)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let options = parse_args()?;

    let config = SMALL_CONFIG;
    let (mut ring, consumer) = MaskRing::new(config)?;
    let mut queue = RenderQueue::new(Executor::new(consumer).with_latency(options.latency));
    let drainer = Drainer::spawn(queue.clone()).context("spawning drainer")?;

    let jobs: Vec<Job> = Workload::new(options.seed, config.max_allocation())
        .take(options.jobs)
        .collect();
    info!(jobs = jobs.len(), capacity = config.capacity, "streaming fills");

    let started = Instant::now();
    for job in &jobs {
        job.submit(&mut ring, &mut queue)?;
    }
    let produced = started.elapsed();
    drainer.shutdown()?;
    let total = started.elapsed();

    let fills = queue.with_executor(|executor| executor.take_fills());
    if fills.len() != jobs.len() {
        bail!("executed {} fills, submitted {}", fills.len(), jobs.len());
    }
    let corrupted = jobs
        .iter()
        .zip(&fills)
        .filter(|(job, executed)| executed.digest != job.expected_digest())
        .count();
    if corrupted > 0 {
        bail!("{corrupted} masks were overwritten before execution");
    }

    let metrics = ring.metrics();
    let stats = queue.executor_stats();
    println!();
    println!("══════════════════ MaskRing ══════════════════");
    println!("  jobs                 {:>12}", jobs.len());
    println!("  producer time        {:>12.2?}", produced);
    println!("  total time           {:>12.2?}", total);
    println!("  allocations          {:>12}", metrics.allocations);
    println!("  fast path            {:>12}", metrics.fast_path);
    println!("  boundary crossings   {:>12}", metrics.boundary_crossings);
    println!("  wraparounds          {:>12}", metrics.wraparounds);
    println!("  fence waits queued   {:>12}", metrics.fence_waits_requested);
    println!("  backpressure events  {:>12}", metrics.backpressure_events);
    println!("  drain requests       {:>12}", metrics.drain_requests);
    println!("  bytes written        {:>12}", metrics.bytes_written);
    println!("  bytes read           {:>12}", stats.bytes_read);
    println!("  unmasked fills       {:>12}", stats.unmasked_fills);
    println!("══════════════════════════════════════════════");
    println!("  all {} masks verified", jobs.len() - stats.unmasked_fills as usize);

    Ok(())
}
