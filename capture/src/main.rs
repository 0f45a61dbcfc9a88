//! ipeye – periodically captures a still image from a network camera.
//!
//! This binary:
//! 1. Reads configuration from the environment (optionally layered over a
//!    `KEY=VALUE` file given as the first argument)
//! 2. Waits for the next interval boundary
//! 3. On every tick fetches, re-encodes and stores one image, and reports
//!    the outcome to telegraf over UDP.

mod codec;
mod error;
mod fetch;
mod job;
mod scheduler;
mod telegraf;
mod timing;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tracing::info;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // ── load config ──────────────────────────────────────────────────
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config =
        ipeye_common::config::load(config_path.as_deref()).context("Config load failed")?;

    info!(
        "ipeye starting (name={}, url={}, interval={:?}, format={}, output={})",
        config.name,
        config.url,
        config.interval,
        config.output_format,
        config.output_dir.display()
    );
    if !config.extra_tags.is_empty() {
        info!("Extra tags: {:?}", config.extra_tags);
    }

    // ── ctrl-c ───────────────────────────────────────────────────────
    ctrlc::set_handler(move || {
        SHUTDOWN.store(true, Ordering::Relaxed);
        info!("Shutdown signal received");
    })
    .context("Cannot set Ctrl-C handler")?;

    // ── collaborators live for the whole process ─────────────────────
    let fetcher = fetch::HttpFetcher::new(config.request_timeout)?;
    let sink = telegraf::UdpSink::new(&config.telegraf_host)?;
    let job = job::CaptureJob::new(&config, &fetcher, &sink);

    scheduler::run(&config, &job, &SHUTDOWN)?;

    info!("ipeye stopped");
    Ok(())
}
