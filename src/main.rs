use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytering::{config, source, stress};
use clap::Parser;
use log::{error, info};

/// Framed-traffic stress driver for the SPSC byte ring.
///
/// One producer task pushes pseudo-random framed packets through the ring
/// while one consumer task resynchronizes on the frame sync word and
/// verifies checksums. Any mismatch fails the run.
#[derive(Parser, Debug)]
#[command(name = "bytering-stress", version, about)]
struct Args {
    /// Path to a TOML configuration file; defaults apply when absent.
    #[arg(short, long)]
    config: Option<String>,
    /// Override the configured buffer capacity (element count).
    #[arg(long)]
    capacity: Option<usize>,
    /// Override the configured run duration in seconds.
    #[arg(long)]
    duration_secs: Option<u64>,
    /// Override the configured frame limit.
    #[arg(long)]
    max_frames: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize logging
    env_logger::init();
    let args = Args::parse();

    let mut cfg = config::load_config(args.config.as_deref())?;
    if let Some(capacity) = args.capacity {
        cfg.buffer.capacity = capacity;
    }
    if let Some(secs) = args.duration_secs {
        cfg.traffic.duration_secs = Some(secs);
    }
    if let Some(max) = args.max_frames {
        cfg.traffic.max_frames = Some(max);
    }

    let source = source::from_config(&cfg.source).await?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        let duration = cfg.traffic.duration_secs;
        tokio::spawn(async move {
            match duration {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => {
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
            info!("stopping");
            stop.store(true, Ordering::Relaxed);
        });
    }

    let report = stress::run(&cfg, source, stop).await?;
    info!(
        "run finished: {} frames / {} B in, {} frames / {} B out, {} B discarded, {} checksum errors",
        report.frames_produced,
        report.bytes_produced,
        report.frames_consumed,
        report.bytes_consumed,
        report.bytes_discarded,
        report.checksum_errors
    );

    if report.checksum_errors > 0 {
        error!("stream integrity check failed");
        return Err("checksum errors detected".into());
    }
    Ok(())
}
