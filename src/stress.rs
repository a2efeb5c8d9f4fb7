//! Producer/consumer stress harness exercising the ring buffer contract:
//! partial-write/partial-read retry loops on the producer side, sync-word
//! scanning via `peek` and checksum validation on the consumer side.

use crate::config::{Config, TrafficConfig};
use crate::error::Error;
use crate::frame::{self, FrameHeader, HEADER_LEN};
use crate::ring::{Consumer, Producer, RingBuffer};
use crate::seed::Prng;
use crate::source::PayloadSource;
use futures::future::join_all;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinError;
use tokio::time::sleep;

/// Shared run counters, passed into every worker task.
#[derive(Debug, Default)]
pub struct Stats {
    pub frames_produced: AtomicU64,
    pub frames_consumed: AtomicU64,
    pub bytes_produced: AtomicU64,
    pub bytes_consumed: AtomicU64,
    pub bytes_discarded: AtomicU64,
    pub checksum_errors: AtomicU64,
}

impl Stats {
    pub fn snapshot(&self) -> Report {
        Report {
            frames_produced: self.frames_produced.load(Ordering::Relaxed),
            frames_consumed: self.frames_consumed.load(Ordering::Relaxed),
            bytes_produced: self.bytes_produced.load(Ordering::Relaxed),
            bytes_consumed: self.bytes_consumed.load(Ordering::Relaxed),
            bytes_discarded: self.bytes_discarded.load(Ordering::Relaxed),
            checksum_errors: self.checksum_errors.load(Ordering::Relaxed),
        }
    }
}

/// Counters of a completed (or observed) run.
#[derive(Debug, Clone, Copy)]
pub struct Report {
    pub frames_produced: u64,
    pub frames_consumed: u64,
    pub bytes_produced: u64,
    pub bytes_consumed: u64,
    pub bytes_discarded: u64,
    pub checksum_errors: u64,
}

/// Drive the full harness to completion and return the final counters.
///
/// The run ends when the producer reaches `max_frames` and the consumer
/// drains the buffer, or when `stop` is raised externally (duration
/// expiry, Ctrl-C).
pub async fn run(
    cfg: &Config,
    source: Arc<dyn PayloadSource>,
    stop: Arc<AtomicBool>,
) -> Result<Report, Error> {
    let ring = RingBuffer::with_capacity(cfg.buffer.capacity, cfg.buffer.element_size)?;
    info!("ring buffer capacity: {} bytes", ring.capacity());
    let (tx, rx) = ring.split();

    let stats = Arc::new(Stats::default());
    let producer_done = Arc::new(AtomicBool::new(false));

    // Independent stream for payload lengths; offset so a shared seed does
    // not correlate lengths with payload bytes.
    let lengths = match cfg.source.seed {
        Some(seed) => Prng::from_seed(seed ^ 0x6c65_6e67_7468_7321),
        None => Prng::seeded()?,
    };

    let producer = tokio::spawn(producer_loop(
        tx,
        source,
        cfg.traffic.clone(),
        lengths,
        Arc::clone(&stats),
        Arc::clone(&stop),
        Arc::clone(&producer_done),
    ));
    let consumer = tokio::spawn(consumer_loop(
        rx,
        cfg.traffic.clone(),
        Arc::clone(&stats),
        Arc::clone(&stop),
        Arc::clone(&producer_done),
    ));
    let reporter = tokio::spawn(reporter_loop(
        Arc::clone(&stats),
        cfg.traffic.report_interval_secs,
    ));

    let results = join_all([producer, consumer]).await;
    reporter.abort();
    let _ = reporter.await;

    for res in results {
        flatten(res)?;
    }
    Ok(stats.snapshot())
}

fn flatten(res: Result<Result<(), Error>, JoinError>) -> Result<(), Error> {
    match res {
        Ok(inner) => inner,
        Err(join_err) => {
            error!("worker task failed: {}", join_err);
            Err(Error::Unexpected)
        }
    }
}

/// Generate framed packets and deliver each one through a partial-write
/// retry loop.
async fn producer_loop(
    mut tx: Producer,
    source: Arc<dyn PayloadSource>,
    cfg: TrafficConfig,
    mut lengths: Prng,
    stats: Arc<Stats>,
    stop: Arc<AtomicBool>,
    producer_done: Arc<AtomicBool>,
) -> Result<(), Error> {
    let poll = Duration::from_micros(cfg.poll_interval_us);
    let mut payload = vec![0u8; cfg.max_payload];
    let mut frame_buf = Vec::with_capacity(HEADER_LEN + cfg.max_payload);
    let mut produced = 0u64;

    'frames: while !stop.load(Ordering::Relaxed) {
        if let Some(max) = cfg.max_frames {
            if produced >= max {
                break;
            }
        }

        let len = lengths.next_range(cfg.min_payload, cfg.max_payload);
        let body = &mut payload[..len];
        if let Err(e) = source.fill(body).await {
            // The consumer keys its drain on this flag; raise it on every
            // exit path.
            producer_done.store(true, Ordering::Release);
            return Err(e);
        }
        frame_buf.clear();
        frame::encode_frame(body, &mut frame_buf);

        let mut sent = 0usize;
        while sent < frame_buf.len() {
            let n = tx.write(&frame_buf[sent..]);
            sent += n;
            if n == 0 {
                if stop.load(Ordering::Relaxed) {
                    break 'frames;
                }
                sleep(poll).await;
            }
        }

        produced += 1;
        stats.frames_produced.fetch_add(1, Ordering::Relaxed);
        stats
            .bytes_produced
            .fetch_add(frame_buf.len() as u64, Ordering::Relaxed);
    }

    debug!("producer done after {} frames", produced);
    producer_done.store(true, Ordering::Release);
    Ok(())
}

/// Scan for sync, discard garbage, assemble frames, verify checksums.
async fn consumer_loop(
    mut rx: Consumer,
    cfg: TrafficConfig,
    stats: Arc<Stats>,
    stop: Arc<AtomicBool>,
    producer_done: Arc<AtomicBool>,
) -> Result<(), Error> {
    let poll = Duration::from_micros(cfg.poll_interval_us);
    let mut window = vec![0u8; rx.capacity()];
    let mut payload: Vec<u8> = Vec::new();

    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }

        let avail = rx.available();
        if avail < HEADER_LEN {
            if producer_done.load(Ordering::Acquire) {
                // No more data will arrive; trailing bytes cannot form a
                // header.
                if avail > 0 {
                    discard(&mut rx, &stats, avail);
                }
                break;
            }
            sleep(poll).await;
            continue;
        }

        let peeked = rx.peek(&mut window[..avail]);
        match frame::scan_sync(&window[..peeked]) {
            None => {
                // Keep the final byte; it may be the first half of a sync
                // pair still in flight.
                discard(&mut rx, &stats, peeked - 1);
                continue;
            }
            Some(0) => {}
            Some(pos) => {
                discard(&mut rx, &stats, pos);
                continue;
            }
        }

        let mut header_bytes = [0u8; HEADER_LEN];
        let n = rx.read(&mut header_bytes);
        debug_assert_eq!(n, HEADER_LEN);
        let header = match FrameHeader::decode(&header_bytes) {
            Some(header) => header,
            None => {
                stats
                    .bytes_discarded
                    .fetch_add(HEADER_LEN as u64, Ordering::Relaxed);
                continue;
            }
        };

        let len = header.len as usize;
        payload.clear();
        payload.resize(len, 0);
        let mut got = 0usize;
        while got < len {
            let n = rx.read(&mut payload[got..]);
            got += n;
            if n == 0 {
                if stop.load(Ordering::Relaxed) {
                    return Ok(());
                }
                if producer_done.load(Ordering::Acquire) && rx.is_empty() {
                    warn!("stream ended mid-frame: {} of {} payload bytes", got, len);
                    return Ok(());
                }
                sleep(poll).await;
            }
        }

        let computed = frame::checksum(&payload);
        if computed != header.checksum {
            stats.checksum_errors.fetch_add(1, Ordering::Relaxed);
            error!(
                "checksum mismatch on {}-byte payload: header {:#010x}, computed {:#010x}",
                len, header.checksum, computed
            );
        }
        stats.frames_consumed.fetch_add(1, Ordering::Relaxed);
        stats
            .bytes_consumed
            .fetch_add((HEADER_LEN + len) as u64, Ordering::Relaxed);
    }

    Ok(())
}

/// Remove `n` bytes known to be present, counting them as discarded.
fn discard(rx: &mut Consumer, stats: &Stats, mut n: usize) {
    let mut scratch = [0u8; 256];
    while n > 0 {
        let take = n.min(scratch.len());
        let got = rx.read(&mut scratch[..take]);
        if got == 0 {
            break;
        }
        n -= got;
        stats.bytes_discarded.fetch_add(got as u64, Ordering::Relaxed);
    }
}

/// Periodic statistics line; aborted by `run` when the workers finish.
async fn reporter_loop(stats: Arc<Stats>, interval_secs: u64) -> Result<(), Error> {
    if interval_secs == 0 {
        return Ok(());
    }
    let interval = Duration::from_secs(interval_secs);
    let started = Instant::now();
    loop {
        sleep(interval).await;
        let elapsed = started.elapsed().as_secs_f64();
        let s = stats.snapshot();
        info!(
            "in: {} B / {} frames, out: {} B / {} frames, discarded: {} B, \
             checksum errors: {}, rate: {:.1} KiB/s",
            s.bytes_produced,
            s.frames_produced,
            s.bytes_consumed,
            s.frames_consumed,
            s.bytes_discarded,
            s.checksum_errors,
            s.bytes_consumed as f64 / elapsed / 1024.0
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::source::RandomSource;

    fn quick_traffic() -> TrafficConfig {
        TrafficConfig {
            min_payload: 16,
            max_payload: 48,
            poll_interval_us: 50,
            report_interval_secs: 0,
            max_frames: None,
            duration_secs: None,
        }
    }

    #[tokio::test]
    async fn bounded_run_completes_cleanly() {
        let mut cfg = Config::default();
        cfg.buffer.capacity = 64;
        cfg.traffic = quick_traffic();
        cfg.traffic.max_frames = Some(200);
        cfg.source.seed = Some(7);

        let source = Arc::new(RandomSource::new(Prng::from_seed(9)));
        let stop = Arc::new(AtomicBool::new(false));
        let report = run(&cfg, source, stop).await.unwrap();

        assert_eq!(report.frames_produced, 200);
        assert_eq!(report.frames_consumed, 200);
        assert_eq!(report.bytes_produced, report.bytes_consumed);
        assert_eq!(report.bytes_discarded, 0);
        assert_eq!(report.checksum_errors, 0);
    }

    #[tokio::test]
    async fn frames_larger_than_the_buffer_still_flow() {
        let mut cfg = Config::default();
        cfg.buffer.capacity = 16;
        cfg.traffic = quick_traffic();
        cfg.traffic.min_payload = 20;
        cfg.traffic.max_payload = 40;
        cfg.traffic.max_frames = Some(50);
        cfg.source.seed = Some(3);

        let source = Arc::new(RandomSource::new(Prng::from_seed(4)));
        let stop = Arc::new(AtomicBool::new(false));
        let report = run(&cfg, source, stop).await.unwrap();

        assert_eq!(report.frames_produced, 50);
        assert_eq!(report.frames_consumed, 50);
        assert_eq!(report.checksum_errors, 0);
    }

    #[tokio::test]
    async fn consumer_resyncs_past_garbage() {
        let (mut tx, rx) = RingBuffer::with_capacity(256, 1).unwrap().split();
        // No sync pair in the garbage prefix.
        assert_eq!(tx.write(&[0x11, 0x22, 0x33]), 3);
        let mut frame_bytes = Vec::new();
        frame::encode_frame(b"hello world", &mut frame_bytes);
        assert_eq!(tx.write(&frame_bytes), frame_bytes.len());

        let stats = Arc::new(Stats::default());
        let stop = Arc::new(AtomicBool::new(false));
        let producer_done = Arc::new(AtomicBool::new(true));
        consumer_loop(
            rx,
            quick_traffic(),
            Arc::clone(&stats),
            stop,
            producer_done,
        )
        .await
        .unwrap();

        let report = stats.snapshot();
        assert_eq!(report.frames_consumed, 1);
        assert_eq!(report.bytes_discarded, 3);
        assert_eq!(report.checksum_errors, 0);
    }

    #[tokio::test]
    async fn corrupted_payload_is_counted_not_fatal() {
        let (mut tx, rx) = RingBuffer::with_capacity(256, 1).unwrap().split();
        let mut frame_bytes = Vec::new();
        frame::encode_frame(b"intact payload", &mut frame_bytes);
        let last = frame_bytes.len() - 1;
        frame_bytes[last] ^= 0xff;
        assert_eq!(tx.write(&frame_bytes), frame_bytes.len());

        let stats = Arc::new(Stats::default());
        let stop = Arc::new(AtomicBool::new(false));
        let producer_done = Arc::new(AtomicBool::new(true));
        consumer_loop(
            rx,
            quick_traffic(),
            Arc::clone(&stats),
            stop,
            producer_done,
        )
        .await
        .unwrap();

        let report = stats.snapshot();
        assert_eq!(report.frames_consumed, 1);
        assert_eq!(report.checksum_errors, 1);
    }
}
