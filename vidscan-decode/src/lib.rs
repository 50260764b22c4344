//! vidscan decode - parallel frame pipeline over an external decoder
//!
//! One producer thread reads raw frames from ffmpeg's stdout into pooled
//! buffers and pushes them through a bounded queue; a pool of worker threads
//! pops them and runs a user callback per frame.
//!
//! Properties held on every run:
//! - At most `queue_capacity` decoded frames wait ahead of the workers
//! - Every enqueued frame reaches exactly one worker exactly once
//! - Every rented buffer goes back to its pool, on success, error or panic
//! - Cancellation terminates the decoder's whole process tree
//!
//! ```no_run
//! use std::path::Path;
//! use vidscan_decode::{scan_file, CancelToken, DecodeOptions, FrameResults, PipelineConfig};
//!
//! let results = FrameResults::new();
//! let summary = scan_file(
//!     &PipelineConfig::from_env(),
//!     Path::new("movie.mkv"),
//!     &DecodeOptions::default(),
//!     &CancelToken::new(),
//!     |frame, _worker| {
//!         results.insert(frame.index, frame.len());
//!         Ok(())
//!     },
//! )?;
//! println!("{} frames", summary.decode.frames);
//! # Ok::<(), vidscan_decode::Error>(())
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod frame_pool;
pub mod frame_queue;
pub mod pipeline;
pub mod preflight;
pub mod probe;
pub mod process;
pub mod rational;
pub mod results;
pub mod types;
pub mod workers;

pub use cancel::CancelToken;
pub use config::{DecodeOptions, PipelineConfig, DEFAULT_QUEUE_CAPACITY};
pub use error::{Error, Result};
pub use frame_pool::{FrameBuffer, FramePool, PoolStats};
pub use frame_queue::{FrameQueue, PushError};
pub use pipeline::{frame_timestamp, DecodeOutcome, DecodePipeline, DecodeSummary};
pub use preflight::preflight;
pub use probe::probe;
pub use results::FrameResults;
pub use types::{FrameGeometry, PixelLayout, PooledFrame, VideoInfo};
pub use workers::{default_worker_count, run_workers, FrameFailure, WorkerReport};

pub use vidscan_color::{ColorRange, ColorStandard, RgbaImage};

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

/// Everything a finished scan reports
#[derive(Debug, Clone)]
pub struct ScanSummary {
    pub info: VideoInfo,
    pub geometry: FrameGeometry,
    pub decode: DecodeSummary,
    pub workers: WorkerReport,
    pub pool: PoolStats,
    /// Deepest the frame queue got
    pub queue_high_water: usize,
}

/// Probe `path`, decode it, and run `callback` on every frame across the
/// configured number of workers.
///
/// Blocks until all frames are processed or `cancel` fires. A cancelled run
/// still returns `Ok` with [`DecodeOutcome::Cancelled`].
pub fn scan_file<F>(
    config: &PipelineConfig,
    path: &Path,
    options: &DecodeOptions,
    cancel: &CancelToken,
    callback: F,
) -> Result<ScanSummary>
where
    F: Fn(&PooledFrame, usize) -> anyhow::Result<()> + Sync,
{
    let info = probe(config, path)?;
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let pool = FramePool::new();
    let queue = Arc::new(FrameQueue::new(config.queue_capacity));
    let pipeline = DecodePipeline::start(
        config,
        path,
        &info,
        options,
        Arc::clone(&queue),
        Arc::clone(&pool),
        cancel.clone(),
    )?;

    drive(info, pipeline, &queue, &pool, config.worker_count(), callback)
}

/// Like [`scan_file`], with a caller-built decoder command that writes raw
/// frames of `geometry` to stdout. Probe and preflight are skipped.
pub fn run_with_command<F>(
    config: &PipelineConfig,
    command: Command,
    geometry: FrameGeometry,
    fps: f64,
    cancel: &CancelToken,
    callback: F,
) -> Result<ScanSummary>
where
    F: Fn(&PooledFrame, usize) -> anyhow::Result<()> + Sync,
{
    let info = VideoInfo::new(geometry.width, geometry.height, Some(fps));
    let pool = FramePool::new();
    let queue = Arc::new(FrameQueue::new(config.queue_capacity));
    let pipeline = DecodePipeline::spawn(
        command,
        geometry,
        info.fps,
        Arc::clone(&queue),
        Arc::clone(&pool),
        cancel.clone(),
    )?;

    drive(info, pipeline, &queue, &pool, config.worker_count(), callback)
}

fn drive<F>(
    info: VideoInfo,
    pipeline: DecodePipeline,
    queue: &FrameQueue,
    pool: &FramePool,
    workers: usize,
    callback: F,
) -> Result<ScanSummary>
where
    F: Fn(&PooledFrame, usize) -> anyhow::Result<()> + Sync,
{
    let geometry = pipeline.geometry();

    // Workers return once the producer closes the queue and it drains
    let report = run_workers(queue, workers, callback);
    let decode = pipeline.join()?;

    let pool = pool.stats();
    if pool.outstanding != 0 {
        log::warn!("{} frame buffers still outstanding after run", pool.outstanding);
    }

    Ok(ScanSummary {
        info,
        geometry,
        decode,
        workers: report,
        pool,
        queue_high_water: queue.high_water(),
    })
}
