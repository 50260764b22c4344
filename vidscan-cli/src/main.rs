//! vidscan - per-frame color and luminance scan of a video file
//!
//! Decodes the input through ffmpeg, samples every frame on a worker pool and
//! prints one CSV line per frame in index order:
//!
//! ```text
//! index,timestamp,r,g,b[,max_nits,avg_nits]
//! ```
//!
//! Ctrl-C stops decoding; frames already processed are still printed.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use vidscan_color::{average_color, luminance_stats, LuminanceStats};
use vidscan_decode::{
    scan_file, CancelToken, ColorRange, ColorStandard, DecodeOptions, DecodeOutcome,
    FrameResults, PipelineConfig, PixelLayout, DEFAULT_QUEUE_CAPACITY,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Scan video frames for average color and HDR luminance")]
struct Args {
    /// Input video file
    input: PathBuf,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Scale filter expression applied before sampling, e.g. 640:-2
    #[arg(long)]
    scale: Option<String>,

    /// Decode keyframes only
    #[arg(long)]
    keyframes_only: bool,

    /// Worker threads (default: available cores minus 2)
    #[arg(long, env = "VIDSCAN_WORKERS")]
    workers: Option<usize>,

    /// Decoded frames buffered ahead of the workers
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue: usize,

    /// Request hardware-accelerated decoding
    #[arg(long)]
    hwaccel: bool,

    /// Raw layout requested from the decoder: rgba, yuv420p or yuv420p10le
    #[arg(long, default_value = "rgba")]
    layout: PixelLayout,

    /// Treat samples as PQ-encoded and report luminance in nits
    #[arg(long)]
    hdr: bool,

    /// Planar input uses limited (TV) range instead of full range
    #[arg(long)]
    limited_range: bool,

    /// Planar input uses BT.709 coefficients instead of BT.601
    #[arg(long)]
    bt709: bool,

    /// Sample every Nth pixel in both directions
    #[arg(long, default_value_t = 4)]
    step: u32,
}

#[derive(Debug, Clone, Copy)]
struct FrameSample {
    timestamp: f64,
    color: [f64; 3],
    luminance: Option<LuminanceStats>,
}

impl Args {
    fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::from_env()
            .with_queue_capacity(self.queue)
            .with_hwaccel(self.hwaccel)
            .with_output(self.layout);
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        config
    }

    fn options(&self) -> DecodeOptions {
        DecodeOptions {
            max_frames: self.max_frames,
            scale: self.scale.clone(),
            keyframes_only: self.keyframes_only,
        }
    }

    fn range(&self) -> ColorRange {
        if self.limited_range {
            ColorRange::Limited
        } else {
            ColorRange::Full
        }
    }

    fn standard(&self) -> ColorStandard {
        if self.bt709 {
            ColorStandard::Bt709
        } else {
            ColorStandard::Bt601
        }
    }
}

fn write_results(results: FrameResults<FrameSample>) -> io::Result<usize> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let rows = results.into_sorted();

    for (index, sample) in &rows {
        let [r, g, b] = sample.color;
        write!(
            out,
            "{},{:.6},{:.3},{:.3},{:.3}",
            index, sample.timestamp, r, g, b
        )?;
        if let Some(nits) = sample.luminance {
            write!(out, ",{:.3},{:.3}", nits.max_nits, nits.avg_nits)?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(rows.len())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            log::warn!("interrupt received, stopping decode");
            cancel.cancel();
        })
        .context("failed to install Ctrl-C handler")?;
    }

    let config = args.config();
    let (range, standard, step, hdr) = (args.range(), args.standard(), args.step, args.hdr);
    let results = FrameResults::new();

    let summary = scan_file(
        &config,
        &args.input,
        &args.options(),
        &cancel,
        |frame, _worker| {
            let image = frame
                .to_rgba(range, standard)
                .with_context(|| format!("converting frame {}", frame.index))?;
            results.insert(
                frame.index,
                FrameSample {
                    timestamp: frame.timestamp,
                    color: average_color(&image, step),
                    luminance: hdr.then(|| luminance_stats(&image, step)),
                },
            );
            Ok(())
        },
    )
    .with_context(|| format!("scan of {} failed", args.input.display()))?;

    let printed = write_results(results).context("failed to write results")?;

    if summary.decode.outcome == DecodeOutcome::Cancelled {
        log::warn!("scan cancelled after {} frames", summary.decode.frames);
    }
    log::info!(
        "{} frames decoded, {} printed, {} failed ({} workers, queue peak {}/{})",
        summary.decode.frames,
        printed,
        summary.workers.failures.len(),
        summary.workers.per_worker.len(),
        summary.queue_high_water,
        config.queue_capacity
    );
    for failure in &summary.workers.failures {
        log::debug!(
            "frame {} (worker {}): {}",
            failure.index,
            failure.worker,
            failure.message
        );
    }

    Ok(())
}
