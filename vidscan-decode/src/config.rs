//! Run configuration

use crate::types::PixelLayout;
use std::path::PathBuf;

/// Environment variable overriding the decoder binary
pub const FFMPEG_ENV: &str = "VIDSCAN_FFMPEG";
/// Environment variable overriding the prober binary
pub const FFPROBE_ENV: &str = "VIDSCAN_FFPROBE";

pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

/// Settings shared by every run of the pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// Maximum frames decoded ahead of the workers
    pub queue_capacity: usize,
    /// Worker threads; `None` derives a count from available parallelism
    pub workers: Option<usize>,
    /// Ask the decoder for hardware acceleration (`-hwaccel auto`)
    pub hwaccel: bool,
    /// Raw pixel layout requested from the decoder
    pub output: PixelLayout,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            workers: None,
            hwaccel: false,
            output: PixelLayout::Rgba,
        }
    }
}

impl PipelineConfig {
    /// Defaults with binary locations taken from the environment when set
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(path) = std::env::var_os(FFMPEG_ENV) {
            config.ffmpeg_path = PathBuf::from(path);
        }
        if let Some(path) = std::env::var_os(FFPROBE_ENV) {
            config.ffprobe_path = PathBuf::from(path);
        }
        config
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers.max(1));
        self
    }

    pub fn with_hwaccel(mut self, enabled: bool) -> Self {
        self.hwaccel = enabled;
        self
    }

    pub fn with_output(mut self, output: PixelLayout) -> Self {
        self.output = output;
        self
    }

    /// Worker count to use for a run
    pub fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(crate::workers::default_worker_count)
    }
}

/// Per-run decode options
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    /// Stop after this many frames (`-frames:v`)
    pub max_frames: Option<u64>,
    /// Scale filter expression, e.g. `640:-2`
    pub scale: Option<String>,
    /// Decode keyframes only (`-skip_frame nokey`)
    pub keyframes_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.ffmpeg_path, PathBuf::from("ffmpeg"));
        assert_eq!(config.ffprobe_path, PathBuf::from("ffprobe"));
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.output, PixelLayout::Rgba);
        assert!(!config.hwaccel);
        assert!(config.worker_count() >= 1);
    }

    #[test]
    fn test_builders_clamp_to_one() {
        let config = PipelineConfig::default()
            .with_queue_capacity(0)
            .with_workers(0)
            .with_hwaccel(true)
            .with_output(PixelLayout::Yuv420p);
        assert_eq!(config.queue_capacity, 1);
        assert_eq!(config.worker_count(), 1);
        assert!(config.hwaccel);
        assert_eq!(config.output, PixelLayout::Yuv420p);
    }
}
