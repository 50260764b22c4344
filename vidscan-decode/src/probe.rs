//! Stream probing through an external prober (ffprobe)

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::process::{ffprobe_args, output_text};
use crate::rational::parse_rational;
use crate::types::VideoInfo;
use serde::Deserialize;
use std::path::Path;
use std::process::{Command, Stdio};

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
}

/// Probe width, height and average frame rate of the first video stream
pub fn probe(config: &PipelineConfig, path: &Path) -> Result<VideoInfo> {
    log::debug!("probing {}", path.display());

    let output = Command::new(&config.ffprobe_path)
        .args(ffprobe_args(path))
        .stdin(Stdio::null())
        .output()
        .map_err(|source| Error::Spawn {
            program: config.ffprobe_path.display().to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(Error::ProbeFailure {
            message: format!(
                "{} exited with {}: {}",
                config.ffprobe_path.display(),
                output.status,
                output_text(&output).trim()
            ),
        });
    }

    let info = parse_probe_output(&output.stdout)?;
    log::info!(
        "probed {}: {}x{} @ {:.3} fps",
        path.display(),
        info.width,
        info.height,
        info.fps
    );
    Ok(info)
}

/// Parse the prober's JSON into [`VideoInfo`].
///
/// A missing or zero frame rate falls back to 24000/1001; missing dimensions
/// are an error.
pub fn parse_probe_output(json: &[u8]) -> Result<VideoInfo> {
    let parsed: ProbeOutput = serde_json::from_slice(json).map_err(|e| Error::ProbeFailure {
        message: format!("unparsable probe output: {}", e),
    })?;

    let stream = parsed.streams.first().ok_or_else(|| Error::ProbeFailure {
        message: "probe output has no video stream".to_string(),
    })?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => {
            return Err(Error::ProbeFailure {
                message: "probe output is missing stream width/height".to_string(),
            })
        }
    };

    let fps = stream.avg_frame_rate.as_deref().and_then(parse_rational);
    if !matches!(fps, Some(f) if f > 0.0) {
        log::warn!(
            "could not determine frame rate (got {:?}), defaulting to 24000/1001",
            stream.avg_frame_rate
        );
    }

    Ok(VideoInfo::new(width, height, fps))
}
