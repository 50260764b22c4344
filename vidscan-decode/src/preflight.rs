//! Output-size preflight
//!
//! A scale filter can change output dimensions in ways that cannot be derived
//! from the probed source size, so the decoder is run for a single frame
//! through `showinfo` and the reported size is used instead.

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::process::{output_text, preflight_args};
use regex::Regex;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::OnceLock;

fn size_pattern() -> &'static Regex {
    static SIZE_RE: OnceLock<Regex> = OnceLock::new();
    SIZE_RE.get_or_init(|| Regex::new(r"s:(\d+)x(\d+)").expect("static regex is valid"))
}

/// Decode one frame and report the filtered output `(width, height)`
pub fn preflight(config: &PipelineConfig, path: &Path, scale: Option<&str>) -> Result<(u32, u32)> {
    let output = Command::new(&config.ffmpeg_path)
        .args(preflight_args(path, scale))
        .stdin(Stdio::null())
        .output()
        .map_err(|source| Error::Spawn {
            program: config.ffmpeg_path.display().to_string(),
            source,
        })?;

    let text = output_text(&output);
    if text.trim().is_empty() {
        return Err(Error::PreflightFailure {
            message: format!(
                "{} produced no output (exit {})",
                config.ffmpeg_path.display(),
                output.status
            ),
        });
    }

    let (width, height) = parse_showinfo(&text)?;
    log::debug!("preflight output size {}x{}", width, height);
    Ok((width, height))
}

/// Extract the first `s:<W>x<H>` from showinfo diagnostics.
///
/// A zero dimension is rejected; such a frame has no bytes to read.
pub fn parse_showinfo(text: &str) -> Result<(u32, u32)> {
    size_pattern()
        .captures(text)
        .and_then(|caps| {
            let width: u32 = caps[1].parse().ok()?;
            let height: u32 = caps[2].parse().ok()?;
            (width > 0 && height > 0).then_some((width, height))
        })
        .ok_or_else(|| Error::PreflightParseFailure {
            output: text.trim().to_string(),
        })
}
