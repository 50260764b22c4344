//! Error taxonomy for probing, preflight and decoding

use std::io;
use thiserror::Error;
use vidscan_color::ConvertError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Prober exited non-zero or emitted output without the expected fields
    #[error("probe failed: {message}")]
    ProbeFailure { message: String },

    /// Preflight decode produced no diagnostic output
    #[error("preflight failed: {message}")]
    PreflightFailure { message: String },

    /// Preflight output did not contain an `s:<W>x<H>` size
    #[error("could not find output size in preflight output: {output}")]
    PreflightParseFailure { output: String },

    /// Unexpected error reading the decoder's raw frame stream
    #[error("failed reading decoder output: {source}{}", tail_suffix(.stderr_tail))]
    PipeReadFailure {
        #[source]
        source: io::Error,
        stderr_tail: String,
    },

    /// External process could not be launched
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Output geometry describes frames with no bytes
    #[error("frame geometry {width}x{height} {layout} holds no pixel data")]
    EmptyFrameGeometry {
        width: u32,
        height: u32,
        layout: &'static str,
    },

    /// Run stopped through its cancellation token
    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

fn tail_suffix(tail: &str) -> String {
    if tail.is_empty() {
        String::new()
    } else {
        format!(" (decoder stderr: {})", tail)
    }
}

impl Error {
    /// Cancellation is an expected way for a run to end
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_read_failure_message() {
        let err = Error::PipeReadFailure {
            source: io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"),
            stderr_tail: "Invalid data found when processing input".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("broken pipe"));
        assert!(msg.contains("Invalid data found"));

        let err = Error::PipeReadFailure {
            source: io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"),
            stderr_tail: String::new(),
        };
        assert!(!err.to_string().contains("stderr"));
    }

    #[test]
    fn test_cancelled_is_not_failure() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::ProbeFailure {
            message: "x".into()
        }
        .is_cancelled());
    }
}
