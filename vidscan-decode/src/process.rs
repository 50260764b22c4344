//! External process plumbing: argument shapes, process-tree control and
//! diagnostic stream draining

use crate::config::DecodeOptions;
use crate::error::{Error, Result};
use crate::types::PixelLayout;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Diagnostic lines kept for error messages
const STDERR_TAIL_LINES: usize = 32;

fn os_args<I, S>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    args.into_iter().map(Into::into).collect()
}

/// `-v error -select_streams v:0 -show_entries stream=width,height,avg_frame_rate -of json -i <path>`
pub fn ffprobe_args(path: &Path) -> Vec<OsString> {
    let mut args = os_args([
        "-v",
        "error",
        "-select_streams",
        "v:0",
        "-show_entries",
        "stream=width,height,avg_frame_rate",
        "-of",
        "json",
        "-i",
    ]);
    args.push(path.as_os_str().to_owned());
    args
}

/// One-frame decode through `showinfo` to learn the real output size
pub fn preflight_args(path: &Path, scale: Option<&str>) -> Vec<OsString> {
    let mut args = os_args(["-hide_banner", "-loglevel", "info", "-nostats", "-i"]);
    args.push(path.as_os_str().to_owned());

    let filter = match scale {
        Some(expr) => format!("scale={},showinfo", expr),
        None => "showinfo".to_string(),
    };
    args.extend(os_args(["-vf".to_string(), filter]));
    args.extend(os_args(["-frames:v", "1", "-f", "null", "-"]));
    args
}

/// Raw frame decode to `pipe:1`
pub fn decode_args(
    path: &Path,
    layout: PixelLayout,
    options: &DecodeOptions,
    hwaccel: bool,
) -> Vec<OsString> {
    let mut args = os_args(["-loglevel", "error"]);

    // Input options must precede -i
    if options.keyframes_only {
        args.extend(os_args(["-skip_frame", "nokey"]));
    }
    if hwaccel {
        args.extend(os_args(["-hwaccel", "auto"]));
    }
    args.push("-i".into());
    args.push(path.as_os_str().to_owned());

    if let Some(expr) = options.scale.as_deref() {
        args.push("-vf".into());
        args.push(format!("scale={}", expr).into());
    }
    if let Some(frames) = options.max_frames {
        args.push("-frames:v".into());
        args.push(frames.to_string().into());
    }
    args.extend(os_args([
        "-map",
        "0:v:0",
        "-vsync",
        "0",
        "-f",
        "rawvideo",
        "-pix_fmt",
        layout.pix_fmt(),
        "pipe:1",
    ]));
    args
}

fn program_name(command: &Command) -> String {
    command.get_program().to_string_lossy().into_owned()
}

/// Spawn `command` as the leader of a new process group so the whole tree
/// can be terminated together
pub fn spawn_in_group(mut command: Command) -> Result<Child> {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    command.spawn().map_err(|source| Error::Spawn {
        program: program_name(&command),
        source,
    })
}

/// Forcibly terminate a process spawned by [`spawn_in_group`] and everything
/// it started.
///
/// Must be called before the child is reaped, while its pid is still reserved.
#[cfg(unix)]
pub fn kill_tree(pid: u32) -> io::Result<()> {
    let pgid = pid as libc::pid_t;
    // SAFETY: kill(2) has no memory-safety preconditions
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        // Already gone
        return Ok(());
    }
    Err(err)
}

#[cfg(windows)]
pub fn kill_tree(pid: u32) -> io::Result<()> {
    use std::process::Stdio;

    let status = Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    if !status.success() {
        log::debug!("taskkill for pid {} exited with {}", pid, status);
    }
    Ok(())
}

/// Capture combined stdout/stderr text of a finished process
pub fn output_text(output: &std::process::Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stderr).into_owned();
    if !output.stdout.is_empty() {
        text.push_str(&String::from_utf8_lossy(&output.stdout));
    }
    text
}

/// Background reader for a child's diagnostic stream.
///
/// The decoder blocks once its stderr pipe fills, so this must run for the
/// whole lifetime of the process.
pub struct StderrDrain {
    tail: Arc<Mutex<VecDeque<String>>>,
    handle: Option<JoinHandle<()>>,
}

impl StderrDrain {
    pub fn spawn<R>(stream: R) -> io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let lines = Arc::clone(&tail);

        let handle = thread::Builder::new()
            .name("vidscan-stderr".to_string())
            .spawn(move || {
                let mut reader = BufReader::new(stream);
                let mut raw = Vec::new();
                loop {
                    raw.clear();
                    match reader.read_until(b'\n', &mut raw) {
                        Ok(0) => break,
                        Ok(_) => {
                            let line = String::from_utf8_lossy(&raw);
                            let line = line.trim();
                            if line.is_empty() {
                                continue;
                            }
                            log::debug!(target: "ffmpeg_stderr", "{}", line);

                            let mut tail = lines.lock();
                            if tail.len() == STDERR_TAIL_LINES {
                                tail.pop_front();
                            }
                            tail.push_back(line.to_string());
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            log::debug!(target: "ffmpeg_stderr", "read error: {}", e);
                            break;
                        }
                    }
                }
            })?;

        Ok(Self {
            tail,
            handle: Some(handle),
        })
    }

    /// Most recent diagnostic lines joined with `"; "`
    pub fn tail(&self) -> String {
        self.tail
            .lock()
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Wait for the stream to reach EOF and return the tail
    pub fn finish(mut self) -> String {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.tail()
    }
}
