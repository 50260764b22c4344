//! Decode pipeline (producer side)
//!
//! Runs the external decoder, slices its raw output into fixed-size frames held
//! in pooled buffers, and feeds them into the bounded [`FrameQueue`].
//!
//! Threads per run:
//! - `vidscan-producer`: blocking reads from the decoder's stdout, pushes frames
//! - `vidscan-stderr`: drains the decoder's stderr for the life of the process
//! - `vidscan-reaper`: kills the decoder's process tree when cancelled, which
//!   also unblocks any in-flight read
//!
//! The queue is closed exactly once, by the producer, on every exit path.

use crate::cancel::CancelToken;
use crate::config::{DecodeOptions, PipelineConfig};
use crate::error::{Error, Result};
use crate::frame_pool::FramePool;
use crate::frame_queue::{FrameQueue, PushError};
use crate::preflight::preflight;
use crate::process::{decode_args, kill_tree, spawn_in_group, StderrDrain};
use crate::types::{FrameGeometry, PooledFrame, VideoInfo};
use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Rate used for timestamps when the caller passes a non-positive fps
const TIMESTAMP_FALLBACK_FPS: f64 = 24.0;

/// Presentation time of frame `index` at a constant `fps`
pub fn frame_timestamp(index: u64, fps: f64) -> f64 {
    let fps = if fps > 0.0 { fps } else { TIMESTAMP_FALLBACK_FPS };
    index as f64 / fps
}

/// How the producer stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// Decoder reached end of stream
    Completed,
    /// Stopped early through the cancellation token
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct DecodeSummary {
    /// Frames enqueued
    pub frames: u64,
    pub outcome: DecodeOutcome,
    /// Decoder exit status, when it could be collected
    pub exit: Option<ExitStatus>,
    /// Whether the decoder process tree was forcibly terminated
    pub terminated: bool,
}

/// Handle to a running decode producer
pub struct DecodePipeline {
    geometry: FrameGeometry,
    pid: u32,
    cancel: CancelToken,
    handle: Option<JoinHandle<Result<DecodeSummary>>>,
}

impl DecodePipeline {
    /// Preflight the output size, then launch the decoder for `path`
    pub fn start(
        config: &PipelineConfig,
        path: &Path,
        info: &VideoInfo,
        options: &DecodeOptions,
        queue: Arc<FrameQueue>,
        pool: Arc<FramePool>,
        cancel: CancelToken,
    ) -> Result<Self> {
        let (width, height) = preflight(config, path, options.scale.as_deref())?;
        if (width, height) != (info.width, info.height) {
            log::info!(
                "output size {}x{} differs from source {}x{}",
                width,
                height,
                info.width,
                info.height
            );
        }
        let geometry = FrameGeometry::new(width, height, config.output);

        let mut command = Command::new(&config.ffmpeg_path);
        command.args(decode_args(path, config.output, options, config.hwaccel));

        Self::spawn(command, geometry, info.fps, queue, pool, cancel)
    }

    /// Launch `command` as the decoder.
    ///
    /// The command must write raw frames of `geometry` to stdout. Its stdio
    /// handles are overridden.
    pub fn spawn(
        mut command: Command,
        geometry: FrameGeometry,
        fps: f64,
        queue: Arc<FrameQueue>,
        pool: Arc<FramePool>,
        cancel: CancelToken,
    ) -> Result<Self> {
        command.stdout(Stdio::piped());
        Self::launch(command, geometry, fps, queue, pool, cancel, |child| {
            child
                .stdout
                .take()
                .ok_or_else(|| io::Error::other("decoder stdout not captured"))
        })
    }

    /// Launch `command` but read frames from `reader` in place of its stdout
    #[cfg(test)]
    fn spawn_with_reader<R>(
        mut command: Command,
        reader: R,
        geometry: FrameGeometry,
        fps: f64,
        queue: Arc<FrameQueue>,
        pool: Arc<FramePool>,
        cancel: CancelToken,
    ) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        command.stdout(Stdio::null());
        Self::launch(command, geometry, fps, queue, pool, cancel, move |_| Ok(reader))
    }

    fn launch<R, F>(
        mut command: Command,
        geometry: FrameGeometry,
        fps: f64,
        queue: Arc<FrameQueue>,
        pool: Arc<FramePool>,
        cancel: CancelToken,
        frames_from: F,
    ) -> Result<Self>
    where
        R: Read + Send + 'static,
        F: FnOnce(&mut Child) -> io::Result<R>,
    {
        if geometry.frame_size() == 0 {
            queue.close();
            return Err(Error::EmptyFrameGeometry {
                width: geometry.width,
                height: geometry.height,
                layout: geometry.layout.pix_fmt(),
            });
        }

        command.stdin(Stdio::null()).stderr(Stdio::piped());

        log::info!(
            "starting decoder {:?}: {}x{} {} ({} bytes/frame)",
            command.get_program(),
            geometry.width,
            geometry.height,
            geometry.layout.pix_fmt(),
            geometry.frame_size()
        );

        let producer = Producer::prepare(
            command,
            geometry,
            fps,
            queue,
            pool,
            cancel.clone(),
            frames_from,
        )?;
        let pid = producer.child.id();

        // The producer is handed over only once its thread exists, so a
        // failed spawn can still shut the decoder down here
        let (handoff, inbox) = channel::bounded::<Producer<R>>(1);
        let spawned = thread::Builder::new()
            .name("vidscan-producer".to_string())
            .spawn(move || match inbox.recv() {
                Ok(producer) => producer.run(),
                Err(_) => Err(Error::Io(io::Error::other("decode producer never started"))),
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                producer.abort();
                return Err(e.into());
            }
        };
        if let Err(channel::SendError(producer)) = handoff.send(producer) {
            producer.abort();
            let _ = handle.join();
            return Err(Error::Io(io::Error::other("decode producer exited early")));
        }

        Ok(Self {
            geometry,
            pid,
            cancel,
            handle: Some(handle),
        })
    }

    /// Output geometry of every frame this pipeline produces
    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    /// Decoder process id
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Wait for the producer to finish
    pub fn join(mut self) -> Result<DecodeSummary> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| Error::Io(io::Error::other("decode producer panicked")))?,
            None => Err(Error::Io(io::Error::other("decode producer already joined"))),
        }
    }
}

impl Drop for DecodePipeline {
    /// Dropping an unjoined pipeline cancels its run and waits for shutdown
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.cancel.cancel();
            let _ = handle.join();
        }
    }
}

/// Waits for cancellation or producer completion, whichever comes first.
///
/// Returns true if it terminated the decoder.
fn spawn_reaper(
    pid: u32,
    cancel: CancelToken,
    done: Receiver<()>,
) -> io::Result<JoinHandle<bool>> {
    thread::Builder::new()
        .name("vidscan-reaper".to_string())
        .spawn(move || {
            select! {
                recv(cancel.signal()) -> _ => {
                    log::info!("cancelled, terminating decoder (pid {})", pid);
                    if let Err(e) = kill_tree(pid) {
                        log::warn!("failed to terminate decoder (pid {}): {}", pid, e);
                    }
                    true
                }
                recv(done) -> _ => false,
            }
        })
}

/// Read until `buf` is full or the stream ends. Returns bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

struct Producer<R> {
    child: Child,
    stdout: R,
    drain: StderrDrain,
    reaper: Option<JoinHandle<bool>>,
    done_tx: Option<Sender<()>>,
    geometry: FrameGeometry,
    fps: f64,
    queue: Arc<FrameQueue>,
    pool: Arc<FramePool>,
    cancel: CancelToken,
}

impl<R: Read> Producer<R> {
    /// Spawn the decoder with its stderr drain and reaper.
    ///
    /// On failure the decoder is terminated and the queue closed.
    fn prepare<F>(
        command: Command,
        geometry: FrameGeometry,
        fps: f64,
        queue: Arc<FrameQueue>,
        pool: Arc<FramePool>,
        cancel: CancelToken,
        frames_from: F,
    ) -> Result<Self>
    where
        F: FnOnce(&mut Child) -> io::Result<R>,
    {
        let mut child = match spawn_in_group(command) {
            Ok(child) => child,
            Err(e) => {
                queue.close();
                return Err(e);
            }
        };
        let pid = child.id();

        let started = (|| -> io::Result<_> {
            let stdout = frames_from(&mut child)?;
            let stderr = child
                .stderr
                .take()
                .ok_or_else(|| io::Error::other("decoder stderr not captured"))?;
            let drain = StderrDrain::spawn(stderr)?;
            let (done_tx, done_rx) = channel::bounded::<()>(0);
            let reaper = spawn_reaper(pid, cancel.clone(), done_rx)?;
            Ok((stdout, drain, done_tx, reaper))
        })();

        match started {
            Ok((stdout, drain, done_tx, reaper)) => Ok(Self {
                child,
                stdout,
                drain,
                reaper: Some(reaper),
                done_tx: Some(done_tx),
                geometry,
                fps,
                queue,
                pool,
                cancel,
            }),
            Err(e) => {
                queue.close();
                if let Err(e) = kill_tree(pid) {
                    log::warn!("failed to terminate decoder (pid {}): {}", pid, e);
                }
                let _ = child.wait();
                Err(e.into())
            }
        }
    }

    fn run(mut self) -> Result<DecodeSummary> {
        let mut frames = 0u64;
        let result = self.read_loop(&mut frames);
        self.queue.close();

        let forced = !matches!(result, Ok(DecodeOutcome::Completed));
        let (terminated, exit, stderr_tail) = self.shutdown(forced);

        match result {
            Ok(outcome) => {
                if outcome == DecodeOutcome::Completed {
                    if let Some(status) = exit.filter(|s| !s.success()) {
                        log::warn!("decoder exited with {}: {}", status, stderr_tail);
                    }
                }
                log::info!("decode {:?} after {} frames", outcome, frames);
                Ok(DecodeSummary {
                    frames,
                    outcome,
                    exit,
                    terminated,
                })
            }
            Err(source) => {
                log::error!("decoder pipe read failed after {} frames: {}", frames, source);
                Err(Error::PipeReadFailure {
                    source,
                    stderr_tail,
                })
            }
        }
    }

    /// Stop a producer that never ran
    fn abort(self) {
        self.queue.close();
        let _ = self.shutdown(true);
    }

    /// Terminate (when `forced`) and reap the decoder.
    ///
    /// Returns whether it was terminated, its exit status and the stderr tail.
    fn shutdown(mut self, forced: bool) -> (bool, Option<ExitStatus>, String) {
        let pid = self.child.id();
        if forced {
            if let Err(e) = kill_tree(pid) {
                log::warn!("failed to terminate decoder (pid {}): {}", pid, e);
            }
        }

        // The reaper must be gone before the child is reaped and its pid freed
        drop(self.done_tx.take());
        let reaped = self
            .reaper
            .take()
            .map(|reaper| reaper.join().unwrap_or(false))
            .unwrap_or(false);

        drop(self.stdout);
        let exit = match self.child.wait() {
            Ok(status) => Some(status),
            Err(e) => {
                log::warn!("failed to wait for decoder: {}", e);
                None
            }
        };
        (forced || reaped, exit, self.drain.finish())
    }

    fn read_loop(&mut self, frames: &mut u64) -> io::Result<DecodeOutcome> {
        let frame_size = self.geometry.frame_size();

        loop {
            if self.cancel.is_cancelled() {
                return Ok(DecodeOutcome::Cancelled);
            }

            let mut buffer = self.pool.rent(frame_size);
            let filled = match read_full(&mut self.stdout, &mut buffer) {
                Ok(filled) => filled,
                // A killed decoder can surface as a read error
                Err(_) if self.cancel.is_cancelled() => return Ok(DecodeOutcome::Cancelled),
                Err(e) => return Err(e),
            };

            if self.cancel.is_cancelled() {
                return Ok(DecodeOutcome::Cancelled);
            }
            if filled < frame_size {
                if filled > 0 {
                    log::warn!(
                        "partial frame at end of stream ({}/{} bytes), discarding",
                        filled,
                        frame_size
                    );
                }
                self.pool.release(buffer);
                return Ok(DecodeOutcome::Completed);
            }

            let index = *frames;
            let frame = PooledFrame::new(
                index,
                self.geometry,
                frame_timestamp(index, self.fps),
                buffer,
            );
            match self.queue.push(frame, &self.cancel) {
                Ok(()) => {
                    *frames += 1;
                    log::trace!("enqueued frame {}", index);
                }
                Err(PushError::Cancelled(frame)) => {
                    frame.release();
                    return Ok(DecodeOutcome::Cancelled);
                }
                Err(PushError::Closed(frame)) => {
                    log::debug!("frame queue closed by consumer side, stopping decode");
                    frame.release();
                    return Ok(DecodeOutcome::Cancelled);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelLayout;
    use std::time::{Duration, Instant};

    /// Yields `remaining` zero bytes, then fails after `delay`
    struct FailingReader {
        remaining: usize,
        delay: Duration,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                thread::sleep(self.delay);
                return Err(io::Error::new(io::ErrorKind::InvalidData, "corrupt stream"));
            }
            let n = buf.len().min(self.remaining);
            buf[..n].fill(0);
            self.remaining -= n;
            Ok(n)
        }
    }

    fn shell(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.args(["-c", script]);
        command
    }

    #[test]
    fn test_frame_timestamps() {
        assert_eq!(frame_timestamp(0, 25.0), 0.0);
        assert_eq!(frame_timestamp(50, 25.0), 2.0);
        assert_eq!(frame_timestamp(48, 0.0), 2.0);
        assert_eq!(frame_timestamp(48, -1.0), 2.0);
    }

    #[test]
    fn test_timestamps_evenly_spaced() {
        let fps = 24000.0 / 1001.0;
        let stamps: Vec<f64> = (0..100).map(|i| frame_timestamp(i, fps)).collect();
        for pair in stamps.windows(2) {
            assert!(pair[1] >= pair[0]);
            assert!((pair[1] - pair[0] - 1.0 / fps).abs() < 1e-9);
        }
    }

    #[test]
    fn test_read_full_handles_short_reads() {
        struct Trickle(Vec<u8>);
        impl Read for Trickle {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.0.is_empty() || buf.is_empty() {
                    return Ok(0);
                }
                buf[0] = self.0.remove(0);
                Ok(1)
            }
        }

        let mut reader = Trickle((0..10).collect());
        let mut buf = [0u8; 4];
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 4);
        assert_eq!(buf, [0, 1, 2, 3]);
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 4);
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 2);
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_read_full_propagates_errors() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            }
        }
        let mut buf = [0u8; 4];
        let err = read_full(&mut Broken, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_empty_geometry_rejected() {
        let queue = Arc::new(FrameQueue::new(2));
        for geometry in [
            FrameGeometry::new(0, 0, PixelLayout::Rgba),
            FrameGeometry::new(0, 480, PixelLayout::Yuv420p),
        ] {
            let result = DecodePipeline::spawn(
                Command::new("true"),
                geometry,
                25.0,
                Arc::clone(&queue),
                FramePool::new(),
                CancelToken::new(),
            );
            assert!(matches!(result, Err(Error::EmptyFrameGeometry { .. })));
        }
        assert!(queue.is_closed());
        assert!(queue.pop().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_read_failure_terminates_decoder() {
        let geometry = FrameGeometry::new(4, 4, PixelLayout::Rgba);
        let pool = FramePool::new();
        let queue = Arc::new(FrameQueue::new(4));
        let reader = FailingReader {
            remaining: geometry.frame_size() * 2,
            delay: Duration::from_millis(300),
        };
        let started = Instant::now();

        let pipeline = DecodePipeline::spawn_with_reader(
            shell("echo 'corrupt packet' >&2; sleep 30"),
            reader,
            geometry,
            25.0,
            Arc::clone(&queue),
            Arc::clone(&pool),
            CancelToken::new(),
        )
        .unwrap();

        let popped: Vec<u64> = std::iter::from_fn(|| queue.pop()).map(|f| f.index).collect();
        let err = pipeline.join().unwrap_err();

        // Reaping a decoder that was left running would take the full sleep
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(popped, vec![0, 1]);
        assert!(queue.is_closed());
        match err {
            Error::PipeReadFailure {
                source,
                stderr_tail,
            } => {
                assert_eq!(source.kind(), io::ErrorKind::InvalidData);
                assert!(stderr_tail.contains("corrupt packet"), "{}", stderr_tail);
            }
            other => panic!("unexpected error: {}", other),
        }

        let stats = pool.stats();
        assert_eq!(stats.outstanding, 0);
        assert_eq!(stats.rented, stats.returned);
    }

    #[cfg(unix)]
    #[test]
    fn test_forced_shutdown_reaps_decoder() {
        let geometry = FrameGeometry::new(4, 4, PixelLayout::Rgba);
        let queue = Arc::new(FrameQueue::new(2));
        let mut command = shell("sleep 30");
        command.stdout(Stdio::piped()).stderr(Stdio::piped());
        let started = Instant::now();

        let producer = Producer::prepare(
            command,
            geometry,
            25.0,
            Arc::clone(&queue),
            FramePool::new(),
            CancelToken::new(),
            |child| {
                child
                    .stdout
                    .take()
                    .ok_or_else(|| io::Error::other("no stdout"))
            },
        )
        .unwrap();
        let (terminated, exit, _) = producer.shutdown(true);

        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(terminated);
        assert!(!exit.unwrap().success());
    }

    #[cfg(unix)]
    #[test]
    fn test_abort_closes_queue() {
        let geometry = FrameGeometry::new(4, 4, PixelLayout::Rgba);
        let queue = Arc::new(FrameQueue::new(2));
        let mut command = shell("sleep 30");
        command.stderr(Stdio::piped());
        let started = Instant::now();

        let producer = Producer::prepare(
            command,
            geometry,
            25.0,
            Arc::clone(&queue),
            FramePool::new(),
            CancelToken::new(),
            |_| Ok(io::empty()),
        )
        .unwrap();
        assert!(!queue.is_closed());

        producer.abort();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(queue.is_closed());
    }
}
