//! Background consumer for the transport's stderr.
//!
//! ssh keeps writing diagnostics to stderr for the whole session. If nobody
//! reads them the OS pipe fills up and ssh blocks, which stalls stdout too.
//! The drain reads to EOF on its own thread and keeps only the most recent
//! bytes so a transport-loss report can still quote what ssh said last.

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read};
use std::process::ChildStderr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use psh_core::{PshError, PshResult};
use tracing::{debug, warn};

/// Bytes of stderr retained for error reports.
pub const DEFAULT_TAIL_CAPACITY: usize = 8 * 1024;

const READ_CHUNK: usize = 4096;
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// How long a pipe read waits before rechecking for a stop request.
#[cfg(unix)]
const PIPE_POLL_MS: u16 = 50;
/// How long a stopped drain gets to notice before it is detached.
const STOP_GRACE: Duration = Duration::from_millis(500);

/// Keeps the last `capacity` bytes written to it.
#[derive(Debug)]
pub struct TailBuffer {
    buf: VecDeque<u8>,
    capacity: usize,
    total_written: u64,
}

impl TailBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
            total_written: 0,
        }
    }

    /// Append, discarding the oldest bytes once full.
    pub fn write(&mut self, data: &[u8]) {
        self.total_written += data.len() as u64;
        if self.capacity == 0 {
            return;
        }
        let data = if data.len() > self.capacity {
            &data[data.len() - self.capacity..]
        } else {
            data
        };
        let overflow = (self.buf.len() + data.len()).saturating_sub(self.capacity);
        self.buf.drain(..overflow);
        self.buf.extend(data);
    }

    /// Retained bytes, oldest first.
    pub fn contents(&self) -> Vec<u8> {
        self.buf.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes ever written, including discarded ones.
    pub fn total_written(&self) -> u64 {
        self.total_written
    }
}

/// A running drain thread.
pub struct StderrDrain {
    tail: Arc<Mutex<TailBuffer>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StderrDrain {
    /// Start draining `source` on a thread named `psh-stderr-drain`.
    pub fn spawn<R>(source: R, capacity: usize) -> PshResult<Self>
    where
        R: Read + Send + 'static,
    {
        let tail = Arc::new(Mutex::new(TailBuffer::new(capacity)));
        let stop = Arc::new(AtomicBool::new(false));
        let sink = Arc::clone(&tail);
        let stopped = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("psh-stderr-drain".into())
            .spawn(move || drain(source, &sink, &stopped))
            .map_err(|e| PshError::Other(format!("failed to start stderr drain: {e}")))?;
        Ok(Self {
            tail,
            stop,
            handle: Some(handle),
        })
    }

    /// Drain a child's stderr pipe. On unix each read first polls the pipe,
    /// so the thread can be stopped while the pipe is still open.
    pub fn spawn_pipe(stderr: ChildStderr, capacity: usize) -> PshResult<Self> {
        #[cfg(unix)]
        {
            Self::spawn(Polled(stderr), capacity)
        }
        #[cfg(not(unix))]
        {
            Self::spawn(stderr, capacity)
        }
    }

    /// Snapshot of the retained stderr bytes.
    pub fn tail(&self) -> Vec<u8> {
        self.tail
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contents()
    }

    /// Wait up to `timeout` for the thread to reach EOF. Returns whether it did.
    pub fn wait_finished(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            match self.handle.as_ref() {
                Some(handle) if !handle.is_finished() => {}
                _ => return true,
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(JOIN_POLL_INTERVAL);
        }
    }

    /// Wait for EOF and return the retained bytes.
    ///
    /// Only returns once the write end of the pipe is closed, so the
    /// transport must be dead (or its stderr otherwise closed) first.
    pub fn join(mut self) -> Vec<u8> {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("stderr drain thread panicked");
            }
        }
        self.tail()
    }

    /// Like [`join`](Self::join), but stop waiting for EOF after `timeout`.
    ///
    /// A daemonized ssh control master can inherit the stderr pipe and keep
    /// it open long after the session is gone. The thread is then told to
    /// stop and joined. Only a reader that stays blocked through
    /// [`STOP_GRACE`] is left running detached.
    pub fn join_timeout(mut self, timeout: Duration) -> Vec<u8> {
        if !self.wait_finished(timeout) {
            self.stop.store(true, Ordering::Relaxed);
            if !self.wait_finished(STOP_GRACE) {
                warn!("stderr still open after transport exit, detaching drain");
                self.handle = None;
                return self.tail();
            }
            debug!("stderr still open after transport exit, drain stopped");
        }
        self.join()
    }
}

/// A pipe whose reads give up with `WouldBlock` when nothing arrives within
/// [`PIPE_POLL_MS`].
#[cfg(unix)]
struct Polled<R>(R);

#[cfg(unix)]
impl<R: Read + std::os::fd::AsFd> Read for Polled<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        use nix::errno::Errno;
        use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

        let ready = {
            let mut fds = [PollFd::new(self.0.as_fd(), PollFlags::POLLIN)];
            poll(&mut fds, PollTimeout::from(PIPE_POLL_MS))
        };
        match ready {
            Ok(0) => Err(ErrorKind::WouldBlock.into()),
            Ok(_) => self.0.read(buf),
            Err(Errno::EINTR) => Err(ErrorKind::Interrupted.into()),
            Err(e) => Err(io::Error::from(e)),
        }
    }
}

fn drain<R: Read>(mut source: R, tail: &Mutex<TailBuffer>, stop: &AtomicBool) {
    let mut chunk = [0u8; READ_CHUNK];
    while !stop.load(Ordering::Relaxed) {
        match source.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                debug!(bytes = n, "transport stderr");
                tail.lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .write(&chunk[..n]);
            }
            Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => continue,
            Err(e) => {
                debug!(error = %e, "stderr drain stopped");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn tail_keeps_most_recent() {
        let mut tb = TailBuffer::new(5);
        tb.write(b"abc");
        assert_eq!(tb.contents(), b"abc");
        tb.write(b"defg");
        assert_eq!(tb.contents(), b"cdefg");
        assert_eq!(tb.len(), 5);
        assert_eq!(tb.total_written(), 7);
    }

    #[test]
    fn oversized_write() {
        let mut tb = TailBuffer::new(3);
        tb.write(b"0123456789");
        assert_eq!(tb.contents(), b"789");
    }

    #[test]
    fn zero_capacity_tail() {
        let mut tb = TailBuffer::new(0);
        tb.write(b"lost");
        assert!(tb.is_empty());
        assert_eq!(tb.total_written(), 4);
    }

    #[test]
    fn drain_reads_to_eof() {
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let drain = StderrDrain::spawn(Cursor::new(data.clone()), 16).unwrap();
        let tail = drain.join();
        assert_eq!(tail, &data[data.len() - 16..]);
    }

    #[test]
    fn join_timeout_stops_reader_without_eof() {
        use std::sync::atomic::AtomicUsize;

        struct Forever(Arc<AtomicUsize>);
        impl Read for Forever {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                self.0.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                Err(std::io::Error::new(ErrorKind::Interrupted, "again"))
            }
        }
        let reads = Arc::new(AtomicUsize::new(0));
        let drain = StderrDrain::spawn(Forever(Arc::clone(&reads)), 16).unwrap();
        let started = Instant::now();
        assert!(drain.join_timeout(Duration::from_millis(100)).is_empty());
        assert!(started.elapsed() < Duration::from_secs(5));

        // joined, not detached: nothing reads any more
        let after_join = reads.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(reads.load(Ordering::SeqCst), after_join);
    }

    #[cfg(unix)]
    #[test]
    fn pipe_held_open_by_another_process_is_joined() {
        use std::process::{Command, Stdio};

        let mut holder = Command::new("sh")
            .args(["-c", "echo started >&2; exec sleep 30"])
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        let stderr = holder.stderr.take().unwrap();
        let drain = StderrDrain::spawn_pipe(stderr, 64).unwrap();
        let started = Instant::now();
        let tail = drain.join_timeout(Duration::from_millis(200));
        let elapsed = started.elapsed();
        holder.kill().unwrap();
        holder.wait().unwrap();

        assert_eq!(tail, b"started\n");
        assert!(elapsed < STOP_GRACE + Duration::from_secs(1), "{elapsed:?}");
    }
}
