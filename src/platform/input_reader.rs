//! Background thread turning terminal input into messages.

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::core::input::{decode_sequence, InputEvent};
use crate::core::message::Msg;
use crate::platform::stdin_buffer::{Chunk, StdinBuffer};

#[cfg(unix)]
use crate::platform::process_terminal::{poll_readable, read_fd, RawFd};

pub const INPUT_TRACE_TARGET: &str = "tape_runtime::input";

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const READ_CHUNK: usize = 4096;

pub type SharedReader = Arc<Mutex<Box<dyn Read + Send>>>;

/// Where the reader thread pulls bytes from.
#[derive(Clone)]
pub enum ReaderSource {
    /// A terminal descriptor; polled so cancellation takes effect promptly.
    #[cfg(unix)]
    Fd(RawFd),
    /// Any byte stream. Cancellation is observed between reads.
    Stream(SharedReader),
}

pub struct InputReader {
    stop: Arc<AtomicBool>,
    done: Receiver<()>,
}

impl InputReader {
    /// Start reading. `sink` receives each decoded message and returns `false` to stop;
    /// `on_error` receives the read error that ended the thread, if any.
    pub fn spawn<S, E>(source: ReaderSource, trace: bool, sink: S, on_error: E) -> io::Result<Self>
    where
        S: FnMut(Msg) -> bool + Send + 'static,
        E: FnOnce(io::Error) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done) = bounded::<()>(0);
        let worker = ReadLoop {
            stop: Arc::clone(&stop),
            buffer: StdinBuffer::default(),
            trace,
            sink,
            _done: done_tx,
        };
        thread::Builder::new()
            .name("tape-input".to_string())
            .spawn(move || worker.run(source, on_error))?;
        Ok(Self { stop, done })
    }

    /// Ask the thread to stop. Returns `false` if it was already stopping.
    pub fn cancel(&self) -> bool {
        !self.stop.swap(true, Ordering::SeqCst)
    }

    /// Wait for the thread to exit. Returns `false` on timeout.
    pub fn wait(&self, timeout: Duration) -> bool {
        !matches!(
            self.done.recv_timeout(timeout),
            Err(RecvTimeoutError::Timeout)
        )
    }
}

impl Drop for InputReader {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct ReadLoop<S> {
    stop: Arc<AtomicBool>,
    buffer: StdinBuffer,
    trace: bool,
    sink: S,
    _done: Sender<()>,
}

impl<S> ReadLoop<S>
where
    S: FnMut(Msg) -> bool,
{
    fn run<E>(mut self, source: ReaderSource, on_error: E)
    where
        E: FnOnce(io::Error),
    {
        let result = match source {
            #[cfg(unix)]
            ReaderSource::Fd(fd) => self.run_fd(fd),
            ReaderSource::Stream(reader) => self.run_stream(&reader),
        };
        if let Err(err) = result {
            if !self.stopped() {
                on_error(err);
            }
        }
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    #[cfg(unix)]
    fn run_fd(&mut self, fd: RawFd) -> io::Result<()> {
        let mut bytes = [0u8; READ_CHUNK];
        while !self.stopped() {
            let timeout = self.buffer.poll_timeout(Instant::now(), POLL_INTERVAL);
            let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
            let mut chunks = Vec::new();
            if poll_readable(fd, timeout_ms)? {
                if self.stopped() {
                    break;
                }
                let n = read_fd(fd, &mut bytes)?;
                if n == 0 {
                    let rest = self.buffer.flush();
                    self.dispatch(rest);
                    break;
                }
                chunks = self.buffer.push(&bytes[..n], Instant::now());
            }
            chunks.extend(self.buffer.flush_due(Instant::now()));
            if !self.dispatch(chunks) {
                break;
            }
        }
        Ok(())
    }

    fn run_stream(&mut self, reader: &SharedReader) -> io::Result<()> {
        let mut bytes = [0u8; READ_CHUNK];
        while !self.stopped() {
            let n = {
                let mut reader = match reader.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                match reader.read(&mut bytes) {
                    Ok(n) => n,
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => return Err(err),
                }
            };
            if self.stopped() {
                break;
            }
            if n == 0 {
                let rest = self.buffer.flush();
                self.dispatch(rest);
                break;
            }
            let mut chunks = self.buffer.push(&bytes[..n], Instant::now());
            chunks.extend(self.buffer.flush_due(Instant::now()));
            if !self.dispatch(chunks) {
                break;
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, chunks: Vec<Chunk>) -> bool {
        for chunk in chunks {
            let msg = match chunk {
                Chunk::Sequence(seq) => {
                    if self.trace {
                        tracing::debug!(target: INPUT_TRACE_TARGET, sequence = ?seq, "input");
                    }
                    match decode_sequence(&seq) {
                        Some(msg) => msg,
                        None => continue,
                    }
                }
                Chunk::Paste(text) => {
                    if self.trace {
                        tracing::debug!(target: INPUT_TRACE_TARGET, len = text.len(), "paste");
                    }
                    Msg::Input(InputEvent::Paste(text))
                }
            };
            if !(self.sink)(msg) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crossbeam_channel::unbounded;

    use super::{InputReader, ReaderSource, SharedReader};
    use crate::core::input::{InputEvent, KeyCode};
    use crate::core::message::Msg;

    fn stream(bytes: &[u8]) -> ReaderSource {
        let reader: SharedReader = Arc::new(Mutex::new(Box::new(Cursor::new(bytes.to_vec()))));
        ReaderSource::Stream(reader)
    }

    #[test]
    fn stream_input_is_decoded_in_order() {
        let (tx, rx) = unbounded();
        let reader = InputReader::spawn(
            stream(b"a\x1b[B\x1b[200~pasted\x1b[201~"),
            false,
            move |msg| tx.send(msg).is_ok(),
            |err| panic!("unexpected read error: {err}"),
        )
        .expect("spawn reader");
        assert!(reader.wait(Duration::from_secs(2)), "reader should stop at EOF");

        let msgs: Vec<Msg> = rx.try_iter().collect();
        assert_eq!(msgs.len(), 3);
        match msgs[0].as_input() {
            Some(InputEvent::Key(key)) => assert_eq!(key.code, KeyCode::Char('a')),
            other => panic!("unexpected {other:?}"),
        }
        match msgs[1].as_input() {
            Some(InputEvent::Key(key)) => assert_eq!(key.code, KeyCode::Down),
            other => panic!("unexpected {other:?}"),
        }
        match msgs[2].as_input() {
            Some(InputEvent::Paste(text)) => assert_eq!(text, "pasted"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn sink_refusal_stops_reader() {
        let (tx, rx) = unbounded();
        let reader = InputReader::spawn(
            stream(b"abc"),
            false,
            move |msg| {
                let _ = tx.send(msg);
                false
            },
            |_| {},
        )
        .expect("spawn reader");
        assert!(reader.wait(Duration::from_secs(2)));
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn cancel_stops_polling_reader() {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let reader = InputReader::spawn(ReaderSource::Fd(fds[0]), false, |_| true, |_| {})
            .expect("spawn reader");
        assert!(!reader.wait(Duration::from_millis(20)));
        assert!(reader.cancel());
        assert!(!reader.cancel());
        assert!(reader.wait(Duration::from_secs(1)));
        unsafe {
            libc::close(fds[0]);
            libc::close(fds[1]);
        }
    }
}
