//! Fixed-rate flushing of the renderer's buffered frame.

use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Sender};

use crate::render::{lock, SharedRenderer};

/// Runs a thread body, e.g. inside a panic guard.
pub type ThreadRunner = Box<dyn FnOnce(Box<dyn FnOnce() + Send>) + Send>;

struct Running {
    stop: Sender<()>,
    thread: JoinHandle<()>,
    thread_id: ThreadId,
}

/// Flushes the renderer on a ticker. Starting a running scheduler or stopping a
/// stopped one does nothing.
#[derive(Default)]
pub struct RenderScheduler {
    running: Option<Running>,
}

pub fn frame_interval(fps: u32) -> Duration {
    Duration::from_secs(1) / fps.max(1)
}

pub fn flush(renderer: &SharedRenderer) {
    if let Err(err) = lock(renderer).flush() {
        tracing::warn!(error = %err, "render flush failed");
    }
}

impl RenderScheduler {
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn start(&mut self, renderer: SharedRenderer, fps: u32, runner: ThreadRunner) {
        if self.running.is_some() {
            return;
        }
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let interval = frame_interval(fps);
        let body: Box<dyn FnOnce() + Send> = Box::new(move || {
            let ticker = tick(interval);
            loop {
                select! {
                    recv(ticker) -> _ => flush(&renderer),
                    recv(stop_rx) -> _ => break,
                }
            }
        });
        let spawned = thread::Builder::new()
            .name("tape-render".to_string())
            .spawn(move || runner(body));
        match spawned {
            Ok(thread) => {
                let thread_id = thread.thread().id();
                self.running = Some(Running {
                    stop: stop_tx,
                    thread,
                    thread_id,
                });
            }
            Err(err) => tracing::error!(error = %err, "failed to start render scheduler"),
        }
    }

    /// Stop ticking and wait for the thread, unless called from the scheduler thread itself.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let _ = running.stop.try_send(());
        if thread::current().id() != running.thread_id {
            let _ = running.thread.join();
        }
    }
}

impl Drop for RenderScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::{frame_interval, RenderScheduler};
    use crate::core::color::ColorProfile;
    use crate::core::model::Cursor;
    use crate::render::{shared, Renderer};

    struct CountingRenderer {
        flushes: Arc<AtomicUsize>,
    }

    impl Renderer for CountingRenderer {
        fn render(&mut self, _view: &str, _cursor: Option<Cursor>) {}
        fn flush(&mut self) -> io::Result<()> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn close(&mut self) -> io::Result<()> {
            Ok(())
        }
        fn reset(&mut self) {}
        fn resize(&mut self, _width: u16, _height: u16) {}
        fn set_color_profile(&mut self, _profile: ColorProfile) {}
        fn enter_alt_screen(&mut self) {}
        fn exit_alt_screen(&mut self) {}
        fn show_cursor(&mut self) {}
        fn hide_cursor(&mut self) {}
        fn clear_screen(&mut self) {}
        fn repaint(&mut self) {}
        fn insert_above(&mut self, _text: &str) {}
    }

    #[test]
    fn interval_follows_fps() {
        assert_eq!(frame_interval(60), Duration::from_nanos(16_666_666));
        assert_eq!(frame_interval(0), Duration::from_secs(1));
    }

    #[test]
    fn ticks_flush_until_stopped() {
        let flushes = Arc::new(AtomicUsize::new(0));
        let renderer = shared(Box::new(CountingRenderer {
            flushes: Arc::clone(&flushes),
        }));
        let mut scheduler = RenderScheduler::default();
        scheduler.start(renderer.clone(), 120, Box::new(|body| body()));
        scheduler.start(renderer, 120, Box::new(|body| body()));
        std::thread::sleep(Duration::from_millis(100));
        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_running());

        let after_stop = flushes.load(Ordering::SeqCst);
        assert!(after_stop > 0);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(flushes.load(Ordering::SeqCst), after_stop);
    }
}
