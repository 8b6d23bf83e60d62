use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use super::stream::SharedAudio;

/// How long shutdown waits for a source stuck in a blocking open or read
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A capture backend. `run` executes on its own thread: it must publish the
/// stream format once known, keep writing samples into `shared`, and return
/// when `shared.should_terminate()` turns true or the stream ends.
pub trait SampleSource: Send + 'static {
    fn describe(&self) -> String;

    fn run(self: Box<Self>, shared: &SharedAudio) -> Result<()>;
}

/// Owns the capture thread. Dropping without `shutdown` detaches it.
pub struct CaptureHandle {
    shared: Arc<SharedAudio>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureHandle {
    pub fn spawn(source: Box<dyn SampleSource>, shared: Arc<SharedAudio>) -> Result<Self> {
        log::info!("Starting audio thread: {}", source.describe());
        let worker = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("capture".into())
            .spawn(move || match source.run(&worker) {
                Ok(()) => worker.finish(),
                Err(err) => {
                    log::error!("Capture failed: {:#}", err);
                    worker.fail(format!("{:#}", err));
                }
            })
            .context("Failed to spawn audio thread")?;

        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// Ask the capture thread to stop and wait for it.
    pub fn shutdown(self) {
        self.shutdown_within(SHUTDOWN_GRACE);
    }

    /// Like `shutdown`, but gives up after `grace` and leaves the thread
    /// detached. Returns whether the thread was joined.
    pub fn shutdown_within(mut self, grace: Duration) -> bool {
        self.shared.request_terminate();
        let Some(thread) = self.thread.take() else {
            return true;
        };

        let deadline = Instant::now() + grace;
        while !thread.is_finished() {
            if Instant::now() >= deadline {
                log::warn!(
                    "Audio thread still blocked after {:?}, leaving it behind",
                    grace
                );
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        if thread.join().is_err() {
            log::warn!("Audio thread panicked during shutdown");
        }
        true
    }
}
