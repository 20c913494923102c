use crate::RenderQueue;
use crossbeam_utils::Backoff;
use maskring::SinkError;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

/// Sleep between empty polls once spinning has stopped paying off.
const IDLE_SLEEP: Duration = Duration::from_micros(200);

/// Background thread that keeps flushing a [`RenderQueue`], standing in for
/// an executor that runs asynchronously to the producer.
#[derive(Debug)]
pub struct Drainer {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<u64, SinkError>>>,
}

impl Drainer {
    pub fn spawn(queue: RenderQueue) -> io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("maskring-drainer".into())
            .spawn(move || run(&queue, &stop))?;
        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }

    /// Stops the thread after a final flush and returns how many records it
    /// executed.
    pub fn shutdown(mut self) -> Result<u64, SinkError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<u64, SinkError> {
        self.shutdown.store(true, Ordering::Release);
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .unwrap_or(Err(SinkError::Execution("drain thread panicked"))),
            None => Ok(0),
        }
    }
}

impl Drop for Drainer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn run(queue: &RenderQueue, shutdown: &AtomicBool) -> Result<u64, SinkError> {
    info!("drainer started");
    let backoff = Backoff::new();
    let mut executed = 0;

    while !shutdown.load(Ordering::Acquire) {
        match queue.flush()? {
            0 if backoff.is_completed() => thread::sleep(IDLE_SLEEP),
            0 => backoff.snooze(),
            records => {
                executed += records;
                backoff.reset();
            }
        }
    }

    executed += queue.flush()?;
    debug!(executed, "drainer stopped");
    Ok(executed)
}
