//! Ordered render queue.
//!
//! The producer appends encoded records; whoever flushes (the producer via
//! `drain_now`, or a [`Drainer`](crate::Drainer) thread) decodes and executes
//! them in push order.
//!
//! Lock order is executor, then pending bytes. `push` only ever takes the
//! pending-bytes lock, so it never waits behind an executing batch.

use crate::{ExecError, Executor, ExecutorStats};
use maskring::{Command, CommandSink, SinkError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Debug)]
struct Shared {
    /// Encoded records not yet executed
    pending: Mutex<Vec<u8>>,
    executor: Mutex<Executor>,
    failure: Mutex<Option<ExecError>>,
    closed: AtomicBool,
    pushed: AtomicU64,
    executed: AtomicU64,
}

/// Byte-encoded command queue with an attached executor.
///
/// Clones share the same queue.
#[derive(Debug, Clone)]
pub struct RenderQueue {
    shared: Arc<Shared>,
}

impl RenderQueue {
    pub fn new(executor: Executor) -> Self {
        Self {
            shared: Arc::new(Shared {
                pending: Mutex::new(Vec::new()),
                executor: Mutex::new(executor),
                failure: Mutex::new(None),
                closed: AtomicBool::new(false),
                pushed: AtomicU64::new(0),
                executed: AtomicU64::new(0),
            }),
        }
    }

    /// Stops accepting records. Already queued records can still be flushed.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Encoded bytes waiting for execution.
    pub fn pending_bytes(&self) -> usize {
        self.shared.pending.lock().len()
    }

    pub fn records_pushed(&self) -> u64 {
        self.shared.pushed.load(Ordering::Relaxed)
    }

    pub fn records_executed(&self) -> u64 {
        self.shared.executed.load(Ordering::Relaxed)
    }

    /// The error that stopped the executor, if any.
    pub fn failure(&self) -> Option<ExecError> {
        self.shared.failure.lock().clone()
    }

    pub fn executor_stats(&self) -> ExecutorStats {
        self.shared.executor.lock().stats()
    }

    /// Runs `f` with exclusive access to the executor.
    pub fn with_executor<R>(&self, f: impl FnOnce(&mut Executor) -> R) -> R {
        f(&mut self.shared.executor.lock())
    }

    /// Executes every record queued so far, returning how many ran.
    ///
    /// Once a record fails the queue is closed and every later flush fails.
    pub fn flush(&self) -> Result<u64, SinkError> {
        let mut executor = self.shared.executor.lock();
        if let Some(failure) = self.shared.failure.lock().as_ref() {
            return Err(SinkError::Execution(failure.reason()));
        }

        let batch = std::mem::take(&mut *self.shared.pending.lock());
        let mut pos = 0;
        let mut executed = 0;
        while pos < batch.len() {
            let (command, used) = Command::decode(&batch[pos..]).map_err(|err| self.fail(err.into()))?;
            executor.execute(command).map_err(|err| self.fail(err))?;
            pos += used;
            executed += 1;
            self.shared.executed.fetch_add(1, Ordering::Relaxed);
        }

        if executed > 0 {
            debug!(records = executed, bytes = batch.len(), "batch executed");
        }
        Ok(executed)
    }

    fn fail(&self, err: ExecError) -> SinkError {
        error!(error = %err, "executor failed; closing render queue");
        let reason = err.reason();
        self.shared.failure.lock().get_or_insert(err);
        self.close();
        SinkError::Execution(reason)
    }
}

impl CommandSink for RenderQueue {
    fn push(&mut self, command: Command) -> Result<(), SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed);
        }
        command.encode(&mut self.shared.pending.lock());
        self.shared.pushed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn drain_now(&mut self) -> Result<(), SinkError> {
        self.flush().map(|_| ())
    }
}
