//! Consumer side of the simulation: executes decoded records against the
//! ring's [`ConsumerHandle`].
//!
//! A fence marker places a fence for its finished region; the fence is
//! signalled as soon as every earlier record has executed, which in a
//! synchronous executor is immediately. Waiting on the marker's wait region
//! therefore just retires that fence and releases the region to the producer.

use maskring::{Command, ConsumerHandle, DecodeError, FenceMarker, PayloadRef, RingError};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

/// Failure while executing a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    /// Reading a payload or releasing a region failed.
    #[error("ring access failed: {0}")]
    Ring(#[from] RingError),

    /// The encoded stream is malformed.
    #[error("malformed record: {0}")]
    Decode(#[from] DecodeError),

    /// A marker asked to wait on a region that has no outstanding fence.
    #[error("wait on region {region} without a placed fence")]
    UnplacedFence { region: usize },
}

impl ExecError {
    /// Short reason for [`SinkError::Execution`](maskring::SinkError::Execution).
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Ring(_) => "ring access failed",
            Self::Decode(_) => "malformed record",
            Self::UnplacedFence { .. } => "wait on unplaced fence",
        }
    }
}

/// A payload reference after execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutedFill {
    pub fill: PayloadRef,
    /// Digest of the mask bytes as read at execution time; `None` when unmasked.
    pub digest: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    pub fills: u64,
    pub unmasked_fills: u64,
    pub fences_placed: u64,
    pub fence_waits: u64,
    pub bytes_read: u64,
}

/// FNV-1a over `bytes`.
pub fn digest(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, &byte| (hash ^ u64::from(byte)).wrapping_mul(PRIME))
}

/// Plays the asynchronous executor for a [`MaskRing`](maskring::MaskRing).
#[derive(Debug)]
pub struct Executor {
    consumer: ConsumerHandle,
    /// Regions with a fence placed and not yet waited on
    placed: Vec<bool>,
    scratch: Vec<u8>,
    fills: Vec<ExecutedFill>,
    latency: Option<Duration>,
    stats: ExecutorStats,
}

impl Executor {
    pub fn new(consumer: ConsumerHandle) -> Self {
        let regions = consumer.geometry().region_count();
        Self {
            consumer,
            placed: vec![false; regions],
            scratch: Vec::new(),
            fills: Vec::new(),
            latency: None,
            stats: ExecutorStats::default(),
        }
    }

    /// Sleeps for `latency` before every masked fill, to model a slow device.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    #[inline]
    pub fn stats(&self) -> ExecutorStats {
        self.stats
    }

    /// Executed fills since the last call, in execution order.
    pub fn take_fills(&mut self) -> Vec<ExecutedFill> {
        std::mem::take(&mut self.fills)
    }

    pub fn execute(&mut self, command: Command) -> Result<(), ExecError> {
        match command {
            Command::Fence(marker) => self.fence(marker),
            Command::MaskFill(fill) => self.fill(fill),
        }
    }

    fn fence(&mut self, marker: FenceMarker) -> Result<(), ExecError> {
        let regions = self.placed.len();
        let Some(placed) = self.placed.get_mut(marker.finished_region) else {
            return Err(RingError::RegionOutOfRange {
                region: marker.finished_region,
                regions,
            }
            .into());
        };
        *placed = true;
        self.stats.fences_placed += 1;

        if let Some(region) = marker.wait_region {
            match self.placed.get_mut(region) {
                Some(placed) if *placed => *placed = false,
                _ => return Err(ExecError::UnplacedFence { region }),
            }
            self.consumer.on_region_consumed(region)?;
            self.stats.fence_waits += 1;
        }
        trace!(finished = marker.finished_region, wait = ?marker.wait_region, "fence executed");
        Ok(())
    }

    fn fill(&mut self, fill: PayloadRef) -> Result<(), ExecError> {
        self.stats.fills += 1;
        let Some(offset) = fill.payload_offset else {
            self.stats.unmasked_fills += 1;
            self.fills.push(ExecutedFill { fill, digest: None });
            return Ok(());
        };

        if let Some(latency) = self.latency {
            thread::sleep(latency);
        }
        self.scratch.resize(fill.payload_len(), 0);
        self.consumer.read_into(offset, &mut self.scratch)?;
        self.stats.bytes_read += self.scratch.len() as u64;
        self.fills.push(ExecutedFill {
            fill,
            digest: Some(digest(&self.scratch)),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maskring::{Config, MaskRing};

    fn marker(finished_region: usize, wait_region: Option<usize>) -> Command {
        FenceMarker {
            finished_region,
            wait_region,
        }
        .into()
    }

    #[test]
    fn test_wait_releases_region() {
        let (ring, consumer) = MaskRing::new(Config::new(4096, 4)).unwrap();
        ring.fences().mark_pending(0).unwrap();
        let mut executor = Executor::new(consumer);

        executor.execute(marker(0, None)).unwrap();
        executor.execute(marker(1, None)).unwrap();
        executor.execute(marker(2, Some(0))).unwrap();

        assert!(!ring.fences().is_pending(0));
        assert_eq!(executor.stats().fences_placed, 3);
        assert_eq!(executor.stats().fence_waits, 1);
    }

    #[test]
    fn test_wait_without_fence_rejected() {
        let (_ring, consumer) = MaskRing::new(Config::new(4096, 4)).unwrap();
        let mut executor = Executor::new(consumer);
        assert_eq!(
            executor.execute(marker(0, Some(2))),
            Err(ExecError::UnplacedFence { region: 2 })
        );
    }

    #[test]
    fn test_fill_digests_payload() {
        let (_ring, consumer) = MaskRing::new(Config::new(4096, 4)).unwrap();
        let mut executor = Executor::new(consumer);
        let fill = PayloadRef {
            x: 0,
            y: 0,
            width: 4,
            height: 2,
            payload_offset: Some(0),
        };

        executor.execute(fill.into()).unwrap();
        let fills = executor.take_fills();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].digest, Some(digest(&[0; 8])));
        assert_eq!(executor.stats().bytes_read, 8);
        assert!(executor.take_fills().is_empty());
    }

    #[test]
    fn test_digest_known_values() {
        assert_eq!(digest(&[]), 0xcbf2_9ce4_8422_2325);
        assert_eq!(digest(b"a"), 0xaf63_dc4c_8601_ec8c);
    }
}
