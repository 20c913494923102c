use crate::region::Crossing;
use crate::RingError;
use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

// =============================================================================
// FENCE PROTOCOL
// =============================================================================
//
// One pending flag per region, all behind a single mutex. The table is tiny
// and is only touched at region boundaries, so per-region locks buy nothing.
//
// **Producer** (on a boundary crossing, one critical section):
// 1. Read pending[finished + 2] to decide the marker's wait region
// 2. Set pending[finished]
// 3. Read pending[entered]; if set, drain the sink and wait on `cleared`
//
// If the marker cannot be pushed, step 2 is reverted so no region is left
// pending without a marker that names it.
//
// **Consumer** (after finishing every read attributable to a region):
// 1. Clear pending[region]
// 2. Notify `cleared` so a parked producer re-checks
//
// The producer never writes into a region while its flag is set. The flag is
// set only by the producer and cleared only by the consumer.
//
// =============================================================================

/// Outcome of the producer's crossing critical section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CrossingState {
    /// Region the fence marker asks the consumer to wait on, if pending.
    pub wait_region: Option<usize>,
    /// Whether the region being entered is still pending.
    pub entered_pending: bool,
    /// Whether the finished region was already pending before the crossing.
    pub finished_was_pending: bool,
}

/// Per-region pending flags shared between producer and consumer.
#[derive(Debug)]
pub struct FenceTable {
    /// Pending flag per region
    pending: CachePadded<Mutex<Vec<bool>>>,
    /// Signalled whenever a flag is cleared
    cleared: Condvar,
    /// Number of times the lock was taken (for fast-path verification)
    lock_acquisitions: AtomicU64,
    region_count: usize,
}

impl FenceTable {
    /// Creates a table with every region non-pending.
    pub fn new(region_count: usize) -> Self {
        Self {
            pending: CachePadded::new(Mutex::new(vec![false; region_count])),
            cleared: Condvar::new(),
            lock_acquisitions: AtomicU64::new(0),
            region_count,
        }
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, Vec<bool>> {
        self.lock_acquisitions.fetch_add(1, Ordering::Relaxed);
        self.pending.lock()
    }

    /// Number of regions tracked.
    #[inline]
    pub fn region_count(&self) -> usize {
        self.region_count
    }

    fn check(&self, region: usize) -> Result<(), RingError> {
        if region < self.region_count {
            Ok(())
        } else {
            Err(RingError::RegionOutOfRange {
                region,
                regions: self.region_count,
            })
        }
    }

    /// Marks `region` as awaiting consumption.
    pub fn mark_pending(&self, region: usize) -> Result<(), RingError> {
        self.check(region)?;
        self.lock()[region] = true;
        Ok(())
    }

    /// Releases `region` back to the producer and wakes a parked producer.
    ///
    /// Idempotent. Returns whether the region was pending.
    pub fn clear_pending(&self, region: usize) -> Result<bool, RingError> {
        self.check(region)?;
        let was_pending = std::mem::replace(&mut self.lock()[region], false);
        self.cleared.notify_all();
        Ok(was_pending)
    }

    /// Returns whether `region` is awaiting consumption. Out-of-range regions
    /// are never pending.
    pub fn is_pending(&self, region: usize) -> bool {
        self.lock().get(region).copied().unwrap_or(false)
    }

    /// Runs the producer's side of a boundary crossing atomically: picks the
    /// marker's wait region, marks the finished region pending, and probes the
    /// region being entered.
    pub(crate) fn record_crossing(&self, crossing: &Crossing) -> CrossingState {
        let mut pending = self.lock();
        let wait_region = pending[crossing.wait_candidate].then_some(crossing.wait_candidate);
        let finished_was_pending = std::mem::replace(&mut pending[crossing.finished], true);
        CrossingState {
            wait_region,
            entered_pending: pending[crossing.entered],
            finished_was_pending,
        }
    }

    /// Undoes the pending mark of a crossing whose marker never reached the
    /// consumer.
    pub(crate) fn revert_crossing(&self, crossing: &Crossing, state: &CrossingState) {
        if !state.finished_was_pending {
            self.lock()[crossing.finished] = false;
        }
    }

    /// Parks until `region` is cleared or `timeout` elapses.
    ///
    /// Returns `true` if the region is no longer pending.
    pub fn wait_cleared(&self, region: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut pending = self.lock();
        while pending.get(region).copied().unwrap_or(false) {
            if self.cleared.wait_until(&mut pending, deadline).timed_out() {
                return !pending[region];
            }
        }
        true
    }

    /// Snapshot of the currently pending regions, in index order.
    pub fn pending_regions(&self) -> Vec<usize> {
        self.lock()
            .iter()
            .enumerate()
            .filter_map(|(region, &pending)| pending.then_some(region))
            .collect()
    }

    /// Total lock acquisitions since creation.
    pub fn lock_acquisitions(&self) -> u64 {
        self.lock_acquisitions.load(Ordering::Relaxed)
    }
}
