use crate::invariants::{
    debug_assert_cursor_in_bounds, debug_assert_region_released, debug_assert_single_crossing,
};
use crate::payload::write_mask;
use crate::region::{Crossing, RegionGeometry};
use crate::{
    CommandSink, Config, ConsumerView, FenceMarker, FenceTable, HeapProvider, MaskSource,
    MemoryError, MemoryProvider, Metrics, PayloadRef, ProducerView, RingError,
};
use crossbeam_utils::Backoff;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

// =============================================================================
// ALLOCATION PROTOCOL
// =============================================================================
//
// The buffer is split into R equal regions. Allocations are bump-allocated
// from a single cursor; nothing is ever freed individually.
//
// ## Fast path
//
// An allocation that starts and ends in the same region touches no shared
// state: the cursor is owned by the producer (`&mut self`).
//
// ## Boundary crossing
//
// An allocation that moves the cursor into the next region (or wraps from the
// last region back to 0) is the last one charged to the region it leaves:
// 1. Push a fence marker for the finished region. It names the region two
//    slots ahead as the wait region if that region is still pending.
// 2. Mark the finished region pending.
// 3. If the entered region is pending, drain the sink and wait for the
//    consumer to release it.
// The wait-region choice, the pending mark and the probe of the entered
// region happen in one critical section of the fence table. If the sink
// refuses the marker, the pending mark is reverted and the whole crossing is
// replayed by the next `allocate` before it hands out any bytes.
//
// ## Wraparound
//
// If `cursor + size >= capacity` the cursor resets to 0 and the tail bytes
// are abandoned. The crossing is computed from the pre-wrap cursor, so a wrap
// always fences the last region and checks region 0 before reuse.
//
// Allocations are strictly smaller than a region, so each one crosses at most
// one boundary.
//
// =============================================================================

/// A span handed out by [`MaskRing::allocate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub offset: usize,
    pub size: usize,
}

/// Fence-synchronized ring allocator over a shared byte buffer.
///
/// There is a single producer: every mutating method takes `&mut self`, and
/// `MaskRing` is not `Clone`.
#[derive(Debug)]
pub struct MaskRing {
    config: Config,
    geometry: RegionGeometry,
    /// Next write offset
    cursor: usize,
    /// Crossing whose fence marker the sink refused
    unfenced: Option<Crossing>,
    /// Region entered by an allocation whose backpressure wait failed
    awaiting: Option<usize>,
    view: ProducerView,
    reader: ConsumerView,
    fences: Arc<FenceTable>,
    metrics: Metrics,
}

impl MaskRing {
    /// Creates a ring backed by heap memory.
    ///
    /// Returns the producer-side ring and a handle for the consumer.
    pub fn new(config: Config) -> Result<(Self, ConsumerHandle), RingError> {
        Self::with_provider(config, &HeapProvider::new())
    }

    /// Creates a ring whose buffer comes from `provider`.
    pub fn with_provider<P>(config: Config, provider: &P) -> Result<(Self, ConsumerHandle), RingError>
    where
        P: MemoryProvider + ?Sized,
    {
        config.validate()?;

        let buffer = provider.allocate_region(config.capacity)?;
        if buffer.len() != config.capacity {
            return Err(MemoryError::SizeMismatch {
                expected: config.capacity,
                actual: buffer.len(),
            }
            .into());
        }
        let (view, reader) = buffer.split();
        let geometry = RegionGeometry::new(&config);
        let fences = Arc::new(FenceTable::new(config.region_count));

        info!(
            capacity = config.capacity,
            regions = config.region_count,
            region_size = geometry.region_size(),
            "mask ring initialized"
        );

        let consumer = ConsumerHandle {
            view: reader.clone(),
            fences: Arc::clone(&fences),
            geometry,
        };
        let ring = Self {
            config,
            geometry,
            cursor: 0,
            unfenced: None,
            awaiting: None,
            view,
            reader,
            fences,
            metrics: Metrics::new(),
        };
        Ok((ring, consumer))
    }

    // ---------------------------------------------------------------------
    // STATUS
    // ---------------------------------------------------------------------

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn geometry(&self) -> &RegionGeometry {
        &self.geometry
    }

    /// Offset the next allocation would start at (before any wraparound).
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The pending-flag table shared with the consumer.
    #[inline]
    pub fn fences(&self) -> &FenceTable {
        &self.fences
    }

    /// Snapshot of the producer counters.
    #[inline]
    pub fn metrics(&self) -> Metrics {
        self.metrics
    }

    /// Another consumer handle onto the same buffer and fence table.
    pub fn consumer(&self) -> ConsumerHandle {
        ConsumerHandle {
            view: self.reader.clone(),
            fences: Arc::clone(&self.fences),
            geometry: self.geometry,
        }
    }

    // ---------------------------------------------------------------------
    // PRODUCER API
    // ---------------------------------------------------------------------

    /// Reserves `size` bytes and returns their offset.
    ///
    /// Touches no shared state unless the allocation crosses a region
    /// boundary. On a crossing it pushes a fence marker into `sink` and, if
    /// the consumer still holds the region being entered, blocks until the
    /// consumer releases it or the configured wait bound is exhausted.
    pub fn allocate<S>(&mut self, size: usize, sink: &mut S) -> Result<Allocation, RingError>
    where
        S: CommandSink + ?Sized,
    {
        let limit = self.config.max_allocation();
        if size > limit {
            return Err(RingError::OversizedRequest { size, limit });
        }

        // A previous crossing failed part way; the cursor already sits in the
        // entered region, so finish that crossing before anything lands there.
        if let Some(crossing) = self.unfenced {
            self.cross(crossing, sink)?;
        }
        if let Some(region) = self.awaiting {
            self.await_region(region, sink)?;
            self.awaiting = None;
        }

        let before = self.cursor;
        if self.geometry.needs_wrap(self.cursor, size) {
            debug!(cursor = self.cursor, size, "wrapping to offset 0");
            self.cursor = 0;
            self.metrics.wraparounds += 1;
        }

        let offset = self.cursor;
        self.cursor += size;
        debug_assert_cursor_in_bounds!(self.cursor, self.geometry.capacity());
        self.metrics.allocations += 1;

        match self.geometry.crossing(before, self.cursor) {
            None => self.metrics.fast_path += 1,
            Some(crossing) => {
                self.metrics.boundary_crossings += 1;
                self.cross(crossing, sink)?;
            }
        }

        Ok(Allocation { offset, size })
    }

    fn cross<S>(&mut self, crossing: Crossing, sink: &mut S) -> Result<(), RingError>
    where
        S: CommandSink + ?Sized,
    {
        debug_assert_single_crossing!(
            crossing.finished,
            crossing.entered,
            self.geometry.region_count()
        );

        let state = self.fences.record_crossing(&crossing);
        let marker = FenceMarker {
            finished_region: crossing.finished,
            wait_region: state.wait_region,
        };
        if let Err(err) = sink.push(marker.into()) {
            self.fences.revert_crossing(&crossing, &state);
            self.unfenced = Some(crossing);
            warn!(finished = crossing.finished, error = %err, "fence marker rejected");
            return Err(err.into());
        }
        self.unfenced = None;
        self.metrics.fence_markers += 1;
        if state.wait_region.is_some() {
            self.metrics.fence_waits_requested += 1;
        }
        trace!(
            finished = crossing.finished,
            entered = crossing.entered,
            wait = ?state.wait_region,
            "fence marker queued"
        );

        if state.entered_pending {
            self.metrics.backpressure_events += 1;
            self.awaiting = Some(crossing.entered);
            self.await_region(crossing.entered, sink)?;
            self.awaiting = None;
        }

        debug_assert_region_released!(self.fences, crossing.entered);
        Ok(())
    }

    /// Drains the sink until `region` is released, spinning briefly before
    /// parking on the fence table between drains.
    fn await_region<S>(&mut self, region: usize, sink: &mut S) -> Result<(), RingError>
    where
        S: CommandSink + ?Sized,
    {
        warn!(region, "producer blocked on pending region");
        let started = Instant::now();
        let backoff = Backoff::new();
        let mut attempts = 0u32;

        loop {
            sink.drain_now()?;
            attempts += 1;
            self.metrics.drain_requests += 1;

            if !self.fences.is_pending(region) {
                debug!(region, attempts, waited = ?started.elapsed(), "region released");
                return Ok(());
            }

            let waited = started.elapsed();
            if attempts >= self.config.max_drain_attempts || waited >= self.config.max_wait {
                error!(region, attempts, ?waited, "consumer stalled");
                return Err(RingError::StalledConsumer {
                    region,
                    attempts,
                    waited,
                });
            }

            if backoff.is_completed() {
                self.fences.wait_cleared(region, self.config.poll_interval);
            } else {
                backoff.snooze();
            }
        }
    }

    /// Copies `mask` into a span previously returned by [`allocate`](Self::allocate).
    pub fn write(&mut self, allocation: &Allocation, mask: &MaskSource<'_>) -> Result<(), RingError> {
        if mask.len() > allocation.size {
            return Err(RingError::SpanOverrun {
                len: mask.len(),
                size: allocation.size,
            });
        }
        write_mask(&mut self.view, allocation.offset, mask)?;
        self.metrics.bytes_written += mask.len() as u64;
        Ok(())
    }

    /// Allocates space for `mask` and copies it in, returning its offset.
    ///
    /// An absent mask allocates nothing and returns the current cursor, which
    /// callers may only use as a placeholder.
    pub fn queue_mask<S>(&mut self, mask: Option<&MaskSource<'_>>, sink: &mut S) -> Result<usize, RingError>
    where
        S: CommandSink + ?Sized,
    {
        let Some(mask) = mask else {
            return Ok(self.cursor);
        };
        let allocation = self.allocate(mask.len(), sink)?;
        self.write(&allocation, mask)?;
        Ok(allocation.offset)
    }

    /// Queues a masked fill of the `width x height` rectangle at `(x, y)`.
    ///
    /// Copies the mask (if any) into the ring, then pushes the payload
    /// reference after any fence marker the allocation produced. Returns the
    /// payload offset, or `None` for an unmasked fill.
    pub fn mask_fill<S>(
        &mut self,
        sink: &mut S,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        mask: Option<&MaskSource<'_>>,
    ) -> Result<Option<usize>, RingError>
    where
        S: CommandSink + ?Sized,
    {
        let payload_offset = match mask {
            Some(mask) => {
                let expected = (width as usize, height as usize);
                let actual = (mask.width(), mask.height());
                if actual != expected {
                    return Err(RingError::DimensionMismatch { expected, actual });
                }
                Some(self.queue_mask(Some(mask), sink)?)
            }
            None => None,
        };

        sink.push(
            PayloadRef {
                x,
                y,
                width,
                height,
                payload_offset,
            }
            .into(),
        )?;
        Ok(payload_offset)
    }
}

/// Consumer-side access: read payload bytes and release regions.
#[derive(Debug, Clone)]
pub struct ConsumerHandle {
    view: ConsumerView,
    fences: Arc<FenceTable>,
    geometry: RegionGeometry,
}

impl ConsumerHandle {
    #[inline]
    pub fn geometry(&self) -> &RegionGeometry {
        &self.geometry
    }

    #[inline]
    pub fn fences(&self) -> &FenceTable {
        &self.fences
    }

    /// Reads `len` payload bytes at `offset`.
    pub fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>, RingError> {
        self.view.read(offset, len)
    }

    /// Reads `dst.len()` payload bytes at `offset` into `dst`.
    pub fn read_into(&self, offset: usize, dst: &mut [u8]) -> Result<(), RingError> {
        self.view.read_into(offset, dst)
    }

    /// Fence-completion signal: every read attributable to `region` is done.
    ///
    /// Idempotent.
    pub fn on_region_consumed(&self, region: usize) -> Result<(), RingError> {
        let was_pending = self.fences.clear_pending(region)?;
        trace!(region, was_pending, "region consumed");
        Ok(())
    }

    /// Returns whether the producer is still waiting on the consumer for `region`.
    pub fn is_pending(&self, region: usize) -> bool {
        self.fences.is_pending(region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Command;
    use std::time::Duration;

    fn small_ring() -> (MaskRing, ConsumerHandle) {
        MaskRing::new(Config::new(4096, 4).with_max_wait(Duration::from_millis(50))).unwrap()
    }

    #[test]
    fn test_same_region_is_fast_path() {
        let (mut ring, _consumer) = small_ring();
        let mut sink = Vec::new();

        assert_eq!(ring.allocate(100, &mut sink).unwrap().offset, 0);
        assert_eq!(ring.allocate(100, &mut sink).unwrap().offset, 100);
        assert!(sink.is_empty());
        assert_eq!(ring.metrics().fast_path, 2);
        assert_eq!(ring.cursor(), 200);
    }

    #[test]
    fn test_zero_size_allocation() {
        let (mut ring, _consumer) = small_ring();
        let mut sink = Vec::new();
        ring.allocate(10, &mut sink).unwrap();
        let allocation = ring.allocate(0, &mut sink).unwrap();
        assert_eq!(allocation, Allocation { offset: 10, size: 0 });
        assert_eq!(ring.cursor(), 10);
    }

    #[test]
    fn test_crossing_marks_finished_region() {
        let (mut ring, consumer) = small_ring();
        let mut sink = Vec::new();

        ring.allocate(1000, &mut sink).unwrap();
        ring.allocate(100, &mut sink).unwrap();

        assert_eq!(
            sink,
            vec![Command::Fence(FenceMarker {
                finished_region: 0,
                wait_region: None
            })]
        );
        assert!(consumer.is_pending(0));
        assert!(!consumer.is_pending(1));
    }

    #[test]
    fn test_oversized_rejected() {
        let (mut ring, _consumer) = small_ring();
        let mut sink = Vec::new();
        assert_eq!(
            ring.allocate(1024, &mut sink),
            Err(RingError::OversizedRequest { size: 1024, limit: 1023 })
        );
        assert_eq!(ring.cursor(), 0);
        assert!(ring.allocate(1023, &mut sink).is_ok());
    }

    #[test]
    fn test_absent_mask_returns_cursor() {
        let (mut ring, _consumer) = small_ring();
        let mut sink = Vec::new();
        ring.allocate(42, &mut sink).unwrap();
        assert_eq!(ring.queue_mask(None, &mut sink).unwrap(), 42);
        assert_eq!(ring.cursor(), 42);
        assert_eq!(ring.metrics().allocations, 1);
    }

    #[test]
    fn test_mask_fill_round_trip() {
        let (mut ring, consumer) = small_ring();
        let mut sink = Vec::new();
        let data = [9u8; 12];
        let mask = MaskSource::packed(&data, 4, 3).unwrap();

        let offset = ring.mask_fill(&mut sink, 5, 6, 4, 3, Some(&mask)).unwrap();
        assert_eq!(offset, Some(0));
        assert_eq!(
            sink,
            vec![Command::MaskFill(PayloadRef {
                x: 5,
                y: 6,
                width: 4,
                height: 3,
                payload_offset: Some(0)
            })]
        );
        assert_eq!(consumer.read(0, 12).unwrap(), data.to_vec());
        assert_eq!(ring.metrics().bytes_written, 12);
    }

    #[test]
    fn test_mask_fill_dimension_mismatch() {
        let (mut ring, _consumer) = small_ring();
        let mut sink = Vec::new();
        let data = [1u8; 4];
        let mask = MaskSource::packed(&data, 2, 2).unwrap();
        assert_eq!(
            ring.mask_fill(&mut sink, 0, 0, 4, 1, Some(&mask)),
            Err(RingError::DimensionMismatch {
                expected: (4, 1),
                actual: (2, 2)
            })
        );
        assert!(sink.is_empty());
    }

    #[test]
    fn test_write_rejects_overrun() {
        let (mut ring, consumer) = small_ring();
        let mut sink = Vec::new();
        let data = [7u8; 12];
        let mask = MaskSource::packed(&data, 4, 3).unwrap();

        let allocation = ring.allocate(8, &mut sink).unwrap();
        assert_eq!(
            ring.write(&allocation, &mask),
            Err(RingError::SpanOverrun { len: 12, size: 8 })
        );
        // A hand-built span is held to its own size too.
        let forged = Allocation { offset: 1020, size: 4 };
        assert!(ring.write(&forged, &mask).is_err());
        assert_eq!(consumer.read(0, 12).unwrap(), vec![0; 12]);
        assert_eq!(consumer.read(1020, 4).unwrap(), vec![0; 4]);
        assert_eq!(ring.metrics().bytes_written, 0);
    }

    #[test]
    fn test_consumer_rejects_bad_region() {
        let (_ring, consumer) = small_ring();
        assert_eq!(
            consumer.on_region_consumed(4),
            Err(RingError::RegionOutOfRange { region: 4, regions: 4 })
        );
        assert!(!consumer.is_pending(9));
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            MaskRing::new(Config::new(4096, 2)),
            Err(RingError::Config(_))
        ));
    }
}
