/// Producer-side counters for a [`MaskRing`](crate::MaskRing).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    /// `allocate` calls that advanced the cursor
    pub allocations: u64,
    /// Allocations that stayed inside the current region
    pub fast_path: u64,
    /// Allocations that crossed a region boundary
    pub boundary_crossings: u64,
    /// Fence markers pushed to the sink
    pub fence_markers: u64,
    /// Markers that asked the consumer to wait on a region
    pub fence_waits_requested: u64,
    /// Cursor resets to offset 0
    pub wraparounds: u64,
    /// Crossings that found the entered region still pending
    pub backpressure_events: u64,
    /// `drain_now` calls issued while waiting
    pub drain_requests: u64,
    /// Payload bytes copied into the buffer
    pub bytes_written: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}
