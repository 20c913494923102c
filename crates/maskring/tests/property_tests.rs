//! Property-based tests for the allocation and fence protocol.
//!
//! Every test drives the ring with an in-order consumer stand-in so that the
//! producer never stalls, then checks the allocation stream and the fence
//! markers it produced.

mod common;

use common::FenceDrainingSink;
use maskring::{Command, Config, MaskRing};
use proptest::prelude::*;

const CAPACITY: usize = 4096;
const REGIONS: usize = 4;
const REGION_SIZE: usize = CAPACITY / REGIONS;

fn sizes() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0usize..REGION_SIZE, 1..200)
}

// =============================================================================
// Wraparound: offsets stay in bounds, and a wrap always restarts at 0
// =============================================================================

proptest! {
    #[test]
    fn prop_offsets_in_bounds_and_wrap_to_zero(sizes in sizes()) {
        let (mut ring, consumer) = MaskRing::new(Config::new(CAPACITY, REGIONS)).unwrap();
        let mut sink = FenceDrainingSink::new(consumer);

        let mut expected_cursor = 0usize;
        for size in sizes {
            let allocation = ring.allocate(size, &mut sink).unwrap();
            prop_assert!(allocation.offset + allocation.size < CAPACITY,
                "allocation [{}, +{}) reaches the end of the buffer", allocation.offset, size);

            if expected_cursor + size >= CAPACITY {
                // Tail [expected_cursor, CAPACITY) is abandoned
                prop_assert_eq!(allocation.offset, 0);
            } else {
                prop_assert_eq!(allocation.offset, expected_cursor);
            }
            expected_cursor = allocation.offset + size;
            prop_assert_eq!(ring.cursor(), expected_cursor);
        }
    }
}

// =============================================================================
// One marker per crossing, finished regions in ring order
// =============================================================================

proptest! {
    #[test]
    fn prop_markers_follow_ring_order(sizes in sizes()) {
        let (mut ring, consumer) = MaskRing::new(Config::new(CAPACITY, REGIONS)).unwrap();
        let mut sink = FenceDrainingSink::new(consumer);

        for size in sizes {
            ring.allocate(size, &mut sink).unwrap();
        }

        let metrics = ring.metrics();
        let markers = sink.markers();
        prop_assert_eq!(markers.len() as u64, metrics.boundary_crossings);
        prop_assert_eq!(metrics.fence_markers, metrics.boundary_crossings);
        prop_assert_eq!(metrics.fast_path + metrics.boundary_crossings, metrics.allocations);

        for (index, marker) in markers.iter().enumerate() {
            prop_assert_eq!(marker.finished_region, index % REGIONS);
            if let Some(wait) = marker.wait_region {
                prop_assert_eq!(wait, (marker.finished_region + 2) % REGIONS);
            }
        }
    }
}

// =============================================================================
// The producer never sits in a pending region
// =============================================================================

proptest! {
    #[test]
    fn prop_current_region_released(sizes in sizes()) {
        let (mut ring, consumer) = MaskRing::new(Config::new(CAPACITY, REGIONS)).unwrap();
        let mut sink = FenceDrainingSink::new(consumer);

        for size in sizes {
            let allocation = ring.allocate(size, &mut sink).unwrap();
            let region = ring.geometry().region_of(allocation.offset);
            let end_region = ring.geometry().region_of(ring.cursor());
            prop_assert!(!ring.fences().is_pending(end_region),
                "cursor region {} still pending", end_region);
            // A crossing allocation starts in the region it just fenced.
            if region != end_region {
                prop_assert!(ring.fences().is_pending(region));
            }
        }
    }
}

// =============================================================================
// Fast path: same-region allocations never lock the fence table
// =============================================================================

proptest! {
    #[test]
    fn prop_fast_path_takes_no_lock(sizes in prop::collection::vec(0usize..64, 1..15)) {
        let (mut ring, _consumer) = MaskRing::new(Config::new(CAPACITY, REGIONS)).unwrap();
        let mut sink: Vec<Command> = Vec::new();

        let locks = ring.fences().lock_acquisitions();
        for size in sizes {
            ring.allocate(size, &mut sink).unwrap();
        }
        prop_assert_eq!(ring.fences().lock_acquisitions(), locks);
        prop_assert!(sink.is_empty());
    }
}
