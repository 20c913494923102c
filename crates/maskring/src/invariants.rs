//! Debug assertion macros for ring allocator invariants.
//!
//! They are only active in debug builds (`#[cfg(debug_assertions)]`), so there
//! is zero overhead in release builds.

// =============================================================================
// Cursor bounds
// =============================================================================

/// Assert that the write cursor stays inside the buffer.
///
/// **Invariant**: `0 <= cursor < capacity`
///
/// Used in: `MaskRing::allocate()` after advancing the cursor
macro_rules! debug_assert_cursor_in_bounds {
    ($cursor:expr, $capacity:expr) => {
        debug_assert!(
            $cursor < $capacity,
            "cursor {} escaped buffer of capacity {}",
            $cursor,
            $capacity
        )
    };
}

// =============================================================================
// Region index range
// =============================================================================

/// Assert that a region index is valid.
///
/// **Invariant**: `0 <= region < region_count`
///
/// Used in: `RegionGeometry::region_of()`
macro_rules! debug_assert_region_in_range {
    ($region:expr, $count:expr) => {
        debug_assert!(
            $region < $count,
            "region {} out of range (regions: {})",
            $region,
            $count
        )
    };
}

// =============================================================================
// Single boundary crossing
// =============================================================================

/// Assert that an allocation entered the region directly after the one it
/// finished (wrapping from the last region to region 0).
///
/// **Invariant**: `entered == (finished + 1) % region_count`
///
/// Used in: `MaskRing::allocate()` on the crossing path
macro_rules! debug_assert_single_crossing {
    ($finished:expr, $entered:expr, $count:expr) => {
        debug_assert!(
            $entered == ($finished + 1) % $count,
            "allocation jumped from region {} to region {} (regions: {})",
            $finished,
            $entered,
            $count
        )
    };
}

// =============================================================================
// No write into pending region
// =============================================================================

/// Assert that the producer only enters a region the consumer has released.
///
/// **Invariant**: `!pending[entered]` once `allocate()` returns
///
/// Used in: `MaskRing::allocate()` after the backpressure wait
macro_rules! debug_assert_region_released {
    ($fences:expr, $region:expr) => {
        debug_assert!(
            !$fences.is_pending($region),
            "producer entered region {} while it is still pending",
            $region
        )
    };
}

pub(crate) use debug_assert_cursor_in_bounds;
pub(crate) use debug_assert_region_in_range;
pub(crate) use debug_assert_region_released;
pub(crate) use debug_assert_single_crossing;
