//! Region arithmetic over the buffer geometry.
//!
//! Everything here is pure: no shared state is read or written.

use crate::invariants::debug_assert_region_in_range;
use crate::Config;

/// A region-boundary crossing produced by one allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crossing {
    /// Region the producer just finished filling.
    pub finished: usize,
    /// Region the producer is about to write into.
    pub entered: usize,
    /// Region two slots ahead of `finished`, the fence wait candidate.
    pub wait_candidate: usize,
}

/// Buffer geometry: capacity split into equal regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionGeometry {
    capacity: usize,
    region_size: usize,
    region_count: usize,
}

impl RegionGeometry {
    /// Builds the geometry for a validated configuration.
    pub(crate) fn new(config: &Config) -> Self {
        Self {
            capacity: config.capacity,
            region_size: config.region_size(),
            region_count: config.region_count,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn region_size(&self) -> usize {
        self.region_size
    }

    #[inline]
    pub fn region_count(&self) -> usize {
        self.region_count
    }

    /// Region index containing `offset`.
    #[inline]
    pub fn region_of(&self, offset: usize) -> usize {
        let region = offset / self.region_size;
        debug_assert_region_in_range!(region, self.region_count);
        region
    }

    /// Region the producer waits on after finishing `finished`: two slots ahead.
    #[inline]
    pub fn wait_region(&self, finished: usize) -> usize {
        (finished + 2) % self.region_count
    }

    /// Returns the crossing between the region of `before` and the region of
    /// `after`, or `None` if both offsets lie in the same region.
    #[inline]
    pub fn crossing(&self, before: usize, after: usize) -> Option<Crossing> {
        let finished = self.region_of(before);
        let entered = self.region_of(after);
        (finished != entered).then(|| Crossing {
            finished,
            entered,
            wait_candidate: self.wait_region(finished),
        })
    }

    /// Returns `true` if an allocation of `size` at `cursor` must wrap to 0.
    #[inline]
    pub fn needs_wrap(&self, cursor: usize, size: usize) -> bool {
        cursor + size >= self.capacity
    }

    /// Byte range `[start, end)` of `region`.
    pub fn bounds(&self, region: usize) -> (usize, usize) {
        let start = region * self.region_size;
        (start, start + self.region_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> RegionGeometry {
        RegionGeometry::new(&Config::new(4096, 4))
    }

    #[test]
    fn test_region_of() {
        let g = geometry();
        assert_eq!(g.region_size(), 1024);
        assert_eq!(g.region_of(0), 0);
        assert_eq!(g.region_of(1023), 0);
        assert_eq!(g.region_of(1024), 1);
        assert_eq!(g.region_of(4095), 3);
    }

    #[test]
    fn test_wait_region_wraps() {
        let g = geometry();
        assert_eq!(g.wait_region(0), 2);
        assert_eq!(g.wait_region(1), 3);
        assert_eq!(g.wait_region(2), 0);
        assert_eq!(g.wait_region(3), 1);
    }

    #[test]
    fn test_crossing_detection() {
        let g = geometry();
        assert_eq!(g.crossing(0, 500), None);
        assert_eq!(g.crossing(500, 1023), None);
        assert_eq!(
            g.crossing(500, 1100),
            Some(Crossing {
                finished: 0,
                entered: 1,
                wait_candidate: 2
            })
        );
        // Wraparound registers as last region -> region 0
        assert_eq!(
            g.crossing(4000, 50),
            Some(Crossing {
                finished: 3,
                entered: 0,
                wait_candidate: 1
            })
        );
    }

    #[test]
    fn test_needs_wrap_and_bounds() {
        let g = geometry();
        assert!(!g.needs_wrap(4000, 95));
        assert!(g.needs_wrap(4000, 96));
        assert_eq!(g.bounds(2), (2048, 3072));
    }
}
