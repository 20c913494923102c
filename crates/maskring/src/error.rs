//! Error types for maskring operations.

use std::time::Duration;
use thiserror::Error;

/// Invalid ring geometry or wait policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The buffer has no bytes.
    #[error("buffer capacity must be non-zero")]
    ZeroCapacity,

    /// Fewer regions than the two-ahead fence protocol needs.
    #[error("at least {min} regions are required (got {regions})")]
    TooFewRegions { regions: usize, min: usize },

    /// Capacity does not split into equal regions.
    #[error("capacity {capacity} is not a multiple of the region count {regions}")]
    UnevenRegions { capacity: usize, regions: usize },

    /// Offsets would not fit the 32-bit command stream.
    #[error("capacity {capacity} exceeds the addressable maximum {max}")]
    CapacityTooLarge { capacity: usize, max: usize },

    /// The wait policy allows no drain attempts.
    #[error("max_drain_attempts must be at least 1")]
    NoDrainAttempts,
}

/// Failure of the memory-allocation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// The provider could not supply the requested bytes.
    #[error("failed to allocate {requested} bytes for the shared buffer")]
    AllocationFailed { requested: usize },

    /// The provider returned a buffer of the wrong size.
    #[error("provider returned {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// Errors reported by a [`CommandSink`](crate::CommandSink).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The sink no longer accepts records.
    #[error("command sink is closed")]
    Closed,

    /// The consumer failed while executing drained records.
    #[error("executor failed: {0}")]
    Execution(&'static str),
}

/// Malformed record in an encoded command stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The stream ends in the middle of a record.
    #[error("truncated record: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    /// The leading word is not a known opcode.
    #[error("unknown opcode {0}")]
    UnknownOpcode(i32),

    /// A field holds a value outside its domain.
    #[error("invalid {field}: {value}")]
    InvalidField { field: &'static str, value: i32 },
}

/// Errors that can occur while allocating or writing payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RingError {
    /// Rejected configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The shared buffer could not be created.
    #[error("memory allocation failed: {0}")]
    Memory(#[from] MemoryError),

    /// The command sink refused a record or a drain request.
    #[error("command sink error: {0}")]
    Sink(#[from] SinkError),

    /// The request does not fit in a single region.
    #[error("oversized request: {size} bytes (limit {limit})")]
    OversizedRequest { size: usize, limit: usize },

    /// The consumer never released the region the producer needs next.
    #[error("consumer stalled: region {region} still pending after {attempts} drains in {waited:?}")]
    StalledConsumer {
        region: usize,
        attempts: u32,
        waited: Duration,
    },

    /// A region index outside `[0, regions)`.
    #[error("region {region} out of range (regions: {regions})")]
    RegionOutOfRange { region: usize, regions: usize },

    /// A write or read outside the buffer.
    #[error("span [{offset}, {offset}+{len}) exceeds buffer capacity {capacity}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    /// The payload source cannot supply the described rectangle.
    #[error("mask source of {available} bytes cannot hold {width}x{height} at offset {offset} with stride {stride}")]
    InvalidSource {
        width: usize,
        height: usize,
        offset: usize,
        stride: usize,
        available: usize,
    },

    /// A mask longer than the allocation it is written into.
    #[error("mask of {len} bytes overruns a {size}-byte allocation")]
    SpanOverrun { len: usize, size: usize },

    /// A mask whose dimensions differ from the fill rectangle.
    #[error("mask is {}x{}, fill rectangle is {}x{}", .actual.0, .actual.1, .expected.0, .expected.1)]
    DimensionMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },
}

impl RingError {
    /// Returns `true` if the ring cannot make further progress.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Memory(_) | Self::StalledConsumer { .. } | Self::Sink(SinkError::Closed)
        )
    }

    /// Returns `true` if the caller passed an invalid request.
    #[inline]
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::OversizedRequest { .. }
                | Self::RegionOutOfRange { .. }
                | Self::OutOfBounds { .. }
                | Self::InvalidSource { .. }
                | Self::SpanOverrun { .. }
                | Self::DimensionMismatch { .. }
        )
    }
}
