//! MaskRing - Fence-Synchronized Ring Allocator for Mask Payloads
//!
//! Streams variable-length coverage masks into a fixed-capacity shared buffer
//! that an asynchronous executor reads later. The buffer is partitioned into
//! equal regions; the producer bump-allocates from a cursor and only touches
//! shared state when an allocation crosses a region boundary.
//!
//! # Key Features
//!
//! - Lock-free fast path (same-region allocations touch no shared state)
//! - Per-region fences with two-region slack before the producer blocks
//! - Bounded backpressure wait (spin → park on condvar → stalled-consumer error)
//! - Safe, bounds-checked producer/consumer views over the shared bytes
//!
//! # Example
//!
//! ```
//! use maskring::{Command, Config, MaskRing, MaskSource};
//!
//! let (mut ring, consumer) = MaskRing::new(Config::new(4096, 4)).unwrap();
//! let mut sink: Vec<Command> = Vec::new();
//!
//! let coverage = [0xFFu8; 6];
//! let mask = MaskSource::packed(&coverage, 3, 2).unwrap();
//! let offset = ring.mask_fill(&mut sink, 10, 20, 3, 2, Some(&mask)).unwrap();
//!
//! assert_eq!(offset, Some(0));
//! assert_eq!(consumer.read(0, 6).unwrap(), coverage.to_vec());
//! ```

mod buffer;
mod command;
mod config;
mod error;
mod fence;
mod invariants;
mod metrics;
mod payload;
mod region;
mod ring;

pub use buffer::{ConsumerView, HeapProvider, MemoryProvider, ProducerView, SharedBuffer};
pub use command::{
    Command, CommandSink, FenceMarker, PayloadRef, NO_PAYLOAD, NO_WAIT, OP_MASK_BUFFER_FENCE, OP_MASK_FILL,
};
pub use config::{Config, DEFAULT_CONFIG, SMALL_CONFIG};
pub use error::{ConfigError, DecodeError, MemoryError, RingError, SinkError};
pub use fence::FenceTable;
pub use metrics::Metrics;
pub use payload::{write_mask, MaskSource};
pub use region::{Crossing, RegionGeometry};
pub use ring::{Allocation, ConsumerHandle, MaskRing};
