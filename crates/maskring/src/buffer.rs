//! Shared byte storage and its producer/consumer views.
//!
//! The buffer is allocated once by a [`MemoryProvider`] and split into exactly
//! one [`ProducerView`] (write access, not `Clone`) and any number of
//! [`ConsumerView`]s (read access). Bytes are relaxed atomics, so concurrent
//! access from the two sides is never a data race; the fence protocol decides
//! *which* bytes each side may touch, and the fence table's mutex together
//! with the command sink provides the happens-before edges.

use crate::{MemoryError, RingError};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// External memory-allocation service.
///
/// Called once at ring construction; the returned buffer must stay valid and
/// keep its size for the ring's lifetime.
pub trait MemoryProvider {
    /// Allocates a zero-filled buffer of exactly `size` bytes.
    fn allocate_region(&self, size: usize) -> Result<SharedBuffer, MemoryError>;
}

/// Heap-backed provider with an optional byte budget.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapProvider {
    limit: Option<usize>,
}

impl HeapProvider {
    /// Creates an unbounded heap provider.
    pub const fn new() -> Self {
        Self { limit: None }
    }

    /// Creates a provider that refuses requests larger than `limit` bytes.
    pub const fn with_limit(limit: usize) -> Self {
        Self { limit: Some(limit) }
    }
}

impl MemoryProvider for HeapProvider {
    fn allocate_region(&self, size: usize) -> Result<SharedBuffer, MemoryError> {
        if self.limit.is_some_and(|limit| size > limit) {
            return Err(MemoryError::AllocationFailed { requested: size });
        }
        SharedBuffer::try_zeroed(size)
    }
}

/// A fixed-length byte region, before it is split into views.
pub struct SharedBuffer {
    bytes: Arc<[AtomicU8]>,
}

impl SharedBuffer {
    /// Allocates `size` zero bytes, reporting allocation failure instead of aborting.
    pub fn try_zeroed(size: usize) -> Result<Self, MemoryError> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(size)
            .map_err(|_| MemoryError::AllocationFailed { requested: size })?;
        bytes.resize_with(size, || AtomicU8::new(0));
        Ok(Self {
            bytes: bytes.into(),
        })
    }

    /// Length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Splits the buffer into its unique writer and a reader.
    pub fn split(self) -> (ProducerView, ConsumerView) {
        let reader = ConsumerView {
            bytes: Arc::clone(&self.bytes),
        };
        (ProducerView { bytes: self.bytes }, reader)
    }
}

#[inline]
fn check_span(offset: usize, len: usize, capacity: usize) -> Result<usize, RingError> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(end),
        _ => Err(RingError::OutOfBounds {
            offset,
            len,
            capacity,
        }),
    }
}

/// Write access to the shared buffer. There is exactly one per buffer.
pub struct ProducerView {
    bytes: Arc<[AtomicU8]>,
}

impl ProducerView {
    #[inline]
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Copies `src` into the buffer at `offset`.
    ///
    /// This is the single write primitive; every payload byte goes through it.
    pub fn write(&mut self, offset: usize, src: &[u8]) -> Result<(), RingError> {
        let end = check_span(offset, src.len(), self.bytes.len())?;
        for (dst, &byte) in self.bytes[offset..end].iter().zip(src) {
            dst.store(byte, Ordering::Relaxed);
        }
        Ok(())
    }
}

/// Read access to the shared buffer.
#[derive(Clone)]
pub struct ConsumerView {
    bytes: Arc<[AtomicU8]>,
}

impl ConsumerView {
    #[inline]
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Copies `dst.len()` bytes starting at `offset` into `dst`.
    pub fn read_into(&self, offset: usize, dst: &mut [u8]) -> Result<(), RingError> {
        let end = check_span(offset, dst.len(), self.bytes.len())?;
        for (out, byte) in dst.iter_mut().zip(&self.bytes[offset..end]) {
            *out = byte.load(Ordering::Relaxed);
        }
        Ok(())
    }

    /// Reads `len` bytes starting at `offset`.
    pub fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>, RingError> {
        let mut out = vec![0; len];
        self.read_into(offset, &mut out)?;
        Ok(out)
    }
}

macro_rules! impl_debug_len {
    ($($ty:ident),*) => {$(
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($ty))
                    .field("len", &self.bytes.len())
                    .finish_non_exhaustive()
            }
        }
    )*};
}

impl_debug_len!(SharedBuffer, ProducerView, ConsumerView);
