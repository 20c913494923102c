//! Copying mask payloads into allocated spans.

use crate::{ProducerView, RingError};

/// A `width x height` coverage mask inside a larger row-major byte image.
///
/// Row `i` of the mask starts at `data[offset + i * stride]`.
#[derive(Debug, Clone, Copy)]
pub struct MaskSource<'a> {
    data: &'a [u8],
    offset: usize,
    stride: usize,
    width: usize,
    height: usize,
}

impl<'a> MaskSource<'a> {
    /// Describes a sub-rectangle of `data`.
    ///
    /// Fails if `stride < width` or if the last row runs past `data`.
    pub fn new(
        data: &'a [u8],
        offset: usize,
        stride: usize,
        width: usize,
        height: usize,
    ) -> Result<Self, RingError> {
        let invalid = || RingError::InvalidSource {
            width,
            height,
            offset,
            stride,
            available: data.len(),
        };

        if stride < width {
            return Err(invalid());
        }
        if width > 0 && height > 0 {
            let last_row_end = (height - 1)
                .checked_mul(stride)
                .and_then(|rows| rows.checked_add(offset))
                .and_then(|start| start.checked_add(width))
                .ok_or_else(invalid)?;
            if last_row_end > data.len() {
                return Err(invalid());
            }
        }

        Ok(Self {
            data,
            offset,
            stride,
            width,
            height,
        })
    }

    /// A tightly packed mask (`stride == width`, no leading offset).
    pub fn packed(data: &'a [u8], width: usize, height: usize) -> Result<Self, RingError> {
        Self::new(data, 0, width, width, height)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of bytes the mask occupies once packed.
    #[inline]
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over the mask rows, each exactly `width` bytes.
    pub fn rows(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        (0..self.height).map(move |row| {
            let start = self.offset + row * self.stride;
            &self.data[start..start + self.width]
        })
    }
}

/// Copies `mask` into `view` at `offset`, packing its rows back to back.
///
/// Skips `stride - width` source bytes between rows. Callers must have
/// allocated `mask.len()` bytes at `offset`.
pub fn write_mask(view: &mut ProducerView, offset: usize, mask: &MaskSource<'_>) -> Result<(), RingError> {
    let mut dst = offset;
    for row in mask.rows() {
        view.write(dst, row)?;
        dst += row.len();
    }
    Ok(())
}
