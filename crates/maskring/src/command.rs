//! Records the producer issues to the consumer, and the sink that carries them.
//!
//! On the wire every record is a run of little-endian `i32` words led by an
//! opcode:
//!
//! | record        | words                                                    |
//! |---------------|----------------------------------------------------------|
//! | fence marker  | `OP_MASK_BUFFER_FENCE`, finished region, wait region / -1 |
//! | payload ref   | `OP_MASK_FILL`, x, y, width, height, offset / `NO_PAYLOAD` |

use crate::{DecodeError, SinkError};

/// Opcode of a fence-marker record.
pub const OP_MASK_BUFFER_FENCE: i32 = 80;
/// Opcode of a payload-reference record.
pub const OP_MASK_FILL: i32 = 81;
/// Wire value of a fence marker that needs no wait.
pub const NO_WAIT: i32 = -1;
/// Wire value of a payload reference without mask bytes.
pub const NO_PAYLOAD: i32 = 0x7FFF_FFFF;

const WORD: usize = 4;

/// "Finished filling `finished_region`; make sure `wait_region` is drained
/// before the producer reuses it."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FenceMarker {
    pub finished_region: usize,
    pub wait_region: Option<usize>,
}

/// A primitive whose coverage mask lives at `payload_offset` in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadRef {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    /// `None` when the primitive has no mask (full coverage).
    pub payload_offset: Option<usize>,
}

impl PayloadRef {
    /// Packed payload length in bytes.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// One record in the producer → consumer stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Fence(FenceMarker),
    MaskFill(PayloadRef),
}

impl From<FenceMarker> for Command {
    fn from(marker: FenceMarker) -> Self {
        Self::Fence(marker)
    }
}

impl From<PayloadRef> for Command {
    fn from(fill: PayloadRef) -> Self {
        Self::MaskFill(fill)
    }
}

impl Command {
    /// Encoded length in bytes.
    pub const fn encoded_len(&self) -> usize {
        match self {
            Self::Fence(_) => 3 * WORD,
            Self::MaskFill(_) => 6 * WORD,
        }
    }

    /// Appends the encoded record to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        let mut put = |word: i32| out.extend_from_slice(&word.to_le_bytes());
        match *self {
            Self::Fence(marker) => {
                put(OP_MASK_BUFFER_FENCE);
                put(marker.finished_region as i32);
                put(marker.wait_region.map_or(NO_WAIT, |region| region as i32));
            }
            Self::MaskFill(fill) => {
                put(OP_MASK_FILL);
                put(fill.x);
                put(fill.y);
                put(fill.width as i32);
                put(fill.height as i32);
                put(fill.payload_offset.map_or(NO_PAYLOAD, |offset| offset as i32));
            }
        }
    }

    /// Decodes one record from the front of `input`.
    ///
    /// Returns the record and the number of bytes consumed.
    pub fn decode(input: &[u8]) -> Result<(Self, usize), DecodeError> {
        let mut words = Words { input, pos: 0 };
        let command = match words.next()? {
            OP_MASK_BUFFER_FENCE => {
                let finished_region = non_negative("finished_region", words.next()?)?;
                let wait_region = match words.next()? {
                    NO_WAIT => None,
                    value => Some(non_negative("wait_region", value)?),
                };
                Self::Fence(FenceMarker {
                    finished_region,
                    wait_region,
                })
            }
            OP_MASK_FILL => {
                let x = words.next()?;
                let y = words.next()?;
                let width = non_negative("width", words.next()?)? as u32;
                let height = non_negative("height", words.next()?)? as u32;
                let payload_offset = match words.next()? {
                    NO_PAYLOAD => None,
                    value => Some(non_negative("payload_offset", value)?),
                };
                Self::MaskFill(PayloadRef {
                    x,
                    y,
                    width,
                    height,
                    payload_offset,
                })
            }
            opcode => return Err(DecodeError::UnknownOpcode(opcode)),
        };
        Ok((command, words.pos))
    }
}

struct Words<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Words<'_> {
    fn next(&mut self) -> Result<i32, DecodeError> {
        let end = self.pos + WORD;
        let bytes = self
            .input
            .get(self.pos..end)
            .ok_or(DecodeError::Truncated {
                needed: end,
                available: self.input.len(),
            })?;
        self.pos = end;
        let mut word = [0; WORD];
        word.copy_from_slice(bytes);
        Ok(i32::from_le_bytes(word))
    }
}

fn non_negative(field: &'static str, value: i32) -> Result<usize, DecodeError> {
    usize::try_from(value).map_err(|_| DecodeError::InvalidField { field, value })
}

/// Ordered, append-only channel to the consumer.
///
/// Records must be observed by the consumer in the order they were pushed.
pub trait CommandSink {
    /// Appends a record.
    fn push(&mut self, command: Command) -> Result<(), SinkError>;

    /// Synchronously executes every queued record.
    ///
    /// Used by the producer while it waits for a region to be released.
    fn drain_now(&mut self) -> Result<(), SinkError>;
}

impl<S: CommandSink + ?Sized> CommandSink for &mut S {
    fn push(&mut self, command: Command) -> Result<(), SinkError> {
        (**self).push(command)
    }

    fn drain_now(&mut self) -> Result<(), SinkError> {
        (**self).drain_now()
    }
}

/// Records commands without executing them; `drain_now` does nothing.
impl CommandSink for Vec<Command> {
    fn push(&mut self, command: Command) -> Result<(), SinkError> {
        Vec::push(self, command);
        Ok(())
    }

    fn drain_now(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fence_wire_layout() {
        let mut out = Vec::new();
        Command::Fence(FenceMarker {
            finished_region: 1,
            wait_region: None,
        })
        .encode(&mut out);

        let mut expected = Vec::new();
        for word in [OP_MASK_BUFFER_FENCE, 1, -1] {
            expected.extend_from_slice(&word.to_le_bytes());
        }
        assert_eq!(out, expected);
    }

    #[test]
    fn test_decode_stream() {
        let records = [
            Command::MaskFill(PayloadRef {
                x: -3,
                y: 7,
                width: 4,
                height: 2,
                payload_offset: Some(1100),
            }),
            Command::Fence(FenceMarker {
                finished_region: 0,
                wait_region: Some(2),
            }),
            Command::MaskFill(PayloadRef {
                x: 0,
                y: 0,
                width: 16,
                height: 16,
                payload_offset: None,
            }),
        ];
        let mut stream = Vec::new();
        for record in &records {
            record.encode(&mut stream);
        }

        let mut pos = 0;
        let mut decoded = Vec::new();
        while pos < stream.len() {
            let (command, used) = Command::decode(&stream[pos..]).unwrap();
            assert_eq!(used, command.encoded_len());
            decoded.push(command);
            pos += used;
        }
        assert_eq!(decoded, records);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert_eq!(
            Command::decode(&[0, 0]),
            Err(DecodeError::Truncated {
                needed: 4,
                available: 2
            })
        );
        assert_eq!(
            Command::decode(&99i32.to_le_bytes()),
            Err(DecodeError::UnknownOpcode(99))
        );

        let mut bad = Vec::new();
        for word in [OP_MASK_BUFFER_FENCE, 0, -5] {
            bad.extend_from_slice(&word.to_le_bytes());
        }
        assert_eq!(
            Command::decode(&bad),
            Err(DecodeError::InvalidField {
                field: "wait_region",
                value: -5
            })
        );

        let mut short = Vec::new();
        Command::Fence(FenceMarker {
            finished_region: 2,
            wait_region: Some(0),
        })
        .encode(&mut short);
        short.pop();
        assert!(matches!(Command::decode(&short), Err(DecodeError::Truncated { .. })));
    }

    #[test]
    fn test_vec_sink_records_in_order() {
        let mut sink: Vec<Command> = Vec::new();
        let marker = FenceMarker {
            finished_region: 3,
            wait_region: Some(1),
        };
        CommandSink::push(&mut sink, marker.into()).unwrap();
        sink.drain_now().unwrap();
        assert_eq!(sink, vec![Command::Fence(marker)]);
    }
}
