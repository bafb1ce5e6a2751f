//! Serial report frames
//!
//! Each published snapshot is sent as one `postcard` record, COBS encoded so
//! the zero byte only ever appears as the frame delimiter. A reader that joins
//! the stream mid-frame resynchronises at the next zero.

use heapless::Vec;
use thiserror_no_std::Error;

use crate::classification::ClassificationSnapshot;

/// Upper bound of one encoded frame, delimiter included.
pub const FRAME_CAPACITY: usize = 128;

const DELIMITER: u8 = 0x00;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportError {
    #[error("report does not fit in the frame buffer")]
    BufferFull,
    #[error("malformed report frame")]
    Malformed,
}

impl From<postcard::Error> for ReportError {
    fn from(e: postcard::Error) -> Self {
        match e {
            postcard::Error::SerializeBufferFull => Self::BufferFull,
            _ => Self::Malformed,
        }
    }
}

/// Encode `snapshot` into `buf`, returning the frame including its trailing delimiter.
pub fn encode_frame<'b>(
    snapshot: &ClassificationSnapshot,
    buf: &'b mut [u8],
) -> Result<&'b mut [u8], ReportError> {
    Ok(postcard::to_slice_cobs(snapshot, buf)?)
}

/// Decode one frame in place. The trailing delimiter is optional.
pub fn decode_frame(frame: &mut [u8]) -> Result<ClassificationSnapshot, ReportError> {
    if frame.iter().all(|b| *b == DELIMITER) {
        return Err(ReportError::Malformed);
    }
    Ok(postcard::from_bytes_cobs(frame)?)
}

/// Splits a byte stream into frames.
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    buf: Vec<u8, FRAME_CAPACITY>,
    overflowed: bool,
}

impl FrameAccumulator {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            overflowed: false,
        }
    }

    /// Feed one byte. Returns a result whenever a delimiter closes a frame.
    pub fn push(&mut self, byte: u8) -> Option<Result<ClassificationSnapshot, ReportError>> {
        if byte != DELIMITER {
            if self.buf.push(byte).is_err() {
                self.overflowed = true;
            }
            return None;
        }

        let result = if self.overflowed {
            Err(ReportError::BufferFull)
        } else {
            decode_frame(&mut self.buf)
        };
        self.buf.clear();
        self.overflowed = false;
        Some(result)
    }
}
