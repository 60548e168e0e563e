//! Firmware image loading and 16-byte segmentation.
//!
//! Segments are numbered from 1. Each DFU_DATA payload is the segment's
//! bytes zero-padded to [`SEGMENT_SIZE`] and reversed into little-endian
//! transmission order.

use std::path::Path;

use thiserror::Error;

use crate::protocol::constants::{SEGMENT_SIZE, WORD_SIZE};
use crate::protocol::field::Field;

#[derive(Error, Debug)]
pub enum FirmwareError {
    #[error("Firmware image is empty")]
    Empty,
    #[error("Firmware needs {segments} segments, at most {max} can be numbered")]
    TooLarge { segments: usize, max: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Firmware image to transfer.
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    data: Vec<u8>,
}

impl FirmwareImage {
    /// Largest segment number the `segment` field can carry.
    pub const MAX_SEGMENTS: usize = Field::Segment.max_value() as usize;

    pub fn from_bytes(data: Vec<u8>) -> Result<Self, FirmwareError> {
        if data.is_empty() {
            return Err(FirmwareError::Empty);
        }
        let segments = data.len().div_ceil(SEGMENT_SIZE);
        if segments > Self::MAX_SEGMENTS {
            return Err(FirmwareError::TooLarge {
                segments,
                max: Self::MAX_SEGMENTS,
            });
        }
        Ok(Self { data })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, FirmwareError> {
        Self::from_bytes(std::fs::read(path)?)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of DFU_DATA segments, `ceil(len / 16)`.
    pub fn segment_count(&self) -> usize {
        self.data.len().div_ceil(SEGMENT_SIZE)
    }

    /// START_DFU `length`: image size in 32-bit words, rounded up.
    pub fn length_words(&self) -> u32 {
        self.data.len().div_ceil(WORD_SIZE) as u32
    }

    /// Wire payload for 1-based `segment`.
    pub fn segment_payload(&self, segment: usize) -> Option<[u8; SEGMENT_SIZE]> {
        if segment == 0 || segment > self.segment_count() {
            return None;
        }
        let start = (segment - 1) * SEGMENT_SIZE;
        let end = (start + SEGMENT_SIZE).min(self.data.len());

        let mut chunk = [0u8; SEGMENT_SIZE];
        chunk[..end - start].copy_from_slice(&self.data[start..end]);
        chunk.reverse();
        Some(chunk)
    }
}

/// Segment cursor for one transfer.
///
/// `next` is the 1-based segment to send next. It stops at `total + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentCursor {
    /// Next segment number.
    pub next: usize,
    /// Total number of segments.
    pub total: usize,
}

impl Default for SegmentCursor {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SegmentCursor {
    pub fn new(total: usize) -> Self {
        Self { next: 1, total }
    }

    /// Take the next segment number, advancing the cursor.
    pub fn advance(&mut self) -> Option<usize> {
        if self.next > self.total {
            return None;
        }
        let segment = self.next;
        self.next += 1;
        Some(segment)
    }

    /// Segments handed out so far.
    pub fn sent(&self) -> usize {
        self.next - 1
    }

    pub fn is_done(&self) -> bool {
        self.next > self.total
    }

    pub fn reset(&mut self) {
        self.next = 1;
    }

    /// Progress as percentage.
    pub fn progress_pct(&self) -> u8 {
        if self.total == 0 {
            100
        } else {
            ((self.sent() * 100) / self.total) as u8
        }
    }
}
