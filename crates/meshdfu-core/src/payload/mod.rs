//! Payload handling module.
//!
//! Firmware image loading and segmentation for DFU_DATA.

pub mod firmware;

pub use firmware::{FirmwareError, FirmwareImage, SegmentCursor};
