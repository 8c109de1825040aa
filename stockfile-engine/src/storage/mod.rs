//! Storage layer for the stockfile data file
//!
//! This module handles the low-level binary format:
//! - Fixed-size slot encoding and decoding
//! - Tombstone flags
//! - Slot-addressed file I/O

pub mod record;
pub mod slot_file;

pub use record::{Record, SlotFlags, SLOT_SIZE, TEXT_CAPACITY};
pub use slot_file::SlotFile;
