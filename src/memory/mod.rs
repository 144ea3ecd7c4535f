//! Long-term memory bank

pub mod atomic;
pub mod bank;

pub use bank::{MemoryBank, MemoryEntry, MemoryMatch, MemoryStats};
