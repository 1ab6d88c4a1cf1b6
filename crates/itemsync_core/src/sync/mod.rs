//! Dual-store synchronization building blocks.
//!
//! # Responsibility
//! - Hold the cursor and merge rules used by the item service.
//! - Stamp writes with timestamps usable as a sync cursor.

pub mod clock;
pub mod policy;
