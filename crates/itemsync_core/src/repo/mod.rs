//! Local cache layer.
//!
//! # Responsibility
//! - Define the cache contract the sync service depends on.
//! - Isolate SQLite query details from sync orchestration.
//!
//! # Invariants
//! - Cache APIs return semantic errors (`NotFound`, `Duplicate`) in addition
//!   to DB transport errors.

pub mod item_cache;
