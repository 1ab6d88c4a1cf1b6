//! Domain model shared by both stores.
//!
//! # Responsibility
//! - Define the item record and its write payload.
//! - Keep input and identity validation in one place.
//!
//! # Invariants
//! - Every persisted item is identified by a server-assigned `ItemId`.
//! - Deletion is a hard delete in both stores; there are no tombstones.

pub mod item;
