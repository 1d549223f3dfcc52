//! Domain model for scoped inventory records.
//!
//! # Responsibility
//! - Define scope identity and the records the core moves between scopes.
//!
//! # Invariants
//! - Exactly one scope owns a given item at any instant.
//! - Transfer requests are append-only from the client's point of view.

pub mod item;
pub mod scope;
pub mod transfer;
