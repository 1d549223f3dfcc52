//! Realtime listener lifecycle.
//!
//! # Responsibility
//! - Track per-scope subscription factories and their live teardowns.
//! - React to process foreground/background transitions.
//! - Apply the active-view policy and view-lifetime adapters on top.

pub mod hooks;
pub mod manager;
pub mod policy;
pub mod source;
