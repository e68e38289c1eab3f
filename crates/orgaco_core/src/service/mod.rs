//! Use-case services over the repository layer.
//!
//! # Responsibility
//! - Orchestrate load/find/update/insert flows for callers.
//! - Keep presentation layers decoupled from storage details.

pub mod record_store;
