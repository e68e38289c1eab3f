//! Domain model for group association records.
//!
//! # Responsibility
//! - Define the fixed record shape and its column allow-list.
//! - Keep field validation next to the data it guards.

pub mod record;
