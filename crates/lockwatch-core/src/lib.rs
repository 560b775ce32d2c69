//! Lockwatch Core Library
//!
//! Shared functionality for Lockwatch components:
//! - `SQLite` pool helpers and the `define_database!` macro
//! - Tracing/logging initialization

pub mod db;
pub mod tracing_init;
