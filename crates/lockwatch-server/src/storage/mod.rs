//! SQLite storage for the Lockwatch server.
//!
//! Provides persistence for users, tokens, devices, and block periods.

mod db;
mod models;
mod queries;

#[cfg(test)]
mod tests;

pub use db::ServerDatabase;
pub use lockwatch_core::db::DatabaseError;
pub use models::*;
