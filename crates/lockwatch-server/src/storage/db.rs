//! SQLite database for the Lockwatch server.

lockwatch_core::define_database!(ServerDatabase, "Server database migrations complete");
