// Database service module
// SQLite connection and schema management for the scheduling core

mod connection;
pub mod migrations;
mod schema;

pub use connection::Database;
