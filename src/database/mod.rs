//! linksync database layer.
//!
//! Provides SQLite connection management and schema migrations. The schema is
//! a single key-value table; the typed view over it lives in
//! [`crate::services::local_store`].
//!
//! # Usage
//!
//! ```no_run
//! use linksync::database::Database;
//!
//! let db = Database::open("linksync.db").expect("failed to open database");
//! let conn = db.connection();
//! ```

pub mod connection;
pub mod migrations;

pub use connection::Database;
