//! Adapters translating the transactional contract onto client libraries.
//!
//! - `sql`: sqlx pools for PostgreSQL, MySQL and SQLite, nested scopes as save points
//! - `memory`: in-memory document store, no nested transactions

pub mod memory;
pub mod sql;

pub use memory::{DocumentSession, DocumentStore, MemoryAdapter, MemoryTransactionOptions};
pub use sql::{
    MySqlAdapter, PgAdapter, SqlTransactionOptions, SqliteAdapter, SqlxAdapter, SqlxClient,
};
