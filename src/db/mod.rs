//! Database connection setup.
//!
//! Creates sqlx pools for the supported databases so they can be handed to
//! the adapters in [`crate::adapters::sql`].

pub mod pool;

pub use pool::{
    DatabaseType, connect_mysql, connect_postgres, connect_sqlite, masked_connection_string,
};
