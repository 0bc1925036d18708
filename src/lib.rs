//! cls-transactional
//!
//! Context-scoped transaction management for async Rust. A request carries a
//! [`ClsContext`]; a [`TransactionHost`] publishes the active transaction into
//! it so repositories can run their queries on whatever handle is current,
//! whether that is a transaction, a save point or the plain pool.
//!
//! Backing clients plug in through [`TransactionalAdapter`]. Adapters are
//! provided for sqlx (PostgreSQL, MySQL, SQLite) and for an in-memory
//! document store.

pub mod adapters;
pub mod cls;
pub mod config;
pub mod db;
pub mod error;
pub mod module;
pub mod transactional;
pub mod users;

pub use cls::{ClsContext, ClsService};
pub use config::Config;
pub use error::{TransactionalError, TransactionalResult};
pub use module::{ClsModule, ClsModuleBuilder};
pub use transactional::{Propagation, TransactionHost, TransactionalAdapter, TransactionalPlugin};
