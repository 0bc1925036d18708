//! Transaction management layered over continuation-local storage.
//!
//! This module provides:
//! - The adapter contract implemented once per backing client
//! - The transaction host exposing the active handle of a context
//! - Propagation modes for calls made while a transaction is active
//! - Plugin registration for named connections

pub mod adapter;
pub mod host;
pub mod plugin;
pub mod propagation;

pub use adapter::{TransactionOptions, TransactionalAdapter, generate_transaction_id};
pub use host::TransactionHost;
pub use plugin::{DEFAULT_CONNECTION_NAME, TransactionalPlugin};
pub use propagation::Propagation;
