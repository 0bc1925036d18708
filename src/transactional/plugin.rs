//! Registration of transactional hosts at application bootstrap.

use super::adapter::TransactionalAdapter;
use super::host::TransactionHost;

/// Connection name used when a plugin does not set one.
pub const DEFAULT_CONNECTION_NAME: &str = "default";

/// One adapter bound to a connection name, ready to be registered with
/// [`crate::ClsModuleBuilder::plugin`].
pub struct TransactionalPlugin<A: TransactionalAdapter> {
    adapter: A,
    connection_name: String,
}

impl<A: TransactionalAdapter> TransactionalPlugin<A> {
    pub fn new(adapter: A) -> Self {
        Self {
            adapter,
            connection_name: DEFAULT_CONNECTION_NAME.to_string(),
        }
    }

    /// Register under a named connection, for applications with several databases.
    pub fn connection_name(mut self, name: impl Into<String>) -> Self {
        self.connection_name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.connection_name
    }

    pub fn into_host(self) -> TransactionHost<A> {
        TransactionHost::new(self.adapter, self.connection_name)
    }
}
