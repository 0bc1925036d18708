//! Application builder.
//!
//! All CLS and transactional configuration is gathered into one explicit
//! [`ClsModule`] value at startup instead of being registered globally.

use crate::cls::{ClsContext, ClsOptions, ClsService};
use crate::error::{TransactionalError, TransactionalResult};
use crate::transactional::{
    DEFAULT_CONNECTION_NAME, TransactionHost, TransactionalAdapter, TransactionalPlugin,
};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

type HostEntry = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
pub struct ClsModuleBuilder {
    options: ClsOptions,
    hosts: Vec<(String, &'static str, HostEntry)>,
}

impl ClsModuleBuilder {
    pub fn options(mut self, options: ClsOptions) -> Self {
        self.options = options;
        self
    }

    pub fn plugin<A: TransactionalAdapter>(mut self, plugin: TransactionalPlugin<A>) -> Self {
        let name = plugin.name().to_string();
        let host = plugin.into_host();
        let backend = host.adapter().name();
        self.hosts.push((name, backend, Arc::new(host)));
        self
    }

    /// Build the module. Fails on a blank connection name or if two plugins
    /// share one.
    pub fn build(self) -> TransactionalResult<ClsModule> {
        let mut hosts = HashMap::with_capacity(self.hosts.len());
        for (name, backend, host) in self.hosts {
            if name.trim().is_empty() {
                return Err(TransactionalError::configuration(
                    "Connection name cannot be empty",
                ));
            }
            if hosts.contains_key(&name) {
                return Err(TransactionalError::configuration(format!(
                    "Connection '{}' is registered more than once",
                    name
                )));
            }
            info!(connection = %name, backend = backend, "Registered transactional plugin");
            hosts.insert(name, host);
        }

        Ok(ClsModule {
            cls: ClsService::new(self.options),
            hosts,
        })
    }
}

/// Configured CLS service plus every registered transaction host.
#[derive(Clone)]
pub struct ClsModule {
    cls: ClsService,
    hosts: HashMap<String, HostEntry>,
}

impl ClsModule {
    pub fn builder() -> ClsModuleBuilder {
        ClsModuleBuilder::default()
    }

    pub fn cls(&self) -> &ClsService {
        &self.cls
    }

    /// Shorthand for `self.cls().enter()`.
    pub fn enter(&self) -> ClsContext {
        self.cls.enter()
    }

    /// Typed host for `connection_name`.
    pub fn transaction_host<A: TransactionalAdapter>(
        &self,
        connection_name: &str,
    ) -> TransactionalResult<TransactionHost<A>> {
        let entry = self.hosts.get(connection_name).ok_or_else(|| {
            TransactionalError::configuration(format!(
                "No transactional plugin registered for connection '{}'",
                connection_name
            ))
        })?;
        entry
            .downcast_ref::<TransactionHost<A>>()
            .cloned()
            .ok_or_else(|| {
                TransactionalError::configuration(format!(
                    "Connection '{}' is registered with a different adapter type",
                    connection_name
                ))
            })
    }

    pub fn default_transaction_host<A: TransactionalAdapter>(
        &self,
    ) -> TransactionalResult<TransactionHost<A>> {
        self.transaction_host(DEFAULT_CONNECTION_NAME)
    }

    pub fn connection_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.hosts.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ClsModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClsModule")
            .field("cls", &self.cls)
            .field("connections", &self.connection_names())
            .finish()
    }
}
