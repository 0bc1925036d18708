//! The uniform contract every backing client implements.

use crate::error::TransactionalError;
use std::fmt;
use std::future::Future;

/// Options bag for one adapter.
///
/// All fields are expected to be optional so that call-site options can be
/// layered over adapter defaults.
pub trait TransactionOptions: Clone + Default + fmt::Debug + Send + Sync + 'static {
    /// Fields set in `overrides` win, unset ones fall back to `self`.
    fn merge(&self, overrides: &Self) -> Self;
}

/// Translates "run this work in a transaction" onto one client library.
///
/// The transactional handle is handed to `work` before any of its own code
/// runs. On `Ok` the transaction is committed, on `Err` it is rolled back and
/// the error is returned. A failed rollback is reported as
/// [`TransactionalError::Rollback`] carrying the original error's message.
pub trait TransactionalAdapter: Send + Sync + 'static {
    /// Handle exposed to application code, transactional or not.
    type Client: Clone + Send + Sync + 'static;
    type Options: TransactionOptions;

    /// Backend label used in logs.
    fn name(&self) -> &'static str;

    fn default_options(&self) -> &Self::Options;

    /// Non-transactional handle for code running outside any transaction.
    fn fallback_instance(&self) -> Self::Client;

    fn wrap_with_transaction<T, E, F, Fut>(
        &self,
        options: Self::Options,
        work: F,
    ) -> impl Future<Output = Result<T, E>> + Send
    where
        F: FnOnce(Self::Client) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: From<TransactionalError> + fmt::Display + Send;

    /// Whether [`TransactionalAdapter::wrap_with_nested_transaction`] opens a
    /// real save point.
    fn supports_nested(&self) -> bool {
        false
    }

    /// Run `work` in a save point inside `parent`.
    ///
    /// The default reuses `parent` as is: an inner failure then surfaces to
    /// the outer scope and rolls back the whole transaction.
    fn wrap_with_nested_transaction<T, E, F, Fut>(
        &self,
        options: Self::Options,
        work: F,
        parent: Self::Client,
    ) -> impl Future<Output = Result<T, E>> + Send
    where
        F: FnOnce(Self::Client) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: From<TransactionalError> + fmt::Display + Send,
    {
        let backend = self.name();
        async move {
            tracing::debug!(
                backend = backend,
                options = ?options,
                "Nested transactions not supported, reusing parent handle"
            );
            work(parent).await
        }
    }
}

/// Generate a unique transaction ID.
pub fn generate_transaction_id() -> String {
    format!("tx_{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_format() {
        let id = generate_transaction_id();
        assert!(id.starts_with("tx_"));
        assert_eq!(id.len(), 3 + 32); // "tx_" + 32 hex chars
    }

    #[test]
    fn test_transaction_ids_are_unique() {
        assert_ne!(generate_transaction_id(), generate_transaction_id());
    }
}
