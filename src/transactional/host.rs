//! Access to the active transaction of a request context.

use super::adapter::{TransactionOptions, TransactionalAdapter};
use super::propagation::Propagation;
use crate::cls::ClsContext;
use crate::error::TransactionalError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Prefix of the context key holding the active transaction of a connection.
const TRANSACTION_SLOT_PREFIX: &str = "cls-transactional:";

/// Active transaction published into a context.
struct ActiveTransaction<C> {
    client: C,
    /// 0 for a top-level transaction, +1 per nested scope.
    depth: usize,
}

/// Exposes the transactional handle of the active context for one named
/// connection and starts transactions through its adapter.
pub struct TransactionHost<A: TransactionalAdapter> {
    adapter: Arc<A>,
    connection_name: Arc<str>,
}

impl<A: TransactionalAdapter> Clone for TransactionHost<A> {
    fn clone(&self) -> Self {
        Self {
            adapter: Arc::clone(&self.adapter),
            connection_name: Arc::clone(&self.connection_name),
        }
    }
}

impl<A: TransactionalAdapter> fmt::Debug for TransactionHost<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionHost")
            .field("connection_name", &self.connection_name)
            .field("backend", &self.adapter.name())
            .finish()
    }
}

impl<A: TransactionalAdapter> TransactionHost<A> {
    pub fn new(adapter: A, connection_name: impl Into<Arc<str>>) -> Self {
        Self {
            adapter: Arc::new(adapter),
            connection_name: connection_name.into(),
        }
    }

    pub fn connection_name(&self) -> &str {
        &self.connection_name
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    fn slot_key(&self) -> String {
        format!("{}{}", TRANSACTION_SLOT_PREFIX, self.connection_name)
    }

    fn active(&self, ctx: &ClsContext) -> Option<Arc<ActiveTransaction<A::Client>>> {
        ctx.get::<ActiveTransaction<A::Client>>(&self.slot_key())
    }

    /// The active transactional handle, or the adapter's fallback instance
    /// when no transaction is active in `ctx`.
    pub fn tx(&self, ctx: &ClsContext) -> A::Client {
        match self.active(ctx) {
            Some(active) => active.client.clone(),
            None => self.adapter.fallback_instance(),
        }
    }

    pub fn is_transaction_active(&self, ctx: &ClsContext) -> bool {
        self.active(ctx).is_some()
    }

    /// Nesting depth of the active transaction (0 = top level).
    pub fn transaction_depth(&self, ctx: &ClsContext) -> Option<usize> {
        self.active(ctx).map(|active| active.depth)
    }

    /// Run `f` in a transaction with the adapter's default options.
    pub async fn with_transaction<T, E, F, Fut>(&self, ctx: &ClsContext, f: F) -> Result<T, E>
    where
        F: FnOnce(ClsContext) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: From<TransactionalError> + fmt::Display + Send,
    {
        self.with_transaction_propagation(ctx, Propagation::default(), None, f)
            .await
    }

    /// Run `f` in a transaction with `options` layered over the defaults.
    pub async fn with_transaction_options<T, E, F, Fut>(
        &self,
        ctx: &ClsContext,
        options: A::Options,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce(ClsContext) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: From<TransactionalError> + fmt::Display + Send,
    {
        self.with_transaction_propagation(ctx, Propagation::default(), Some(options), f)
            .await
    }

    /// Run `f` according to `propagation`.
    ///
    /// `f` receives the context to use for its own calls: a fork of `ctx`
    /// carrying the new handle when a transaction or save point is opened,
    /// `ctx` without any handle for [`Propagation::NotSupported`], and `ctx`
    /// itself otherwise. Options are ignored when an active transaction is
    /// reused.
    pub async fn with_transaction_propagation<T, E, F, Fut>(
        &self,
        ctx: &ClsContext,
        propagation: Propagation,
        options: Option<A::Options>,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce(ClsContext) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: From<TransactionalError> + fmt::Display + Send,
    {
        let active = self.active(ctx);
        debug!(
            connection = %self.connection_name,
            propagation = %propagation,
            active = active.is_some(),
            request_id = %ctx.id(),
            "Entering transactional scope"
        );

        match (propagation, active) {
            (Propagation::Mandatory, None) => {
                Err(TransactionalError::not_active(self.connection_name.as_ref()).into())
            }
            (Propagation::Never, Some(_)) => {
                Err(TransactionalError::already_active(self.connection_name.as_ref()).into())
            }
            (Propagation::NotSupported, _) => f(ctx.without(&self.slot_key())).await,
            (Propagation::Nested, Some(parent)) => {
                self.run_nested(ctx, options, &parent, f).await
            }
            (Propagation::RequiresNew, _) | (Propagation::Required | Propagation::Nested, None) => {
                self.run_new(ctx, options, f).await
            }
            (Propagation::Required | Propagation::Supports | Propagation::Mandatory, Some(_))
            | (Propagation::Supports | Propagation::Never, None) => f(ctx.clone()).await,
        }
    }

    /// Run `f` with no active transaction, even if `ctx` has one.
    pub async fn without_transaction<T, F, Fut>(&self, ctx: &ClsContext, f: F) -> T
    where
        F: FnOnce(ClsContext) -> Fut,
        Fut: Future<Output = T>,
    {
        f(ctx.without(&self.slot_key())).await
    }

    fn merged_options(&self, options: Option<A::Options>) -> A::Options {
        let defaults = self.adapter.default_options();
        match options {
            Some(overrides) => defaults.merge(&overrides),
            None => defaults.clone(),
        }
    }

    async fn run_new<T, E, F, Fut>(
        &self,
        ctx: &ClsContext,
        options: Option<A::Options>,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce(ClsContext) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: From<TransactionalError> + fmt::Display + Send,
    {
        let options = self.merged_options(options);
        let key = self.slot_key();
        let ctx = ctx.clone();
        self.adapter
            .wrap_with_transaction(options, move |client| {
                f(ctx.with(key, ActiveTransaction { client, depth: 0 }))
            })
            .await
    }

    async fn run_nested<T, E, F, Fut>(
        &self,
        ctx: &ClsContext,
        options: Option<A::Options>,
        parent: &ActiveTransaction<A::Client>,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce(ClsContext) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: From<TransactionalError> + fmt::Display + Send,
    {
        let options = self.merged_options(options);
        let key = self.slot_key();
        let depth = parent.depth + 1;
        let ctx = ctx.clone();
        self.adapter
            .wrap_with_nested_transaction(
                options,
                move |client| f(ctx.with(key, ActiveTransaction { client, depth })),
                parent.client.clone(),
            )
            .await
    }
}
