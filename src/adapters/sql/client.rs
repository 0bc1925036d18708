//! Handles exposed to application code by the sqlx adapters.

use super::dialect::SqlDialect;
use crate::error::{TransactionalError, TransactionalResult};
use sqlx::Pool;
use sqlx::pool::PoolConnection;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;

/// Pooled connection with an open transaction.
///
/// If it is dropped before commit or rollback completed, the connection is
/// closed rather than returned to the pool with a transaction still open.
pub struct TxConnection<DB: SqlDialect> {
    conn: PoolConnection<DB>,
    transaction_id: String,
    /// Number of save points currently open.
    savepoint_depth: usize,
    finished: bool,
}

impl<DB: SqlDialect> TxConnection<DB> {
    pub(crate) fn new(conn: PoolConnection<DB>, transaction_id: String) -> Self {
        Self {
            conn,
            transaction_id,
            savepoint_depth: 0,
            finished: false,
        }
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    pub(crate) fn push_savepoint(&mut self) -> usize {
        self.savepoint_depth += 1;
        self.savepoint_depth
    }

    pub(crate) fn pop_savepoint(&mut self) {
        self.savepoint_depth = self.savepoint_depth.saturating_sub(1);
    }

    pub(crate) fn mark_finished(&mut self) {
        self.finished = true;
    }

    pub(crate) fn ensure_active(&self) -> TransactionalResult<()> {
        if self.finished {
            return Err(TransactionalError::finished(&self.transaction_id));
        }
        Ok(())
    }

    pub(crate) async fn execute(&mut self, sql: &str) -> Result<(), sqlx::Error> {
        DB::execute_raw(&mut self.conn, sql).await
    }
}

impl<DB: SqlDialect> Deref for TxConnection<DB> {
    type Target = DB::Connection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl<DB: SqlDialect> DerefMut for TxConnection<DB> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl<DB: SqlDialect> Drop for TxConnection<DB> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                transaction_id = %self.transaction_id,
                "Transaction dropped before completion, closing its connection"
            );
            self.conn.close_on_drop();
        }
    }
}

/// Shared handle to one open transaction.
pub struct TransactionHandle<DB: SqlDialect> {
    inner: Arc<Mutex<TxConnection<DB>>>,
    transaction_id: Arc<str>,
}

impl<DB: SqlDialect> TransactionHandle<DB> {
    pub(crate) fn new(tx: TxConnection<DB>) -> Self {
        let transaction_id: Arc<str> = Arc::from(tx.transaction_id());
        Self {
            inner: Arc::new(Mutex::new(tx)),
            transaction_id,
        }
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    pub(crate) async fn lock(&self) -> tokio::sync::MutexGuard<'_, TxConnection<DB>> {
        self.inner.lock().await
    }

    /// Lock the connection unless someone already holds it.
    pub(crate) fn try_lock(&self) -> Option<tokio::sync::MutexGuard<'_, TxConnection<DB>>> {
        self.inner.try_lock().ok()
    }

    async fn lock_owned(&self) -> OwnedMutexGuard<TxConnection<DB>> {
        Arc::clone(&self.inner).lock_owned().await
    }
}

impl<DB: SqlDialect> Clone for TransactionHandle<DB> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            transaction_id: Arc::clone(&self.transaction_id),
        }
    }
}

/// Client handed to application code: the pool outside a transaction, the
/// transaction's connection inside one.
pub enum SqlxClient<DB: SqlDialect> {
    Pool(Pool<DB>),
    Transaction(TransactionHandle<DB>),
}

impl<DB: SqlDialect> SqlxClient<DB> {
    pub fn is_transactional(&self) -> bool {
        matches!(self, Self::Transaction(_))
    }

    pub fn transaction_id(&self) -> Option<&str> {
        match self {
            Self::Pool(_) => None,
            Self::Transaction(handle) => Some(handle.transaction_id()),
        }
    }

    /// Connection to run queries on.
    ///
    /// Inside a transaction this locks the shared connection: drop the guard
    /// before starting nested transactional work in the same context.
    pub async fn acquire(&self) -> TransactionalResult<SqlxConnection<DB>> {
        match self {
            Self::Pool(pool) => Ok(SqlxConnection::Pooled(pool.acquire().await?)),
            Self::Transaction(handle) => {
                let guard = handle.lock_owned().await;
                guard.ensure_active()?;
                Ok(SqlxConnection::Transaction(guard))
            }
        }
    }
}

impl<DB: SqlDialect> Clone for SqlxClient<DB> {
    fn clone(&self) -> Self {
        match self {
            Self::Pool(pool) => Self::Pool(pool.clone()),
            Self::Transaction(handle) => Self::Transaction(handle.clone()),
        }
    }
}

impl<DB: SqlDialect> fmt::Debug for SqlxClient<DB> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pool(_) => f.debug_tuple("Pool").field(&<DB as SqlDialect>::NAME).finish(),
            Self::Transaction(handle) => f
                .debug_struct("Transaction")
                .field("backend", &<DB as SqlDialect>::NAME)
                .field("transaction_id", &handle.transaction_id())
                .finish(),
        }
    }
}

/// Connection guard returned by [`SqlxClient::acquire`].
///
/// Dereferences to the driver connection, so `&mut *conn` can be passed to
/// any sqlx query.
pub enum SqlxConnection<DB: SqlDialect> {
    Pooled(PoolConnection<DB>),
    Transaction(OwnedMutexGuard<TxConnection<DB>>),
}

impl<DB: SqlDialect> Deref for SqlxConnection<DB> {
    type Target = DB::Connection;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Pooled(conn) => conn,
            Self::Transaction(guard) => guard,
        }
    }
}

impl<DB: SqlDialect> DerefMut for SqlxConnection<DB> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Self::Pooled(conn) => conn,
            Self::Transaction(guard) => guard,
        }
    }
}
