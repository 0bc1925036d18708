//! Adapters over sqlx pools for PostgreSQL, MySQL and SQLite.
//!
//! Transactions hold one pooled connection for their whole lifetime and are
//! driven with explicit `BEGIN`/`COMMIT`/`ROLLBACK` statements so that the
//! options bag (isolation level, access mode, SQLite locking) can shape the
//! opening statement. Nested scopes use save points on the same connection.

pub mod client;
pub mod dialect;
pub mod options;

pub use client::{SqlxClient, SqlxConnection, TransactionHandle, TxConnection};
pub use dialect::{Savepoint, SqlDialect};
pub use options::{AccessMode, IsolationLevel, SqlTransactionOptions, SqliteLocking};

use crate::error::{TransactionalError, is_unsupported_code};
use crate::transactional::{TransactionalAdapter, generate_transaction_id};
use sqlx::{MySql, Pool, Postgres, Sqlite};
use std::fmt;
use std::future::Future;
use tracing::{debug, error, info, warn};

pub type PgAdapter = SqlxAdapter<Postgres>;
pub type MySqlAdapter = SqlxAdapter<MySql>;
pub type SqliteAdapter = SqlxAdapter<Sqlite>;

/// Transactional adapter for one sqlx pool.
pub struct SqlxAdapter<DB: SqlDialect> {
    pool: Pool<DB>,
    defaults: SqlTransactionOptions,
}

impl<DB: SqlDialect> SqlxAdapter<DB> {
    pub fn new(pool: Pool<DB>) -> Self {
        Self {
            pool,
            defaults: SqlTransactionOptions::default(),
        }
    }

    pub fn with_default_options(mut self, defaults: SqlTransactionOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn pool(&self) -> &Pool<DB> {
        &self.pool
    }
}

impl<DB: SqlDialect> fmt::Debug for SqlxAdapter<DB> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlxAdapter")
            .field("backend", &<DB as SqlDialect>::NAME)
            .field("defaults", &self.defaults)
            .finish()
    }
}

/// Save point label reported when nothing could be opened.
const SAVEPOINT_NOT_CREATED: &str = "<none>";

/// Whether the database refused a statement as unsupported.
fn is_unsupported(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .is_some_and(|code| is_unsupported_code(&code)),
        _ => false,
    }
}

fn sql_state(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|c| c.to_string()),
        _ => None,
    }
}

impl<DB: SqlDialect> TransactionalAdapter for SqlxAdapter<DB> {
    type Client = SqlxClient<DB>;
    type Options = SqlTransactionOptions;

    fn name(&self) -> &'static str {
        <DB as SqlDialect>::NAME
    }

    fn default_options(&self) -> &Self::Options {
        &self.defaults
    }

    fn fallback_instance(&self) -> Self::Client {
        SqlxClient::Pool(self.pool.clone())
    }

    fn wrap_with_transaction<T, E, F, Fut>(
        &self,
        options: Self::Options,
        work: F,
    ) -> impl Future<Output = Result<T, E>> + Send
    where
        F: FnOnce(Self::Client) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: From<TransactionalError> + fmt::Display + Send,
    {
        async move {
            let conn = self
                .pool
                .acquire()
                .await
                .map_err(|e| TransactionalError::begin(e.to_string(), <DB as SqlDialect>::NAME))?;
            let mut tx = TxConnection::new(conn, generate_transaction_id());

            for statement in DB::begin_statements(&options) {
                if let Err(e) = tx.execute(&statement).await {
                    // Nothing to undo; the connection is closed on drop.
                    error!(
                        transaction_id = %tx.transaction_id(),
                        statement = %statement,
                        error = %e,
                        "Failed to begin transaction"
                    );
                    return Err(TransactionalError::begin(e.to_string(), <DB as SqlDialect>::NAME).into());
                }
            }

            let handle = TransactionHandle::new(tx);
            info!(
                transaction_id = %handle.transaction_id(),
                backend = <DB as SqlDialect>::NAME,
                options = ?options,
                "Transaction started"
            );

            let result = work(SqlxClient::Transaction(handle.clone())).await;

            let mut tx = handle.lock().await;
            match result {
                Ok(value) => {
                    if let Err(e) = tx.execute("COMMIT").await {
                        error!(
                            transaction_id = %handle.transaction_id(),
                            error = %e,
                            "Commit failed"
                        );
                        return Err(
                            TransactionalError::commit(e.to_string(), handle.transaction_id())
                                .into(),
                        );
                    }
                    tx.mark_finished();
                    info!(transaction_id = %handle.transaction_id(), "Transaction committed");
                    Ok(value)
                }
                Err(err) => match tx.execute("ROLLBACK").await {
                    Ok(()) => {
                        tx.mark_finished();
                        info!(
                            transaction_id = %handle.transaction_id(),
                            error = %err,
                            "Transaction rolled back"
                        );
                        Err(err)
                    }
                    Err(e) => {
                        error!(
                            transaction_id = %handle.transaction_id(),
                            error = %e,
                            original = %err,
                            "Rollback failed"
                        );
                        Err(TransactionalError::rollback(
                            e.to_string(),
                            handle.transaction_id(),
                            err.to_string(),
                        )
                        .into())
                    }
                },
            }
        }
    }

    fn supports_nested(&self) -> bool {
        true
    }

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
        async move {
            let handle = match &parent {
                SqlxClient::Transaction(handle) => handle.clone(),
                SqlxClient::Pool(_) => {
                    debug!(backend = <DB as SqlDialect>::NAME, "No parent transaction, starting a new one");
                    return self.wrap_with_transaction(options, work).await;
                }
            };

            if !options.is_empty() {
                debug!(
                    transaction_id = %handle.transaction_id(),
                    options = ?options,
                    "Options ignored for save points"
                );
            }

            let savepoint = {
                // The enclosing scope may still hold its connection guard on this
                // task; waiting for it would never return.
                let Some(mut tx) = handle.try_lock() else {
                    warn!(
                        transaction_id = %handle.transaction_id(),
                        "Connection held by the enclosing scope, cannot open a save point"
                    );
                    return Err(TransactionalError::savepoint(
                        "Connection is held by the enclosing scope; drop its guard before \
                         opening a nested transaction",
                        SAVEPOINT_NOT_CREATED,
                        None,
                    )
                    .into());
                };
                tx.ensure_active()?;
                let savepoint = Savepoint::for_depth(tx.push_savepoint());
                if let Err(e) = tx.execute(&savepoint.create_sql::<DB>()).await {
                    tx.pop_savepoint();
                    return Err(TransactionalError::savepoint(
                        e.to_string(),
                        savepoint.name(),
                        sql_state(&e),
                    )
                    .into());
                }
                debug!(
                    transaction_id = %handle.transaction_id(),
                    savepoint = %savepoint.name(),
                    depth = savepoint.depth(),
                    "Savepoint created"
                );
                savepoint
            };

            let result = work(parent.clone()).await;

            let mut tx = handle.lock().await;
            tx.pop_savepoint();
            match result {
                Ok(value) => match tx.execute(&savepoint.release_sql::<DB>()).await {
                    Ok(()) => {
                        debug!(
                            transaction_id = %handle.transaction_id(),
                            savepoint = %savepoint.name(),
                            depth = savepoint.depth(),
                            "Savepoint released"
                        );
                        Ok(value)
                    }
                    // The outer COMMIT/ROLLBACK ends the save point anyway.
                    Err(e) if is_unsupported(&e) => {
                        warn!(
                            transaction_id = %handle.transaction_id(),
                            savepoint = %savepoint.name(),
                            error = %e,
                            "Savepoint release not supported, leaving it to the outer transaction"
                        );
                        Ok(value)
                    }
                    Err(e) => Err(TransactionalError::savepoint(
                        e.to_string(),
                        savepoint.name(),
                        sql_state(&e),
                    )
                    .into()),
                },
                Err(err) => match tx.execute(&savepoint.rollback_sql::<DB>()).await {
                    Ok(()) => {
                        debug!(
                            transaction_id = %handle.transaction_id(),
                            savepoint = %savepoint.name(),
                            depth = savepoint.depth(),
                            error = %err,
                            "Rolled back to savepoint"
                        );
                        Err(err)
                    }
                    Err(e) => Err(TransactionalError::rollback(
                        e.to_string(),
                        handle.transaction_id(),
                        err.to_string(),
                    )
                    .into()),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;

    #[derive(Debug, thiserror::Error)]
    #[error("{message}")]
    struct CodedError {
        message: String,
        code: &'static str,
    }

    impl DatabaseError for CodedError {
        fn message(&self) -> &str {
            &self.message
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.code))
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    fn db_error(code: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(CodedError {
            message: format!("error {}", code),
            code,
        }))
    }

    #[test]
    fn test_release_unsupported_by_code() {
        assert!(is_unsupported(&db_error("0A000")));
        assert!(is_unsupported(&db_error("1235")));
        assert!(!is_unsupported(&db_error("3B001")));
        assert!(!is_unsupported(&sqlx::Error::PoolClosed));
    }

    #[test]
    fn test_sql_state_of_database_errors() {
        assert_eq!(sql_state(&db_error("3B001")).as_deref(), Some("3B001"));
        assert_eq!(sql_state(&sqlx::Error::RowNotFound), None);
    }

    #[tokio::test]
    async fn test_adapter_debug_names_backend() {
        let pool = sqlx::SqlitePool::connect_lazy("sqlite::memory:").unwrap();
        let debug = format!("{:?}", SqliteAdapter::new(pool));
        assert!(debug.contains("SQLite"));
    }
}
