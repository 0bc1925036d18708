//! Per-database transaction statements.

use super::options::SqlTransactionOptions;
use futures_util::future::BoxFuture;
use sqlx::{Database, MySql, MySqlConnection, PgConnection, Postgres, Sqlite, SqliteConnection};
use tracing::debug;

/// Transaction control statements for one sqlx database.
pub trait SqlDialect: Database + Sync {
    /// Display name used in logs.
    const NAME: &'static str;

    /// Statements that open a transaction with `options`, in order.
    fn begin_statements(options: &SqlTransactionOptions) -> Vec<String>;

    fn quote_identifier(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Run one statement through the simple-query path, ignoring its result.
    fn execute_raw<'c>(
        conn: &'c mut <Self as Database>::Connection,
        sql: &'c str,
    ) -> BoxFuture<'c, Result<(), sqlx::Error>>;
}

impl SqlDialect for Postgres {
    const NAME: &'static str = "PostgreSQL";

    fn begin_statements(options: &SqlTransactionOptions) -> Vec<String> {
        let mut sql = String::from("BEGIN");
        if let Some(level) = options.isolation_level {
            sql.push_str(" ISOLATION LEVEL ");
            sql.push_str(level.to_sql());
        }
        if let Some(mode) = options.access_mode {
            sql.push(' ');
            sql.push_str(mode.to_sql());
        }
        if options.sqlite_locking.is_some() {
            debug!("sqlite_locking ignored for PostgreSQL");
        }
        vec![sql]
    }

    fn execute_raw<'c>(
        conn: &'c mut PgConnection,
        sql: &'c str,
    ) -> BoxFuture<'c, Result<(), sqlx::Error>> {
        Box::pin(async move { sqlx::Executor::execute(conn, sqlx::raw_sql(sql)).await.map(|_| ()) })
    }
}

impl SqlDialect for MySql {
    const NAME: &'static str = "MySQL";

    fn begin_statements(options: &SqlTransactionOptions) -> Vec<String> {
        // MySQL takes the isolation level for the next transaction only, and
        // only outside an active one.
        let mut statements = Vec::with_capacity(2);
        if let Some(level) = options.isolation_level {
            statements.push(format!("SET TRANSACTION ISOLATION LEVEL {}", level.to_sql()));
        }
        match options.access_mode {
            Some(mode) => statements.push(format!("START TRANSACTION {}", mode.to_sql())),
            None => statements.push("START TRANSACTION".to_string()),
        }
        if options.sqlite_locking.is_some() {
            debug!("sqlite_locking ignored for MySQL");
        }
        statements
    }

    fn quote_identifier(name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn execute_raw<'c>(
        conn: &'c mut MySqlConnection,
        sql: &'c str,
    ) -> BoxFuture<'c, Result<(), sqlx::Error>> {
        Box::pin(async move { sqlx::Executor::execute(conn, sqlx::raw_sql(sql)).await.map(|_| ()) })
    }
}

impl SqlDialect for Sqlite {
    const NAME: &'static str = "SQLite";

    fn begin_statements(options: &SqlTransactionOptions) -> Vec<String> {
        // SQLite transactions are always serializable.
        if options.isolation_level.is_some() || options.access_mode.is_some() {
            debug!(
                isolation_level = ?options.isolation_level,
                access_mode = ?options.access_mode,
                "Isolation level and access mode ignored for SQLite"
            );
        }
        match options.sqlite_locking {
            Some(locking) => vec![format!("BEGIN {}", locking.to_sql())],
            None => vec!["BEGIN".to_string()],
        }
    }

    fn execute_raw<'c>(
        conn: &'c mut SqliteConnection,
        sql: &'c str,
    ) -> BoxFuture<'c, Result<(), sqlx::Error>> {
        Box::pin(async move { sqlx::Executor::execute(conn, sqlx::raw_sql(sql)).await.map(|_| ()) })
    }
}

/// Save point inside an open transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Savepoint {
    name: String,
    depth: usize,
}

impl Savepoint {
    /// Save point for nesting level `depth` (1 = first nested scope).
    pub fn for_depth(depth: usize) -> Self {
        Self {
            name: format!("sp_{}", depth),
            depth,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn create_sql<DB: SqlDialect>(&self) -> String {
        format!("SAVEPOINT {}", DB::quote_identifier(&self.name))
    }

    pub fn release_sql<DB: SqlDialect>(&self) -> String {
        format!("RELEASE SAVEPOINT {}", DB::quote_identifier(&self.name))
    }

    pub fn rollback_sql<DB: SqlDialect>(&self) -> String {
        format!("ROLLBACK TO SAVEPOINT {}", DB::quote_identifier(&self.name))
    }
}
