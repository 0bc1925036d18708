//! Sample user service.
//!
//! Shows how application code reaches the active transaction through a
//! [`TransactionHost`]: repositories call `host.tx(ctx)` and never care
//! whether they run inside a transaction or not.

use crate::adapters::sql::{SqlDialect, SqlxAdapter};
use crate::cls::ClsContext;
use crate::error::{TransactionalError, TransactionalResult};
use crate::module::ClsModule;
use crate::transactional::{Propagation, TransactionHost};
use serde::Serialize;
use sqlx::{MySql, Postgres, Sqlite};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
}

/// Per-database SQL for the `users` table.
///
/// Inserts are followed by [`UserSchema::SELECT_LAST_INSERTED`] on the same
/// connection, since MySQL has no `RETURNING`.
pub trait UserSchema: SqlDialect {
    const CREATE_TABLE: &'static str;
    const INSERT: &'static str;
    const SELECT_LAST_INSERTED: &'static str;
    const SELECT_BY_ID: &'static str;
    const SELECT_BY_NAME: &'static str;
    const COUNT: &'static str = "SELECT COUNT(*) FROM users";
}

impl UserSchema for Postgres {
    const CREATE_TABLE: &'static str = "CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT
    )";
    const INSERT: &'static str = "INSERT INTO users (name, email) VALUES ($1, $2)";
    const SELECT_LAST_INSERTED: &'static str =
        "SELECT id, name, email FROM users WHERE id = lastval()";
    const SELECT_BY_ID: &'static str = "SELECT id, name, email FROM users WHERE id = $1";
    const SELECT_BY_NAME: &'static str =
        "SELECT id, name, email FROM users WHERE name = $1 ORDER BY id";
}

impl UserSchema for MySql {
    const CREATE_TABLE: &'static str = "CREATE TABLE IF NOT EXISTS users (
        id BIGINT AUTO_INCREMENT PRIMARY KEY,
        name VARCHAR(255) NOT NULL,
        email VARCHAR(255)
    ) ENGINE=InnoDB";
    const INSERT: &'static str = "INSERT INTO users (name, email) VALUES (?, ?)";
    const SELECT_LAST_INSERTED: &'static str =
        "SELECT id, name, email FROM users WHERE id = LAST_INSERT_ID()";
    const SELECT_BY_ID: &'static str = "SELECT id, name, email FROM users WHERE id = ?";
    const SELECT_BY_NAME: &'static str =
        "SELECT id, name, email FROM users WHERE name = ? ORDER BY id";
}

impl UserSchema for Sqlite {
    const CREATE_TABLE: &'static str = "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT
    )";
    const INSERT: &'static str = "INSERT INTO users (name, email) VALUES (?, ?)";
    const SELECT_LAST_INSERTED: &'static str =
        "SELECT id, name, email FROM users WHERE id = last_insert_rowid()";
    const SELECT_BY_ID: &'static str = "SELECT id, name, email FROM users WHERE id = ?";
    const SELECT_BY_NAME: &'static str =
        "SELECT id, name, email FROM users WHERE name = ? ORDER BY id";
}

#[derive(Debug)]
pub struct UserRepository<DB: UserSchema> {
    host: TransactionHost<SqlxAdapter<DB>>,
}

impl<DB: UserSchema> Clone for UserRepository<DB> {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
        }
    }
}

impl<DB: UserSchema> UserRepository<DB> {
    pub fn new(host: TransactionHost<SqlxAdapter<DB>>) -> Self {
        Self { host }
    }
}

#[derive(Debug)]
pub struct UserService<DB: UserSchema> {
    host: TransactionHost<SqlxAdapter<DB>>,
    repository: UserRepository<DB>,
}

impl<DB: UserSchema> Clone for UserService<DB> {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
            repository: self.repository.clone(),
        }
    }
}

impl<DB: UserSchema> UserService<DB> {
    pub fn new(host: TransactionHost<SqlxAdapter<DB>>) -> Self {
        let repository = UserRepository::new(host.clone());
        Self { host, repository }
    }

    pub fn repository(&self) -> &UserRepository<DB> {
        &self.repository
    }
}

/// Outcome of [`UserService::run_scenarios`].
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub backend: &'static str,
    pub created: User,
    pub read_inside_transaction: bool,
    pub visible_after_commit: bool,
    pub rollback_error: Option<String>,
    pub rows_after_rollback: usize,
    pub nested_outer: User,
    pub nested_inner_rows: usize,
    pub total: i64,
}

/// Queries are written per database so every backend runs its own concrete
/// sqlx types.
macro_rules! impl_users {
    ($($db:ty),+ $(,)?) => {
        $(
            impl UserRepository<$db> {
                pub async fn create_table(&self, ctx: &ClsContext) -> TransactionalResult<()> {
                    let mut conn = self.host.tx(ctx).acquire().await?;
                    sqlx::query(<$db as UserSchema>::CREATE_TABLE)
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                }

                pub async fn create(
                    &self,
                    ctx: &ClsContext,
                    name: &str,
                    email: Option<&str>,
                ) -> TransactionalResult<User> {
                    let mut conn = self.host.tx(ctx).acquire().await?;
                    sqlx::query(<$db as UserSchema>::INSERT)
                        .bind(name)
                        .bind(email)
                        .execute(&mut *conn)
                        .await?;
                    let user =
                        sqlx::query_as::<_, User>(<$db as UserSchema>::SELECT_LAST_INSERTED)
                            .fetch_one(&mut *conn)
                            .await?;
                    Ok(user)
                }

                pub async fn get_by_id(
                    &self,
                    ctx: &ClsContext,
                    id: i64,
                ) -> TransactionalResult<Option<User>> {
                    let mut conn = self.host.tx(ctx).acquire().await?;
                    let user = sqlx::query_as::<_, User>(<$db as UserSchema>::SELECT_BY_ID)
                        .bind(id)
                        .fetch_optional(&mut *conn)
                        .await?;
                    Ok(user)
                }

                pub async fn find_by_name(
                    &self,
                    ctx: &ClsContext,
                    name: &str,
                ) -> TransactionalResult<Vec<User>> {
                    let mut conn = self.host.tx(ctx).acquire().await?;
                    let users = sqlx::query_as::<_, User>(<$db as UserSchema>::SELECT_BY_NAME)
                        .bind(name)
                        .fetch_all(&mut *conn)
                        .await?;
                    Ok(users)
                }

                pub async fn count(&self, ctx: &ClsContext) -> TransactionalResult<i64> {
                    let mut conn = self.host.tx(ctx).acquire().await?;
                    let count = sqlx::query_scalar::<_, i64>(<$db as UserSchema>::COUNT)
                        .fetch_one(&mut *conn)
                        .await?;
                    Ok(count)
                }
            }

            impl UserService<$db> {
                /// Create a user and read it back inside one transaction.
                ///
                /// Returns the created user and the row seen by the in-transaction read.
                pub async fn create_and_read_back(
                    &self,
                    ctx: &ClsContext,
                    name: &str,
                    email: Option<&str>,
                ) -> TransactionalResult<(User, Option<User>)> {
                    self.host
                        .with_transaction(ctx, |ctx| async move {
                            let created = self.repository.create(&ctx, name, email).await?;
                            let found = self.repository.get_by_id(&ctx, created.id).await?;
                            Ok((created, found))
                        })
                        .await
                }

                /// Create a user, then fail so the whole transaction rolls back.
                pub async fn create_then_fail(
                    &self,
                    ctx: &ClsContext,
                    name: &str,
                    email: Option<&str>,
                ) -> TransactionalResult<User> {
                    self.host
                        .with_transaction(ctx, |ctx| async move {
                            self.repository.create(&ctx, name, email).await?;
                            Err(TransactionalError::aborted("Rollback"))
                        })
                        .await
                }

                /// Create `outer`, then `inner` in a save point that fails.
                ///
                /// The outer user survives; the inner one is rolled back with its save point.
                pub async fn create_with_failing_nested(
                    &self,
                    ctx: &ClsContext,
                    outer: &str,
                    inner: &str,
                ) -> TransactionalResult<User> {
                    self.host
                        .with_transaction(ctx, |ctx| async move {
                            let user = self.repository.create(&ctx, outer, None).await?;
                            let nested: TransactionalResult<User> = self
                                .host
                                .with_transaction_propagation(
                                    &ctx,
                                    Propagation::Nested,
                                    None,
                                    |ctx| async move {
                                        self.repository.create(&ctx, inner, None).await?;
                                        Err(TransactionalError::aborted("Rollback"))
                                    },
                                )
                                .await;
                            if let Err(e) = nested {
                                debug!(error = %e, "Nested scope rolled back");
                            }
                            Ok(user)
                        })
                        .await
                }

                /// Run every scenario, each in a fresh context of `module`.
                pub async fn run_scenarios(
                    &self,
                    module: &ClsModule,
                ) -> TransactionalResult<ScenarioReport> {
                    let repo = &self.repository;
                    repo.create_table(&module.enter()).await?;

                    let (created, read_back) = self
                        .create_and_read_back(&module.enter(), "John", Some("john@example.com"))
                        .await?;
                    let visible_after_commit =
                        repo.get_by_id(&module.enter(), created.id).await?.is_some();

                    let rollback_error = self
                        .create_then_fail(&module.enter(), "Nobody", None)
                        .await
                        .err()
                        .map(|e| e.to_string());
                    let rows_after_rollback =
                        repo.find_by_name(&module.enter(), "Nobody").await?.len();

                    let nested_outer = self
                        .create_with_failing_nested(&module.enter(), "Outer", "Inner")
                        .await?;
                    let nested_inner_rows =
                        repo.find_by_name(&module.enter(), "Inner").await?.len();

                    Ok(ScenarioReport {
                        backend: <$db as SqlDialect>::NAME,
                        read_inside_transaction: read_back.is_some(),
                        created,
                        visible_after_commit,
                        rollback_error,
                        rows_after_rollback,
                        nested_outer,
                        nested_inner_rows,
                        total: repo.count(&module.enter()).await?,
                    })
                }
            }
        )+
    };
}

impl_users!(Postgres, MySql, Sqlite);
