//! Transaction options for SQL databases.

use crate::transactional::TransactionOptions;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    ReadWrite,
    ReadOnly,
}

impl AccessMode {
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::ReadWrite => "READ WRITE",
            Self::ReadOnly => "READ ONLY",
        }
    }
}

/// SQLite `BEGIN` behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SqliteLocking {
    Deferred,
    Immediate,
    Exclusive,
}

impl SqliteLocking {
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::Deferred => "DEFERRED",
            Self::Immediate => "IMMEDIATE",
            Self::Exclusive => "EXCLUSIVE",
        }
    }
}

/// Options for SQL transactions. Unset fields use the server's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlTransactionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolation_level: Option<IsolationLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_mode: Option<AccessMode>,
    /// SQLite only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlite_locking: Option<SqliteLocking>,
}

impl SqlTransactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    pub fn access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = Some(mode);
        self
    }

    pub fn read_only(self) -> Self {
        self.access_mode(AccessMode::ReadOnly)
    }

    pub fn sqlite_locking(mut self, locking: SqliteLocking) -> Self {
        self.sqlite_locking = Some(locking);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl TransactionOptions for SqlTransactionOptions {
    fn merge(&self, overrides: &Self) -> Self {
        Self {
            isolation_level: overrides.isolation_level.or(self.isolation_level),
            access_mode: overrides.access_mode.or(self.access_mode),
            sqlite_locking: overrides.sqlite_locking.or(self.sqlite_locking),
        }
    }
}
