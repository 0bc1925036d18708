//! Configuration handling.
//!
//! Pool sizing and default transaction options for applications, plus the
//! CLI/environment configuration of the demo binary.

use crate::adapters::sql::{AccessMode, IsolationLevel, SqlTransactionOptions, SqliteLocking};
use crate::transactional::DEFAULT_CONNECTION_NAME;
use clap::Parser;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:cls-transactional.db?mode=rwc";

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
/// SQLite needs more than one connection for independent (`RequiresNew`)
/// transactions to run next to an open one.
pub const DEFAULT_MAX_CONNECTIONS_SQLITE: u32 = 4;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 1;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Connection pool configuration options.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PoolOptions {
    /// Maximum connections in pool (default: 10 for MySQL/PostgreSQL, 4 for SQLite)
    pub max_connections: Option<u32>,
    /// Minimum connections in pool (default: 1)
    pub min_connections: Option<u32>,
    /// Idle timeout in seconds (default: 600)
    pub idle_timeout_secs: Option<u64>,
    /// Connection acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: Option<u64>,
    /// Whether to test connections before use (default: true)
    pub test_before_acquire: Option<bool>,
}

impl PoolOptions {
    /// Get max_connections with default value based on database type.
    pub fn max_connections_or_default(&self, is_sqlite: bool) -> u32 {
        self.max_connections.unwrap_or(if is_sqlite {
            DEFAULT_MAX_CONNECTIONS_SQLITE
        } else {
            DEFAULT_MAX_CONNECTIONS
        })
    }

    pub fn min_connections_or_default(&self) -> u32 {
        self.min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS)
    }

    pub fn idle_timeout_or_default(&self) -> u64 {
        self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS)
    }

    pub fn acquire_timeout_or_default(&self) -> u64 {
        self.acquire_timeout_secs
            .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS)
    }

    pub fn test_before_acquire_or_default(&self) -> bool {
        self.test_before_acquire.unwrap_or(true)
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(max) = self.max_connections {
            if max == 0 {
                return Err("max_connections must be greater than 0".to_string());
            }
        }
        if let Some(min) = self.min_connections {
            if let Some(max) = self.max_connections {
                if min > max {
                    return Err(format!(
                        "min_connections ({}) cannot exceed max_connections ({})",
                        min, max
                    ));
                }
            }
        }
        if self.acquire_timeout_secs == Some(0) {
            return Err("acquire_timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Configuration for the demo binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "cls-transactional",
    about = "Runs the transactional user scenarios against a database",
    version,
    author
)]
pub struct Config {
    /// Database connection URL (sqlite:, postgres:// or mysql://)
    #[arg(
        short = 'd',
        long = "database-url",
        value_name = "URL",
        default_value = DEFAULT_DATABASE_URL,
        env = "DATABASE_URL"
    )]
    pub database_url: String,

    /// Connection name the transactional plugin is registered under
    #[arg(long, default_value = DEFAULT_CONNECTION_NAME, env = "CLS_CONNECTION_NAME")]
    pub connection_name: String,

    /// Default isolation level for transactions
    #[arg(long, value_enum, env = "CLS_ISOLATION_LEVEL")]
    pub isolation_level: Option<IsolationLevel>,

    /// Default access mode for transactions
    #[arg(long, value_enum, env = "CLS_ACCESS_MODE")]
    pub access_mode: Option<AccessMode>,

    /// SQLite BEGIN behavior
    #[arg(long, value_enum, env = "CLS_SQLITE_LOCKING")]
    pub sqlite_locking: Option<SqliteLocking>,

    /// Maximum connections in the pool
    #[arg(long, env = "CLS_MAX_CONNECTIONS")]
    pub max_connections: Option<u32>,

    /// Minimum connections in the pool
    #[arg(long, env = "CLS_MIN_CONNECTIONS")]
    pub min_connections: Option<u32>,

    /// Pool acquire timeout in seconds
    #[arg(long, env = "CLS_ACQUIRE_TIMEOUT")]
    pub acquire_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "CLS_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "CLS_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            idle_timeout_secs: None,
            acquire_timeout_secs: self.acquire_timeout,
            test_before_acquire: None,
        }
    }

    /// Adapter defaults that every transaction starts from.
    pub fn default_transaction_options(&self) -> SqlTransactionOptions {
        SqlTransactionOptions {
            isolation_level: self.isolation_level,
            access_mode: self.access_mode,
            sqlite_locking: self.sqlite_locking,
        }
    }

    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.connection_name.trim().is_empty() {
            return Err("connection name cannot be empty".to_string());
        }
        self.pool_options().validate()
    }
}
