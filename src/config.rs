//! Guard configuration: row-limit tunables, default policy, dialect
//!
//! Configuration is an explicit value handed to [`crate::SqlGuard`]; nothing in
//! the classifier, policy engine, or row limiter reads the environment.

use crate::error::GuardError;
use crate::policy::PolicyMode;
use crate::types::DatabaseType;
use anyhow::Context;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_MAX_ROWS_CEILING: u64 = 10_000;
pub const DEFAULT_MAX_ROWS: u64 = 1_000;
pub const DEFAULT_REWRITE_BUDGET_MS: u64 = 50;
pub const DEFAULT_MAX_STATEMENT_BYTES: usize = 1024 * 1024;

/// Server-side row limit tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RowLimits {
    /// Absolute cap no caller can exceed
    pub ceiling: u64,
    /// Limit applied when the caller does not ask for one
    pub default_limit: u64,
}

impl RowLimits {
    pub fn validate(&self) -> Result<(), GuardError> {
        if self.ceiling == 0 {
            return Err(GuardError::InvalidConfig(
                "row limit ceiling must be positive".to_string(),
            ));
        }
        if self.default_limit == 0 {
            return Err(GuardError::InvalidConfig(
                "default row limit must be positive".to_string(),
            ));
        }
        if self.default_limit > self.ceiling {
            return Err(GuardError::InvalidConfig(format!(
                "default row limit {} exceeds ceiling {}",
                self.default_limit, self.ceiling
            )));
        }
        Ok(())
    }

    /// Effective limit for a request: caller value or default, within `1..=ceiling`
    ///
    /// # Examples
    /// ```
    /// # use kodegen_tools_sql_guard::config::RowLimits;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let limits = RowLimits { ceiling: 1000, default_limit: 100 };
    /// limits.validate()?;
    /// assert_eq!(limits.clamp(None), 100);
    /// assert_eq!(limits.clamp(Some(5000)), 1000);
    /// assert_eq!(limits.clamp(Some(0)), 1);
    /// # Ok(())
    /// # }
    /// ```
    pub fn clamp(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.ceiling.max(1))
    }
}

impl Default for RowLimits {
    fn default() -> Self {
        Self {
            ceiling: DEFAULT_MAX_ROWS_CEILING,
            default_limit: DEFAULT_MAX_ROWS,
        }
    }
}

/// Guard configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GuardConfig {
    /// Absolute row-limit ceiling
    pub max_rows_ceiling: u64,

    /// Row limit used when a request does not specify one
    pub default_max_rows: u64,

    /// Policy applied when a request does not choose one
    pub mode: PolicyMode,

    /// Dialect used for row-limit clauses
    pub database_type: DatabaseType,

    /// Per-statement time budget for the row limiter, in milliseconds
    pub rewrite_budget_ms: u64,

    /// Statements larger than this are executed without rewriting
    pub max_statement_bytes: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_rows_ceiling: DEFAULT_MAX_ROWS_CEILING,
            default_max_rows: DEFAULT_MAX_ROWS,
            mode: PolicyMode::default(),
            database_type: DatabaseType::default(),
            rewrite_budget_ms: DEFAULT_REWRITE_BUDGET_MS,
            max_statement_bytes: DEFAULT_MAX_STATEMENT_BYTES,
        }
    }
}

impl GuardConfig {
    pub fn row_limits(&self) -> RowLimits {
        RowLimits {
            ceiling: self.max_rows_ceiling,
            default_limit: self.default_max_rows,
        }
    }

    pub fn rewrite_budget(&self) -> Duration {
        Duration::from_millis(self.rewrite_budget_ms)
    }

    pub fn validate(&self) -> Result<(), GuardError> {
        self.row_limits().validate()?;
        if self.rewrite_budget_ms == 0 {
            return Err(GuardError::InvalidConfig(
                "rewrite budget must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from environment variables
    ///
    /// Every variable is optional; unset values keep their defaults.
    /// - `SQL_GUARD_MAX_ROWS_CEILING`: absolute row-limit ceiling
    /// - `SQL_GUARD_DEFAULT_MAX_ROWS`: default row limit
    /// - `SQL_GUARD_MODE`: `standard` or `read_only`
    /// - `SQL_GUARD_REWRITE_BUDGET_MS`: row limiter time budget
    /// - `SQL_GUARD_MAX_STATEMENT_BYTES`: largest statement the limiter rewrites
    /// - `SQL_GUARD_DATABASE_TYPE`: dialect name (`sqlserver`, `postgres`, ...)
    /// - `DATABASE_DSN`: dialect detected from the URL scheme when
    ///   `SQL_GUARD_DATABASE_TYPE` is not set
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("SQL_GUARD_MAX_ROWS_CEILING") {
            config.max_rows_ceiling = value
                .trim()
                .parse()
                .context("SQL_GUARD_MAX_ROWS_CEILING must be a positive integer")?;
        }

        if let Some(value) = lookup("SQL_GUARD_DEFAULT_MAX_ROWS") {
            config.default_max_rows = value
                .trim()
                .parse()
                .context("SQL_GUARD_DEFAULT_MAX_ROWS must be a positive integer")?;
        }

        if let Some(value) = lookup("SQL_GUARD_MODE") {
            config.mode = value.parse().context("SQL_GUARD_MODE is invalid")?;
        }

        if let Some(value) = lookup("SQL_GUARD_REWRITE_BUDGET_MS") {
            config.rewrite_budget_ms = value
                .trim()
                .parse()
                .context("SQL_GUARD_REWRITE_BUDGET_MS must be a positive integer")?;
        }

        if let Some(value) = lookup("SQL_GUARD_MAX_STATEMENT_BYTES") {
            config.max_statement_bytes = value
                .trim()
                .parse()
                .context("SQL_GUARD_MAX_STATEMENT_BYTES must be a positive integer")?;
        }

        if let Some(value) = lookup("SQL_GUARD_DATABASE_TYPE") {
            config.database_type = value
                .parse()
                .context("SQL_GUARD_DATABASE_TYPE is not a supported database")?;
        } else if let Some(dsn) = lookup("DATABASE_DSN") {
            config.database_type = DatabaseType::from_url(&dsn)
                .context("Failed to determine database type from DATABASE_DSN")?;
        } else {
            log::info!(
                "No database type configured, defaulting to {}",
                config.database_type
            );
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<GuardConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GuardConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]);
        assert!(config.is_ok(), "load failed: {:?}", config.err());
        if let Ok(config) = config {
            assert_eq!(config, GuardConfig::default());
            assert_eq!(config.database_type, DatabaseType::SqlServer);
            assert_eq!(config.mode, PolicyMode::Standard);
        }
    }

    #[test]
    fn test_reads_all_variables() {
        let config = load(&[
            ("SQL_GUARD_MAX_ROWS_CEILING", "5000"),
            ("SQL_GUARD_DEFAULT_MAX_ROWS", " 250 "),
            ("SQL_GUARD_MODE", "read_only"),
            ("SQL_GUARD_REWRITE_BUDGET_MS", "20"),
            ("SQL_GUARD_MAX_STATEMENT_BYTES", "4096"),
            ("DATABASE_DSN", "postgres://localhost/app"),
        ]);
        assert!(config.is_ok(), "load failed: {:?}", config.err());
        if let Ok(config) = config {
            assert_eq!(config.row_limits(), RowLimits { ceiling: 5000, default_limit: 250 });
            assert_eq!(config.mode, PolicyMode::ReadOnly);
            assert_eq!(config.rewrite_budget(), Duration::from_millis(20));
            assert_eq!(config.max_statement_bytes, 4096);
            assert_eq!(config.database_type, DatabaseType::Postgres);
        }
    }

    #[test]
    fn test_explicit_database_type_wins_over_dsn() {
        let config = load(&[
            ("SQL_GUARD_DATABASE_TYPE", "mysql"),
            ("DATABASE_DSN", "postgres://localhost/app"),
        ]);
        assert!(matches!(config, Ok(c) if c.database_type == DatabaseType::MySQL));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(load(&[("SQL_GUARD_MAX_ROWS_CEILING", "lots")]).is_err());
        assert!(load(&[("SQL_GUARD_MODE", "yolo")]).is_err());
        assert!(load(&[("DATABASE_DSN", "oracle://db")]).is_err());
        assert!(load(&[("SQL_GUARD_REWRITE_BUDGET_MS", "0")]).is_err());
    }

    #[test]
    fn test_default_above_ceiling_is_rejected() {
        let err = load(&[
            ("SQL_GUARD_MAX_ROWS_CEILING", "100"),
            ("SQL_GUARD_DEFAULT_MAX_ROWS", "500"),
        ]);
        assert!(err.is_err());
        assert!(RowLimits { ceiling: 0, default_limit: 0 }.validate().is_err());
        assert!(RowLimits { ceiling: 10, default_limit: 0 }.validate().is_err());
    }

    #[test]
    fn test_clamp() {
        let limits = RowLimits::default();
        assert_eq!(limits.clamp(None), DEFAULT_MAX_ROWS);
        assert_eq!(limits.clamp(Some(50)), 50);
        assert_eq!(limits.clamp(Some(u64::MAX)), DEFAULT_MAX_ROWS_CEILING);
        assert_eq!(limits.clamp(Some(0)), 1);
    }

    #[test]
    fn test_deserializes_partial_config() {
        let config: Result<GuardConfig, _> =
            serde_json::from_str(r#"{"default_max_rows": 10, "mode": "read_only"}"#);
        assert!(config.is_ok(), "deserialize failed: {:?}", config.err());
        if let Ok(config) = config {
            assert_eq!(config.default_max_rows, 10);
            assert_eq!(config.mode, PolicyMode::ReadOnly);
            assert_eq!(config.max_rows_ceiling, DEFAULT_MAX_ROWS_CEILING);
        }
    }
}
