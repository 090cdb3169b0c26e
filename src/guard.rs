//! SqlGuard - single entry point for every SQL-accepting operation
//!
//! Runs normalization, classification, authorization, row limiting, and
//! advisories in one place so no entry point can skip a step.

use crate::advise::{Advisory, advise_on};
use crate::classify::classify_normalized;
use crate::config::{GuardConfig, RowLimits};
use crate::error::GuardError;
use crate::normalize::normalize;
use crate::policy::{PolicyDecision, PolicyMode, authorize};
use crate::sql_limiter::{RewriteOutcome, RewriteRequest, RowLimiter};
use crate::types::Classification;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ============================================================================
// REQUEST / RESPONSE TYPES
// ============================================================================

/// A statement submitted for execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StatementRequest {
    /// SQL text exactly as the caller sent it
    pub sql: String,

    /// Caller acknowledges DELETE/TRUNCATE
    #[serde(default)]
    pub confirm_unsafe: bool,

    /// Requested row limit; clamped to the configured ceiling
    #[serde(default)]
    pub max_rows: Option<u64>,

    /// Rows to skip before returning results
    #[serde(default)]
    pub offset: Option<u64>,

    /// Policy override; the configured mode applies when absent
    #[serde(default)]
    pub mode: Option<PolicyMode>,
}

impl StatementRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Self::default()
        }
    }

    pub fn confirm_unsafe(mut self, confirm: bool) -> Self {
        self.confirm_unsafe = confirm;
        self
    }

    pub fn max_rows(mut self, max_rows: u64) -> Self {
        self.max_rows = Some(max_rows);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn mode(mut self, mode: PolicyMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// Everything the guard decided about a statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct Evaluation {
    pub classification: Classification,
    pub decision: PolicyDecision,

    /// Text to execute: row-limited for allowed reads, otherwise the original
    pub statement: String,

    /// Row limiter outcome; absent when the limiter did not run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewrite: Option<RewriteOutcome>,

    #[schemars(with = "Vec<String>")]
    pub warnings: Vec<Advisory>,
}

impl Evaluation {
    pub fn is_allowed(&self) -> bool {
        self.decision.is_allowed()
    }

    /// Convert into an executable statement, or the refusal as an error
    pub fn into_prepared(self) -> Result<PreparedStatement, GuardError> {
        self.decision.into_result(&self.statement)?;
        Ok(PreparedStatement {
            sql: self.statement,
            classification: self.classification,
            rewrite: self.rewrite,
            warnings: self.warnings,
        })
    }
}

/// An authorized statement ready for the execution layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct PreparedStatement {
    pub sql: String,
    pub classification: Classification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewrite: Option<RewriteOutcome>,
    #[schemars(with = "Vec<String>")]
    pub warnings: Vec<Advisory>,
}

// ============================================================================
// GUARD
// ============================================================================

/// Stateless statement guard
///
/// Holds only immutable configuration, so one instance can be shared across
/// threads.
#[derive(Debug, Clone)]
pub struct SqlGuard {
    config: GuardConfig,
    limits: RowLimits,
    limiter: RowLimiter,
}

impl SqlGuard {
    /// Create a guard from validated configuration
    ///
    /// # Errors
    /// Returns `GuardError::InvalidConfig` if the row limits or budget are invalid
    pub fn new(config: GuardConfig) -> Result<Self, GuardError> {
        config.validate()?;
        let limiter = RowLimiter::new(config.database_type)
            .with_budget(config.rewrite_budget())
            .with_max_statement_bytes(config.max_statement_bytes);
        Ok(Self {
            limits: config.row_limits(),
            limiter,
            config,
        })
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Evaluate a statement without failing
    ///
    /// Warnings are attached whatever the decision. Only allowed read-only
    /// statements pass through the row limiter.
    ///
    /// # Examples
    /// ```
    /// # use kodegen_tools_sql_guard::{GuardConfig, SqlGuard, StatementRequest};
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let guard = SqlGuard::new(GuardConfig::default())?;
    /// let evaluation = guard.evaluate(&StatementRequest::new("SELECT * FROM Orders").max_rows(100));
    /// assert!(evaluation.is_allowed());
    /// assert_eq!(evaluation.statement, "SELECT TOP 100 * FROM Orders");
    /// # Ok(())
    /// # }
    /// ```
    pub fn evaluate(&self, request: &StatementRequest) -> Evaluation {
        let mode = request.mode.unwrap_or(self.config.mode);
        let normalized = normalize(&request.sql);
        let classification = classify_normalized(&normalized, mode);
        let decision = authorize(&classification, request.confirm_unsafe, mode);

        let (statement, rewrite) = if decision.is_allowed() && classification.is_read_only() {
            let rewrite_request = RewriteRequest::new(
                &request.sql,
                &self.limits,
                request.max_rows,
                request.offset,
            );
            let result = self.limiter.rewrite(&rewrite_request, classification.category);
            (result.sql, Some(result.outcome))
        } else {
            (request.sql.clone(), None)
        };

        let warnings = advise_on(&request.sql, &classification, request.offset);

        Evaluation {
            classification,
            decision,
            statement,
            rewrite,
            warnings,
        }
    }

    /// Evaluate a statement and fail on anything not allowed
    ///
    /// # Errors
    /// `GuardError::Blocked` or `GuardError::ConfirmationRequired`, carrying
    /// the operation tag and the original statement text
    pub fn prepare(&self, request: &StatementRequest) -> Result<PreparedStatement, GuardError> {
        self.evaluate(request).into_prepared()
    }
}
