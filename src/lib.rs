//! SQL statement guard for kodegen database tools
//!
//! Classifies arbitrary SQL text, decides whether it may run, and injects
//! row-limit and pagination clauses into read-only queries, across
//! PostgreSQL, MySQL, MariaDB, SQLite, and SQL Server.
//!
//! Everything here is text analysis; no database connection is involved.

pub mod error;
pub mod types;

pub mod config;
pub mod normalize;
pub mod classify;
pub mod policy;
pub mod sql_limiter;
pub mod advise;
pub mod guard;

// Re-exports
pub use advise::{Advisory, advise_on};
pub use classify::{classify, classify_normalized};
pub use config::{GuardConfig, RowLimits};
pub use error::GuardError;
pub use guard::{Evaluation, PreparedStatement, SqlGuard, StatementRequest};
pub use normalize::{DialectHazard, NormalizedSql, StructuralView, normalize, strip_comments};
pub use policy::{PolicyDecision, PolicyMode, authorize};
pub use sql_limiter::{RewriteOutcome, RewriteRequest, RewriteResult, RowLimiter, rewrite_for_limit};
pub use types::{Classification, DatabaseType, OperationTag, StatementCategory};
