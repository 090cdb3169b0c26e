//! Policy engine: maps a classification and caller intent to a decision

use crate::error::GuardError;
use crate::types::{Classification, OperationTag, StatementCategory};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Which policy an entry point applies
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    /// Reads and INSERT/UPDATE allowed, DELETE/TRUNCATE need confirmation,
    /// DDL and administrative statements blocked
    #[default]
    Standard,

    /// Strict read-only: only SELECT-family statements are allowed
    ReadOnly,
}

impl std::str::FromStr for PolicyMode {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "read_only" | "readonly" | "read-only" | "strict" => Ok(Self::ReadOnly),
            other => Err(GuardError::InvalidConfig(format!(
                "Unknown policy mode '{}': must be 'standard' or 'read_only'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::ReadOnly => write!(f, "read_only"),
        }
    }
}

/// Outcome of authorizing a classified statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PolicyDecision {
    Allowed,
    Blocked { reason: OperationTag },
    RequiresConfirmation { reason: OperationTag },
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Operation behind a refusal
    pub fn reason(&self) -> Option<OperationTag> {
        match self {
            Self::Allowed => None,
            Self::Blocked { reason } | Self::RequiresConfirmation { reason } => Some(*reason),
        }
    }

    /// Whether re-submitting with `confirm_unsafe = true` would be allowed
    pub fn confirmation_would_resolve(&self) -> bool {
        matches!(self, Self::RequiresConfirmation { .. })
    }

    /// Turn a refusal into an error carrying the tag and the statement text
    pub fn into_result(self, statement: &str) -> Result<(), GuardError> {
        match self {
            Self::Allowed => Ok(()),
            Self::Blocked { reason } => Err(GuardError::Blocked {
                tag: reason,
                statement: statement.to_string(),
            }),
            Self::RequiresConfirmation { reason } => Err(GuardError::ConfirmationRequired {
                tag: reason,
                statement: statement.to_string(),
            }),
        }
    }
}

/// Authorize a classified statement
///
/// Pure function of (classification, confirmation, mode). Confirmation never
/// unblocks a `Dangerous` statement.
///
/// # Examples
/// ```
/// # use kodegen_tools_sql_guard::classify::classify;
/// # use kodegen_tools_sql_guard::policy::{authorize, PolicyDecision, PolicyMode};
/// # use kodegen_tools_sql_guard::types::OperationTag;
/// let delete = classify("DELETE FROM Orders WHERE id=1", PolicyMode::Standard);
/// assert_eq!(
///     authorize(&delete, false, PolicyMode::Standard),
///     PolicyDecision::RequiresConfirmation { reason: OperationTag::Delete }
/// );
/// assert_eq!(authorize(&delete, true, PolicyMode::Standard), PolicyDecision::Allowed);
///
/// let drop = classify("DROP TABLE Orders", PolicyMode::Standard);
/// assert_eq!(
///     authorize(&drop, true, PolicyMode::Standard),
///     PolicyDecision::Blocked { reason: OperationTag::Drop }
/// );
/// ```
pub fn authorize(
    classification: &Classification,
    confirm_unsafe: bool,
    mode: PolicyMode,
) -> PolicyDecision {
    let reason = classification.tag;
    let decision = match (classification.category, mode) {
        (StatementCategory::ReadOnly, _) => PolicyDecision::Allowed,
        (StatementCategory::Dangerous, _) => PolicyDecision::Blocked { reason },
        (_, PolicyMode::ReadOnly) => PolicyDecision::Blocked { reason },
        (StatementCategory::Insert | StatementCategory::Update, PolicyMode::Standard) => {
            PolicyDecision::Allowed
        }
        (StatementCategory::Delete | StatementCategory::Truncate, PolicyMode::Standard) => {
            if confirm_unsafe {
                PolicyDecision::Allowed
            } else {
                PolicyDecision::RequiresConfirmation { reason }
            }
        }
    };

    if !decision.is_allowed() {
        log::info!(
            "Statement not allowed in {} mode: {:?} ({})",
            mode,
            decision,
            reason.description()
        );
    }
    decision
}
