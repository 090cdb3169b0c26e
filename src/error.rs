//! Error types for statement authorization and rewriting

use crate::types::OperationTag;
use kodegen_mcp_schema::McpError;
use thiserror::Error;

/// Statement guard errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    /// Operation is forbidden; confirmation does not change the outcome
    #[error("{} is blocked: {}. Statement: {}", .tag, .tag.description(), .statement)]
    Blocked {
        tag: OperationTag,
        statement: String,
    },

    /// Operation is forbidden for this call; re-submitting with confirmation allows it
    #[error(
        "{} requires confirmation: {}. Re-submit with confirm_unsafe=true to proceed. Statement: {}",
        .tag,
        .tag.description(),
        .statement
    )]
    ConfirmationRequired {
        tag: OperationTag,
        statement: String,
    },

    /// Guard configuration is inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Database type not supported
    #[error("Unsupported database: {0}")]
    UnsupportedDatabase(String),
}

impl GuardError {
    /// Operation tag behind a refusal, if this is a policy outcome
    pub fn tag(&self) -> Option<OperationTag> {
        match self {
            Self::Blocked { tag, .. } | Self::ConfirmationRequired { tag, .. } => Some(*tag),
            _ => None,
        }
    }

    /// Whether re-submitting with `confirm_unsafe = true` would succeed
    pub fn confirmation_would_resolve(&self) -> bool {
        matches!(self, Self::ConfirmationRequired { .. })
    }
}

/// Reasons the row limiter leaves a statement untouched
///
/// Never surfaced to callers: the limiter turns these into a fallback outcome
/// and executes the original text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub(crate) enum RewriteError {
    #[error("statement is empty after removing comments")]
    EmptyStatement,

    #[error("no top-level SELECT found")]
    MainSelectNotFound,

    #[error("row limit clause is not a plain row count: {0}")]
    AmbiguousRowLimit(&'static str),

    #[error("quoting may be read differently by this database: {0}")]
    AmbiguousQuoting(&'static str),

    #[error("statement is {size} bytes, above the {max} byte rewrite limit")]
    InputTooLarge { size: usize, max: usize },

    #[error("rewrite exceeded its {0:?} time budget")]
    BudgetExceeded(std::time::Duration),

    #[error("edit position does not fall on a character boundary")]
    MisalignedEdit,
}

/// Convert GuardError to McpError
impl From<GuardError> for McpError {
    fn from(err: GuardError) -> Self {
        let message = err.to_string();
        match err {
            GuardError::Blocked { .. } => {
                McpError::ReadOnlyViolation(format!("[SQL Guard] {}", message))
            }
            GuardError::ConfirmationRequired { .. } => {
                McpError::InvalidArguments(format!("[SQL Guard] {}", message))
            }
            GuardError::InvalidConfig(_) => {
                McpError::InvalidArguments(format!("[SQL Guard Config] {}", message))
            }
            GuardError::UnsupportedDatabase(_) => {
                McpError::InvalidArguments(format!("[Unsupported DB] {}", message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_message_names_tag_and_statement() {
        let err = GuardError::Blocked {
            tag: OperationTag::Drop,
            statement: "DROP TABLE Orders".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("DROP"));
        assert!(message.contains("DROP TABLE Orders"));
        assert!(!err.confirmation_would_resolve());
    }

    #[test]
    fn test_confirmation_message_explains_retry() {
        let err = GuardError::ConfirmationRequired {
            tag: OperationTag::Delete,
            statement: "DELETE FROM Orders WHERE id=1".to_string(),
        };
        assert!(err.to_string().contains("confirm_unsafe=true"));
        assert!(err.confirmation_would_resolve());
        assert_eq!(err.tag(), Some(OperationTag::Delete));
    }

    #[test]
    fn test_config_error_has_no_tag() {
        let err = GuardError::InvalidConfig("ceiling must be positive".to_string());
        assert_eq!(err.tag(), None);
    }
}
