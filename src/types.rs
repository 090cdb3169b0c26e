//! Type definitions shared by the classifier, policy engine, and row limiter

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Statement category assigned by the classifier
///
/// Every statement maps to exactly one category. Anything that is not
/// positively recognized as one of the first five lands in `Dangerous`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StatementCategory {
    ReadOnly,
    Insert,
    Update,
    Delete,
    Truncate,
    Dangerous,
}

impl StatementCategory {
    /// Whether statements in this category modify stored data
    pub fn modifies_data(&self) -> bool {
        matches!(
            self,
            Self::Insert | Self::Update | Self::Delete | Self::Truncate
        )
    }

    /// Whether statements in this category permanently remove rows
    pub fn removes_data(&self) -> bool {
        matches!(self, Self::Delete | Self::Truncate)
    }
}

impl std::fmt::Display for StatementCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "read-only"),
            Self::Insert => write!(f, "insert"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::Truncate => write!(f, "truncate"),
            Self::Dangerous => write!(f, "dangerous"),
        }
    }
}

/// Named operation that triggered a classification
///
/// Used by the policy engine as the reason attached to `Blocked` and
/// `RequiresConfirmation`, and by callers to build diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationTag {
    Select,
    Insert,
    Update,
    Delete,
    Truncate,
    Drop,
    Create,
    Alter,
    Exec,
    Execute,
    Merge,
    Bulk,
    Grant,
    Revoke,
    Deny,
    Use,
    Set,
    Dbcc,
    Backup,
    Restore,
    Reconfigure,
    MultipleStatements,
    SelectInto,
    NonSelectStatement,
}

impl OperationTag {
    /// Look up the tag for an administrative keyword (case-insensitive)
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let tag = match keyword.to_ascii_uppercase().as_str() {
            "SELECT" => Self::Select,
            "INSERT" => Self::Insert,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            "TRUNCATE" => Self::Truncate,
            "DROP" => Self::Drop,
            "CREATE" => Self::Create,
            "ALTER" => Self::Alter,
            "EXEC" => Self::Exec,
            "EXECUTE" => Self::Execute,
            "MERGE" => Self::Merge,
            "BULK" => Self::Bulk,
            "GRANT" => Self::Grant,
            "REVOKE" => Self::Revoke,
            "DENY" => Self::Deny,
            "USE" => Self::Use,
            "SET" => Self::Set,
            "DBCC" => Self::Dbcc,
            "BACKUP" => Self::Backup,
            "RESTORE" => Self::Restore,
            "RECONFIGURE" => Self::Reconfigure,
            _ => return None,
        };
        Some(tag)
    }

    /// Wire name of the tag (`DROP`, `MULTIPLE_STATEMENTS`, ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
            Self::Drop => "DROP",
            Self::Create => "CREATE",
            Self::Alter => "ALTER",
            Self::Exec => "EXEC",
            Self::Execute => "EXECUTE",
            Self::Merge => "MERGE",
            Self::Bulk => "BULK",
            Self::Grant => "GRANT",
            Self::Revoke => "REVOKE",
            Self::Deny => "DENY",
            Self::Use => "USE",
            Self::Set => "SET",
            Self::Dbcc => "DBCC",
            Self::Backup => "BACKUP",
            Self::Restore => "RESTORE",
            Self::Reconfigure => "RECONFIGURE",
            Self::MultipleStatements => "MULTIPLE_STATEMENTS",
            Self::SelectInto => "SELECT_INTO",
            Self::NonSelectStatement => "NON_SELECT_STATEMENT",
        }
    }

    /// Human-readable explanation used in refusal messages
    pub fn description(&self) -> &'static str {
        match self {
            Self::Select => "read-only query",
            Self::Insert => "INSERT adds rows to a table",
            Self::Update => "UPDATE modifies existing rows",
            Self::Delete => "DELETE permanently removes rows",
            Self::Truncate => "TRUNCATE permanently removes every row in a table",
            Self::Drop => "DROP permanently removes database objects",
            Self::Create => "CREATE adds database objects",
            Self::Alter => "ALTER changes database object definitions",
            Self::Exec | Self::Execute => "EXEC/EXECUTE runs stored procedures or dynamic SQL",
            Self::Merge => "MERGE can insert, update, and delete rows in one statement",
            Self::Bulk => "BULK operations load data from outside the database",
            Self::Grant | Self::Revoke | Self::Deny => "permission changes are administrative",
            Self::Use => "USE switches the active database",
            Self::Set => "SET changes session options",
            Self::Dbcc => "DBCC runs database console commands",
            Self::Backup | Self::Restore => "BACKUP/RESTORE are server-level operations",
            Self::Reconfigure => "RECONFIGURE applies server configuration changes",
            Self::MultipleStatements => "only a single statement is accepted per request",
            Self::SelectInto => "SELECT ... INTO creates a new table",
            Self::NonSelectStatement => "only SELECT queries (optionally with a WITH prefix) are accepted",
        }
    }
}

impl std::fmt::Display for OperationTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier output: category plus the operation that decided it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Classification {
    pub category: StatementCategory,
    pub tag: OperationTag,
}

impl Classification {
    pub fn new(category: StatementCategory, tag: OperationTag) -> Self {
        Self { category, tag }
    }

    pub fn read_only() -> Self {
        Self::new(StatementCategory::ReadOnly, OperationTag::Select)
    }

    pub fn dangerous(tag: OperationTag) -> Self {
        Self::new(StatementCategory::Dangerous, tag)
    }

    pub fn is_read_only(&self) -> bool {
        self.category == StatementCategory::ReadOnly
    }
}

/// Database type for dialect-specific row limiting
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    Postgres,
    MySQL,
    MariaDB,
    SQLite,
    #[default]
    SqlServer,
}

impl DatabaseType {
    /// Detect database type from connection URL scheme
    ///
    /// # Examples
    /// ```
    /// # use kodegen_tools_sql_guard::types::DatabaseType;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let db = DatabaseType::from_url("mssql://localhost/orders")?;
    /// assert_eq!(db, DatabaseType::SqlServer);
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_url(url: &str) -> Result<Self, crate::error::GuardError> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Self::Postgres)
        } else if url.starts_with("mysql://") {
            Ok(Self::MySQL)
        } else if url.starts_with("mariadb://") {
            Ok(Self::MariaDB)
        } else if url.starts_with("sqlite:") || url.starts_with("file:") {
            Ok(Self::SQLite)
        } else if url.starts_with("sqlserver://") || url.starts_with("mssql://") {
            Ok(Self::SqlServer)
        } else {
            Err(crate::error::GuardError::UnsupportedDatabase(format!(
                "Cannot determine database type from URL: {}",
                url
            )))
        }
    }

    /// Whether rows are limited with `TOP n` rather than a trailing `LIMIT n`
    pub fn uses_top(&self) -> bool {
        matches!(self, Self::SqlServer)
    }
}

impl std::str::FromStr for DatabaseType {
    type Err = crate::error::GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" => Ok(Self::MySQL),
            "mariadb" => Ok(Self::MariaDB),
            "sqlite" => Ok(Self::SQLite),
            "sqlserver" | "mssql" => Ok(Self::SqlServer),
            other => Err(crate::error::GuardError::UnsupportedDatabase(other.to_string())),
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Postgres => write!(f, "PostgreSQL"),
            Self::MySQL => write!(f, "MySQL"),
            Self::MariaDB => write!(f, "MariaDB"),
            Self::SQLite => write!(f, "SQLite"),
            Self::SqlServer => write!(f, "SQL Server"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_wire_names() {
        assert_eq!(OperationTag::MultipleStatements.to_string(), "MULTIPLE_STATEMENTS");
        let json = serde_json::to_string(&OperationTag::SelectInto);
        assert!(json.is_ok(), "serialize failed: {:?}", json.err());
        if let Ok(json) = json {
            assert_eq!(json, "\"SELECT_INTO\"");
        }
    }

    #[test]
    fn test_from_keyword_is_case_insensitive() {
        assert_eq!(OperationTag::from_keyword("drop"), Some(OperationTag::Drop));
        assert_eq!(OperationTag::from_keyword("Dbcc"), Some(OperationTag::Dbcc));
        assert_eq!(OperationTag::from_keyword("insertion"), None);
    }

    #[test]
    fn test_database_type_from_url() {
        assert!(matches!(
            DatabaseType::from_url("postgresql://db/app"),
            Ok(DatabaseType::Postgres)
        ));
        assert!(matches!(
            DatabaseType::from_url("sqlite::memory:"),
            Ok(DatabaseType::SQLite)
        ));
        assert!(DatabaseType::from_url("oracle://db").is_err());
    }

    #[test]
    fn test_only_sql_server_uses_top() {
        assert!(DatabaseType::SqlServer.uses_top());
        assert!(!DatabaseType::Postgres.uses_top());
    }
}
