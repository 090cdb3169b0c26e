//! Non-blocking advisories attached to evaluated statements
//!
//! Advisories never influence the policy decision. They are heuristics over
//! the normalized text and are generated for every statement, allowed or not.

use crate::normalize::normalize;
use crate::types::{Classification, OperationTag, StatementCategory};
use lazy_regex::{Lazy, Regex, lazy_regex};
use serde::{Serialize, Serializer};

static WHERE_WORD: Lazy<Regex> = lazy_regex!(r"(?i)\bWHERE\b");
static ROW_LIMIT_WORD: Lazy<Regex> = lazy_regex!(r"(?i)\b(?:TOP|LIMIT|FETCH)\b");
static OFFSET_WORD: Lazy<Regex> = lazy_regex!(r"(?i)\bOFFSET\b");

/// A single advisory
///
/// Serializes as its human-readable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Advisory {
    /// Read-only query with neither a WHERE clause nor a row limit
    UnboundedResult,
    /// Offset requested for a query without its own OFFSET/FETCH clause
    ManualPagination { offset: u64 },
    /// INSERT or UPDATE
    DataModification,
    /// DELETE or TRUNCATE
    DataRemoval,
    /// UPDATE or DELETE without a WHERE clause
    AffectsAllRows { operation: OperationTag },
}

impl std::fmt::Display for Advisory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnboundedResult => write!(
                f,
                "Query has no WHERE clause or row limit and may return a large result set"
            ),
            Self::ManualPagination { offset } => write!(
                f,
                "Offset {} requested but the query has no OFFSET/FETCH clause; page boundaries depend on row order, add an ORDER BY for stable pages",
                offset
            ),
            Self::DataModification => write!(f, "This statement will modify data"),
            Self::DataRemoval => write!(f, "This statement will permanently remove data"),
            Self::AffectsAllRows { operation } => write!(
                f,
                "{} has no WHERE clause and will affect every row in the table",
                operation
            ),
        }
    }
}

impl Serialize for Advisory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Produce advisories for a statement, in a fixed order
///
/// Result size first, then pagination, then modification or removal, then
/// missing-WHERE warnings.
///
/// # Examples
/// ```
/// # use kodegen_tools_sql_guard::advise::{advise_on, Advisory};
/// # use kodegen_tools_sql_guard::classify::classify;
/// # use kodegen_tools_sql_guard::policy::PolicyMode;
/// # use kodegen_tools_sql_guard::types::OperationTag;
/// let sql = "DELETE FROM Orders";
/// let warnings = advise_on(sql, &classify(sql, PolicyMode::Standard), None);
/// assert_eq!(
///     warnings,
///     vec![
///         Advisory::DataRemoval,
///         Advisory::AffectsAllRows { operation: OperationTag::Delete },
///     ]
/// );
/// ```
pub fn advise_on(sql: &str, classification: &Classification, offset: Option<u64>) -> Vec<Advisory> {
    let normalized = normalize(sql);
    let text = normalized.as_str();
    let has_where = WHERE_WORD.is_match(text);
    let mut advisories = Vec::new();

    if classification.is_read_only() {
        if !has_where && !ROW_LIMIT_WORD.is_match(text) {
            advisories.push(Advisory::UnboundedResult);
        }
        if let Some(offset) = offset.filter(|o| *o > 0 && !OFFSET_WORD.is_match(text)) {
            advisories.push(Advisory::ManualPagination { offset });
        }
    }

    let category = classification.category;
    if category.removes_data() {
        advisories.push(Advisory::DataRemoval);
    } else if category.modifies_data() {
        advisories.push(Advisory::DataModification);
    }

    if matches!(category, StatementCategory::Update | StatementCategory::Delete) && !has_where
    {
        advisories.push(Advisory::AffectsAllRows {
            operation: classification.tag,
        });
    }

    if !advisories.is_empty() {
        log::debug!("{} advisories for statement", advisories.len());
    }
    advisories
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::policy::PolicyMode;

    fn advise(sql: &str, offset: Option<u64>) -> Vec<Advisory> {
        advise_on(sql, &classify(sql, PolicyMode::Standard), offset)
    }

    #[test]
    fn test_unbounded_select() {
        assert_eq!(advise("SELECT * FROM Orders", None), vec![Advisory::UnboundedResult]);
    }

    #[test]
    fn test_filtered_or_limited_select_is_quiet() {
        assert!(advise("SELECT * FROM Orders WHERE id = 1", None).is_empty());
        assert!(advise("SELECT TOP 10 * FROM Orders", None).is_empty());
        assert!(advise("SELECT * FROM Orders LIMIT 10", None).is_empty());
    }

    #[test]
    fn test_where_inside_comment_does_not_count() {
        let warnings = advise("SELECT * FROM Orders -- WHERE id = 1", None);
        assert_eq!(warnings, vec![Advisory::UnboundedResult]);
    }

    #[test]
    fn test_manual_pagination() {
        let warnings = advise("SELECT * FROM Orders WHERE total > 10", Some(40));
        assert_eq!(warnings, vec![Advisory::ManualPagination { offset: 40 }]);

        let native = "SELECT * FROM Orders WHERE total > 10 ORDER BY id OFFSET 40 ROWS";
        assert!(advise(native, Some(40)).is_empty());
        assert!(advise("SELECT * FROM Orders WHERE total > 10", Some(0)).is_empty());
    }

    #[test]
    fn test_modification_advisories() {
        assert_eq!(
            advise("INSERT INTO Orders (id) VALUES (1)", None),
            vec![Advisory::DataModification]
        );
        assert_eq!(
            advise("UPDATE Orders SET total = 0", None),
            vec![
                Advisory::DataModification,
                Advisory::AffectsAllRows { operation: OperationTag::Update },
            ]
        );
        assert_eq!(
            advise("UPDATE Orders SET total = 0 WHERE id = 1", None),
            vec![Advisory::DataModification]
        );
    }

    #[test]
    fn test_removal_advisories() {
        assert_eq!(
            advise("DELETE FROM Orders WHERE id = 1", None),
            vec![Advisory::DataRemoval]
        );
        // TRUNCATE has no WHERE by construction
        assert_eq!(advise("TRUNCATE TABLE Orders", None), vec![Advisory::DataRemoval]);
    }

    #[test]
    fn test_dangerous_statements_get_no_advisories() {
        assert!(advise("DROP TABLE Orders", Some(10)).is_empty());
    }

    #[test]
    fn test_serializes_as_message() {
        let json = serde_json::to_value(Advisory::AffectsAllRows {
            operation: OperationTag::Delete,
        });
        assert!(json.is_ok(), "serialize failed: {:?}", json.err());
        if let Ok(json) = json {
            assert_eq!(
                json,
                "DELETE has no WHERE clause and will affect every row in the table"
            );
        }
    }
}
