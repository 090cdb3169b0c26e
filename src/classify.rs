//! Statement classification over normalized SQL text
//!
//! Classification is an ordered list of small rules; the first rule that
//! returns a verdict wins. Anything no rule recognizes ends up `Dangerous`.

use crate::normalize::{NormalizedSql, normalize};
use crate::policy::PolicyMode;
use crate::types::{Classification, OperationTag, StatementCategory};
use lazy_regex::{Lazy, Regex, lazy_regex};

static TRUNCATE_WORD: Lazy<Regex> = lazy_regex!(r"(?i)\bTRUNCATE\b");
static DELETE_WORD: Lazy<Regex> = lazy_regex!(r"(?i)\bDELETE\b");
static INSERT_WORD: Lazy<Regex> = lazy_regex!(r"(?i)\bINSERT\b");
static UPDATE_WORD: Lazy<Regex> = lazy_regex!(r"(?i)\bUPDATE\b");
static ADMIN_KEYWORD: Lazy<Regex> = lazy_regex!(
    r"(?i)\b(DROP|CREATE|ALTER|EXECUTE|EXEC|MERGE|BULK|GRANT|REVOKE|DENY)\b"
);
static STRICT_ADMIN_KEYWORD: Lazy<Regex> = lazy_regex!(
    r"(?i)\b(DROP|CREATE|ALTER|EXECUTE|EXEC|MERGE|BULK|GRANT|REVOKE|DENY|USE|SET|DBCC|BACKUP|RESTORE|RECONFIGURE)\b"
);
static SELECT_WORD: Lazy<Regex> = lazy_regex!(r"(?i)\bSELECT\b");
static INTO_WORD: Lazy<Regex> = lazy_regex!(r"(?i)\bINTO\b");

type Rule = fn(&NormalizedSql, PolicyMode) -> Option<Classification>;

/// Classification rules in evaluation order
const RULES: &[(&str, Rule)] = &[
    ("multiple_statements", multiple_statements),
    ("data_modification", data_modification),
    ("administrative_keyword", administrative_keyword),
    ("select_family", select_family),
];

/// Classify a raw statement
///
/// `mode` only widens the administrative keyword set: strict read-only mode
/// additionally treats `USE`, `SET`, `DBCC`, `BACKUP`, `RESTORE`, and
/// `RECONFIGURE` as dangerous.
///
/// # Examples
/// ```
/// # use kodegen_tools_sql_guard::classify::classify;
/// # use kodegen_tools_sql_guard::policy::PolicyMode;
/// # use kodegen_tools_sql_guard::types::{OperationTag, StatementCategory};
/// let verdict = classify("SELECT * FROM Orders", PolicyMode::Standard);
/// assert_eq!(verdict.category, StatementCategory::ReadOnly);
///
/// let verdict = classify("SELECT a; SELECT b;", PolicyMode::Standard);
/// assert_eq!(verdict.category, StatementCategory::Dangerous);
/// assert_eq!(verdict.tag, OperationTag::MultipleStatements);
/// ```
pub fn classify(sql: &str, mode: PolicyMode) -> Classification {
    classify_normalized(&normalize(sql), mode)
}

/// Classify already-normalized text
pub fn classify_normalized(normalized: &NormalizedSql, mode: PolicyMode) -> Classification {
    for (name, rule) in RULES {
        if let Some(verdict) = rule(normalized, mode) {
            log::debug!(
                "Classified statement as {} ({}) by rule {}",
                verdict.category,
                verdict.tag,
                name
            );
            return verdict;
        }
    }
    Classification::dangerous(OperationTag::NonSelectStatement)
}

/// More than one `;`, or a `;` anywhere but the final character
///
/// Checked before any keyword scan: a stacked statement can smuggle a blocked
/// keyword after the separator.
fn multiple_statements(sql: &NormalizedSql, _mode: PolicyMode) -> Option<Classification> {
    let text = sql.as_str();
    let semicolons = text.matches(';').count();
    let stacked = semicolons > 1 || (semicolons == 1 && !text.ends_with(';'));
    stacked.then(|| Classification::dangerous(OperationTag::MultipleStatements))
}

/// TRUNCATE, DELETE, INSERT, UPDATE anywhere in the text, in that priority
///
/// Runs before the administrative keyword rule, so the DML keyword decides
/// the tag even when DDL or EXEC words appear alongside it.
fn data_modification(sql: &NormalizedSql, _mode: PolicyMode) -> Option<Classification> {
    let text = sql.as_str();
    let (category, tag) = if TRUNCATE_WORD.is_match(text) {
        (StatementCategory::Truncate, OperationTag::Truncate)
    } else if DELETE_WORD.is_match(text) {
        (StatementCategory::Delete, OperationTag::Delete)
    } else if INSERT_WORD.is_match(text) {
        (StatementCategory::Insert, OperationTag::Insert)
    } else if UPDATE_WORD.is_match(text) {
        (StatementCategory::Update, OperationTag::Update)
    } else {
        return None;
    };
    Some(Classification::new(category, tag))
}

fn administrative_keyword(sql: &NormalizedSql, mode: PolicyMode) -> Option<Classification> {
    let keywords: &Regex = match mode {
        PolicyMode::Standard => &*ADMIN_KEYWORD,
        PolicyMode::ReadOnly => &*STRICT_ADMIN_KEYWORD,
    };
    first_keyword_tag(keywords, sql.as_str()).map(Classification::dangerous)
}

/// Terminal rule: SELECT, or WITH ... SELECT, without INTO
fn select_family(sql: &NormalizedSql, _mode: PolicyMode) -> Option<Classification> {
    let text = sql.as_str();
    let is_select = match sql.first_keyword() {
        Some("WITH") => SELECT_WORD.is_match(text),
        Some("SELECT") => true,
        _ => false,
    };

    if !is_select {
        return Some(Classification::dangerous(OperationTag::NonSelectStatement));
    }
    if INTO_WORD.is_match(text) {
        return Some(Classification::dangerous(OperationTag::SelectInto));
    }
    Some(Classification::read_only())
}

/// Tag of the leftmost keyword matched by `keywords`
fn first_keyword_tag(keywords: &Regex, text: &str) -> Option<OperationTag> {
    keywords
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|keyword| {
            OperationTag::from_keyword(keyword.as_str())
                .unwrap_or(OperationTag::NonSelectStatement)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{PolicyDecision, authorize};

    fn standard(sql: &str) -> Classification {
        classify(sql, PolicyMode::Standard)
    }

    fn strict(sql: &str) -> Classification {
        classify(sql, PolicyMode::ReadOnly)
    }

    #[test]
    fn test_plain_select_is_read_only() {
        assert_eq!(standard("SELECT * FROM Orders"), Classification::read_only());
        assert_eq!(standard("select 1;"), Classification::read_only());
    }

    #[test]
    fn test_cte_select_is_read_only() {
        let sql = "WITH recent AS (SELECT id FROM Orders WHERE created > '2024-01-01') SELECT * FROM recent";
        assert_eq!(standard(sql), Classification::read_only());
    }

    #[test]
    fn test_with_without_select_is_non_select() {
        let verdict = standard("WITH x AS (VALUES (1)) TABLE x");
        assert_eq!(verdict, Classification::dangerous(OperationTag::NonSelectStatement));
    }

    #[test]
    fn test_stacked_statements() {
        for sql in [
            "SELECT a; SELECT b;",
            "SELECT a; SELECT b",
            "SELECT 1; DROP TABLE Orders",
            "SELECT 1;;",
            "; SELECT 1",
        ] {
            assert_eq!(
                standard(sql),
                Classification::dangerous(OperationTag::MultipleStatements),
                "{}",
                sql
            );
        }
    }

    #[test]
    fn test_trailing_semicolon_alone_is_fine() {
        assert!(standard("SELECT 1 ;  -- done").is_read_only());
    }

    #[test]
    fn test_stacked_statement_hidden_after_comment_is_caught() {
        let verdict = standard("SELECT 1 /* harmless */; DELETE FROM Orders");
        assert_eq!(verdict.tag, OperationTag::MultipleStatements);
    }

    #[test]
    fn test_data_modification_priority() {
        assert_eq!(standard("TRUNCATE TABLE Orders").category, StatementCategory::Truncate);
        assert_eq!(
            standard("DELETE FROM Orders WHERE id = 1").category,
            StatementCategory::Delete
        );
        assert_eq!(
            standard("INSERT INTO Orders (id) VALUES (1)").category,
            StatementCategory::Insert
        );
        assert_eq!(
            standard("UPDATE Orders SET total = 0 WHERE id = 1").category,
            StatementCategory::Update
        );
        // DELETE outranks INSERT when both appear
        assert_eq!(
            standard("INSERT INTO archive SELECT * FROM (DELETE FROM t OUTPUT deleted.*) d").category,
            StatementCategory::Delete
        );
    }

    #[test]
    fn test_write_hidden_in_select_is_not_read_only() {
        let verdict = standard("SELECT * FROM (UPDATE logs SET checked = 1 OUTPUT inserted.id) AS u");
        assert_eq!(verdict.category, StatementCategory::Update);
    }

    #[test]
    fn test_word_boundaries_avoid_identifier_false_positives() {
        for sql in [
            "SELECT insertion_date, updated_at, deleted_flag FROM Orders",
            "SELECT created_by, dropout_rate FROM t",
            "SELECT * FROM executions",
        ] {
            assert!(standard(sql).is_read_only(), "{}", sql);
        }
    }

    #[test]
    fn test_admin_keywords_are_dangerous() {
        for (sql, tag) in [
            ("DROP TABLE Orders", OperationTag::Drop),
            ("create index ix on t (a)", OperationTag::Create),
            ("ALTER TABLE t ADD c INT", OperationTag::Alter),
            ("EXEC sp_who", OperationTag::Exec),
            ("EXECUTE sp_who", OperationTag::Execute),
            ("MERGE t USING s ON t.id = s.id", OperationTag::Merge),
            ("GRANT SELECT ON t TO bob", OperationTag::Grant),
            ("REVOKE SELECT ON t FROM bob", OperationTag::Revoke),
            ("DENY SELECT ON t TO bob", OperationTag::Deny),
        ] {
            assert_eq!(standard(sql), Classification::dangerous(tag), "{}", sql);
        }
    }

    #[test]
    fn test_dml_keeps_its_own_tag_next_to_admin_words() {
        let verdict = standard("INSERT INTO audit (action) VALUES ('create')");
        assert_eq!(verdict, Classification::new(StatementCategory::Insert, OperationTag::Insert));

        let verdict = standard("DELETE FROM Orders WHERE note = 'drop'");
        assert_eq!(verdict, Classification::new(StatementCategory::Delete, OperationTag::Delete));
        assert_eq!(authorize(&verdict, true, PolicyMode::Standard), PolicyDecision::Allowed);

        assert_eq!(standard("INSERT INTO t EXEC sp_dump").tag, OperationTag::Insert);
        assert_eq!(standard("CREATE PROCEDURE p AS UPDATE t SET a = 1").tag, OperationTag::Update);
    }

    #[test]
    fn test_strict_mode_adds_session_and_server_keywords() {
        assert!(standard("SELECT * FROM t WHERE [use] = 1").is_read_only());
        assert_eq!(
            strict("SELECT * FROM t WHERE [use] = 1"),
            Classification::dangerous(OperationTag::Use)
        );
        assert_eq!(strict("DBCC CHECKDB"), Classification::dangerous(OperationTag::Dbcc));
        assert_eq!(
            standard("USE master").tag,
            OperationTag::NonSelectStatement
        );
    }

    #[test]
    fn test_strict_mode_keeps_dml_tags() {
        let verdict = strict("UPDATE t SET a = 1 WHERE id = 2");
        assert_eq!(verdict.category, StatementCategory::Update);
    }

    #[test]
    fn test_select_into_is_dangerous() {
        let verdict = standard("SELECT * INTO backup_orders FROM Orders");
        assert_eq!(verdict, Classification::dangerous(OperationTag::SelectInto));
    }

    #[test]
    fn test_non_select_statements() {
        for sql in ["", "   ", "-- only a comment", "SHOW TABLES", "(SELECT 1)", "VALUES (1)"] {
            assert_eq!(
                standard(sql),
                Classification::dangerous(OperationTag::NonSelectStatement),
                "{:?}",
                sql
            );
        }
    }

    #[test]
    fn test_keyword_split_by_comment_is_not_reassembled() {
        // "DR OP" is neither DROP nor a SELECT
        let verdict = standard("DR/**/OP TABLE Orders");
        assert_eq!(verdict.tag, OperationTag::NonSelectStatement);
    }

    #[test]
    fn test_keyword_inside_string_literal_over_blocks() {
        let verdict = standard("SELECT * FROM t WHERE name = 'DROP TABLE'");
        assert_eq!(verdict, Classification::dangerous(OperationTag::Drop));
    }

    #[test]
    fn test_comment_marker_in_literal_cannot_hide_stacked_statement() {
        let verdict = standard("SELECT '--', 1 FROM t WHERE 1 = 0 OR 'x' = 'x' UNION SELECT name FROM sys.tables; DROP TABLE t");
        assert_eq!(verdict.tag, OperationTag::MultipleStatements);
    }

    #[test]
    fn test_dialect_quoting_cannot_hide_stacked_statement() {
        for sql in [
            r"SELECT 'a\' -- ' ; DROP TABLE t",
            r"SELECT 'a\'' ; DROP TABLE t --'",
            "SELECT $$ -- $$ ; DROP TABLE t",
            "SELECT $q$ /* $q$ ; DROP TABLE t -- */",
            "SELECT 1 # it's\n; DROP TABLE t -- '",
        ] {
            assert_eq!(
                standard(sql),
                Classification::dangerous(OperationTag::MultipleStatements),
                "{}",
                sql
            );
        }
    }

    #[test]
    fn test_dialect_quoting_cannot_hide_select_into() {
        for sql in [
            r"SELECT 'a\' -- ' INTO OUTFILE '/tmp/x'",
            "SELECT 1 --1 INTO OUTFILE '/tmp/x'",
            "SELECT 1 /*!50000 INTO OUTFILE '/tmp/x' */",
            "SELECT 1 /* /* */ ' */ ' -- ' INTO t2 FROM x",
        ] {
            assert_eq!(standard(sql), Classification::dangerous(OperationTag::SelectInto), "{}", sql);
        }
    }
}
