//! SQL text normalization for keyword detection
//!
//! Two views of a statement are produced here:
//!
//! - [`normalize`] strips comments, folds whitespace and case. The classifier
//!   and the advisory generator only ever look at this view.
//! - [`StructuralView`] blanks comments and the contents of quoted literals
//!   with spaces of equal byte length. Byte offsets line up with the original
//!   text, so the row limiter can detect clauses here and splice its edits
//!   into the statement the caller actually sent.
//!
//! Comment markers inside quoted strings and identifiers are not comments, so
//! quoted spans are recognized first. Quoted contents are still part of the
//! normalized text: a keyword inside a string literal is seen by the
//! classifier.
//!
//! The lexer reads ANSI quoting. Where a supported dialect could read the
//! text differently ([`DialectHazard`]), comments from that point on are kept
//! in the normalized text rather than stripped.

use crate::types::DatabaseType;
use lazy_regex::{Lazy, Regex, lazy_regex};
use regex::Captures;

// Leftmost alternative wins, so an opening quote hides any comment marker
// inside the literal. An unterminated block comment runs to end of input.
static LEXEME: Lazy<Regex> = lazy_regex!(
    r#"(?s)(?P<string>'(?:[^']|'')*')|(?P<ident>"(?:[^"]|"")*"|`(?:[^`]|``)*`)|(?P<bracket>\[(?:[^\]]|\]\])*\])|(?P<block>/\*.*?(?:\*/|\z))|(?P<line>--[^\r\n]*)"#
);
static WHITESPACE: Lazy<Regex> = lazy_regex!(r"\s+");
static DOLLAR_QUOTE: Lazy<Regex> = lazy_regex!(r"\$(?:[A-Za-z_][A-Za-z_0-9]*)?\$");
static HASH_COMMENT: Lazy<Regex> = lazy_regex!(r"#");

fn is_comment(caps: &Captures) -> bool {
    caps.name("block").is_some() || caps.name("line").is_some()
}

/// Quoting or comment syntax that not every supported dialect reads the same way
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialectHazard {
    /// Backslash inside a quoted literal: an escape in MySQL/MariaDB and in
    /// Postgres `E''` strings
    BackslashEscape,
    /// Postgres `$tag$ ... $tag$` string
    DollarQuote,
    /// MySQL `#` line comment on a line that also holds quoting
    HashComment,
    /// MySQL/MariaDB `/*! ... */`, executed rather than ignored
    ExecutableComment,
    /// `--` not followed by whitespace: two minus signs in MySQL/MariaDB
    BareDoubleDash,
    /// `/*` inside a block comment: nests in SQL Server and Postgres
    NestedComment,
    /// `[...]` holding quotes or comment markers: an identifier only in SQL
    /// Server and SQLite
    BracketQuoting,
}

impl DialectHazard {
    /// Whether `db_type` reads this construct differently from the lexer
    pub fn affects(&self, db_type: DatabaseType) -> bool {
        use DatabaseType::*;
        match self {
            Self::BackslashEscape => matches!(db_type, MySQL | MariaDB | Postgres),
            Self::DollarQuote => db_type == Postgres,
            Self::HashComment | Self::ExecutableComment | Self::BareDoubleDash => {
                matches!(db_type, MySQL | MariaDB)
            }
            Self::NestedComment => matches!(db_type, SqlServer | Postgres),
            Self::BracketQuoting => matches!(db_type, MySQL | MariaDB | Postgres),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::BackslashEscape => "backslash inside a quoted literal",
            Self::DollarQuote => "dollar-quoted string",
            Self::HashComment => "# comment on a line with quoting",
            Self::ExecutableComment => "executable /*! */ comment",
            Self::BareDoubleDash => "-- without a following space",
            Self::NestedComment => "nested block comment",
            Self::BracketQuoting => "quoting inside [...]",
        }
    }
}

fn lexeme_hazard(caps: &Captures) -> Option<DialectHazard> {
    if let Some(quoted) = caps.name("string").or_else(|| caps.name("ident")) {
        // backtick identifiers never take backslash escapes
        let text = quoted.as_str();
        return (!text.starts_with('`') && text.contains('\\'))
            .then_some(DialectHazard::BackslashEscape);
    }
    if let Some(bracket) = caps.name("bracket") {
        let text = bracket.as_str();
        let quoting = text.contains(|c: char| matches!(c, '\'' | '"' | '`'))
            || text.contains("--")
            || text.contains("/*");
        return quoting.then_some(DialectHazard::BracketQuoting);
    }
    if let Some(block) = caps.name("block") {
        let text = block.as_str();
        if text.starts_with("/*!") || text.starts_with("/*M!") {
            return Some(DialectHazard::ExecutableComment);
        }
        return text
            .get(2..)
            .is_some_and(|body| body.contains("/*"))
            .then_some(DialectHazard::NestedComment);
    }
    caps.name("line")
        .and_then(|line| line.as_str().chars().nth(2))
        .filter(|c| !c.is_whitespace())
        .map(|_| DialectHazard::BareDoubleDash)
}

/// Strip SQL comments (line and block), keeping quoted text intact
///
/// Each comment is replaced by a single space so tokens on either side never
/// fuse together (`DR/**/OP` stays two words). Comments at or after the first
/// [`DialectHazard`] are kept, since some dialect may not read them as
/// comments.
///
/// # Examples
/// ```
/// # use kodegen_tools_sql_guard::normalize::strip_comments;
/// let sql = "SELECT * FROM users -- get all\n/* WHERE active */";
/// assert_eq!(strip_comments(sql).trim(), "SELECT * FROM users");
///
/// let sql = "SELECT '-- not a comment' FROM t";
/// assert!(strip_comments(sql).contains("-- not a comment"));
///
/// // MySQL reads `\'` as an escaped quote, so this "comment" may be code
/// let sql = r"SELECT 'a\' -- ' ; DROP TABLE t";
/// assert!(strip_comments(sql).contains("DROP TABLE t"));
/// ```
pub fn strip_comments(sql: &str) -> String {
    let trusted_until = StructuralView::new(sql)
        .first_hazard()
        .map_or(sql.len(), |(offset, _)| offset);

    LEXEME
        .replace_all(sql, |caps: &Captures| match caps.get(0) {
            Some(span) if is_comment(caps) && span.start() < trusted_until => " ".to_string(),
            Some(span) => span.as_str().to_string(),
            None => String::new(),
        })
        .into_owned()
}

/// Normalized statement text used for keyword matching
///
/// Comments removed, whitespace collapsed to single spaces, trimmed, and
/// upper-cased. Never executed and never re-serialized.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedSql(String);

impl NormalizedSql {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keyword the statement starts with, if it starts with a word
    pub fn first_keyword(&self) -> Option<&str> {
        self.0
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .next()
            .filter(|word| !word.is_empty())
    }
}

impl std::fmt::Display for NormalizedSql {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize a statement for keyword detection
///
/// Never fails. Unmatched comment delimiters are left as literal text, except
/// an unterminated `/*`, which consumes the rest of the statement.
///
/// # Examples
/// ```
/// # use kodegen_tools_sql_guard::normalize::normalize;
/// let normalized = normalize("  select *\n\tfrom Orders /* all */ ");
/// assert_eq!(normalized.as_str(), "SELECT * FROM ORDERS");
/// assert_eq!(normalized.first_keyword(), Some("SELECT"));
/// ```
pub fn normalize(sql: &str) -> NormalizedSql {
    let stripped = strip_comments(sql);
    let collapsed = WHITESPACE.replace_all(&stripped, " ");
    NormalizedSql(collapsed.trim().to_uppercase())
}

/// Offset-preserving view of a statement for structural clause detection
///
/// Comments become spaces and quoted literals keep only their delimiters, so
/// neither can be mistaken for a clause. Every byte offset into `text` is a
/// valid offset into the original statement.
#[derive(Debug, Clone)]
pub struct StructuralView {
    text: String,
    depth: Vec<u32>,
    hazards: Vec<(usize, DialectHazard)>,
}

impl StructuralView {
    pub fn new(sql: &str) -> Self {
        let mut hazards = Vec::new();
        let text = LEXEME
            .replace_all(sql, |caps: &Captures| {
                let span = &caps[0];
                if let (Some(hazard), Some(m)) = (lexeme_hazard(caps), caps.get(0)) {
                    hazards.push((m.start(), hazard));
                }
                if is_comment(caps) {
                    " ".repeat(span.len())
                } else {
                    blank_quoted(span)
                }
            })
            .into_owned();

        hazards.extend(
            DOLLAR_QUOTE
                .find_iter(&text)
                .map(|m| (m.start(), DialectHazard::DollarQuote)),
        );
        // `#` is code to the lexer, so only a line that also opens quoting can
        // leave MySQL and the lexer out of step
        for hash in HASH_COMMENT.find_iter(&text) {
            let line = sql[hash.start()..].lines().next().unwrap_or_default();
            if line.contains(|c: char| matches!(c, '\'' | '"' | '`' | '[')) || line.contains("/*") {
                hazards.push((hash.start(), DialectHazard::HashComment));
            }
        }
        hazards.sort_by_key(|(offset, _)| *offset);

        let depth = paren_depths(&text);
        Self {
            text,
            depth,
            hazards,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Parenthesis nesting depth at a byte offset
    ///
    /// Parentheses themselves report the depth of the enclosing scope.
    pub fn depth_at(&self, offset: usize) -> u32 {
        self.depth.get(offset).copied().unwrap_or(0)
    }

    pub fn is_top_level(&self, offset: usize) -> bool {
        self.depth_at(offset) == 0
    }

    /// Dialect hazards in offset order
    pub fn hazards(&self) -> &[(usize, DialectHazard)] {
        &self.hazards
    }

    pub fn first_hazard(&self) -> Option<(usize, DialectHazard)> {
        self.hazards.first().copied()
    }

    /// Offset where a trailing clause can be appended
    ///
    /// Just past the last structural character, before any trailing `;` and
    /// any trailing comment or whitespace.
    pub fn append_offset(&self) -> usize {
        let body = self.text.trim_end();
        let body = body.strip_suffix(';').unwrap_or(body).trim_end();
        body.len()
    }
}

/// Keep the quote characters of a literal and blank everything between them
fn blank_quoted(span: &str) -> String {
    let mut chars = span.chars();
    match (chars.next(), chars.next_back()) {
        (Some(open), Some(close)) => {
            let inner = span.len() - open.len_utf8() - close.len_utf8();
            let mut out = String::with_capacity(span.len());
            out.push(open);
            out.push_str(&" ".repeat(inner));
            out.push(close);
            out
        }
        _ => " ".repeat(span.len()),
    }
}

fn paren_depths(text: &str) -> Vec<u32> {
    let mut depths = Vec::with_capacity(text.len());
    let mut depth: u32 = 0;
    for byte in text.bytes() {
        match byte {
            b'(' => {
                depths.push(depth);
                depth += 1;
            }
            b')' => {
                depth = depth.saturating_sub(1);
                depths.push(depth);
            }
            _ => depths.push(depth),
        }
    }
    depths
}
