//! SQL query result limiting to prevent excessive data transfer
//!
//! Row limits are injected into read-only statements by splicing text into
//! the statement the caller sent. Clause detection runs on a
//! [`StructuralView`], so comments and quoted literals never look like
//! clauses, and only clauses at parenthesis depth 0 of the main query count.
//!
//! SQL Server gets `TOP n` after the main SELECT and
//! `OFFSET o ROWS FETCH NEXT n ROWS ONLY` for pagination. The other dialects
//! get a trailing `LIMIT n [OFFSET o]`.
//!
//! The limiter never fails a statement: anything it cannot rewrite with
//! certainty is returned unchanged with a [`RewriteOutcome::Fallback`].

use crate::config::{DEFAULT_MAX_STATEMENT_BYTES, DEFAULT_REWRITE_BUDGET_MS, RowLimits};
use crate::error::RewriteError;
use crate::normalize::StructuralView;
use crate::types::{DatabaseType, StatementCategory};
use lazy_regex::{Lazy, Regex, lazy_regex};
use regex::{Captures, Match};
use schemars::JsonSchema;
use serde::Serialize;
use std::ops::Range;
use std::time::{Duration, Instant};

// Compile-time validated regexes, all applied to the structural view
static SELECT_WORD: Lazy<Regex> = lazy_regex!(r"(?i)\bSELECT\b");
static SELECT_HEAD: Lazy<Regex> = lazy_regex!(r"(?i)\ASELECT(?:\s+(?:DISTINCT|ALL)\b)?");
static TOP_CLAUSE: Lazy<Regex> = lazy_regex!(
    r"(?i)\ASELECT\s+(?:(?:DISTINCT|ALL)\s+)?TOP\b\s*(?:\(\s*(?P<paren>\d+)\s*\)|(?P<bare>\d+))?(?P<percent>\s+PERCENT\b)?"
);
static FETCH_CLAUSE: Lazy<Regex> =
    lazy_regex!(r"(?i)\bFETCH\s+(?:NEXT|FIRST)\s+(?P<count>\d+)\s+ROWS?\s+ONLY\b");
static OFFSET_ROWS: Lazy<Regex> = lazy_regex!(r"(?i)\bOFFSET\s+\d+\s+ROWS?\b");
static BARE_OFFSET: Lazy<Regex> = lazy_regex!(r"(?i)\bOFFSET\s+\d+\b");
static LIMIT_CLAUSE: Lazy<Regex> = lazy_regex!(r"(?i)\bLIMIT\s+(?:\d+\s*,\s*)?(?P<count>\d+)\b");
static TSQL_PAGING_WORD: Lazy<Regex> = lazy_regex!(r"(?i)\b(?:OFFSET|FETCH)\b");
static LIMIT_PAGING_WORD: Lazy<Regex> = lazy_regex!(r"(?i)\b(?:OFFSET|FETCH|LIMIT)\b");
static ORDER_BY: Lazy<Regex> = lazy_regex!(r"(?i)\bORDER\s+BY\b");
static TRAILING_CLAUSE: Lazy<Regex> = lazy_regex!(
    r"(?i)\bFOR\s+(?:XML|JSON|BROWSE|SHARE|NO\s+KEY|KEY\s+SHARE)\b|\bOPTION\s*\(|\bLOCK\s+IN\s+SHARE\s+MODE\b"
);

/// A statement plus the row window it should be limited to
///
/// The limit is clamped through [`RowLimits`] on construction, so the limiter
/// never sees a value above the server ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteRequest<'a> {
    pub sql: &'a str,
    pub limit: u64,
    pub offset: u64,
}

impl<'a> RewriteRequest<'a> {
    pub fn new(
        sql: &'a str,
        limits: &RowLimits,
        max_rows: Option<u64>,
        offset: Option<u64>,
    ) -> Self {
        Self {
            sql,
            limit: limits.clamp(max_rows),
            offset: offset.unwrap_or(0),
        }
    }
}

/// What the limiter did to a statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RewriteOutcome {
    /// Statement is not read-only; row limits do not apply
    NotApplicable,
    /// Existing row cap already within the limit
    WithinLimit { existing: u64 },
    /// Existing row cap lowered to the limit
    Capped { existing: u64, limit: u64 },
    /// Row-limit clause added
    Inserted { limit: u64 },
    /// Offset/pagination clause added
    Paginated { offset: u64, limit: u64 },
    /// Statement left unchanged because it could not be rewritten safely
    Fallback { reason: String },
}

/// Statement text to execute plus the limiter's outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct RewriteResult {
    pub sql: String,
    pub outcome: RewriteOutcome,
}

impl RewriteResult {
    fn unchanged(sql: &str, outcome: RewriteOutcome) -> Self {
        Self {
            sql: sql.to_string(),
            outcome,
        }
    }

    pub fn is_modified(&self) -> bool {
        matches!(
            self.outcome,
            RewriteOutcome::Capped { .. }
                | RewriteOutcome::Inserted { .. }
                | RewriteOutcome::Paginated { .. }
        )
    }

    /// Row cap the statement carries after rewriting, when known
    pub fn effective_limit(&self) -> Option<u64> {
        match self.outcome {
            RewriteOutcome::WithinLimit { existing } => Some(existing),
            RewriteOutcome::Capped { limit, .. }
            | RewriteOutcome::Inserted { limit }
            | RewriteOutcome::Paginated { limit, .. } => Some(limit),
            RewriteOutcome::NotApplicable | RewriteOutcome::Fallback { .. } => None,
        }
    }
}

/// Dialect-aware row limiter with a per-statement time budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLimiter {
    db_type: DatabaseType,
    budget: Duration,
    max_statement_bytes: usize,
}

impl RowLimiter {
    pub fn new(db_type: DatabaseType) -> Self {
        Self {
            db_type,
            budget: Duration::from_millis(DEFAULT_REWRITE_BUDGET_MS),
            max_statement_bytes: DEFAULT_MAX_STATEMENT_BYTES,
        }
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_max_statement_bytes(mut self, max_statement_bytes: usize) -> Self {
        self.max_statement_bytes = max_statement_bytes;
        self
    }

    pub fn database_type(&self) -> DatabaseType {
        self.db_type
    }

    /// Apply the request's row window to a read-only statement
    ///
    /// Non-read-only statements come back untouched. Never fails: on any
    /// ambiguity the original text is returned with a fallback outcome.
    pub fn rewrite(&self, request: &RewriteRequest<'_>, category: StatementCategory) -> RewriteResult {
        if category != StatementCategory::ReadOnly {
            return RewriteResult::unchanged(request.sql, RewriteOutcome::NotApplicable);
        }

        let deadline = Instant::now().checked_add(self.budget);
        match self.try_rewrite(request, deadline) {
            Ok(result) => {
                log::debug!("Row limit applied ({:?})", result.outcome);
                result
            }
            Err(err) => {
                log::warn!(
                    "Row limit not applied, executing statement unchanged: {} ({})",
                    err,
                    request.sql.chars().take(50).collect::<String>()
                );
                RewriteResult::unchanged(
                    request.sql,
                    RewriteOutcome::Fallback {
                        reason: err.to_string(),
                    },
                )
            }
        }
    }

    fn try_rewrite(
        &self,
        request: &RewriteRequest<'_>,
        deadline: Option<Instant>,
    ) -> Result<RewriteResult, RewriteError> {
        let sql = request.sql;
        if sql.len() > self.max_statement_bytes {
            return Err(RewriteError::InputTooLarge {
                size: sql.len(),
                max: self.max_statement_bytes,
            });
        }

        let view = StructuralView::new(sql);
        if view.text().trim().is_empty() {
            return Err(RewriteError::EmptyStatement);
        }
        // clause offsets are only trustworthy where the dialect lexes like the view
        if let Some((_, hazard)) = view.hazards().iter().find(|(_, h)| h.affects(self.db_type)) {
            return Err(RewriteError::AmbiguousQuoting(hazard.description()));
        }
        self.check_budget(deadline)?;

        let main_select = find_top_level(&view, &SELECT_WORD, 0)
            .and_then(|caps| caps.get(0))
            .map(|m| m.start())
            .ok_or(RewriteError::MainSelectNotFound)?;

        let edit = if self.db_type.uses_top() {
            top_edit(&view, main_select, request)?
        } else {
            limit_edit(&view, main_select, request)?
        };
        self.check_budget(deadline)?;

        edit.apply(sql)
    }

    fn check_budget(&self, deadline: Option<Instant>) -> Result<(), RewriteError> {
        match deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Err(RewriteError::BudgetExceeded(self.budget))
            }
            _ => Ok(()),
        }
    }
}

/// Apply a row limit to a read-only statement with default budgets
///
/// # Examples
/// ```
/// # use kodegen_tools_sql_guard::sql_limiter::rewrite_for_limit;
/// # use kodegen_tools_sql_guard::types::{DatabaseType, StatementCategory};
/// let result = rewrite_for_limit(
///     "SELECT * FROM Orders",
///     StatementCategory::ReadOnly,
///     100,
///     None,
///     DatabaseType::SqlServer,
/// );
/// assert_eq!(result.sql, "SELECT TOP 100 * FROM Orders");
///
/// let result = rewrite_for_limit(
///     "SELECT * FROM users LIMIT 200",
///     StatementCategory::ReadOnly,
///     100,
///     None,
///     DatabaseType::Postgres,
/// );
/// assert_eq!(result.sql, "SELECT * FROM users LIMIT 100");
/// ```
pub fn rewrite_for_limit(
    sql: &str,
    category: StatementCategory,
    limit: u64,
    offset: Option<u64>,
    db_type: DatabaseType,
) -> RewriteResult {
    let limit = limit.max(1);
    let limits = RowLimits {
        ceiling: limit,
        default_limit: limit,
    };
    let request = RewriteRequest::new(sql, &limits, None, offset);
    RowLimiter::new(db_type).rewrite(&request, category)
}

/// Single text substitution planned against the structural view
enum Edit {
    Keep(RewriteOutcome),
    Splice {
        range: Range<usize>,
        text: String,
        outcome: RewriteOutcome,
    },
}

impl Edit {
    fn insert(at: usize, text: String, outcome: RewriteOutcome) -> Self {
        Self::Splice {
            range: at..at,
            text,
            outcome,
        }
    }

    fn apply(self, sql: &str) -> Result<RewriteResult, RewriteError> {
        match self {
            Self::Keep(outcome) => Ok(RewriteResult::unchanged(sql, outcome)),
            Self::Splice {
                range,
                text,
                outcome,
            } => {
                if range.end > sql.len()
                    || !sql.is_char_boundary(range.start)
                    || !sql.is_char_boundary(range.end)
                {
                    return Err(RewriteError::MisalignedEdit);
                }
                let mut rewritten = sql.to_string();
                rewritten.replace_range(range, &text);
                Ok(RewriteResult {
                    sql: rewritten,
                    outcome,
                })
            }
        }
    }
}

/// First match of `pattern` at parenthesis depth 0, at or after `from`
fn find_top_level<'t>(
    view: &'t StructuralView,
    pattern: &Regex,
    from: usize,
) -> Option<Captures<'t>> {
    pattern.captures_iter(view.text()).find(|caps| {
        caps.get(0)
            .is_some_and(|m| m.start() >= from && view.is_top_level(m.start()))
    })
}

fn named<'t>(caps: &Captures<'t>, name: &'static str) -> Result<Match<'t>, RewriteError> {
    caps.name(name)
        .ok_or(RewriteError::AmbiguousRowLimit("row count not captured"))
}

/// Lower an existing literal row count to `limit`; `shift` maps the match
/// back to statement offsets
fn cap_count(count: Match<'_>, shift: usize, limit: u64) -> Edit {
    // Digits only, so a parse failure means the value overflowed u64
    let existing = count.as_str().parse::<u64>().unwrap_or(u64::MAX);
    if existing <= limit {
        return Edit::Keep(RewriteOutcome::WithinLimit { existing });
    }
    Edit::Splice {
        range: shift + count.start()..shift + count.end(),
        text: limit.to_string(),
        outcome: RewriteOutcome::Capped { existing, limit },
    }
}

/// Add a clause at the end of the main query, ahead of any trailing
/// `FOR XML`/`FOR JSON`/`OPTION (...)` style clause
fn append_clause(view: &StructuralView, from: usize, clause: &str, outcome: RewriteOutcome) -> Edit {
    match find_top_level(view, &TRAILING_CLAUSE, from).and_then(|caps| caps.get(0)) {
        Some(trailing) => Edit::insert(
            trailing.start(),
            format!("{} ", clause.trim_start()),
            outcome,
        ),
        None => Edit::insert(view.append_offset(), clause.to_string(), outcome),
    }
}

/// SQL Server: `TOP n` and `OFFSET .. FETCH NEXT n ROWS ONLY`
fn top_edit(
    view: &StructuralView,
    main_select: usize,
    request: &RewriteRequest<'_>,
) -> Result<Edit, RewriteError> {
    let limit = request.limit;

    if let Some(caps) = find_top_level(view, &FETCH_CLAUSE, main_select) {
        return Ok(cap_count(named(&caps, "count")?, 0, limit));
    }
    if let Some(offset) = find_top_level(view, &OFFSET_ROWS, main_select).and_then(|c| c.get(0)) {
        return Ok(Edit::insert(
            offset.end(),
            format!(" FETCH NEXT {} ROWS ONLY", limit),
            RewriteOutcome::Inserted { limit },
        ));
    }
    if find_top_level(view, &TSQL_PAGING_WORD, main_select).is_some() {
        return Err(RewriteError::AmbiguousRowLimit(
            "OFFSET/FETCH without a literal row count",
        ));
    }

    let head = &view.text()[main_select..];
    if let Some(top) = TOP_CLAUSE.captures(head) {
        if top.name("percent").is_some() {
            return Err(RewriteError::AmbiguousRowLimit("TOP ... PERCENT"));
        }
        let count = top
            .name("paren")
            .or_else(|| top.name("bare"))
            .ok_or(RewriteError::AmbiguousRowLimit("TOP with a non-literal row count"))?;
        return Ok(cap_count(count, main_select, limit));
    }

    let offset = request.offset;
    if offset > 0 {
        let mut clause = String::new();
        // OFFSET/FETCH is only valid after an ORDER BY
        if find_top_level(view, &ORDER_BY, main_select).is_none() {
            clause.push_str(" ORDER BY (SELECT NULL)");
        }
        clause.push_str(&format!(
            " OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
            offset, limit
        ));
        return Ok(append_clause(
            view,
            main_select,
            &clause,
            RewriteOutcome::Paginated { offset, limit },
        ));
    }

    let select = SELECT_HEAD
        .find(head)
        .ok_or(RewriteError::MainSelectNotFound)?;
    Ok(Edit::insert(
        main_select + select.end(),
        format!(" TOP {}", limit),
        RewriteOutcome::Inserted { limit },
    ))
}

/// PostgreSQL, MySQL, MariaDB, SQLite: trailing `LIMIT n [OFFSET o]`
fn limit_edit(
    view: &StructuralView,
    main_select: usize,
    request: &RewriteRequest<'_>,
) -> Result<Edit, RewriteError> {
    let limit = request.limit;

    if let Some(caps) = find_top_level(view, &FETCH_CLAUSE, main_select) {
        return Ok(cap_count(named(&caps, "count")?, 0, limit));
    }
    if let Some(caps) = find_top_level(view, &LIMIT_CLAUSE, main_select) {
        return Ok(cap_count(named(&caps, "count")?, 0, limit));
    }
    if let Some(offset) = find_top_level(view, &BARE_OFFSET, main_select).and_then(|c| c.get(0)) {
        return Ok(Edit::insert(
            offset.start(),
            format!("LIMIT {} ", limit),
            RewriteOutcome::Inserted { limit },
        ));
    }
    if find_top_level(view, &LIMIT_PAGING_WORD, main_select).is_some() {
        return Err(RewriteError::AmbiguousRowLimit(
            "LIMIT/OFFSET/FETCH without a literal row count",
        ));
    }

    let offset = request.offset;
    if offset > 0 {
        return Ok(append_clause(
            view,
            main_select,
            &format!(" LIMIT {} OFFSET {}", limit, offset),
            RewriteOutcome::Paginated { offset, limit },
        ));
    }
    Ok(append_clause(
        view,
        main_select,
        &format!(" LIMIT {}", limit),
        RewriteOutcome::Inserted { limit },
    ))
}
