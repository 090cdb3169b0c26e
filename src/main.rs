// SQL Guard CLI
//
// Evaluates one SQL statement and prints the guard's verdict as JSON.
// The statement comes from the first argument, or stdin when omitted.
//
// OPTIONAL: SQL_GUARD_* and DATABASE_DSN environment variables (see GuardConfig::from_env).
// Exits 2 when the statement is not allowed.

use anyhow::{Context, Result};
use clap::Parser;
use kodegen_tools_sql_guard::{DatabaseType, GuardConfig, PolicyMode, SqlGuard, StatementRequest};
use std::io::Read;
use std::process;

// ============================================================================
// COMMAND LINE
// ============================================================================

#[derive(Parser)]
#[command(
    name = "kodegen-sql-guard",
    about = "Classify a SQL statement, authorize it, and apply row limits"
)]
struct Cli {
    /// SQL statement (read from stdin when omitted)
    sql: Option<String>,

    /// Acknowledge DELETE/TRUNCATE
    #[arg(long)]
    confirm_unsafe: bool,

    /// Row limit, clamped to the configured ceiling
    #[arg(long)]
    max_rows: Option<u64>,

    /// Rows to skip
    #[arg(long)]
    offset: Option<u64>,

    /// Policy mode (standard, read_only)
    #[arg(long)]
    mode: Option<PolicyMode>,

    /// Dialect used for row limits (sqlserver, postgres, mysql, mariadb, sqlite)
    #[arg(long)]
    database_type: Option<DatabaseType>,
}

fn read_statement(cli_sql: Option<String>) -> Result<String> {
    match cli_sql {
        Some(sql) => Ok(sql),
        None => {
            let mut sql = String::new();
            std::io::stdin()
                .read_to_string(&mut sql)
                .context("Failed to read SQL from stdin")?;
            Ok(sql)
        }
    }
}

// ============================================================================
// MAIN ENTRY POINT
// ============================================================================

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = GuardConfig::from_env().context("Invalid SQL guard configuration")?;
    if let Some(database_type) = cli.database_type {
        config.database_type = database_type;
    }
    let guard = SqlGuard::new(config)?;

    let request = StatementRequest {
        sql: read_statement(cli.sql)?,
        confirm_unsafe: cli.confirm_unsafe,
        max_rows: cli.max_rows,
        offset: cli.offset,
        mode: cli.mode,
    };

    let evaluation = guard.evaluate(&request);
    let output =
        serde_json::to_string_pretty(&evaluation).context("Failed to serialize evaluation")?;
    println!("{}", output);

    if !evaluation.is_allowed() {
        process::exit(2);
    }
    Ok(())
}
