//! `sqlguard guard` command implementation.
//!
//! Reads one statement from the argument or stdin, guards it and prints the
//! result as JSON on stdout. Rejections print only the generic message and
//! are recorded in the audit trail.

use anyhow::{Context, Result};
use clap::Args;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use sqlguard_audit::AuditLogger;
use sqlguard_core::SqlGuardConfig;
use sqlguard_engine::{GuardRequest, SqlGuard};

use super::DEFAULT_CONFIG_FILE;

#[derive(Args, Debug)]
pub struct GuardArgs {
    /// Tenant the caller is authorized to see
    #[arg(long, short = 't')]
    pub tenant: String,

    /// Row cap for this query (defaults to guardrails.max_rows_per_query)
    #[arg(long)]
    pub max_rows: Option<u64>,

    /// Path to the configuration file (defaults to ./sqlguard.yaml when present)
    #[arg(long, short = 'c', env = "SQLGUARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also print the tenant predicates that were added
    #[arg(long, default_value_t = false)]
    pub explain: bool,

    /// SQL statement; read from stdin when omitted
    pub sql: Option<String>,
}

/// Outcome of guarding one statement.
#[derive(Debug)]
pub enum GuardOutcome {
    /// JSON document for stdout.
    Accepted(String),
    /// Message for stderr.
    Rejected(&'static str),
}

pub fn run(args: &GuardArgs) -> Result<ExitCode> {
    let config = load_config(args.config.as_deref())?;
    let sql = match &args.sql {
        Some(sql) => sql.clone(),
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read SQL from stdin")?;
            buffer
        }
    };

    let logger = AuditLogger::new(config.audit.clone()).context("Failed to open audit log")?;

    match guard_statement(&config, &logger, args, &sql)? {
        GuardOutcome::Accepted(json) => {
            println!("{}", json);
            Ok(ExitCode::SUCCESS)
        }
        GuardOutcome::Rejected(message) => {
            eprintln!("{}", message);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Load the configuration. An explicit path must exist; the default file is
/// optional and built-in defaults apply without it.
pub fn load_config(path: Option<&Path>) -> Result<SqlGuardConfig> {
    match path {
        Some(path) => SqlGuardConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                SqlGuardConfig::from_file(default_path).with_context(|| {
                    format!("Failed to load configuration from {}", DEFAULT_CONFIG_FILE)
                })
            } else {
                tracing::debug!("No {} found, using built-in defaults", DEFAULT_CONFIG_FILE);
                Ok(SqlGuardConfig::default())
            }
        }
    }
}

/// Guard `sql` and record the outcome.
pub fn guard_statement(
    config: &SqlGuardConfig,
    logger: &AuditLogger,
    args: &GuardArgs,
    sql: &str,
) -> Result<GuardOutcome> {
    let guard = SqlGuard::new(config);
    let request = GuardRequest {
        sql,
        expected_tenant_id: &args.tenant,
        max_rows: args.max_rows,
    };
    let shape = guard.analyzer().query_shape(sql);

    match guard.explain(&request) {
        Ok(explanation) => {
            logger
                .record_accepted(&args.tenant, &shape, &explanation.result)
                .context("Failed to write audit event")?;
            let json = if args.explain {
                serde_json::to_string_pretty(&explanation)?
            } else {
                serde_json::to_string_pretty(&explanation.result)?
            };
            Ok(GuardOutcome::Accepted(json))
        }
        Err(err) => {
            logger
                .record_rejected(&args.tenant, &shape, &err)
                .context("Failed to write audit event")?;
            Ok(GuardOutcome::Rejected(err.public_message()))
        }
    }
}
