//! `sqlguard check` command implementation.
//!
//! Validates a configuration file:
//! - JSON Schema validation against the embedded `SqlGuardConfig` schema
//! - Semantic validation (allow-list entries, tenancy overrides)
//! - Warnings for settings that are legal but almost certainly unintended

use anyhow::{Context, Result};
use serde_json::Value as JsonValue;
use std::fs;
use std::path::{Path, PathBuf};

use sqlguard_core::{SqlGuardConfig, StorageBackend};

/// Embedded so validation works without the repository checked out.
const CONFIG_SCHEMA: &str = include_str!("../../../../schemas/SqlGuardConfig.schema.json");

// ============================================================================
// Check Result Types
// ============================================================================

/// Severity level for check results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational message.
    Info,
    /// Warning - may indicate a potential issue.
    Warning,
    /// Error - configuration is invalid.
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARN"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// A single check finding.
#[derive(Debug, Clone)]
pub struct CheckFinding {
    pub severity: Severity,
    /// Category of the check that produced this finding.
    pub category: String,
    pub message: String,
    /// Location within the file (e.g., "/guardrails/max_rows_per_query").
    pub location: Option<String>,
}

impl CheckFinding {
    fn error(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            category: category.into(),
            message: message.into(),
            location: None,
        }
    }

    fn warning(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            category: category.into(),
            message: message.into(),
            location: None,
        }
    }

    fn info(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            category: category.into(),
            message: message.into(),
            location: None,
        }
    }

    fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Results from running all checks.
#[derive(Debug, Default)]
pub struct CheckResults {
    pub file: PathBuf,
    pub findings: Vec<CheckFinding>,
}

impl CheckResults {
    fn new(file: &Path) -> Self {
        Self {
            file: file.to_path_buf(),
            findings: Vec::new(),
        }
    }

    fn extend(&mut self, findings: impl IntoIterator<Item = CheckFinding>) {
        self.findings.extend(findings);
    }

    /// Returns true if there are any errors.
    pub fn has_errors(&self) -> bool {
        self.count(Severity::Error) > 0
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == severity)
            .count()
    }

    /// Print human-readable summary.
    pub fn print_summary(&self) {
        for severity in [Severity::Error, Severity::Warning, Severity::Info] {
            let mut group: Vec<_> = self
                .findings
                .iter()
                .filter(|f| f.severity == severity)
                .collect();
            if group.is_empty() {
                continue;
            }
            group.sort_by(|a, b| a.category.cmp(&b.category));

            let title = match severity {
                Severity::Error => "❌ Errors",
                Severity::Warning => "⚠️  Warnings",
                Severity::Info => "ℹ️  Info",
            };
            println!("\n{} ({}):", title, group.len());
            println!("{}", "─".repeat(60));
            for finding in group {
                self.print_finding(finding);
            }
        }

        println!();
        println!("{}", "═".repeat(60));
        let errors = self.count(Severity::Error);
        let warnings = self.count(Severity::Warning);
        if errors == 0 && warnings == 0 {
            println!("✅ All checks passed!");
        } else {
            println!("Summary: {} error(s), {} warning(s)", errors, warnings);
        }
    }

    fn print_finding(&self, finding: &CheckFinding) {
        let location = match &finding.location {
            Some(l) => format!(" [{}:{}]", self.file.display(), l),
            None => format!(" [{}]", self.file.display()),
        };
        println!(
            "  {} [{}]{}: {}",
            finding.severity, finding.category, location, finding.message
        );
    }
}

// ============================================================================
// Main Check Runner
// ============================================================================

/// Run all configuration checks quietly (no output), returns the results.
pub fn run_quiet(config_path: &Path) -> Result<CheckResults> {
    let mut results = CheckResults::new(config_path);

    let content = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;

    // 1. JSON Schema validation
    results.extend(validate_against_schema(&content)?);

    // 2. Semantic validation; skipped when the structure is already wrong
    if !results.has_errors() {
        match SqlGuardConfig::from_yaml(&content) {
            Ok(config) => results.extend(check_guardrails(&config)),
            Err(e) => results.extend([CheckFinding::error("config", e.to_string())]),
        }
    }

    Ok(results)
}

/// Run all configuration checks.
pub fn run(config_path: &Path) -> Result<()> {
    println!("🔍 Checking {}...", config_path.display());

    let results = run_quiet(config_path)?;
    results.print_summary();

    if results.has_errors() {
        anyhow::bail!(
            "Configuration check failed with {} error(s)",
            results.count(Severity::Error)
        );
    }

    Ok(())
}

// ============================================================================
// Check 1: JSON Schema Validation
// ============================================================================

fn validate_against_schema(content: &str) -> Result<Vec<CheckFinding>> {
    let mut findings = Vec::new();

    // An empty file is an empty mapping: every field has a default.
    let parsed = if content.trim().is_empty() {
        Ok(JsonValue::Object(Default::default()))
    } else {
        serde_yaml::from_str(content)
    };
    let yaml_value: JsonValue = match parsed {
        Ok(JsonValue::Null) => JsonValue::Object(Default::default()),
        Ok(v) => v,
        Err(e) => {
            findings.push(CheckFinding::error(
                "json-schema",
                format!("Failed to parse YAML: {}", e),
            ));
            return Ok(findings);
        }
    };

    let schema: JsonValue =
        serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse embedded schema")?;
    let validator = match jsonschema::validator_for(&schema) {
        Ok(v) => v,
        Err(e) => {
            findings.push(CheckFinding::error(
                "json-schema",
                format!("Failed to compile JSON schema: {}", e),
            ));
            return Ok(findings);
        }
    };

    for error in validator.iter_errors(&yaml_value) {
        let path_str = error.instance_path().to_string();
        let location = if path_str.is_empty() {
            "(root)".to_string()
        } else {
            path_str
        };
        findings.push(
            CheckFinding::error("json-schema", error.to_string()).with_location(location),
        );
    }

    Ok(findings)
}

// ============================================================================
// Check 2: Guardrail Sanity
// ============================================================================

fn check_guardrails(config: &SqlGuardConfig) -> Vec<CheckFinding> {
    let mut findings = Vec::new();

    if config.allowed_tables.is_empty() {
        findings.push(
            CheckFinding::warning(
                "allowed-tables",
                "No tables are allowed; every query that reads a table will be rejected",
            )
            .with_location("/allowed_tables"),
        );
    }

    if config.guardrails.max_rows_per_query == 0 {
        findings.push(
            CheckFinding::warning(
                "guardrails",
                "max_rows_per_query is 0; every query returns no rows",
            )
            .with_location("/guardrails/max_rows_per_query"),
        );
    }

    if !config.audit.enabled {
        findings.push(
            CheckFinding::warning(
                "audit",
                "Audit logging is disabled; rejected queries leave no trace",
            )
            .with_location("/audit/enabled"),
        );
    } else if config.audit.backend == StorageBackend::File && config.audit.file_path.is_none() {
        findings.push(
            CheckFinding::info(
                "audit",
                format!(
                    "No audit.file_path set; events go to {}",
                    sqlguard_audit::storage::DEFAULT_AUDIT_FILE
                ),
            )
            .with_location("/audit/file_path"),
        );
    }

    findings
}
