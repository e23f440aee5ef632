//! # sqlguard-engine
//!
//! Validation and tenant-scoped rewriting of untrusted SQL.
//!
//! The guard accepts a single read-only `SELECT`, checks every table it
//! touches against an allow-list, scopes every base table reference to the
//! caller's tenant and caps the number of returned rows:
//!
//! **Before (from the agent):**
//! ```sql
//! SELECT * FROM projects WHERE status = 'active' LIMIT 5000
//! ```
//!
//! **After (to the executor):**
//! ```sql
//! SELECT * FROM projects WHERE status = 'active' AND projects.tenant_id = 'org_a' LIMIT 100
//! ```
//!
//! ## Pipeline
//!
//! | Stage | Failure |
//! |-------|---------|
//! | parse exactly one statement | `EmptyInput`, `ParseError`, `MultipleStatements` |
//! | read-only shape check | `DisallowedStatement` |
//! | resolve base tables | `DisallowedTable` |
//! | allow-list | `DisallowedTable` |
//! | tenant predicate injection | |
//! | row cap on the outer query | |
//!
//! Every rewrite happens on the syntax tree; the output is rendered from it.

pub mod allowlist;
pub mod error;
pub mod guard;
pub mod injector;
pub mod limit;
pub mod parser;
pub mod resolver;
pub mod validator;

pub use error::{GuardError, PUBLIC_ERROR_MESSAGE};
pub use guard::{
    DEFAULT_MAX_ROWS, GuardExplanation, GuardOptions, GuardRequest, GuardResult, SqlGuard, guard,
};
pub use injector::TenantFilterInjector;
pub use parser::SqlAnalyzer;
pub use resolver::{TableReference, resolve_tables};
