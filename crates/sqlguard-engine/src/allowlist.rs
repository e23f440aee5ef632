//! Allow-list enforcement over resolved table references.

use sqlguard_core::AllowedTables;

use crate::error::GuardError;
use crate::resolver::TableReference;

/// Check every reference against `allowed`, failing on the first miss.
///
/// Returns the distinct table names in first-seen order.
pub fn enforce_allow_list(
    references: &[TableReference],
    allowed: &AllowedTables,
) -> Result<Vec<String>, GuardError> {
    let mut tables_used: Vec<String> = Vec::new();
    for reference in references {
        if !allowed.contains(&reference.name) {
            return Err(GuardError::disallowed_table(&reference.name));
        }
        if !tables_used.contains(&reference.name) {
            tables_used.push(reference.name.clone());
        }
    }
    Ok(tables_used)
}
