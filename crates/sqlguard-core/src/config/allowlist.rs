//! Registry of logical tables a guarded query may reference.
//!
//! Entries are bare, unqualified identifiers. A schema-qualified reference
//! such as `system.tables` or `information_schema.columns` is compared as a
//! whole and therefore can never match an entry.

use serde::{Deserialize, Serialize};

use super::{ConfigError, is_plain_identifier};

/// Case-insensitive set of permitted table names, kept in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct AllowedTables {
    names: Vec<String>,
}

impl AllowedTables {
    /// Build a registry, rejecting empty, qualified or otherwise non-identifier names.
    pub fn new<I, S>(names: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tables: Vec<String> = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if !is_plain_identifier(name) {
                return Err(ConfigError::Config(format!(
                    "allowed table '{name}' must be a bare, unqualified identifier"
                )));
            }
            let name = name.to_ascii_lowercase();
            if !tables.contains(&name) {
                tables.push(name);
            }
        }
        Ok(Self { names: tables })
    }

    /// Whether `name` (possibly schema-qualified) is permitted.
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|t| t.eq_ignore_ascii_case(name))
    }

    /// Iterate over the normalized (lowercase) names.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for AllowedTables {
    fn default() -> Self {
        Self {
            names: vec![
                "projects".to_string(),
                "companies".to_string(),
                "addresses".to_string(),
            ],
        }
    }
}

impl TryFrom<Vec<String>> for AllowedTables {
    type Error = ConfigError;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(names)
    }
}

impl From<AllowedTables> for Vec<String> {
    fn from(tables: AllowedTables) -> Self {
        tables.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        let tables = AllowedTables::new(["Projects", "companies"]).unwrap();
        assert!(tables.contains("projects"));
        assert!(tables.contains("PROJECTS"));
        assert!(tables.contains("Companies"));
        assert!(!tables.contains("addresses"));
    }

    #[test]
    fn test_duplicates_collapse() {
        let tables = AllowedTables::new(["projects", "PROJECTS", "companies"]).unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables.iter().collect::<Vec<_>>(), vec!["projects", "companies"]);
    }

    #[test]
    fn test_qualified_names_rejected() {
        assert!(AllowedTables::new(["system.tables"]).is_err());
        assert!(AllowedTables::new(["information_schema.tables"]).is_err());
        assert!(AllowedTables::new(["public.projects"]).is_err());
    }

    #[test]
    fn test_invalid_names_rejected() {
        assert!(AllowedTables::new([""]).is_err());
        assert!(AllowedTables::new(["   "]).is_err());
        assert!(AllowedTables::new(["\"projects\""]).is_err());
        assert!(AllowedTables::new(["projects; drop"]).is_err());
    }

    #[test]
    fn test_qualified_reference_never_matches() {
        let tables = AllowedTables::default();
        assert!(!tables.contains("system.tables"));
        assert!(!tables.contains("information_schema.tables"));
        assert!(!tables.contains("public.projects"));
    }

    #[test]
    fn test_empty_registry_is_valid() {
        let tables = AllowedTables::new(Vec::<String>::new()).unwrap();
        assert!(tables.is_empty());
        assert!(!tables.contains("projects"));
    }
}
