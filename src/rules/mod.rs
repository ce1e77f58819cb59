//! Relationship classification rules for reversion-pension distribution
//!
//! The distribution table only knows three kinds of beneficiary. Each coded
//! relationship type (spouse, son, mother, ...) maps to exactly one of them
//! through a [`RelationshipTable`] injected into the calculator.

pub mod loader;

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ClassificationError, LoadError};

pub use loader::DEFAULT_DATA_PATH;

/// Beneficiary category used by the legal distribution table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipKind {
    Spouse,
    Child,
    /// Parent or grandparent of the decujus
    Ascendant,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::Spouse => "spouse",
            RelationshipKind::Child => "child",
            RelationshipKind::Ascendant => "ascendant",
        }
    }

    /// Parse a kind name, case-insensitive
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "spouse" => Some(RelationshipKind::Spouse),
            "child" => Some(RelationshipKind::Child),
            "ascendant" => Some(RelationshipKind::Ascendant),
            _ => None,
        }
    }
}

/// Mapping from relationship-type identifier to beneficiary kind
#[derive(Debug, Clone, Default)]
pub struct RelationshipTable {
    kinds: HashMap<u32, RelationshipKind>,
}

impl RelationshipTable {
    /// Legacy coding: 1-2 spouse, 3-4 child, 5-6 ascendant
    pub fn legacy() -> Self {
        Self::from_entries([
            (1, RelationshipKind::Spouse),
            (2, RelationshipKind::Spouse),
            (3, RelationshipKind::Child),
            (4, RelationshipKind::Child),
            (5, RelationshipKind::Ascendant),
            (6, RelationshipKind::Ascendant),
        ])
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (u32, RelationshipKind)>,
    {
        Self {
            kinds: entries.into_iter().collect(),
        }
    }

    /// Load the table from `relationship_kinds.csv` in a specific directory
    pub fn from_csv_path(path: &Path) -> Result<Self, LoadError> {
        let entries = loader::load_relationship_kinds(path)?;
        Ok(Self::from_entries(entries))
    }

    pub fn classify(&self, relationship_id: u32) -> Option<RelationshipKind> {
        self.kinds.get(&relationship_id).copied()
    }

    /// Classify the relationship of one declaration, failing on unmapped identifiers
    pub fn kind_of(
        &self,
        declaration_id: u32,
        relationship_id: u32,
    ) -> Result<RelationshipKind, ClassificationError> {
        self.classify(relationship_id)
            .ok_or(ClassificationError::UnknownRelationship {
                declaration_id,
                relationship_id,
            })
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_table() {
        let table = RelationshipTable::legacy();
        assert_eq!(table.len(), 6);
        assert_eq!(table.classify(1), Some(RelationshipKind::Spouse));
        assert_eq!(table.classify(2), Some(RelationshipKind::Spouse));
        assert_eq!(table.classify(3), Some(RelationshipKind::Child));
        assert_eq!(table.classify(4), Some(RelationshipKind::Child));
        assert_eq!(table.classify(5), Some(RelationshipKind::Ascendant));
        assert_eq!(table.classify(6), Some(RelationshipKind::Ascendant));
        assert_eq!(table.classify(0), None);
        assert_eq!(table.classify(7), None);
    }

    #[test]
    fn test_kind_of_unknown() {
        let table = RelationshipTable::legacy();
        assert_eq!(
            table.kind_of(42, 7),
            Err(ClassificationError::UnknownRelationship {
                declaration_id: 42,
                relationship_id: 7,
            })
        );
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!(RelationshipKind::parse("Spouse"), Some(RelationshipKind::Spouse));
        assert_eq!(RelationshipKind::parse(" ascendant "), Some(RelationshipKind::Ascendant));
        assert_eq!(RelationshipKind::parse("cousin"), None);
    }
}
