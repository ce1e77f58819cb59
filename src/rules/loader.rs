//! CSV-based loader for the relationship classification table

use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::RelationshipKind;
use crate::error::LoadError;

/// Default path to the data directory
pub const DEFAULT_DATA_PATH: &str = "data";

/// File holding `relationship_id,kind` rows
pub const RELATIONSHIP_KINDS_FILE: &str = "relationship_kinds.csv";

/// Load relationship kinds from `relationship_kinds.csv` in the given directory
pub fn load_relationship_kinds(path: &Path) -> Result<Vec<(u32, RelationshipKind)>, LoadError> {
    let file = File::open(path.join(RELATIONSHIP_KINDS_FILE))?;
    load_relationship_kinds_from_reader(file)
}

/// Load relationship kinds from any reader
pub fn load_relationship_kinds_from_reader<R: Read>(
    reader: R,
) -> Result<Vec<(u32, RelationshipKind)>, LoadError> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut entries = Vec::new();

    for result in reader.records() {
        let record = result?;
        let id: u32 = record[0].trim().parse().map_err(|_| LoadError::Invalid {
            file: RELATIONSHIP_KINDS_FILE,
            message: format!("bad relationship id '{}'", &record[0]),
        })?;
        let kind = RelationshipKind::parse(&record[1]).ok_or_else(|| LoadError::Invalid {
            file: RELATIONSHIP_KINDS_FILE,
            message: format!("unknown kind '{}' for relationship {}", &record[1], id),
        })?;
        entries.push((id, kind));
    }

    Ok(entries)
}
