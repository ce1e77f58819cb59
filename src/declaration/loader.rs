//! Load and save declarations, applicants and relationship types as CSV

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Applicant, Declaration, DeclarationStatus, Relationship};
use crate::error::LoadError;

pub const DECLARATIONS_FILE: &str = "declarations.csv";
pub const USERS_FILE: &str = "users.csv";
pub const RELATIONSHIPS_FILE: &str = "relationships.csv";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Raw CSV row matching declarations.csv columns
#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    declaration_id: u32,
    applicant_user_id: u32,
    decujus_pension_number: Option<String>,
    relationship_id: u32,
    declaration_date: String,
    status: String,
    #[serde(default)]
    pension_notified: bool,
}

impl CsvRow {
    fn to_declaration(self) -> Result<Declaration, LoadError> {
        let declaration_date = NaiveDate::parse_from_str(self.declaration_date.trim(), DATE_FORMAT)
            .map_err(|e| LoadError::Invalid {
                file: DECLARATIONS_FILE,
                message: format!(
                    "declaration {}: bad date '{}': {}",
                    self.declaration_id, self.declaration_date, e
                ),
            })?;

        let status = DeclarationStatus::parse(&self.status).ok_or_else(|| LoadError::Invalid {
            file: DECLARATIONS_FILE,
            message: format!(
                "declaration {}: unknown status '{}'",
                self.declaration_id, self.status
            ),
        })?;

        let decujus_pension_number = self
            .decujus_pension_number
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        Ok(Declaration {
            declaration_id: self.declaration_id,
            applicant_user_id: self.applicant_user_id,
            decujus_pension_number,
            relationship_id: self.relationship_id,
            declaration_date,
            status,
            pension_notified: self.pension_notified,
        })
    }

    fn from_declaration(declaration: &Declaration) -> Self {
        Self {
            declaration_id: declaration.declaration_id,
            applicant_user_id: declaration.applicant_user_id,
            decujus_pension_number: declaration.decujus_pension_number.clone(),
            relationship_id: declaration.relationship_id,
            declaration_date: declaration.declaration_date.format(DATE_FORMAT).to_string(),
            status: declaration.status.as_str().to_string(),
            pension_notified: declaration.pension_notified,
        }
    }
}

/// Load all declarations from `declarations.csv` in the given directory
pub fn load_declarations(path: &Path) -> Result<Vec<Declaration>, LoadError> {
    load_declarations_from_reader(File::open(path.join(DECLARATIONS_FILE))?)
}

/// Load declarations from any reader (e.g., string buffer)
pub fn load_declarations_from_reader<R: Read>(reader: R) -> Result<Vec<Declaration>, LoadError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut declarations = Vec::new();

    for result in csv_reader.deserialize() {
        let row: CsvRow = result?;
        declarations.push(row.to_declaration()?);
    }

    Ok(declarations)
}

pub fn write_declarations<W: Write>(writer: W, declarations: &[Declaration]) -> Result<(), LoadError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for declaration in declarations {
        csv_writer.serialize(CsvRow::from_declaration(declaration))?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn load_applicants(path: &Path) -> Result<Vec<Applicant>, LoadError> {
    load_applicants_from_reader(File::open(path.join(USERS_FILE))?)
}

pub fn load_applicants_from_reader<R: Read>(reader: R) -> Result<Vec<Applicant>, LoadError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut applicants = Vec::new();
    for result in csv_reader.deserialize() {
        applicants.push(result?);
    }
    Ok(applicants)
}

pub fn write_applicants<W: Write>(writer: W, applicants: &[Applicant]) -> Result<(), LoadError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for applicant in applicants {
        csv_writer.serialize(applicant)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn load_relationships(path: &Path) -> Result<Vec<Relationship>, LoadError> {
    load_relationships_from_reader(File::open(path.join(RELATIONSHIPS_FILE))?)
}

pub fn load_relationships_from_reader<R: Read>(reader: R) -> Result<Vec<Relationship>, LoadError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut relationships = Vec::new();
    for result in csv_reader.deserialize() {
        relationships.push(result?);
    }
    Ok(relationships)
}

pub fn write_relationships<W: Write>(writer: W, relationships: &[Relationship]) -> Result<(), LoadError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for relationship in relationships {
        csv_writer.serialize(relationship)?;
    }
    csv_writer.flush()?;
    Ok(())
}
