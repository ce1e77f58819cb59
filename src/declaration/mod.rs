//! Declarations, applicants and relationship types, plus CSV loading

mod data;
pub mod loader;

pub use data::{
    Applicant, BeneficiaryGroup, BeneficiaryRecord, Declaration, DeclarationStatus, Relationship,
};
pub use loader::{load_applicants, load_declarations, load_relationships};
