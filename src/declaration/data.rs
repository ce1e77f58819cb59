//! Declaration data structures matching the declarations / users / relationships tables

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::TransitionError;

/// Review status of a declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclarationStatus {
    Submitted,
    Processing,
    Approved,
    Rejected,
    /// Administrator asked the applicant for more documents
    RequiresInfo,
}

impl DeclarationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclarationStatus::Submitted => "submitted",
            DeclarationStatus::Processing => "processing",
            DeclarationStatus::Approved => "approved",
            DeclarationStatus::Rejected => "rejected",
            DeclarationStatus::RequiresInfo => "requires_info",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "submitted" => Some(DeclarationStatus::Submitted),
            "processing" => Some(DeclarationStatus::Processing),
            "approved" => Some(DeclarationStatus::Approved),
            "rejected" => Some(DeclarationStatus::Rejected),
            "requires_info" => Some(DeclarationStatus::RequiresInfo),
            _ => None,
        }
    }
}

/// One applicant's claim against a decujus pension number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    /// Unique declaration identifier, increasing in creation order
    pub declaration_id: u32,

    /// User who filed the declaration
    pub applicant_user_id: u32,

    /// Pension number of the deceased holder
    pub decujus_pension_number: Option<String>,

    /// Coded relationship of the applicant to the decujus
    pub relationship_id: u32,

    pub declaration_date: NaiveDate,

    pub status: DeclarationStatus,

    /// Set once the pension distribution for this declaration was notified
    #[serde(default)]
    pub pension_notified: bool,
}

impl Declaration {
    /// Create a freshly submitted declaration
    pub fn new(
        declaration_id: u32,
        applicant_user_id: u32,
        decujus_pension_number: Option<String>,
        relationship_id: u32,
        declaration_date: NaiveDate,
    ) -> Self {
        Self {
            declaration_id,
            applicant_user_id,
            decujus_pension_number,
            relationship_id,
            declaration_date,
            status: DeclarationStatus::Submitted,
            pension_notified: false,
        }
    }

    /// Only approved declarations with a pension number take part in a distribution
    pub fn is_distribution_eligible(&self) -> bool {
        self.status == DeclarationStatus::Approved && self.decujus_pension_number.is_some()
    }

    pub fn belongs_to(&self, pension_number: &str) -> bool {
        self.decujus_pension_number.as_deref() == Some(pension_number)
    }

    pub fn approve(&mut self) -> Result<(), TransitionError> {
        if self.status == DeclarationStatus::Approved {
            return Err(TransitionError::AlreadyApproved(self.declaration_id));
        }
        if self.decujus_pension_number.is_none() {
            return Err(TransitionError::MissingPensionNumber(self.declaration_id));
        }
        self.status = DeclarationStatus::Approved;
        Ok(())
    }

    pub fn reject(&mut self) -> Result<(), TransitionError> {
        if self.status == DeclarationStatus::Rejected {
            return Err(TransitionError::AlreadyRejected(self.declaration_id));
        }
        if self.pension_notified {
            return Err(TransitionError::AlreadyDistributed(self.declaration_id));
        }
        self.status = DeclarationStatus::Rejected;
        Ok(())
    }
}

/// Applicant account, as far as notifications need it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Applicant {
    pub user_id: u32,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl Applicant {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Coded relationship type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: u32,
    pub description: Option<String>,
}

/// Approved declaration joined with applicant and relationship metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeneficiaryRecord {
    pub declaration_id: u32,
    pub applicant_user_id: u32,
    pub pension_number: String,
    pub relationship_id: u32,
    pub declaration_date: NaiveDate,
    pub pension_notified: bool,
    pub applicant_name: String,
    pub applicant_email: String,
    pub relationship_name: String,
}

/// All approved declarations for one pension number; never empty
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeneficiaryGroup {
    pension_number: String,
    beneficiaries: Vec<BeneficiaryRecord>,
}

impl BeneficiaryGroup {
    /// Build a group, returning `None` when there are no beneficiaries
    pub fn new(pension_number: impl Into<String>, beneficiaries: Vec<BeneficiaryRecord>) -> Option<Self> {
        if beneficiaries.is_empty() {
            return None;
        }
        Some(Self {
            pension_number: pension_number.into(),
            beneficiaries,
        })
    }

    pub fn pension_number(&self) -> &str {
        &self.pension_number
    }

    pub fn beneficiaries(&self) -> &[BeneficiaryRecord] {
        &self.beneficiaries
    }

    pub fn len(&self) -> usize {
        self.beneficiaries.len()
    }

    /// Always false; kept for clippy's `len_without_is_empty`
    pub fn is_empty(&self) -> bool {
        false
    }

    /// True if any member was already part of a notified distribution
    pub fn already_notified(&self) -> bool {
        self.beneficiaries.iter().any(|b| b.pension_notified)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BeneficiaryRecord> {
        self.beneficiaries.iter()
    }
}
