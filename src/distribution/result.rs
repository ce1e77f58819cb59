//! Distribution output structures

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::rules::RelationshipKind;

/// Share of the reversion pension allotted to one beneficiary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionResult {
    pub applicant_user_id: u32,
    pub declaration_id: u32,
    pub kind: RelationshipKind,

    /// Percentage of the decujus pension, 0-100, unrounded
    pub percentage: f64,

    /// Date of the beneficiary's own declaration
    pub declaration_date: NaiveDate,
}

impl DistributionResult {
    /// First payment falls `offset_months` calendar months after the declaration date.
    /// Day-of-month is clamped (Jan 31 + 1 month = Feb 28/29).
    pub fn first_payment_date(&self, offset_months: u32) -> Option<NaiveDate> {
        self.declaration_date.checked_add_months(Months::new(offset_months))
    }
}

/// Summary statistics for one group's distribution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionSummary {
    pub beneficiaries: usize,
    pub spouses: usize,
    pub children: usize,
    pub ascendants: usize,
    pub total_percentage: f64,
    /// Part of the pension left unallotted by the per-kind caps
    pub unallocated_percentage: f64,
}

impl DistributionSummary {
    pub fn from_results(results: &[DistributionResult]) -> Self {
        let count = |kind: RelationshipKind| results.iter().filter(|r| r.kind == kind).count();
        let total_percentage: f64 = results.iter().map(|r| r.percentage).sum();

        Self {
            beneficiaries: results.len(),
            spouses: count(RelationshipKind::Spouse),
            children: count(RelationshipKind::Child),
            ascendants: count(RelationshipKind::Ascendant),
            total_percentage,
            unallocated_percentage: (100.0 - total_percentage).max(0.0),
        }
    }
}
