//! Legal distribution table for reversion pensions
//!
//! With a surviving spouse:
//! - spouse alone: 75%
//! - spouse + one other beneficiary: 50% / 30%
//! - spouse + several others: 50%, others share 40% equally
//!
//! Without a spouse:
//! - one beneficiary: 45%
//! - exactly two children: 45% each
//! - otherwise 90% split equally, each child capped at 45% and each ascendant at 30%.
//!   The capped remainder is NOT redistributed, so the total can fall below 90%.

use log::debug;

use super::result::DistributionResult;
use crate::declaration::{BeneficiaryGroup, BeneficiaryRecord};
use crate::error::ClassificationError;
use crate::rules::{RelationshipKind, RelationshipTable};

pub const SPOUSE_ALONE_SHARE: f64 = 75.0;
pub const SPOUSE_SHARED_SHARE: f64 = 50.0;
pub const SINGLE_OTHER_WITH_SPOUSE_SHARE: f64 = 30.0;
pub const OTHERS_WITH_SPOUSE_POOL: f64 = 40.0;
pub const SOLE_BENEFICIARY_SHARE: f64 = 45.0;
pub const NO_SPOUSE_POOL: f64 = 90.0;
pub const CHILD_CAP: f64 = 45.0;
pub const ASCENDANT_CAP: f64 = 30.0;

/// Pure calculator for one beneficiary group
#[derive(Debug, Clone)]
pub struct DistributionCalculator {
    table: RelationshipTable,
}

impl DistributionCalculator {
    pub fn new(table: RelationshipTable) -> Self {
        Self { table }
    }

    /// Compute one share per beneficiary, in group order
    pub fn calculate(
        &self,
        group: &BeneficiaryGroup,
    ) -> Result<Vec<DistributionResult>, ClassificationError> {
        let classified = group
            .iter()
            .map(|b| {
                self.table
                    .kind_of(b.declaration_id, b.relationship_id)
                    .map(|kind| (b, kind))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let spouse_ids: Vec<u32> = classified
            .iter()
            .filter(|(_, kind)| *kind == RelationshipKind::Spouse)
            .map(|(b, _)| b.declaration_id)
            .collect();

        if spouse_ids.len() > 1 {
            return Err(ClassificationError::MultipleSpouses {
                pension_number: group.pension_number().to_string(),
                declaration_ids: spouse_ids,
            });
        }

        let composition = Composition::of(&classified);

        let results = classified
            .into_iter()
            .map(|(beneficiary, kind)| {
                let percentage = composition.share(kind);
                debug!(
                    "pension {}: declaration {} ({}) -> {:.4}%",
                    group.pension_number(),
                    beneficiary.declaration_id,
                    kind.as_str(),
                    percentage
                );
                to_result(beneficiary, kind, percentage)
            })
            .collect();

        Ok(results)
    }
}

/// Bucket counts of a classified group
#[derive(Debug, Clone, Copy)]
struct Composition {
    has_spouse: bool,
    children: usize,
    ascendants: usize,
}

impl Composition {
    fn of(classified: &[(&BeneficiaryRecord, RelationshipKind)]) -> Self {
        let count = |wanted: RelationshipKind| {
            classified.iter().filter(|(_, kind)| *kind == wanted).count()
        };
        Self {
            has_spouse: count(RelationshipKind::Spouse) > 0,
            children: count(RelationshipKind::Child),
            ascendants: count(RelationshipKind::Ascendant),
        }
    }

    fn others(&self) -> usize {
        self.children + self.ascendants
    }

    fn total(&self) -> usize {
        self.others() + usize::from(self.has_spouse)
    }

    fn share(&self, kind: RelationshipKind) -> f64 {
        if self.has_spouse {
            return match (kind, self.others()) {
                (RelationshipKind::Spouse, 0) => SPOUSE_ALONE_SHARE,
                (RelationshipKind::Spouse, _) => SPOUSE_SHARED_SHARE,
                (_, 1) => SINGLE_OTHER_WITH_SPOUSE_SHARE,
                (_, others) => OTHERS_WITH_SPOUSE_POOL / others as f64,
            };
        }

        if self.total() == 1 {
            return SOLE_BENEFICIARY_SHARE;
        }

        if self.children == 2 && self.ascendants == 0 {
            return CHILD_CAP;
        }

        let equal = NO_SPOUSE_POOL / self.total() as f64;
        match kind {
            RelationshipKind::Child => equal.min(CHILD_CAP),
            RelationshipKind::Ascendant => equal.min(ASCENDANT_CAP),
            // unreachable without a spouse; keep the uncapped split
            RelationshipKind::Spouse => equal,
        }
    }
}

fn to_result(beneficiary: &BeneficiaryRecord, kind: RelationshipKind, percentage: f64) -> DistributionResult {
    DistributionResult {
        applicant_user_id: beneficiary.applicant_user_id,
        declaration_id: beneficiary.declaration_id,
        kind,
        percentage,
        declaration_date: beneficiary.declaration_date,
    }
}
