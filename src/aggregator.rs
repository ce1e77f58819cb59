//! Beneficiary aggregation by decujus pension number

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::declaration::{BeneficiaryGroup, BeneficiaryRecord};
use crate::error::StoreError;
use crate::store::{DeclarationStore, Transaction};

/// Collects approved declarations into beneficiary groups
#[derive(Clone)]
pub struct BeneficiaryAggregator {
    store: Arc<dyn DeclarationStore>,
}

impl BeneficiaryAggregator {
    pub fn new(store: Arc<dyn DeclarationStore>) -> Self {
        Self { store }
    }

    /// Approved beneficiaries of one pension number, read inside `tx`.
    /// An empty result is not an error here.
    pub async fn collect(
        &self,
        tx: &Transaction,
        pension_number: &str,
    ) -> Result<Vec<BeneficiaryRecord>, StoreError> {
        let mut beneficiaries = self
            .store
            .find_approved_by_pension_number(tx, pension_number)
            .await?;
        beneficiaries.sort_by_key(|b| b.declaration_id);
        Ok(beneficiaries)
    }

    /// Every pension number with approved declarations, sorted by pension number
    pub async fn approved_groups(&self) -> Result<Vec<BeneficiaryGroup>, StoreError> {
        let mut by_pension: BTreeMap<String, Vec<BeneficiaryRecord>> = BTreeMap::new();
        for record in self.store.find_all_approved().await? {
            by_pension
                .entry(record.pension_number.clone())
                .or_default()
                .push(record);
        }

        Ok(by_pension
            .into_iter()
            .filter_map(|(pension_number, mut records)| {
                records.sort_by_key(|r| r.declaration_id);
                BeneficiaryGroup::new(pension_number, records)
            })
            .collect())
    }
}
