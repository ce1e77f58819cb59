//! Transactional disbursement: aggregate, guard, calculate, notify, mark
//!
//! One [`DisbursementOrchestrator::process`] call handles one pension number
//! inside a single [`Transaction`]. Any error drops the transaction, so no flag
//! and no notification of a failed run is ever committed.

use std::sync::Arc;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::aggregator::BeneficiaryAggregator;
use crate::declaration::BeneficiaryGroup;
use crate::distribution::{DistributionCalculator, DistributionResult, DistributionSummary};
use crate::error::DisbursementError;
use crate::store::{
    CommitSummary, DeclarationStore, NewNotification, NotificationCategory, NotificationSender,
    Transaction,
};

/// Settings for notification content and payment scheduling
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub notification_title: String,
    pub category: NotificationCategory,
    /// Calendar months between declaration date and first payment
    pub payment_offset_months: u32,
    /// chrono format for dates in notification bodies
    pub date_format: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            notification_title: "Répartition de votre pension de réversion".to_string(),
            category: NotificationCategory::PensionDistribution,
            payment_offset_months: 1,
            date_format: "%d/%m/%Y".to_string(),
        }
    }
}

/// What a successful run committed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessReport {
    pub pension_number: String,
    pub results: Vec<DistributionResult>,
    pub declarations_marked: usize,
    pub notifications_sent: usize,
}

impl ProcessReport {
    pub fn summary(&self) -> DistributionSummary {
        DistributionSummary::from_results(&self.results)
    }
}

/// Drives one distribution run per pension number
pub struct DisbursementOrchestrator {
    store: Arc<dyn DeclarationStore>,
    notifier: Arc<dyn NotificationSender>,
    aggregator: BeneficiaryAggregator,
    calculator: DistributionCalculator,
    config: OrchestratorConfig,
}

impl DisbursementOrchestrator {
    pub fn new(
        store: Arc<dyn DeclarationStore>,
        notifier: Arc<dyn NotificationSender>,
        calculator: DistributionCalculator,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            aggregator: BeneficiaryAggregator::new(Arc::clone(&store)),
            store,
            notifier,
            calculator,
            config,
        }
    }

    pub fn aggregator(&self) -> &BeneficiaryAggregator {
        &self.aggregator
    }

    pub fn calculator(&self) -> &DistributionCalculator {
        &self.calculator
    }

    /// Calculate and notify the distribution for one pension number, exactly once
    pub async fn process(
        &self,
        pension_number: &str,
        admin_id: u32,
    ) -> Result<ProcessReport, DisbursementError> {
        match self.run(pension_number, admin_id).await {
            Ok(report) => {
                info!(
                    "pension {}: {} beneficiaries notified by admin {} ({:.2}% allotted)",
                    pension_number,
                    report.notifications_sent,
                    admin_id,
                    report.summary().total_percentage
                );
                Ok(report)
            }
            Err(err) if err.is_internal() => {
                error!("pension {}: distribution aborted and rolled back: {}", pension_number, err);
                Err(err)
            }
            Err(err) => {
                warn!("pension {}: {}", pension_number, err);
                Err(err)
            }
        }
    }

    /// Aggregate and calculate without writing anything
    pub async fn preview(
        &self,
        pension_number: &str,
    ) -> Result<Vec<DistributionResult>, DisbursementError> {
        let tx = self.store.begin(pension_number).await?;
        let group = self.load_group(&tx, pension_number).await?;
        Ok(self.calculator.calculate(&group)?)
    }

    async fn load_group(
        &self,
        tx: &Transaction,
        pension_number: &str,
    ) -> Result<BeneficiaryGroup, DisbursementError> {
        let beneficiaries = self.aggregator.collect(tx, pension_number).await?;
        BeneficiaryGroup::new(pension_number, beneficiaries).ok_or_else(|| {
            DisbursementError::NotFound {
                pension_number: pension_number.to_string(),
            }
        })
    }

    async fn run(&self, pension_number: &str, admin_id: u32) -> Result<ProcessReport, DisbursementError> {
        let mut tx = self.store.begin(pension_number).await?;
        let group = self.load_group(&tx, pension_number).await?;

        if group.already_notified() {
            return Err(DisbursementError::Conflict {
                pension_number: pension_number.to_string(),
            });
        }

        let results = self.calculator.calculate(&group)?;

        for result in &results {
            let notification = self.notification_for(pension_number, result, admin_id)?;
            self.notifier.notify(&mut tx, notification).await?;
            self.store.mark_notified(&mut tx, result.declaration_id).await?;
        }

        let CommitSummary {
            declarations_marked,
            notifications_sent,
        } = tx.commit().await?;

        Ok(ProcessReport {
            pension_number: pension_number.to_string(),
            results,
            declarations_marked,
            notifications_sent,
        })
    }

    fn notification_for(
        &self,
        pension_number: &str,
        result: &DistributionResult,
        admin_id: u32,
    ) -> Result<NewNotification, DisbursementError> {
        let first_payment = result
            .first_payment_date(self.config.payment_offset_months)
            .ok_or(DisbursementError::InvalidDate {
                declaration_id: result.declaration_id,
            })?;

        let body = format!(
            "Suite au calcul de la pension de réversion du N° {}, votre part est fixée à {:.2}%. \
             Votre premier paiement est prévu le {}.",
            pension_number,
            result.percentage,
            first_payment.format(&self.config.date_format)
        );

        Ok(NewNotification {
            user_id: result.applicant_user_id,
            title: self.config.notification_title.clone(),
            body,
            category: self.config.category,
            related_id: Some(result.declaration_id),
            created_by_admin_id: Some(admin_id),
        })
    }
}
