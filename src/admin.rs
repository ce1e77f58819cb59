//! Admin-facing entry points
//!
//! Thin layer over the orchestrator: role check, request validation and
//! mapping of workflow errors to HTTP-style status codes.

use std::sync::Arc;

use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::declaration::{BeneficiaryGroup, BeneficiaryRecord};
use crate::distribution::{DistributionCalculator, DistributionResult, DistributionSummary};
use crate::error::AdminError;
use crate::orchestrator::{DisbursementOrchestrator, ProcessReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    User,
}

/// Authenticated caller, as decoded from the access token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: u32,
    pub role: Role,
}

impl Caller {
    pub fn admin(user_id: u32) -> Self {
        Self { user_id, role: Role::Admin }
    }

    fn require_admin(&self) -> Result<(), AdminError> {
        match self.role {
            Role::Admin => Ok(()),
            Role::User => Err(AdminError::Forbidden),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminResponse {
    pub success: bool,
    pub message: String,
    pub report: ProcessReport,
}

/// Approved group with a dry-run distribution
#[derive(Debug, Clone, Serialize)]
pub struct GroupOverview {
    pub pension_number: String,
    pub notified: bool,
    pub beneficiaries: Vec<BeneficiaryRecord>,
    pub preview: Vec<DistributionResult>,
    pub summary: Option<DistributionSummary>,
    /// Set instead of `preview` when the group cannot be classified
    pub preview_error: Option<String>,
}

pub struct AdminService {
    orchestrator: Arc<DisbursementOrchestrator>,
}

impl AdminService {
    pub fn new(orchestrator: Arc<DisbursementOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Calculate and notify the pension distribution for one pension number
    pub async fn calculate_and_notify(
        &self,
        caller: &Caller,
        pension_number: &str,
    ) -> Result<AdminResponse, AdminError> {
        caller.require_admin()?;
        let pension_number = required_pension_number(pension_number)?;

        let report = self
            .orchestrator
            .process(pension_number, caller.user_id)
            .await?;

        Ok(AdminResponse {
            success: true,
            message: format!(
                "Bénéficiaires pour le N° {} notifiés avec succès.",
                pension_number
            ),
            report,
        })
    }

    /// Distribution for one pension number, without notifying anyone
    pub async fn preview(
        &self,
        caller: &Caller,
        pension_number: &str,
    ) -> Result<Vec<DistributionResult>, AdminError> {
        caller.require_admin()?;
        let pension_number = required_pension_number(pension_number)?;

        Ok(self.orchestrator.preview(pension_number).await?)
    }

    /// All approved groups with their preview shares
    pub async fn approved_groups(&self, caller: &Caller) -> Result<Vec<GroupOverview>, AdminError> {
        caller.require_admin()?;

        let groups = self.orchestrator.aggregator().approved_groups().await?;
        let calculator = self.orchestrator.calculator().clone();

        let overviews = tokio::task::spawn_blocking(move || {
            groups
                .par_iter()
                .map(|group| overview(&calculator, group))
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|err| AdminError::Internal(err.to_string()))?;

        info!("listed {} approved beneficiary groups", overviews.len());
        Ok(overviews)
    }
}

fn required_pension_number(pension_number: &str) -> Result<&str, AdminError> {
    let pension_number = pension_number.trim();
    if pension_number.is_empty() {
        return Err(AdminError::BadRequest("decujusPensionNumber is required.".to_string()));
    }
    Ok(pension_number)
}

fn overview(calculator: &DistributionCalculator, group: &BeneficiaryGroup) -> GroupOverview {
    let (preview, preview_error) = match calculator.calculate(group) {
        Ok(results) => (results, None),
        Err(err) => (Vec::new(), Some(err.to_string())),
    };
    let summary = preview_error
        .is_none()
        .then(|| DistributionSummary::from_results(&preview));

    GroupOverview {
        pension_number: group.pension_number().to_string(),
        notified: group.already_notified(),
        beneficiaries: group.beneficiaries().to_vec(),
        preview,
        summary,
        preview_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::{Applicant, Declaration, DeclarationStatus, Relationship};
    use crate::orchestrator::OrchestratorConfig;
    use crate::rules::RelationshipTable;
    use crate::store::{Database, MemoryStore, TransactionalNotifier};
    use chrono::NaiveDate;

    fn service() -> (AdminService, Arc<Database>) {
        let approved = |id: u32, pension: &str, rel: u32| {
            let mut d = Declaration::new(id, id, Some(pension.to_string()), rel, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
            d.status = DeclarationStatus::Approved;
            d
        };
        let db = Arc::new(Database::with_data(
            vec![
                approved(1, "111111111", 1),
                approved(2, "111111111", 3),
                approved(3, "222222222", 9),
                approved(4, "333333333", 5),
            ],
            (1..=4)
                .map(|id| Applicant {
                    user_id: id,
                    email: format!("u{}@example.com", id),
                    first_name: "Khady".into(),
                    last_name: "Gueye".into(),
                })
                .collect(),
            vec![
                Relationship { id: 1, description: Some("Epouse".into()) },
                Relationship { id: 3, description: Some("Fille".into()) },
                Relationship { id: 5, description: Some("Mère".into()) },
                Relationship { id: 9, description: Some("Cousin".into()) },
            ],
            Vec::new(),
        ));
        let orchestrator = DisbursementOrchestrator::new(
            Arc::new(MemoryStore::new(Arc::clone(&db))),
            Arc::new(TransactionalNotifier),
            DistributionCalculator::new(RelationshipTable::legacy()),
            OrchestratorConfig::default(),
        );
        (AdminService::new(Arc::new(orchestrator)), db)
    }

    #[tokio::test]
    async fn test_calculate_and_notify() {
        let (service, db) = service();
        let response = service
            .calculate_and_notify(&Caller::admin(99), " 111111111 ")
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(response.message, "Bénéficiaires pour le N° 111111111 notifiés avec succès.");
        assert_eq!(db.notifications().await[0].created_by_admin_id, Some(99));
    }

    #[tokio::test]
    async fn test_status_codes() {
        let (service, _db) = service();
        let user = Caller { user_id: 5, role: Role::User };
        let admin = Caller::admin(99);

        let forbidden = service.calculate_and_notify(&user, "111111111").await.unwrap_err();
        assert_eq!(forbidden.status_code(), 403);

        let bad = service.calculate_and_notify(&admin, "  ").await.unwrap_err();
        assert_eq!(bad.status_code(), 400);

        let missing = service.calculate_and_notify(&admin, "999999999").await.unwrap_err();
        assert_eq!(missing.status_code(), 404);

        let unknown = service.calculate_and_notify(&admin, "222222222").await.unwrap_err();
        assert_eq!(unknown.status_code(), 500);

        service.calculate_and_notify(&admin, "333333333").await.unwrap();
        let again = service.calculate_and_notify(&admin, "333333333").await.unwrap_err();
        assert_eq!(again.status_code(), 409);
    }

    #[tokio::test]
    async fn test_preview_trims_and_validates() {
        let (service, db) = service();
        let admin = Caller::admin(99);

        let results = service.preview(&admin, "  111111111\n").await.unwrap();
        assert_eq!(results.iter().map(|r| r.percentage).collect::<Vec<_>>(), vec![50.0, 30.0]);
        assert!(db.notifications().await.is_empty());

        assert_eq!(service.preview(&admin, " ").await.unwrap_err().status_code(), 400);
        assert_eq!(service.preview(&admin, "999999999").await.unwrap_err().status_code(), 404);

        let user = Caller { user_id: 5, role: Role::User };
        assert!(matches!(service.preview(&user, "111111111").await, Err(AdminError::Forbidden)));
    }

    #[tokio::test]
    async fn test_approved_groups_overview() {
        let (service, _db) = service();
        let admin = Caller::admin(99);
        service.calculate_and_notify(&admin, "333333333").await.unwrap();

        let groups = service.approved_groups(&admin).await.unwrap();
        assert_eq!(groups.len(), 3);

        assert_eq!(groups[0].pension_number, "111111111");
        assert!(!groups[0].notified);
        assert_eq!(groups[0].preview.iter().map(|r| r.percentage).collect::<Vec<_>>(), vec![50.0, 30.0]);

        assert!(groups[1].preview.is_empty());
        assert!(groups[1].summary.is_none());
        assert!(groups[1].preview_error.as_deref().unwrap().contains("relationship type 9"));

        assert!(groups[2].notified);

        let user = Caller { user_id: 5, role: Role::User };
        assert!(matches!(service.approved_groups(&user).await, Err(AdminError::Forbidden)));
    }
}
