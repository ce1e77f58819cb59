//! Reversion Pension - distribution engine for survivor pension declarations
//!
//! This library provides:
//! - Aggregation of approved declarations by decujus pension number
//! - The legal distribution table (spouse / child / ascendant shares)
//! - Transactional disbursement: idempotency guard, notifications, notified flags
//! - An admin entry point with role checks and status-code mapping

pub mod admin;
pub mod aggregator;
pub mod declaration;
pub mod distribution;
pub mod error;
pub mod orchestrator;
pub mod rules;
pub mod store;

// Re-export commonly used types
pub use admin::{AdminService, Caller, Role};
pub use aggregator::BeneficiaryAggregator;
pub use declaration::{BeneficiaryGroup, BeneficiaryRecord, Declaration, DeclarationStatus};
pub use distribution::{DistributionCalculator, DistributionResult};
pub use error::{AdminError, ClassificationError, DisbursementError, StoreError};
pub use orchestrator::{DisbursementOrchestrator, OrchestratorConfig, ProcessReport};
pub use rules::{RelationshipKind, RelationshipTable};
pub use store::{Database, DeclarationStore, MemoryStore, NotificationSender, Transaction, TransactionalNotifier};
