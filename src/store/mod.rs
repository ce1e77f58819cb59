//! Persistence collaborators: declaration store, notification sender and the
//! transaction they share
//!
//! Both collaborators receive the same [`Transaction`], so flag updates and
//! notification inserts commit or roll back together.

mod memory;
pub mod notification;

use async_trait::async_trait;

use crate::declaration::BeneficiaryRecord;
use crate::error::StoreError;

pub use memory::{CommitSummary, Database, MemoryStore, Transaction, TransactionalNotifier};
pub use notification::{NewNotification, Notification, NotificationCategory};

/// Declaration persistence as seen by the distribution workflow
#[async_trait]
pub trait DeclarationStore: Send + Sync {
    /// Open a transaction that locks every declaration of `pension_number`
    async fn begin(&self, pension_number: &str) -> Result<Transaction, StoreError>;

    /// Approved declarations for one pension number, in creation order,
    /// read through the given transaction
    async fn find_approved_by_pension_number(
        &self,
        tx: &Transaction,
        pension_number: &str,
    ) -> Result<Vec<BeneficiaryRecord>, StoreError>;

    /// Approved declarations for every pension number (read-only, no lock)
    async fn find_all_approved(&self) -> Result<Vec<BeneficiaryRecord>, StoreError>;

    /// Set `pension_notified` on a declaration when the transaction commits
    async fn mark_notified(&self, tx: &mut Transaction, declaration_id: u32) -> Result<(), StoreError>;
}

/// Delivers notifications to applicants inside a transaction
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn notify(&self, tx: &mut Transaction, notification: NewNotification) -> Result<(), StoreError>;
}
