//! In-memory relational store with pension-number row locks and staged transactions
//!
//! `Database::begin` takes an exclusive lock on every declaration of one pension
//! number (the equivalent of `SELECT ... FOR UPDATE`) and hands out a
//! [`Transaction`]. Writes are staged in the transaction and applied together on
//! [`Transaction::commit`]; dropping an uncommitted transaction discards them.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, warn};
use tempfile::NamedTempFile;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock};

use super::notification::{self, NewNotification, Notification};
use super::{DeclarationStore, NotificationSender};
use crate::declaration::loader as declaration_loader;
use crate::declaration::{Applicant, BeneficiaryRecord, Declaration, Relationship};
use crate::error::{LoadError, StoreError};

#[derive(Debug, Default)]
struct Tables {
    declarations: Vec<Declaration>,
    applicants: HashMap<u32, Applicant>,
    relationships: HashMap<u32, Relationship>,
    notifications: Vec<Notification>,
}

impl Tables {
    /// Inner join of one declaration with its applicant and relationship rows
    fn join(&self, declaration: &Declaration) -> Result<BeneficiaryRecord, StoreError> {
        let applicant = self
            .applicants
            .get(&declaration.applicant_user_id)
            .ok_or(StoreError::DanglingReference {
                declaration_id: declaration.declaration_id,
                entity: "applicant",
                id: declaration.applicant_user_id,
            })?;
        let relationship = self
            .relationships
            .get(&declaration.relationship_id)
            .ok_or(StoreError::DanglingReference {
                declaration_id: declaration.declaration_id,
                entity: "relationship",
                id: declaration.relationship_id,
            })?;

        Ok(BeneficiaryRecord {
            declaration_id: declaration.declaration_id,
            applicant_user_id: declaration.applicant_user_id,
            pension_number: declaration.decujus_pension_number.clone().unwrap_or_default(),
            relationship_id: declaration.relationship_id,
            declaration_date: declaration.declaration_date,
            pension_notified: declaration.pension_notified,
            applicant_name: applicant.display_name(),
            applicant_email: applicant.email.clone(),
            relationship_name: relationship.description.clone().unwrap_or_default(),
        })
    }

    fn next_notification_id(&self) -> u32 {
        self.notifications
            .iter()
            .map(|n| n.notification_id)
            .max()
            .unwrap_or(0)
            + 1
    }
}

/// Shared in-memory store
#[derive(Debug, Default)]
pub struct Database {
    tables: RwLock<Tables>,
    row_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-filled with rows
    pub fn with_data(
        declarations: Vec<Declaration>,
        applicants: Vec<Applicant>,
        relationships: Vec<Relationship>,
        notifications: Vec<Notification>,
    ) -> Self {
        let tables = Tables {
            declarations,
            applicants: applicants.into_iter().map(|a| (a.user_id, a)).collect(),
            relationships: relationships.into_iter().map(|r| (r.id, r)).collect(),
            notifications,
        };
        Self {
            tables: RwLock::new(tables),
            row_locks: Mutex::default(),
        }
    }

    /// Load every table from CSV files in a data directory
    pub fn load_from(path: &Path) -> Result<Self, LoadError> {
        Ok(Self::with_data(
            declaration_loader::load_declarations(path)?,
            declaration_loader::load_applicants(path)?,
            declaration_loader::load_relationships(path)?,
            notification::load_notifications(path)?,
        ))
    }

    /// Write every table back to CSV files in a data directory
    ///
    /// Each table is first written to a temporary file next to its target.
    /// Nothing is renamed into place until all four writes have succeeded, and
    /// `declarations.csv` is replaced last so a notified flag never reaches disk
    /// without its notifications.
    pub async fn save_to(&self, path: &Path) -> Result<(), LoadError> {
        let tables = self.tables.read().await;

        let mut applicants: Vec<Applicant> = tables.applicants.values().cloned().collect();
        applicants.sort_by_key(|a| a.user_id);
        let mut relationships: Vec<Relationship> = tables.relationships.values().cloned().collect();
        relationships.sort_by_key(|r| r.id);

        let mut notifications_tmp = NamedTempFile::new_in(path)?;
        notification::write_notifications(&mut notifications_tmp, &tables.notifications)?;
        let mut users_tmp = NamedTempFile::new_in(path)?;
        declaration_loader::write_applicants(&mut users_tmp, &applicants)?;
        let mut relationships_tmp = NamedTempFile::new_in(path)?;
        declaration_loader::write_relationships(&mut relationships_tmp, &relationships)?;
        let mut declarations_tmp = NamedTempFile::new_in(path)?;
        declaration_loader::write_declarations(&mut declarations_tmp, &tables.declarations)?;
        drop(tables);

        let staged = [
            (notifications_tmp, notification::NOTIFICATIONS_FILE),
            (users_tmp, declaration_loader::USERS_FILE),
            (relationships_tmp, declaration_loader::RELATIONSHIPS_FILE),
            (declarations_tmp, declaration_loader::DECLARATIONS_FILE),
        ];
        for (tmp, _) in &staged {
            tmp.as_file().sync_all()?;
        }
        for (tmp, file_name) in staged {
            tmp.persist(path.join(file_name)).map_err(std::io::Error::from)?;
        }
        debug!("data directory {} saved", path.display());
        Ok(())
    }

    pub async fn insert_declaration(&self, declaration: Declaration) {
        self.tables.write().await.declarations.push(declaration);
    }

    pub async fn insert_applicant(&self, applicant: Applicant) {
        self.tables.write().await.applicants.insert(applicant.user_id, applicant);
    }

    pub async fn declaration(&self, declaration_id: u32) -> Option<Declaration> {
        self.tables
            .read()
            .await
            .declarations
            .iter()
            .find(|d| d.declaration_id == declaration_id)
            .cloned()
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.tables.read().await.notifications.clone()
    }

    /// Approved declarations with a pension number, in creation order, joined
    /// with applicant and relationship rows
    async fn select_approved(&self, pension_number: Option<&str>) -> Result<Vec<BeneficiaryRecord>, StoreError> {
        let tables = self.tables.read().await;

        let mut rows: Vec<&Declaration> = tables
            .declarations
            .iter()
            .filter(|d| d.is_distribution_eligible())
            .filter(|d| pension_number.map_or(true, |p| d.belongs_to(p)))
            .collect();
        rows.sort_by_key(|d| d.declaration_id);

        rows.into_iter().map(|d| tables.join(d)).collect()
    }

    /// Open a transaction holding the lock on one pension number's declarations
    pub async fn begin(
        self: &Arc<Self>,
        pension_number: &str,
        timeout: Option<Duration>,
    ) -> Result<Transaction, StoreError> {
        let lock = {
            let mut locks = self.row_locks.lock().map_err(|_| StoreError::LockPoisoned)?;
            Arc::clone(locks.entry(pension_number.to_string()).or_default())
        };

        let guard = match timeout {
            Some(limit) => tokio::time::timeout(limit, lock.lock_owned())
                .await
                .map_err(|_| StoreError::LockTimeout(pension_number.to_string()))?,
            None => lock.lock_owned().await,
        };
        debug!("transaction opened for pension number {}", pension_number);

        Ok(Transaction {
            db: Arc::clone(self),
            pension_number: pension_number.to_string(),
            staged: Vec::new(),
            finished: false,
            guard: Some(guard),
        })
    }

    /// Forget the lock of a pension number nobody holds or waits for
    fn release_row_lock(&self, pension_number: &str) {
        let Ok(mut locks) = self.row_locks.lock() else {
            return;
        };
        if locks
            .get(pension_number)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(pension_number);
        }
    }

    #[cfg(test)]
    pub(crate) fn row_lock_count(&self) -> usize {
        self.row_locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
enum StagedWrite {
    MarkNotified(u32),
    Notify(NewNotification),
}

/// Counts of rows written by a commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub declarations_marked: usize,
    pub notifications_sent: usize,
}

/// Unit of work scoped to one pension number
pub struct Transaction {
    db: Arc<Database>,
    pension_number: String,
    staged: Vec<StagedWrite>,
    finished: bool,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Transaction {
    pub fn pension_number(&self) -> &str {
        &self.pension_number
    }

    /// Number of writes waiting for commit
    pub fn staged_writes(&self) -> usize {
        self.staged.len()
    }

    pub fn is_staged_notified(&self, declaration_id: u32) -> bool {
        self.staged
            .iter()
            .any(|w| matches!(w, StagedWrite::MarkNotified(id) if *id == declaration_id))
    }

    /// Stage a notification insert
    pub fn stage_notification(&mut self, notification: NewNotification) {
        self.staged.push(StagedWrite::Notify(notification));
    }

    /// Stage setting `pension_notified` on one declaration of this pension number
    pub async fn stage_mark_notified(&mut self, declaration_id: u32) -> Result<(), StoreError> {
        {
            let tables = self.db.tables.read().await;
            let declaration = tables
                .declarations
                .iter()
                .find(|d| d.declaration_id == declaration_id)
                .ok_or(StoreError::DeclarationNotFound(declaration_id))?;
            if !declaration.belongs_to(&self.pension_number) {
                return Err(StoreError::NotInTransaction {
                    declaration_id,
                    pension_number: self.pension_number.clone(),
                });
            }
        }
        self.staged.push(StagedWrite::MarkNotified(declaration_id));
        Ok(())
    }

    /// Apply every staged write at once, then release the lock
    pub async fn commit(mut self) -> Result<CommitSummary, StoreError> {
        let staged = std::mem::take(&mut self.staged);
        let mut tables = self.db.tables.write().await;

        for write in &staged {
            if let StagedWrite::MarkNotified(id) = write {
                if !tables.declarations.iter().any(|d| d.declaration_id == *id) {
                    return Err(StoreError::DeclarationNotFound(*id));
                }
            }
        }

        let sent_at = Utc::now().naive_utc();
        let mut next_id = tables.next_notification_id();
        let mut summary = CommitSummary::default();

        for write in staged {
            match write {
                StagedWrite::MarkNotified(id) => {
                    if let Some(declaration) =
                        tables.declarations.iter_mut().find(|d| d.declaration_id == id)
                    {
                        declaration.pension_notified = true;
                        summary.declarations_marked += 1;
                    }
                }
                StagedWrite::Notify(new) => {
                    tables
                        .notifications
                        .push(Notification::from_new(next_id, new, sent_at));
                    next_id += 1;
                    summary.notifications_sent += 1;
                }
            }
        }
        drop(tables);

        self.finished = true;
        debug!(
            "transaction committed for pension number {}: {:?}",
            self.pension_number, summary
        );
        Ok(summary)
    }

    /// Discard staged writes and release the lock
    pub fn rollback(self) {
        drop(self);
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished {
            if self.staged.is_empty() {
                debug!("transaction for pension number {} closed without writes", self.pension_number);
            } else {
                warn!(
                    "rolling back {} staged writes for pension number {}",
                    self.staged.len(),
                    self.pension_number
                );
            }
        }

        drop(self.guard.take());
        self.db.release_row_lock(&self.pension_number);
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("pension_number", &self.pension_number)
            .field("staged", &self.staged)
            .field("finished", &self.finished)
            .finish()
    }
}

/// Declaration store backed by a [`Database`]
#[derive(Debug, Clone)]
pub struct MemoryStore {
    db: Arc<Database>,
    lock_timeout: Option<Duration>,
}

impl MemoryStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db, lock_timeout: None }
    }

    /// Give up waiting for a pension-number lock after `timeout`
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }
}

#[async_trait]
impl DeclarationStore for MemoryStore {
    async fn begin(&self, pension_number: &str) -> Result<Transaction, StoreError> {
        self.db.begin(pension_number, self.lock_timeout).await
    }

    async fn find_approved_by_pension_number(
        &self,
        tx: &Transaction,
        pension_number: &str,
    ) -> Result<Vec<BeneficiaryRecord>, StoreError> {
        if tx.pension_number() != pension_number {
            return Err(StoreError::WrongTransaction {
                held: tx.pension_number().to_string(),
                requested: pension_number.to_string(),
            });
        }

        let mut rows = self.db.select_approved(Some(pension_number)).await?;
        for row in &mut rows {
            if tx.is_staged_notified(row.declaration_id) {
                row.pension_notified = true;
            }
        }
        Ok(rows)
    }

    async fn find_all_approved(&self) -> Result<Vec<BeneficiaryRecord>, StoreError> {
        self.db.select_approved(None).await
    }

    async fn mark_notified(&self, tx: &mut Transaction, declaration_id: u32) -> Result<(), StoreError> {
        tx.stage_mark_notified(declaration_id).await
    }
}

/// Notification sender enlisted in the caller's transaction
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionalNotifier;

#[async_trait]
impl NotificationSender for TransactionalNotifier {
    async fn notify(&self, tx: &mut Transaction, notification: NewNotification) -> Result<(), StoreError> {
        tx.stage_notification(notification);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::DeclarationStatus;
    use crate::store::NotificationCategory;
    use chrono::NaiveDate;

    const PENSION: &str = "123456789";

    fn approved(declaration_id: u32, pension: &str, relationship_id: u32) -> Declaration {
        let mut declaration = Declaration::new(
            declaration_id,
            declaration_id * 10,
            Some(pension.to_string()),
            relationship_id,
            NaiveDate::from_ymd_opt(2024, 2, declaration_id).unwrap(),
        );
        declaration.status = DeclarationStatus::Approved;
        declaration
    }

    fn applicant(user_id: u32) -> Applicant {
        Applicant {
            user_id,
            email: format!("user{}@example.com", user_id),
            first_name: "Fatou".into(),
            last_name: format!("Sow{}", user_id),
        }
    }

    fn fixture() -> Arc<Database> {
        let mut pending = Declaration::new(4, 40, Some(PENSION.into()), 3, NaiveDate::from_ymd_opt(2024, 2, 4).unwrap());
        pending.status = DeclarationStatus::Submitted;

        Arc::new(Database::with_data(
            vec![approved(3, PENSION, 3), approved(1, PENSION, 1), approved(2, "987654321", 5), pending],
            vec![applicant(10), applicant(20), applicant(30), applicant(40)],
            vec![
                Relationship { id: 1, description: Some("Conjoint".into()) },
                Relationship { id: 3, description: Some("Enfant".into()) },
                Relationship { id: 5, description: None },
            ],
            Vec::new(),
        ))
    }

    fn notification(user_id: u32) -> NewNotification {
        NewNotification {
            user_id,
            title: "t".into(),
            body: "b".into(),
            category: NotificationCategory::PensionDistribution,
            related_id: None,
            created_by_admin_id: Some(1),
        }
    }

    #[tokio::test]
    async fn test_find_approved_ordered_and_joined() {
        let store = MemoryStore::new(fixture());
        let tx = store.begin(PENSION).await.unwrap();
        let rows = store.find_approved_by_pension_number(&tx, PENSION).await.unwrap();

        assert_eq!(rows.iter().map(|r| r.declaration_id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(rows[0].relationship_name, "Conjoint");
        assert_eq!(rows[0].applicant_name, "Fatou Sow10");
        assert_eq!(rows[1].applicant_email, "user30@example.com");
    }

    #[tokio::test]
    async fn test_read_through_wrong_transaction_rejected() {
        let store = MemoryStore::new(fixture());
        let tx = store.begin(PENSION).await.unwrap();
        let err = store.find_approved_by_pension_number(&tx, "987654321").await.unwrap_err();
        assert!(matches!(err, StoreError::WrongTransaction { .. }));
    }

    #[tokio::test]
    async fn test_commit_applies_all_writes() {
        let db = fixture();
        let store = MemoryStore::new(Arc::clone(&db));

        let mut tx = store.begin(PENSION).await.unwrap();
        store.mark_notified(&mut tx, 1).await.unwrap();
        TransactionalNotifier.notify(&mut tx, notification(10)).await.unwrap();

        // staged flag visible inside the transaction only
        let inside = store.find_approved_by_pension_number(&tx, PENSION).await.unwrap();
        assert!(inside[0].pension_notified);
        assert!(!db.declaration(1).await.unwrap().pension_notified);

        let summary = tx.commit().await.unwrap();
        assert_eq!(summary, CommitSummary { declarations_marked: 1, notifications_sent: 1 });
        assert!(db.declaration(1).await.unwrap().pension_notified);

        let notifications = db.notifications().await;
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].notification_id, 1);
        assert!(!notifications[0].is_read);
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let db = fixture();
        let store = MemoryStore::new(Arc::clone(&db));

        let mut tx = store.begin(PENSION).await.unwrap();
        store.mark_notified(&mut tx, 3).await.unwrap();
        TransactionalNotifier.notify(&mut tx, notification(30)).await.unwrap();
        assert_eq!(tx.staged_writes(), 2);
        tx.rollback();

        assert!(!db.declaration(3).await.unwrap().pension_notified);
        assert!(db.notifications().await.is_empty());
    }

    #[tokio::test]
    async fn test_mark_outside_pension_rejected() {
        let store = MemoryStore::new(fixture());
        let mut tx = store.begin(PENSION).await.unwrap();

        let err = store.mark_notified(&mut tx, 2).await.unwrap_err();
        assert!(matches!(err, StoreError::NotInTransaction { declaration_id: 2, .. }));

        let err = store.mark_notified(&mut tx, 99).await.unwrap_err();
        assert!(matches!(err, StoreError::DeclarationNotFound(99)));
    }

    #[tokio::test]
    async fn test_lock_timeout() {
        let db = fixture();
        let store = MemoryStore::new(Arc::clone(&db)).with_lock_timeout(Duration::from_millis(20));

        let held = store.begin(PENSION).await.unwrap();
        let err = store.begin(PENSION).await.unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout(_)));

        // other pension numbers are not blocked
        store.begin("987654321").await.unwrap();

        drop(held);
        store.begin(PENSION).await.unwrap();
    }

    #[tokio::test]
    async fn test_dangling_applicant_reported() {
        let db = Arc::new(Database::with_data(
            vec![approved(1, PENSION, 1)],
            Vec::new(),
            vec![Relationship { id: 1, description: None }],
            Vec::new(),
        ));
        let err = MemoryStore::new(db).find_all_approved().await.unwrap_err();
        assert!(matches!(err, StoreError::DanglingReference { entity: "applicant", .. }));
    }

    #[tokio::test]
    async fn test_row_locks_released_after_use() {
        let db = fixture();
        let store = MemoryStore::new(Arc::clone(&db));

        let tx = store.begin("000000000").await.unwrap();
        assert_eq!(db.row_lock_count(), 1);
        drop(tx);
        assert_eq!(db.row_lock_count(), 0);

        let mut tx = store.begin(PENSION).await.unwrap();
        store.mark_notified(&mut tx, 1).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(db.row_lock_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_row_lock_kept_while_waiting() {
        let db = fixture();
        let held = db.begin(PENSION, None).await.unwrap();

        let waiter = {
            let db = Arc::clone(&db);
            tokio::spawn(async move { db.begin(PENSION, None).await.map(drop) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(db.row_lock_count(), 1);

        drop(held);
        waiter.await.unwrap().unwrap();
        assert_eq!(db.row_lock_count(), 0);
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let db = fixture();
        let mut tx = db.begin(PENSION, None).await.unwrap();
        tx.stage_mark_notified(1).await.unwrap();
        tx.stage_notification(notification(10));
        tx.commit().await.unwrap();

        db.save_to(dir.path()).await.unwrap();
        let loaded = Database::load_from(dir.path()).unwrap();

        let declaration = loaded.declaration(1).await.unwrap();
        assert!(declaration.pension_notified);
        assert_eq!(declaration.status, DeclarationStatus::Approved);
        assert!(!loaded.declaration(4).await.unwrap().is_distribution_eligible());

        let notifications = loaded.notifications().await;
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].user_id, 10);
        assert_eq!(notifications[0].category, NotificationCategory::PensionDistribution);

        let rows = MemoryStore::new(Arc::new(loaded)).find_all_approved().await.unwrap();
        assert_eq!(rows.iter().map(|r| r.declaration_id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(rows[0].relationship_name, "Conjoint");
        assert_eq!(rows[1].relationship_name, "");
    }

    #[tokio::test]
    async fn test_failed_save_leaves_files_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let db = fixture();
        db.save_to(dir.path()).await.unwrap();

        let mut tx = db.begin(PENSION, None).await.unwrap();
        tx.stage_mark_notified(1).await.unwrap();
        tx.stage_notification(notification(10));
        tx.commit().await.unwrap();

        // a directory in place of notifications.csv makes the first replacement fail
        let notifications_path = dir.path().join(notification::NOTIFICATIONS_FILE);
        std::fs::remove_file(&notifications_path).unwrap();
        std::fs::create_dir(&notifications_path).unwrap();

        assert!(db.save_to(dir.path()).await.is_err());

        let on_disk = declaration_loader::load_declarations(dir.path()).unwrap();
        let declaration = on_disk.iter().find(|d| d.declaration_id == 1).unwrap();
        assert!(!declaration.pension_notified);

        // no temporary files left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 4);
    }
}
