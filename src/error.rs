//! Error taxonomy for the distribution workflow

use thiserror::Error;

/// A beneficiary group could not be classified into spouse / child / ascendant buckets
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassificationError {
    #[error("declaration {declaration_id}: relationship type {relationship_id} is not mapped to spouse, child or ascendant")]
    UnknownRelationship {
        declaration_id: u32,
        relationship_id: u32,
    },

    /// Several spouse-classified beneficiaries share one pension number.
    /// Rejected until product owners decide how to split the spouse share.
    #[error("pension number {pension_number}: {} declarations classify as spouse ({declaration_ids:?})", .declaration_ids.len())]
    MultipleSpouses {
        pension_number: String,
        declaration_ids: Vec<u32>,
    },
}

/// Declaration status transition refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("declaration {0} is already approved")]
    AlreadyApproved(u32),

    #[error("declaration {0} is already rejected")]
    AlreadyRejected(u32),

    #[error("declaration {0} has no decujus pension number")]
    MissingPensionNumber(u32),

    #[error("declaration {0} was already included in a notified pension distribution")]
    AlreadyDistributed(u32),
}

/// Persistence and transaction failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store lock poisoned")]
    LockPoisoned,

    #[error("timed out waiting for the lock on pension number {0}")]
    LockTimeout(String),

    #[error("declaration {0} not found")]
    DeclarationNotFound(u32),

    #[error("declaration {declaration_id} does not belong to the transaction for pension number {pension_number}")]
    NotInTransaction {
        declaration_id: u32,
        pension_number: String,
    },

    #[error("transaction holds pension number {held}, not {requested}")]
    WrongTransaction { held: String, requested: String },

    #[error("declaration {declaration_id} references missing {entity} {id}")]
    DanglingReference {
        declaration_id: u32,
        entity: &'static str,
        id: u32,
    },

    #[error("notification rejected: {0}")]
    NotificationRejected(String),
}

/// Failure while loading or saving a CSV data directory
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid value in {file}: {message}")]
    Invalid { file: &'static str, message: String },
}

/// Outcome classification of one disbursement run
#[derive(Debug, Error)]
pub enum DisbursementError {
    #[error("no approved beneficiaries for pension number {pension_number}")]
    NotFound { pension_number: String },

    #[error("beneficiary group for pension number {pension_number} has already been processed")]
    Conflict { pension_number: String },

    #[error(transparent)]
    Classification(#[from] ClassificationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("declaration {declaration_id}: first payment date is out of range")]
    InvalidDate { declaration_id: u32 },
}

impl DisbursementError {
    /// Whether this error is reported to the admin as an internal error
    pub fn is_internal(&self) -> bool {
        !matches!(
            self,
            DisbursementError::NotFound { .. } | DisbursementError::Conflict { .. }
        )
    }
}

/// Errors surfaced by the admin-facing entry point
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("administrator role required")]
    Forbidden,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AdminError {
    /// HTTP-equivalent status code
    pub fn status_code(&self) -> u16 {
        match self {
            AdminError::Forbidden => 403,
            AdminError::BadRequest(_) => 400,
            AdminError::NotFound(_) => 404,
            AdminError::Conflict(_) => 409,
            AdminError::Internal(_) => 500,
        }
    }
}

impl From<DisbursementError> for AdminError {
    fn from(err: DisbursementError) -> Self {
        match &err {
            DisbursementError::NotFound { .. } => AdminError::NotFound(err.to_string()),
            DisbursementError::Conflict { .. } => AdminError::Conflict(err.to_string()),
            _ => AdminError::Internal(err.to_string()),
        }
    }
}

impl From<StoreError> for AdminError {
    fn from(err: StoreError) -> Self {
        AdminError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disbursement_error_mapping() {
        let not_found = DisbursementError::NotFound { pension_number: "123456789".into() };
        assert!(!not_found.is_internal());
        assert_eq!(AdminError::from(not_found).status_code(), 404);

        let conflict = DisbursementError::Conflict { pension_number: "123456789".into() };
        assert_eq!(AdminError::from(conflict).status_code(), 409);

        let classification = DisbursementError::from(ClassificationError::UnknownRelationship {
            declaration_id: 4,
            relationship_id: 9,
        });
        assert!(classification.is_internal());
        assert_eq!(AdminError::from(classification).status_code(), 500);
    }

    #[test]
    fn test_multiple_spouses_message() {
        let err = ClassificationError::MultipleSpouses {
            pension_number: "P1".into(),
            declaration_ids: vec![1, 2],
        };
        assert!(err.to_string().contains("2 declarations classify as spouse"));
    }
}
