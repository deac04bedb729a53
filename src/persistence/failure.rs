//! Reasons a single record's save can fail without aborting the batch.

use serde::Serialize;

#[derive(Debug, Clone, Serialize, thiserror::Error)]
pub enum SaveFailureReason {
    #[error("normalization rejected the record: {0}")]
    NormalizationRejected(String),
    #[error("no slug could be resolved")]
    SlugResolutionFailed,
    #[error("unique constraint violated and retry did not resolve it")]
    DbUniqueConflict,
    #[error("transaction deadlocked after retries")]
    DbDeadlock,
    #[error("database error: {0}")]
    Database(String),
}

impl SaveFailureReason {
    pub fn from_sqlx(err: &sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = err {
            match db_err.code().as_deref() {
                Some("23505") => return SaveFailureReason::DbUniqueConflict,
                Some("40001") => return SaveFailureReason::DbDeadlock,
                _ => {}
            }
        }
        SaveFailureReason::Database(err.to_string())
    }
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505"))
}

pub fn is_deadlock(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("40001"))
}
