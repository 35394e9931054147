//! Error taxonomy for the shop core.

use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Target entity is missing or soft-deleted for this tenant.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already deleted or not found: {0}")]
    AlreadyDeletedOrNotFound(String),

    /// Tenant counters were never seeded; a provisioning bug upstream.
    #[error("Sequence '{counter_key}' not initialized for tenant {tenant_id}")]
    SequenceNotInitialized { tenant_id: Uuid, counter_key: String },

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Invalid monetary input: {0}")]
    InvalidMonetaryInput(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(anyhow::Error),
}

impl CoreError {
    /// Low-cardinality label for the errors metric.
    pub fn error_type(&self) -> &'static str {
        match self {
            CoreError::NotFound(_) => "not_found",
            CoreError::AlreadyDeletedOrNotFound(_) => "already_deleted",
            CoreError::SequenceNotInitialized { .. } => "sequence_not_initialized",
            CoreError::ConstraintViolation(_) => "constraint_violation",
            CoreError::InvalidMonetaryInput(_) => "invalid_monetary_input",
            CoreError::Validation(_) => "validation_error",
            CoreError::Database(_) => "db_error",
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(ref db_err)
                if db_err.is_unique_violation()
                    || db_err.is_foreign_key_violation()
                    || db_err.is_check_violation() =>
            {
                CoreError::ConstraintViolation(db_err.message().to_string())
            }
            _ => CoreError::Database(anyhow::Error::new(err)),
        }
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::NotFound(_) | CoreError::AlreadyDeletedOrNotFound(_) => {
                AppError::NotFound(anyhow::anyhow!(message))
            }
            CoreError::ConstraintViolation(_) => AppError::Conflict(anyhow::anyhow!(message)),
            CoreError::InvalidMonetaryInput(_) | CoreError::Validation(_) => {
                AppError::Unprocessable(anyhow::anyhow!(message))
            }
            CoreError::SequenceNotInitialized { .. } => {
                AppError::InternalError(anyhow::anyhow!(message))
            }
            CoreError::Database(e) => AppError::DatabaseError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn maps_taxonomy_onto_http_errors() {
        let cases = [
            (CoreError::NotFound("invoice".into()), StatusCode::NOT_FOUND),
            (
                CoreError::AlreadyDeletedOrNotFound("invoice".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                CoreError::ConstraintViolation("duplicate".into()),
                StatusCode::CONFLICT,
            ),
            (
                CoreError::InvalidMonetaryInput("negative rate".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                CoreError::SequenceNotInitialized {
                    tenant_id: Uuid::nil(),
                    counter_key: "invoice".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status_code(), status);
        }
    }

    #[test]
    fn row_not_found_is_a_database_error() {
        let err = CoreError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.error_type(), "db_error");
    }
}
