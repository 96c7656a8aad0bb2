// src/common/db_utils.rs

use crate::common::error::AppError;

/// Converte violação de UNIQUE em erro de domínio; o resto vira DatabaseError.
pub(crate) fn map_unique_violation(err: sqlx::Error, what: &str) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let constraint = db_err.constraint().unwrap_or(what);
            return AppError::UniqueConstraintViolation(format!("{what} ({constraint})"));
        }
    }
    err.into()
}
