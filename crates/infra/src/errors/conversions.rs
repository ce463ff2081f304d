//! Conversions from external infrastructure errors into domain errors.

use partsource_domain::PartSourceError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub PartSourceError);

impl From<InfraError> for PartSourceError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<PartSourceError> for InfraError {
    fn from(value: PartSourceError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoPartSourceError {
    fn into_partsource(self) -> PartSourceError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → PartSourceError */
/* -------------------------------------------------------------------------- */

impl IntoPartSourceError for SqlError {
    fn into_partsource(self) -> PartSourceError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        PartSourceError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        PartSourceError::Database("database is locked".into())
                    }
                    // SQLITE_CONSTRAINT_UNIQUE and SQLITE_CONSTRAINT_PRIMARYKEY
                    (ErrorCode::ConstraintViolation, 2067 | 1555) => {
                        PartSourceError::Conflict(format!("unique constraint violation: {message}"))
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        PartSourceError::Database("foreign key constraint violation".into())
                    }
                    _ => PartSourceError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => {
                PartSourceError::NotFound("no rows returned by query".into())
            }
            RE::FromSqlConversionFailure(_, _, cause) => {
                PartSourceError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                PartSourceError::Database(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => {
                PartSourceError::Database("invalid UTF-8 returned from sqlite".into())
            }
            RE::InvalidPath(path) => PartSourceError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => PartSourceError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_partsource())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → PartSourceError */
/* -------------------------------------------------------------------------- */

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(PartSourceError::Database(format!("connection pool error: {value}")))
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → PartSourceError */
/* -------------------------------------------------------------------------- */

impl IntoPartSourceError for HttpError {
    fn into_partsource(self) -> PartSourceError {
        if self.is_timeout() {
            return PartSourceError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return PartSourceError::Network("HTTP connection failure".into());
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                404 => PartSourceError::NotFound(message),
                400..=499 if code != 429 => PartSourceError::InvalidInput(message),
                _ => PartSourceError::Network(message),
            };
        }

        PartSourceError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_partsource())
    }
}

/* -------------------------------------------------------------------------- */
/* serde_json / io → PartSourceError */
/* -------------------------------------------------------------------------- */

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        InfraError(PartSourceError::Internal(format!("serialization failed: {value}")))
    }
}

impl From<std::io::Error> for InfraError {
    fn from(value: std::io::Error) -> Self {
        let error = match value.kind() {
            std::io::ErrorKind::NotFound => PartSourceError::NotFound(value.to_string()),
            _ => PartSourceError::Internal(format!("io error: {value}")),
        };
        InfraError(error)
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
