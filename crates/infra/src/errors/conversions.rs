//! Conversions from external infrastructure errors into domain errors.

use calsync_common::StorageError;
use calsync_domain::CalSyncError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub CalSyncError);

impl From<InfraError> for CalSyncError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<CalSyncError> for InfraError {
    fn from(value: CalSyncError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoCalSyncError {
    fn into_calsync(self) -> CalSyncError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → CalSyncError */
/* -------------------------------------------------------------------------- */

impl IntoCalSyncError for SqlError {
    fn into_calsync(self) -> CalSyncError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        CalSyncError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        CalSyncError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067) => {
                        CalSyncError::Database("unique constraint violation".into())
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        CalSyncError::Database("foreign key constraint violation".into())
                    }
                    _ => CalSyncError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => CalSyncError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                CalSyncError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                CalSyncError::Database(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => CalSyncError::Database("invalid UTF-8 returned from sqlite".into()),
            RE::InvalidParameterName(parameter_name) => {
                CalSyncError::Database(format!("invalid parameter name: {parameter_name}"))
            }
            RE::InvalidPath(path) => {
                CalSyncError::Database(format!("invalid database path: {}", path.to_string_lossy()))
            }
            RE::InvalidQuery => CalSyncError::Database("invalid SQL query".into()),
            other => CalSyncError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_calsync())
    }
}

/* -------------------------------------------------------------------------- */
/* StorageError → CalSyncError */
/* -------------------------------------------------------------------------- */

impl IntoCalSyncError for StorageError {
    fn into_calsync(self) -> CalSyncError {
        match self {
            StorageError::Rusqlite(inner) => inner.into_calsync(),
            StorageError::PoolExhausted => {
                CalSyncError::Database("connection pool exhausted".into())
            }
            other => CalSyncError::Database(other.to_string()),
        }
    }
}

impl From<StorageError> for InfraError {
    fn from(value: StorageError) -> Self {
        InfraError(value.into_calsync())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → CalSyncError */
/* -------------------------------------------------------------------------- */

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(CalSyncError::Database(format!("connection pool error: {value}")))
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → CalSyncError */
/* -------------------------------------------------------------------------- */

impl IntoCalSyncError for HttpError {
    fn into_calsync(self) -> CalSyncError {
        if self.is_timeout() {
            return CalSyncError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return CalSyncError::Network("HTTP connection failure".into());
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                401 | 403 => CalSyncError::Auth(message),
                404 => CalSyncError::NotFound(message),
                429 => CalSyncError::Network(message),
                400..=499 => CalSyncError::InvalidInput(message),
                _ => CalSyncError::Network(message),
            };
        }

        CalSyncError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_calsync())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use reqwest::{Client, StatusCode};
    use rusqlite::ffi::{Error as FfiError, ErrorCode};
    use rusqlite::Error as SqlError;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn sqlite_busy_maps_to_database_error() {
        let err = SqlError::SqliteFailure(
            FfiError { code: ErrorCode::DatabaseBusy, extended_code: 5 },
            Some("database is locked".into()),
        );

        let mapped: CalSyncError = InfraError::from(err).into();
        match mapped {
            CalSyncError::Database(msg) => {
                assert!(msg.contains("busy") || msg.contains("locked"));
            }
            other => panic!("expected database error, got {:?}", other),
        }
    }

    #[test]
    fn sqlite_unique_violation_maps_to_database_error() {
        let err = SqlError::SqliteFailure(
            FfiError { code: ErrorCode::ConstraintViolation, extended_code: 2067 },
            Some("UNIQUE constraint failed".into()),
        );

        let mapped: CalSyncError = InfraError::from(err).into();
        match mapped {
            CalSyncError::Database(msg) => assert!(msg.contains("unique")),
            other => panic!("expected database error, got {:?}", other),
        }
    }

    #[test]
    fn no_rows_maps_to_not_found() {
        let mapped: CalSyncError = InfraError::from(SqlError::QueryReturnedNoRows).into();
        assert!(matches!(mapped, CalSyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn http_status_401_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(StatusCode::UNAUTHORIZED))
            .mount(&server)
            .await;

        let client = Client::builder().no_proxy().build().unwrap();
        let error = client.get(server.uri()).send().await.unwrap().error_for_status().unwrap_err();

        let mapped: CalSyncError = InfraError::from(error).into();
        match mapped {
            CalSyncError::Auth(msg) => assert!(msg.contains("401")),
            other => panic!("expected auth error, got {:?}", other),
        }
    }
}
