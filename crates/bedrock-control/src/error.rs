use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bedrock_db::sea_orm::DbErr;
use bedrock_supervisor::SupervisorError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

/// Every failure a handler can return, already mapped to an HTTP status.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::warn!(status = self.status.as_u16(), code = self.code, message = %self.message, "request failed");
        }
        (
            self.status,
            Json(ErrorBody {
                code: self.code,
                message: self.message,
            }),
        )
            .into_response()
    }
}

impl From<SupervisorError> for ApiError {
    fn from(err: SupervisorError) -> Self {
        let status = match &err {
            SupervisorError::NotFound(_) => StatusCode::NOT_FOUND,
            SupervisorError::AlreadyRunning(_) => StatusCode::CONFLICT,
            SupervisorError::InvalidWorldName(_) => StatusCode::BAD_REQUEST,
            SupervisorError::WriteFailed { .. } => StatusCode::BAD_GATEWAY,
            SupervisorError::LaunchFailed { .. }
            | SupervisorError::KillFailed { .. }
            | SupervisorError::DocumentIo { .. }
            | SupervisorError::Provision { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let code = err.code();
        Self::new(
            status,
            code,
            bedrock_supervisor::format_error_chain(&anyhow::Error::new(err)),
        )
    }
}

impl From<DbErr> for ApiError {
    fn from(err: DbErr) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "db_error",
            format!("db error: {err}"),
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supervisor_errors_map_to_statuses() {
        let cases = [
            (SupervisorError::NotFound("world a".into()), StatusCode::NOT_FOUND),
            (SupervisorError::AlreadyRunning("a".into()), StatusCode::CONFLICT),
            (SupervisorError::InvalidWorldName("../a".into()), StatusCode::BAD_REQUEST),
            (
                SupervisorError::WriteFailed {
                    world: "a".into(),
                    source: std::io::Error::from(std::io::ErrorKind::BrokenPipe),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                SupervisorError::LaunchFailed {
                    world: "a".into(),
                    reason: "no binary".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            let code = err.code();
            let api = ApiError::from(err);
            assert_eq!(api.status, status);
            assert_eq!(api.code, code);
        }
    }

    #[test]
    fn write_failure_message_keeps_the_cause() {
        let api = ApiError::from(SupervisorError::WriteFailed {
            world: "alpha".into(),
            source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed"),
        });
        assert!(api.message.contains("alpha"));
        assert!(api.message.contains("pipe closed"));
    }

    #[test]
    fn db_errors_are_internal() {
        let api = ApiError::from(DbErr::Custom("boom".into()));
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.code, "db_error");
    }
}
