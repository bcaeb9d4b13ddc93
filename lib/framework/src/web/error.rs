use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Serialize;

use crate::exception::Exception;
use crate::exception::Severity;
use crate::exception::error_code;
use crate::log;
use crate::log::current_action_id;
use crate::web::body::Json;

pub type HttpResult<T> = Result<T, HttpError>;

pub struct HttpError {
    exception: Exception,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    id: Option<String>,
    error_code: Option<String>,
    message: String,
}

impl HttpError {
    fn status(&self) -> StatusCode {
        match self.exception.code.as_deref() {
            Some(error_code::NOT_FOUND) => StatusCode::NOT_FOUND,
            Some(error_code::BAD_REQUEST | error_code::VALIDATION_ERROR) => StatusCode::BAD_REQUEST,
            _ if matches!(self.exception.severity, Severity::Warn) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Exception> for HttpError {
    fn from(exception: Exception) -> Self {
        HttpError { exception }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        log::log_exception(&self.exception);
        let status = self.status();
        let body = ErrorResponse {
            id: current_action_id(),
            error_code: self.exception.code,
            message: self.exception.message,
        };
        (status, Json(body)).into_response()
    }
}
