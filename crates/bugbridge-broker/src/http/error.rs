use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

use bugbridge_core::{ExecuteError, LifecycleError, ProbeError, StoreError};

/// HTTP-facing error with a machine-readable code.
///
/// The code is what clients dispatch on; `RECONNECT_REQUIRED` in particular
/// must stay distinct from every other failure because its remedy is user
/// re-authorization, not a retry.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    details: Option<Value>,
}

impl AppError {
    pub fn new(status: StatusCode, code: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request(code: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code)
    }

    pub fn unauthorized(code: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, code)
    }

    pub fn internal(code: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, code)
    }

    /// The credential is dead and gone; only re-authorization helps.
    pub fn reconnect_required() -> Self {
        Self::unauthorized("RECONNECT_REQUIRED")
    }

    pub fn not_connected() -> Self {
        Self::bad_request("NOT_CONNECTED")
    }

    pub fn plan_required() -> Self {
        Self::new(StatusCode::FORBIDDEN, "PLAN_REQUIRED")
    }

    /// Non-auth provider failure, surfaced with the upstream payload.
    pub fn upstream(status: u16, body: impl Into<Value>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "TRACKER_ERROR")
            .with_details(json!({ "status": status, "body": body.into() }))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code, self.status)?;
        if let Some(details) = &self.details {
            write!(f, ": {details}")?;
        }
        Ok(())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = json!({ "error": self.code });
        if let Some(details) = self.details {
            body["details"] = details;
        }
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::internal("STORAGE_ERROR").with_details(json!(err.to_string()))
    }
}

impl From<ExecuteError> for AppError {
    fn from(err: ExecuteError) -> Self {
        match err {
            ExecuteError::Transport(err) => {
                AppError::new(StatusCode::BAD_GATEWAY, "TRACKER_UNREACHABLE")
                    .with_details(json!(err.to_string()))
            }
            ExecuteError::Store(err) => AppError::from(err),
        }
    }
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::State(_) => AppError::bad_request("INVALID_STATE"),
            LifecycleError::ExchangeRejected { status, body } => {
                AppError::new(StatusCode::BAD_GATEWAY, "EXCHANGE_FAILED")
                    .with_details(json!({ "status": status, "body": body }))
            }
            LifecycleError::InvalidResponse(detail) => {
                AppError::new(StatusCode::BAD_GATEWAY, "TRACKER_ERROR")
                    .with_details(json!(detail))
            }
            LifecycleError::NoSites => AppError::bad_request("NO_WORKSPACE"),
            LifecycleError::Transport(err) => {
                AppError::new(StatusCode::BAD_GATEWAY, "TRACKER_UNREACHABLE")
                    .with_details(json!(err.to_string()))
            }
            LifecycleError::Store(err) => AppError::from(err),
            LifecycleError::Config(detail) => {
                AppError::internal("CONFIG_ERROR").with_details(json!(detail))
            }
        }
    }
}

impl From<ProbeError> for AppError {
    fn from(err: ProbeError) -> Self {
        match err {
            ProbeError::Unhealthy { status } => {
                AppError::upstream(status, Value::Null)
            }
            ProbeError::Execute(err) => AppError::from(err),
            ProbeError::Store(err) => AppError::from(err),
        }
    }
}
