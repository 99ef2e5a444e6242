//! Error taxonomy and protocol mapping.
//!
//! Every gate terminates a request with exactly one of these kinds; none of
//! them is retried by the core. Only [`GateError::StorageUnavailable`] and
//! [`GateError::Internal`] represent operator-visible faults and are logged
//! as errors; the rest are routine outcomes.

use std::collections::BTreeMap;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::store::StoreError;

/// Terminal outcome of a request that did not reach (or complete) its handler.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Admission denied by the client rate limiter.
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// The Authorization header was present but not of the exact shape
    /// `Bearer <token>` with a well-formed token.
    #[error("invalid or missing authentication token")]
    AuthCredentialMalformed,

    /// The presented token is unknown or expired. Shares its message and
    /// status with [`GateError::AuthCredentialMalformed`] so callers cannot
    /// distinguish the two.
    #[error("invalid or missing authentication token")]
    AuthCredentialInvalid,

    /// Login failed. Covers both unknown email and wrong password.
    #[error("invalid authentication credentials")]
    InvalidCredentials,

    /// The route requires a known principal but the request is anonymous.
    #[error("authentication is required to access this resource")]
    Unauthenticated,

    /// The principal exists but has not activated their account.
    #[error("your account must be activated to access this resource")]
    NotActivated,

    /// The principal is activated but lacks the required permission code.
    #[error("your account has no permission to access this resource")]
    NotPermitted,

    /// A conditional write lost the race against a concurrent editor.
    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,

    /// The requested record does not exist.
    #[error("the requested resource could not be found")]
    NotFound,

    /// The request body could not be decoded.
    #[error("{0}")]
    BadRequest(String),

    /// One or more fields failed validation; keyed by field name.
    #[error("validation failed")]
    ValidationFailed(BTreeMap<String, String>),

    /// A storage collaborator timed out or failed unexpectedly.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// An invariant the code relies on was violated. Always a bug, never a
    /// caller error; aborts the single request with a 500.
    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl GateError {
    /// Protocol status for this outcome.
    pub fn status(&self) -> StatusCode {
        match self {
            GateError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            GateError::AuthCredentialMalformed
            | GateError::AuthCredentialInvalid
            | GateError::InvalidCredentials
            | GateError::Unauthenticated => StatusCode::UNAUTHORIZED,
            GateError::NotActivated | GateError::NotPermitted => StatusCode::FORBIDDEN,
            GateError::EditConflict => StatusCode::CONFLICT,
            GateError::NotFound => StatusCode::NOT_FOUND,
            GateError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GateError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            GateError::StorageUnavailable(_) | GateError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether the response must carry `WWW-Authenticate: Bearer`.
    fn challenges_bearer(&self) -> bool {
        matches!(
            self,
            GateError::AuthCredentialMalformed | GateError::AuthCredentialInvalid
        )
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        match &self {
            GateError::StorageUnavailable(reason) => {
                tracing::error!(reason = %reason, "storage collaborator failed");
            }
            GateError::Internal(reason) => {
                tracing::error!(reason = %reason, "request aborted by invariant violation");
            }
            _ => {}
        }

        let status = self.status();
        let body = match &self {
            GateError::ValidationFailed(fields) => json!({ "error": fields }),
            GateError::StorageUnavailable(_) | GateError::Internal(_) => {
                // Never leak internals to the caller.
                json!({ "error": "the server encountered a problem and could not process your request" })
            }
            other => json!({ "error": other.to_string() }),
        };

        let mut response = (status, Json(body)).into_response();
        if self.challenges_bearer() {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<StoreError> for GateError {
    /// Context-free mapping. Gates that need a different mapping (e.g. a
    /// credential lookup miss becoming `AuthCredentialInvalid`) match on
    /// [`StoreError`] themselves before falling back to this.
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => GateError::NotFound,
            StoreError::EditConflict => GateError::EditConflict,
            StoreError::DuplicateEmail => {
                let mut fields = BTreeMap::new();
                fields.insert(
                    "email".to_string(),
                    "this email address is already in use".to_string(),
                );
                GateError::ValidationFailed(fields)
            }
            StoreError::Unavailable(reason) => GateError::StorageUnavailable(reason),
        }
    }
}
