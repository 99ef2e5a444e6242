//! Pipeline composition.
//!
//! Orders the gates around the business handlers. Outermost to innermost:
//!
//! ```text
//! catch-panic → request-id → trace → timeout → body limit
//!     → admission (429 is terminal)
//!     → identity resolution (runs on every request)
//!     → per-route authorization gates
//!     → business handler
//! ```
//!
//! Per-route gates stay declarative at the routing layer:
//! `from_fn_with_state(authz.require(CODE), require_permission)`.

use std::any::Any;
use std::time::Duration;

use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Response, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::identity::{authenticate_middleware, IdentityState};
use crate::limiter::{admission_middleware, AdmissionState};

/// The fixed middleware stack around a business router.
#[derive(Clone)]
pub struct Pipeline {
    pub admission: AdmissionState,
    pub identity: IdentityState,
    pub request_timeout: Duration,
    pub max_body_bytes: usize,
}

impl Pipeline {
    /// Wrap `router` with the gate stack. Stage order within a request is
    /// strict: admission, then identity, then whatever gates the routes
    /// attach, then the handler.
    pub fn wrap(&self, router: Router) -> Router {
        router.layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(panic_response))
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(self.request_timeout))
                .layer(DefaultBodyLimit::max(self.max_body_bytes))
                .layer(from_fn_with_state(
                    self.admission.clone(),
                    admission_middleware,
                ))
                .layer(from_fn_with_state(
                    self.identity.clone(),
                    authenticate_middleware,
                )),
        )
    }
}

/// Convert a panic anywhere in the stack into a generic 500. The connection
/// is closed rather than reused, in case the panic left the stream in a
/// half-written state.
fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "non-string panic payload"
    };
    tracing::error!(panic = %detail, "request handler panicked");

    let body = serde_json::json!({
        "error": "the server encountered a problem and could not process your request"
    });

    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .header(header::CONNECTION, HeaderValue::from_static("close"))
        .body(Body::from(body.to_string()))
        .expect("static panic response must build")
}
