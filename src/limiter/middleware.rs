//! Admission middleware.
//!
//! Runs before everything else in the pipeline: a denied request never
//! reaches identity resolution, authorization, or the handler.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::errors::GateError;
use crate::limiter::registry::ClientRegistry;

/// State for the admission gate.
#[derive(Clone)]
pub struct AdmissionState {
    pub registry: Arc<ClientRegistry>,
    pub enabled: bool,
}

/// Admit or reject a request based on the client's bucket. Clients are keyed
/// by source IP.
pub async fn admission_middleware(
    State(state): State<AdmissionState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, GateError> {
    if !state.enabled {
        return Ok(next.run(request).await);
    }

    let client = addr.ip().to_string();
    if state.registry.allow(&client) {
        Ok(next.run(request).await)
    } else {
        tracing::debug!(client = %client, "admission denied");
        Err(GateError::RateLimitExceeded)
    }
}
