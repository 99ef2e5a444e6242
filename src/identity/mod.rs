//! Identity resolution.
//!
//! Runs on every request, whether or not the route needs authentication.
//! The outcome is an [`Identity`] request extension: anonymous when no
//! credential was presented, a known principal otherwise. Routes that need
//! more are enforced downstream by the authorization gates.
//!
//! Presentation state machine:
//!
//! ```text
//! no Authorization header        → Anonymous, proceed
//! header != "Bearer <token>"     → Malformed, reject (401, no lookup)
//! token fails syntactic check    → Malformed, reject (401, no lookup)
//! lookup miss / expired          → Invalid, reject (401, same shape)
//! lookup hit                     → Known(principal), proceed
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::errors::GateError;
use crate::principal::Identity;
use crate::store::{bounded, CredentialStore, StoreError};
use crate::token;

/// How a request presented (or failed to present) a credential.
#[derive(Debug, PartialEq, Eq)]
enum Presentation<'a> {
    Absent,
    Malformed,
    Bearer(&'a str),
}

/// Parse the Authorization header value. Only the exact two-part shape
/// `Bearer <token>` is well-formed.
fn parse_authorization(value: Option<&str>) -> Presentation<'_> {
    let Some(value) = value else {
        return Presentation::Absent;
    };

    match value.split_once(' ') {
        Some(("Bearer", candidate))
            if !candidate.is_empty() && !candidate.contains(' ') =>
        {
            Presentation::Bearer(candidate)
        }
        _ => Presentation::Malformed,
    }
}

/// State for the identity resolver.
#[derive(Clone)]
pub struct IdentityState {
    pub credentials: Arc<dyn CredentialStore>,
    pub storage_timeout: Duration,
}

impl IdentityState {
    async fn resolve(&self, header: Option<&str>) -> Result<Identity, GateError> {
        let candidate = match parse_authorization(header) {
            Presentation::Absent => return Ok(Identity::Anonymous),
            Presentation::Malformed => return Err(GateError::AuthCredentialMalformed),
            Presentation::Bearer(candidate) => candidate,
        };

        // Syntactic check before any storage round trip.
        if !token::validate_plaintext(candidate) {
            return Err(GateError::AuthCredentialMalformed);
        }

        let hash = token::hash_plaintext(candidate);
        let lookup = self
            .credentials
            .lookup(hash, token::Scope::Authentication);

        match bounded(self.storage_timeout, lookup).await {
            Ok(principal) => Ok(Identity::Known(Arc::new(principal))),
            // Unknown and expired are deliberately the same outcome.
            Err(StoreError::NotFound) => Err(GateError::AuthCredentialInvalid),
            Err(other) => Err(other.into()),
        }
    }
}

/// Resolve the request's identity and attach it as an extension.
pub async fn authenticate_middleware(
    State(state): State<IdentityState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(header::AUTHORIZATION)
        .map(|value| value.to_str().unwrap_or(""));

    let mut response = match state.resolve(header).await {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(outcome) => outcome.into_response(),
    };

    // Caches must not serve one principal's response to another.
    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::{Password, Principal};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts lookups so tests can assert malformed headers never reach
    /// storage.
    struct SpyStore {
        lookups: AtomicUsize,
        principal: Option<Principal>,
    }

    impl SpyStore {
        fn empty() -> Self {
            Self {
                lookups: AtomicUsize::new(0),
                principal: None,
            }
        }

        fn with_principal(principal: Principal) -> Self {
            Self {
                lookups: AtomicUsize::new(0),
                principal: Some(principal),
            }
        }
    }

    #[async_trait]
    impl CredentialStore for SpyStore {
        async fn insert(
            &self,
            _hash: [u8; 32],
            _principal_id: i64,
            _expires_at: u64,
            _scope: token::Scope,
        ) -> Result<(), StoreError> {
            Ok(())
        }

        async fn lookup(
            &self,
            _hash: [u8; 32],
            _scope: token::Scope,
        ) -> Result<Principal, StoreError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.principal.clone().ok_or(StoreError::NotFound)
        }

        async fn purge(&self, _principal_id: i64, _scope: token::Scope) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn state(store: Arc<SpyStore>) -> IdentityState {
        IdentityState {
            credentials: store,
            storage_timeout: Duration::from_secs(3),
        }
    }

    fn well_formed_token() -> String {
        "a".repeat(token::PLAINTEXT_LEN)
    }

    #[test]
    fn parse_recognizes_the_three_shapes() {
        assert_eq!(parse_authorization(None), Presentation::Absent);
        assert_eq!(parse_authorization(Some("Bearer abc")), Presentation::Bearer("abc"));
        assert_eq!(parse_authorization(Some("Bearer")), Presentation::Malformed);
        assert_eq!(parse_authorization(Some("Token abc")), Presentation::Malformed);
        assert_eq!(parse_authorization(Some("Bearer a b")), Presentation::Malformed);
        assert_eq!(parse_authorization(Some("bearer abc")), Presentation::Malformed);
        assert_eq!(parse_authorization(Some("")), Presentation::Malformed);
    }

    #[tokio::test]
    async fn absent_header_resolves_to_anonymous() {
        let store = Arc::new(SpyStore::empty());
        let identity = state(Arc::clone(&store)).resolve(None).await.unwrap();

        assert!(identity.is_anonymous());
        assert_eq!(store.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_headers_never_reach_storage() {
        let store = Arc::new(SpyStore::empty());
        let s = state(Arc::clone(&store));

        for header in ["Bearer", "Token abc", "Bearer nothex!"] {
            let err = s.resolve(Some(header)).await.unwrap_err();
            assert!(matches!(err, GateError::AuthCredentialMalformed));
        }
        assert_eq!(store.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_token_is_invalid_after_exactly_one_lookup() {
        let store = Arc::new(SpyStore::empty());
        let s = state(Arc::clone(&store));

        let header = format!("Bearer {}", well_formed_token());
        let err = s.resolve(Some(&header)).await.unwrap_err();

        assert!(matches!(err, GateError::AuthCredentialInvalid));
        assert_eq!(store.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn known_token_resolves_to_its_principal() {
        let principal = Principal {
            id: 42,
            created_at: 0,
            name: "Test".to_string(),
            email: "t@example.com".to_string(),
            password: Password::set("pa55word123".to_string()),
            activated: true,
            version: 1,
        };
        let store = Arc::new(SpyStore::with_principal(principal));
        let s = state(store);

        let header = format!("Bearer {}", well_formed_token());
        let identity = s.resolve(Some(&header)).await.unwrap();

        assert_eq!(identity.principal().unwrap().id, 42);
    }
}
