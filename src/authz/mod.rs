//! Authorization gates.
//!
//! Layered preconditions in a fixed order: authenticated → activated →
//! permitted. Each gate implies the ones before it, so attaching
//! `require_permission` alone enforces the full chain, and a failure at an
//! earlier layer short-circuits before any later lookup runs.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::errors::GateError;
use crate::principal::{Identity, Principal};
use crate::store::{bounded, PermissionStore};

/// State for the permission gate.
#[derive(Clone)]
pub struct AuthzState {
    pub permissions: Arc<dyn PermissionStore>,
    pub storage_timeout: Duration,
}

impl AuthzState {
    /// Bind a permission code for declarative route attachment:
    /// `from_fn_with_state(authz.require(CODE), require_permission)`.
    pub fn require(&self, code: &'static str) -> PermissionRequirement {
        PermissionRequirement {
            authz: self.clone(),
            code,
        }
    }
}

/// A permission gate bound to one capability code.
#[derive(Clone)]
pub struct PermissionRequirement {
    pub authz: AuthzState,
    pub code: &'static str,
}

/// The identity the resolver attached upstream. Its absence means the
/// pipeline was mis-assembled, which is a bug, not a caller error.
fn identity(request: &Request<Body>) -> Result<&Identity, GateError> {
    request
        .extensions()
        .get::<Identity>()
        .ok_or(GateError::Internal("identity resolver did not run"))
}

fn authenticated(request: &Request<Body>) -> Result<&Arc<Principal>, GateError> {
    identity(request)?
        .principal()
        .ok_or(GateError::Unauthenticated)
}

fn activated(request: &Request<Body>) -> Result<&Arc<Principal>, GateError> {
    let principal = authenticated(request)?;
    if !principal.activated {
        return Err(GateError::NotActivated);
    }
    Ok(principal)
}

/// The full precondition chain behind `require_permission`, separated from
/// the middleware plumbing. The permission fetch only happens once the
/// earlier layers have passed.
fn permitted<'a>(
    requirement: &'a PermissionRequirement,
    request: &Request<Body>,
) -> impl std::future::Future<Output = Result<(), GateError>> + 'a {
    // Resolve the principal synchronously so the returned future borrows
    // nothing from the request, whose body is not `Sync` and would make the
    // middleware future non-`Send`.
    let principal = activated(request).map(Arc::clone);

    async move {
        let principal = principal?;

        let granted = bounded(
            requirement.authz.storage_timeout,
            requirement.authz.permissions.permissions_for(principal.id),
        )
        .await?;

        if !granted.contains(requirement.code) {
            return Err(GateError::NotPermitted);
        }
        Ok(())
    }
}

/// Reject anonymous requests.
pub async fn require_authenticated(
    request: Request<Body>,
    next: Next,
) -> Result<Response, GateError> {
    authenticated(&request)?;
    Ok(next.run(request).await)
}

/// Reject anonymous and unactivated requests.
pub async fn require_activated(
    request: Request<Body>,
    next: Next,
) -> Result<Response, GateError> {
    activated(&request)?;
    Ok(next.run(request).await)
}

/// Reject unless the principal is authenticated, activated, and granted the
/// bound permission code.
pub async fn require_permission(
    State(requirement): State<PermissionRequirement>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, GateError> {
    permitted(&requirement, &request).await?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::{Password, PermissionSet, PERMISSION_ITEMS_READ};
    use crate::store::StoreError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SpyPermissions {
        fetches: AtomicUsize,
        granted: Vec<&'static str>,
    }

    impl SpyPermissions {
        fn granting(granted: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                fetches: AtomicUsize::new(0),
                granted,
            })
        }
    }

    #[async_trait]
    impl PermissionStore for SpyPermissions {
        async fn permissions_for(&self, _principal_id: i64) -> Result<PermissionSet, StoreError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.granted.iter().copied().collect())
        }

        async fn grant(&self, _principal_id: i64, _codes: &[&str]) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn request_with(identity: Identity) -> Request<Body> {
        let mut request = Request::new(Body::empty());
        request.extensions_mut().insert(identity);
        request
    }

    fn principal(activated: bool) -> Identity {
        Identity::Known(Arc::new(Principal {
            id: 1,
            created_at: 0,
            name: "Test".to_string(),
            email: "t@example.com".to_string(),
            password: Password::set("pa55word123".to_string()),
            activated,
            version: 1,
        }))
    }

    fn requirement(permissions: Arc<SpyPermissions>) -> PermissionRequirement {
        AuthzState {
            permissions,
            storage_timeout: Duration::from_secs(3),
        }
        .require(PERMISSION_ITEMS_READ)
    }

    #[test]
    fn anonymous_fails_authentication() {
        let request = request_with(Identity::Anonymous);
        assert!(matches!(
            authenticated(&request),
            Err(GateError::Unauthenticated)
        ));
    }

    #[test]
    fn unactivated_fails_activation_but_passes_authentication() {
        let request = request_with(principal(false));
        assert!(authenticated(&request).is_ok());
        assert!(matches!(activated(&request), Err(GateError::NotActivated)));
    }

    #[test]
    fn missing_identity_extension_is_a_programmer_error() {
        let request = Request::new(Body::empty());
        assert!(matches!(identity(&request), Err(GateError::Internal(_))));
    }

    #[tokio::test]
    async fn anonymous_short_circuits_before_permission_fetch() {
        let permissions = SpyPermissions::granting(vec![PERMISSION_ITEMS_READ]);
        let requirement = requirement(Arc::clone(&permissions));

        let request = request_with(Identity::Anonymous);
        let result = permitted(&requirement, &request).await;

        assert!(matches!(result, Err(GateError::Unauthenticated)));
        assert_eq!(permissions.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unactivated_principal_short_circuits_before_permission_fetch() {
        let permissions = SpyPermissions::granting(vec![PERMISSION_ITEMS_READ]);
        let requirement = requirement(Arc::clone(&permissions));

        let request = request_with(principal(false));
        let result = permitted(&requirement, &request).await;

        assert!(matches!(result, Err(GateError::NotActivated)));
        assert_eq!(permissions.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_code_is_not_permitted_after_one_fetch() {
        let permissions = SpyPermissions::granting(vec![]);
        let requirement = requirement(Arc::clone(&permissions));

        let request = request_with(principal(true));
        let result = permitted(&requirement, &request).await;

        assert!(matches!(result, Err(GateError::NotPermitted)));
        assert_eq!(permissions.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn granted_code_passes() {
        let permissions = SpyPermissions::granting(vec![PERMISSION_ITEMS_READ]);
        let requirement = requirement(permissions);

        let request = request_with(principal(true));
        assert!(permitted(&requirement, &request).await.is_ok());
    }
}
