//! Account flows: registration, activation, login.
//!
//! Transport-independent operations invoked by the HTTP surface. Login
//! deliberately reports unknown email and wrong password as the same
//! failure, and activation reports unknown and expired tokens as the same
//! failure, so callers cannot probe which accounts exist.

use std::sync::Arc;
use std::time::Duration;

use crate::config::TokenConfig;
use crate::errors::GateError;
use crate::lifecycle::Background;
use crate::mailer::Mailer;
use crate::principal::{Password, Principal, PERMISSION_ITEMS_READ};
use crate::store::{bounded, CredentialStore, PermissionStore, PrincipalStore, StoreError};
use crate::token::{self, Credential, Scope};
use crate::validate::{check_email, check_name, check_password, Checks};

/// Account operations over the storage and mail collaborators.
#[derive(Clone)]
pub struct Accounts {
    pub principals: Arc<dyn PrincipalStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub permissions: Arc<dyn PermissionStore>,
    pub mailer: Arc<dyn Mailer>,
    pub background: Arc<Background>,
    pub tokens: TokenConfig,
    pub storage_timeout: Duration,
}

impl Accounts {
    /// Register a new, unactivated principal. Grants the baseline read
    /// permission, issues an activation credential, and dispatches the
    /// welcome mail in the background; the plaintext leaves the process
    /// only inside that mail.
    pub async fn register(
        &self,
        name: String,
        email: String,
        password: String,
    ) -> Result<Principal, GateError> {
        let mut checks = Checks::new();
        check_name(&mut checks, &name);
        check_email(&mut checks, &email);
        check_password(&mut checks, &password);
        checks.finish()?;

        let mut principal = Principal {
            id: 0,
            created_at: 0,
            name,
            email,
            password: Password::set(password),
            activated: false,
            version: 0,
        };
        if principal.password.verifier().is_none() {
            return Err(GateError::Internal("password verifier missing"));
        }

        bounded(self.storage_timeout, self.principals.insert(&mut principal)).await?;

        bounded(
            self.storage_timeout,
            self.permissions.grant(principal.id, &[PERMISSION_ITEMS_READ]),
        )
        .await?;

        let credential = token::issue(
            principal.id,
            Duration::from_secs(self.tokens.activation_ttl_secs),
            Scope::Activation,
        );
        bounded(
            self.storage_timeout,
            self.credentials.insert(
                credential.hash,
                credential.principal_id,
                credential.expires_at,
                credential.scope,
            ),
        )
        .await?;

        let mailer = Arc::clone(&self.mailer);
        let recipient = principal.email.clone();
        let payload = serde_json::json!({
            "activation_token": credential.plaintext,
            "name": principal.name,
        });
        self.background.spawn("welcome-mail", async move {
            if let Err(err) = mailer.send(&recipient, "user_welcome", payload).await {
                tracing::error!(error = %err, "welcome mail failed");
            }
        });

        Ok(principal)
    }

    /// Consume an activation credential: flip the activation flag through a
    /// conditional update, then invalidate every outstanding activation
    /// credential for the principal.
    pub async fn activate(&self, plaintext: &str) -> Result<Principal, GateError> {
        let mut checks = Checks::new();
        checks.check(!plaintext.is_empty(), "token", "must be provided");
        checks.check(
            token::validate_plaintext(plaintext),
            "token",
            "must be a well-formed activation token",
        );
        checks.finish()?;

        let hash = token::hash_plaintext(plaintext);
        let lookup = self.credentials.lookup(hash, Scope::Activation);
        let mut principal = match bounded(self.storage_timeout, lookup).await {
            Ok(principal) => principal,
            Err(StoreError::NotFound) => {
                let mut fields = std::collections::BTreeMap::new();
                fields.insert(
                    "token".to_string(),
                    "invalid or expired activation token".to_string(),
                );
                return Err(GateError::ValidationFailed(fields));
            }
            Err(other) => return Err(other.into()),
        };

        principal.activated = true;
        let new_version =
            bounded(self.storage_timeout, self.principals.update(&principal)).await?;
        principal.version = new_version;

        bounded(
            self.storage_timeout,
            self.credentials.purge(principal.id, Scope::Activation),
        )
        .await?;

        Ok(principal)
    }

    /// Exchange email and password for an authentication credential.
    pub async fn login(&self, email: &str, password: &str) -> Result<Credential, GateError> {
        let mut checks = Checks::new();
        check_email(&mut checks, email);
        check_password(&mut checks, password);
        checks.finish()?;

        let principal = match bounded(self.storage_timeout, self.principals.get_by_email(email)).await
        {
            Ok(principal) => principal,
            // Unknown email reads exactly like a wrong password.
            Err(StoreError::NotFound) => return Err(GateError::InvalidCredentials),
            Err(other) => return Err(other.into()),
        };

        if !principal.password.matches(password)? {
            return Err(GateError::InvalidCredentials);
        }

        let credential = token::issue(
            principal.id,
            Duration::from_secs(self.tokens.authentication_ttl_secs),
            Scope::Authentication,
        );
        bounded(
            self.storage_timeout,
            self.credentials.insert(
                credential.hash,
                credential.principal_id,
                credential.expires_at,
                credential.scope,
            ),
        )
        .await?;

        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::MailerError;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;

    /// Captures dispatched mail so tests can pull out the activation token.
    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<(String, Value)>>,
    }

    impl RecordingMailer {
        fn activation_token(&self) -> Option<String> {
            self.sent
                .lock()
                .unwrap()
                .last()
                .and_then(|(_, payload)| payload.get("activation_token"))
                .and_then(Value::as_str)
                .map(str::to_string)
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(
            &self,
            recipient: &str,
            _template: &str,
            payload: Value,
        ) -> Result<(), MailerError> {
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), payload));
            Ok(())
        }
    }

    struct Fixture {
        accounts: Accounts,
        store: Arc<MemoryStore>,
        mailer: Arc<RecordingMailer>,
        background: Arc<Background>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::default());
        let background = Background::new();

        let accounts = Accounts {
            principals: Arc::clone(&store) as Arc<dyn PrincipalStore>,
            credentials: Arc::clone(&store) as Arc<dyn CredentialStore>,
            permissions: Arc::clone(&store) as Arc<dyn PermissionStore>,
            mailer: Arc::clone(&mailer) as Arc<dyn Mailer>,
            background: Arc::clone(&background),
            tokens: TokenConfig::default(),
            storage_timeout: Duration::from_secs(3),
        };

        Fixture {
            accounts,
            store,
            mailer,
            background,
        }
    }

    #[tokio::test]
    async fn register_creates_unactivated_principal_with_read_permission() {
        let f = fixture();

        let principal = f
            .accounts
            .register(
                "Alice".to_string(),
                "alice@example.com".to_string(),
                "pa55word123".to_string(),
            )
            .await
            .unwrap();

        assert!(!principal.activated);
        assert_eq!(principal.version, 1);

        let granted = f.store.permissions_for(principal.id).await.unwrap();
        assert!(granted.contains(PERMISSION_ITEMS_READ));

        // Exactly one activation credential was recorded.
        f.background.wait().await;
        assert_eq!(f.store.credential_count(), 1);
        assert!(f.mailer.activation_token().is_some());
    }

    #[tokio::test]
    async fn register_rejects_invalid_input_without_storage_writes() {
        let f = fixture();

        let err = f
            .accounts
            .register("".to_string(), "bad".to_string(), "short".to_string())
            .await
            .unwrap_err();

        assert!(matches!(err, GateError::ValidationFailed(_)));
        assert_eq!(f.store.credential_count(), 0);
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email_as_validation_failure() {
        let f = fixture();
        let register = |email: &str| {
            f.accounts.register(
                "Alice".to_string(),
                email.to_string(),
                "pa55word123".to_string(),
            )
        };

        register("alice@example.com").await.unwrap();
        let err = register("alice@example.com").await.unwrap_err();

        let GateError::ValidationFailed(fields) = err else {
            panic!("expected ValidationFailed");
        };
        assert!(fields.contains_key("email"));
    }

    #[tokio::test]
    async fn activation_flips_the_flag_and_purges_tokens() {
        let f = fixture();
        f.accounts
            .register(
                "Alice".to_string(),
                "alice@example.com".to_string(),
                "pa55word123".to_string(),
            )
            .await
            .unwrap();
        f.background.wait().await;
        let plaintext = f.mailer.activation_token().unwrap();

        let principal = f.accounts.activate(&plaintext).await.unwrap();

        assert!(principal.activated);
        assert_eq!(principal.version, 2);
        assert_eq!(f.store.credential_count(), 0);

        // A second attempt with the same token now fails as unknown.
        let err = f.accounts.activate(&plaintext).await.unwrap_err();
        assert!(matches!(err, GateError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn unknown_and_malformed_activation_tokens_both_fail_validation() {
        let f = fixture();

        let malformed = f.accounts.activate("nope").await.unwrap_err();
        assert!(matches!(malformed, GateError::ValidationFailed(_)));

        let unknown = f.accounts.activate(&"a".repeat(32)).await.unwrap_err();
        assert!(matches!(unknown, GateError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn login_issues_an_authentication_credential() {
        let f = fixture();
        f.accounts
            .register(
                "Alice".to_string(),
                "alice@example.com".to_string(),
                "pa55word123".to_string(),
            )
            .await
            .unwrap();

        let credential = f
            .accounts
            .login("alice@example.com", "pa55word123")
            .await
            .unwrap();

        assert_eq!(credential.scope, Scope::Authentication);

        // The issued credential resolves back to the principal.
        let principal = f
            .store
            .lookup(credential.hash, Scope::Authentication)
            .await
            .unwrap();
        assert_eq!(principal.email, "alice@example.com");
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_are_indistinguishable() {
        let f = fixture();
        f.accounts
            .register(
                "Alice".to_string(),
                "alice@example.com".to_string(),
                "pa55word123".to_string(),
            )
            .await
            .unwrap();

        let unknown = f
            .accounts
            .login("nobody@example.com", "pa55word123")
            .await
            .unwrap_err();
        let wrong = f
            .accounts
            .login("alice@example.com", "wrongpassword")
            .await
            .unwrap_err();

        assert!(matches!(unknown, GateError::InvalidCredentials));
        assert!(matches!(wrong, GateError::InvalidCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }
}
