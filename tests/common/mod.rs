//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::net::TcpListener;

use gateward::config::GateConfig;
use gateward::mailer::{Mailer, MailerError};
use gateward::principal::{Password, Principal};
use gateward::store::{CredentialStore, MemoryStore, PermissionStore, PrincipalStore};
use gateward::token::{self, Scope};
use gateward::{Collaborators, GatewayServer, Shutdown};

/// Mailer that records payloads so tests can read activation tokens.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, Value)>>,
}

impl RecordingMailer {
    /// The activation token most recently mailed to `recipient`.
    #[allow(dead_code)]
    pub fn activation_token_for(&self, recipient: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, _)| to == recipient)
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

/// A gateway running on an ephemeral port against the in-memory store.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub store: Arc<MemoryStore>,
    #[allow(dead_code)]
    pub mailer: Arc<RecordingMailer>,
    #[allow(dead_code)]
    pub shutdown: Shutdown,
    pub client: reqwest::Client,
}

impl TestGateway {
    /// Boot a gateway. The limiter is disabled unless the tweak enables it,
    /// so unrelated tests do not trip admission control.
    pub async fn spawn(tweak: impl FnOnce(&mut GateConfig)) -> Self {
        let mut config = GateConfig::default();
        config.limiter.enabled = false;
        tweak(&mut config);

        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::default());
        let collaborators = Collaborators {
            principals: Arc::clone(&store) as _,
            credentials: Arc::clone(&store) as _,
            permissions: Arc::clone(&store) as _,
            resources: Arc::clone(&store) as _,
            mailer: Arc::clone(&mailer) as _,
        };

        let server = GatewayServer::new(&config, collaborators);
        let shutdown = server.shutdown_handle();

        // Bind before spawning so requests queue instead of racing startup.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.run(listener).await;
        });

        Self {
            addr,
            store,
            mailer,
            shutdown,
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Insert a principal directly into the store, grant `permissions`, and
    /// issue an authentication token for it. Returns the principal and the
    /// token plaintext.
    pub async fn seed_principal(
        &self,
        email: &str,
        activated: bool,
        permissions: &[&str],
    ) -> (Principal, String) {
        let mut principal = Principal {
            id: 0,
            created_at: 0,
            name: "Seeded".to_string(),
            email: email.to_string(),
            password: Password::set("pa55word123".to_string()),
            activated,
            version: 0,
        };
        PrincipalStore::insert(self.store.as_ref(), &mut principal)
            .await
            .unwrap();

        if !permissions.is_empty() {
            self.store.grant(principal.id, permissions).await.unwrap();
        }

        let credential = token::issue(
            principal.id,
            Duration::from_secs(3600),
            Scope::Authentication,
        );
        CredentialStore::insert(
            self.store.as_ref(),
            credential.hash,
            principal.id,
            credential.expires_at,
            Scope::Authentication,
        )
        .await
        .unwrap();

        (principal, credential.plaintext)
    }

    /// Issue a token whose expiry is already in the past.
    #[allow(dead_code)]
    pub async fn seed_expired_token(&self, principal_id: i64) -> String {
        let credential = token::issue(principal_id, Duration::from_secs(0), Scope::Authentication);
        CredentialStore::insert(
            self.store.as_ref(),
            credential.hash,
            principal_id,
            token::unix_now().saturating_sub(60),
            Scope::Authentication,
        )
        .await
        .unwrap();
        credential.plaintext
    }
}
