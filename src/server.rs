//! Server setup and wiring.
//!
//! # Responsibilities
//! - Initialize subsystems from config (registry, gates, flows)
//! - Build the business router and wrap it in the pipeline
//! - Spawn the registry janitor
//! - Serve with graceful shutdown, draining background work

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;

use crate::account::Accounts;
use crate::api::{self, ApiState};
use crate::authz::AuthzState;
use crate::config::GateConfig;
use crate::identity::IdentityState;
use crate::lifecycle::{Background, Shutdown};
use crate::limiter::{AdmissionState, ClientRegistry};
use crate::mailer::Mailer;
use crate::occ::WriteController;
use crate::pipeline::Pipeline;
use crate::store::{CredentialStore, PermissionStore, PrincipalStore, ResourceStore};

/// The external collaborators the gateway is composed over.
#[derive(Clone)]
pub struct Collaborators {
    pub principals: Arc<dyn PrincipalStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub permissions: Arc<dyn PermissionStore>,
    pub resources: Arc<dyn ResourceStore>,
    pub mailer: Arc<dyn Mailer>,
}

/// A fully wired gateway.
pub struct GatewayServer {
    router: Router,
    registry: Arc<ClientRegistry>,
    background: Arc<Background>,
    shutdown: Shutdown,
}

impl GatewayServer {
    /// Wire every subsystem. The janitor is spawned in [`Self::run`]; until
    /// then nothing is running in the background.
    pub fn new(config: &GateConfig, collaborators: Collaborators) -> Self {
        let storage_timeout = Duration::from_secs(config.storage.timeout_secs);

        let background = Background::new();
        let shutdown = Shutdown::new();
        let registry = ClientRegistry::new(&config.limiter);

        let accounts = Accounts {
            principals: collaborators.principals,
            credentials: Arc::clone(&collaborators.credentials),
            permissions: Arc::clone(&collaborators.permissions),
            mailer: collaborators.mailer,
            background: Arc::clone(&background),
            tokens: config.tokens.clone(),
            storage_timeout,
        };
        let writes = WriteController::new(collaborators.resources, storage_timeout);

        let authz = AuthzState {
            permissions: collaborators.permissions,
            storage_timeout,
        };
        let pipeline = Pipeline {
            admission: AdmissionState {
                registry: Arc::clone(&registry),
                enabled: config.limiter.enabled,
            },
            identity: IdentityState {
                credentials: collaborators.credentials,
                storage_timeout,
            },
            request_timeout: Duration::from_secs(config.http.request_timeout_secs),
            max_body_bytes: config.http.max_body_bytes,
        };

        let router = pipeline.wrap(api::router(ApiState { accounts, writes }, authz));

        Self {
            router,
            registry,
            background,
            shutdown,
        }
    }

    /// The wired router, for serving or for driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    pub fn background(&self) -> &Arc<Background> {
        &self.background
    }

    /// Handle for triggering a graceful stop from another task.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Run the server on `listener` until interrupted or stopped through the
    /// shutdown handle, then drain background work.
    pub async fn run(self, listener: TcpListener) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "gateway starting");

        self.registry.spawn_janitor(&self.background, &self.shutdown);

        let mut stop = self.shutdown.subscribe();
        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(err) = result {
                            tracing::error!(error = %err, "failed to listen for interrupt");
                        }
                        tracing::info!("shutdown signal received");
                    }
                    _ = stop.recv() => {
                        tracing::info!("shutdown triggered");
                    }
                }
            })
            .await?;

        // Stop the janitor and wait out in-flight background work.
        self.shutdown.trigger();
        self.background.wait().await;

        tracing::info!("gateway stopped");
        Ok(())
    }
}
