use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gateward::config::{load_config, GateConfig};
use gateward::mailer::LogMailer;
use gateward::store::MemoryStore;
use gateward::{Collaborators, GatewayServer};

/// Config file read when present; defaults apply otherwise.
const CONFIG_PATH: &str = "gateward.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = if Path::new(CONFIG_PATH).exists() {
        load_config(Path::new(CONFIG_PATH))?
    } else {
        GateConfig::default()
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("gateward={},tower_http=info", config.observability.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        bind_address = %config.listener.bind_address,
        limiter_enabled = config.limiter.enabled,
        limiter_rps = config.limiter.requests_per_second,
        limiter_burst = config.limiter.burst,
        storage_timeout_secs = config.storage.timeout_secs,
        "configuration loaded"
    );

    // The demo wiring runs against the in-memory store; production embeds
    // the crate with real collaborators behind the same traits.
    let store = Arc::new(MemoryStore::new());
    let collaborators = Collaborators {
        principals: Arc::clone(&store) as _,
        credentials: Arc::clone(&store) as _,
        permissions: Arc::clone(&store) as _,
        resources: Arc::clone(&store) as _,
        mailer: Arc::new(LogMailer) as _,
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = GatewayServer::new(&config, collaborators);
    server.run(listener).await?;

    tracing::info!("shutdown complete");
    Ok(())
}
