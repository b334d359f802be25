use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::domain::error::Result;
use crate::infrastructure::bootstrap;
use crate::infrastructure::config::CertifierConfig;
use crate::interfaces::http::start_server;

pub async fn run() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let config = CertifierConfig::load().inspect_err(|e| error!("Invalid configuration: {}", e))?;
    let state = bootstrap::setup(&config)
        .await
        .inspect_err(|e| error!("Startup failed: {}", e))?;

    let flusher = state.audit.spawn_flusher(config.audit.flush_interval());

    info!(
        templates = state.registry.len(),
        sink = state.audit.sink_name(),
        "SQL certifier starting"
    );
    start_server(state.clone(), &config.server.host, config.server.port)?.await?;

    flusher.abort();
    let flushed = state.audit.flush_pending().await;
    if state.audit.pending_count() > 0 {
        error!(
            flushed,
            lost = state.audit.pending_count(),
            "Audit records still pending at shutdown"
        );
    }

    Ok(())
}
