use std::sync::Arc;

use anyhow::Context;
use jobshift_api::config::ProxyConfig;
use jobshift_infra::HttpTargetClient;
use jobshift_live::{MigrationProxy, MigrationSession};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    jobshift_observability::init();

    let config = ProxyConfig::from_env()?;

    let mut target = HttpTargetClient::new(&config.target_url, config.forward_timeout)?;
    if let Some(token) = &config.target_token {
        target = target.with_token(token.clone());
    }

    let session = Arc::new(MigrationSession::new(config.source));
    match config.percentage {
        Some(pct) => session.start_dual_run(pct)?,
        None => tracing::info!("session idle; POST /percentage to start the dual run"),
    }

    let proxy = MigrationProxy::new(Arc::clone(&session), Arc::new(target))
        .with_max_body_bytes(config.max_body_bytes);
    let app = jobshift_api::app::build_app(Arc::new(proxy));

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        source = %config.source,
        target = %config.target_url,
        session = %session.id(),
        "migration proxy listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
