mod config;
mod error;
mod server;

use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use server::RelayState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting maxwell relay");

    let config = Config::from_env()?;
    info!(
        upstream_url = %config.upstream_url,
        cors_origin = config.cors_origin.as_deref().unwrap_or("*"),
        body_limit_bytes = config.body_limit_bytes,
        "configuration loaded"
    );

    let state = RelayState::new(&config)?;
    let app = server::router(state, &config)?;

    let listener = tokio::net::TcpListener::bind(config.listen_addr()).await?;
    info!(addr = %listener.local_addr()?, "relay ready");

    axum::serve(listener, app).await.inspect_err(|e| {
        tracing::error!(error = %e, "relay server error");
    })?;
    info!("relay shut down");
    Ok(())
}
