use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stylizer_gateway::config::Args;
use stylizer_gateway::provider::{ImageProvider, ReplicateProvider};
use stylizer_gateway::rate_limit::{AdmissionLimiter, cleanup_loop};
use stylizer_gateway::state::AppState;
use stylizer_gateway::watcher::JobWatcher;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stylizer_gateway=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // parse cli arguments
    let args = Args::parse();
    let shutdown = CancellationToken::new();

    let window = args.window();
    let budget = args.attempt_budget();
    let limiter = Arc::new(AdmissionLimiter::new(window));

    let provider: Option<Arc<dyn ImageProvider>> = match &args.provider_token {
        Some(token) if !token.is_empty() => Some(Arc::new(ReplicateProvider::new(
            reqwest::Client::new(),
            &args.provider_url,
            token.clone(),
            args.model_version.clone(),
        ))),
        _ => {
            tracing::warn!("REPLICATE_API_TOKEN not set; personalization requests will be refused");
            None
        }
    };

    let state = Arc::new(AppState {
        limiter: Arc::clone(&limiter),
        watcher: JobWatcher::new(budget),
        provider,
        max_photo_bytes: args.max_photo_bytes,
        shutdown: shutdown.clone(),
    });

    // the limiter never sweeps itself; this task owns that cadence
    let cleanup = tokio::spawn(cleanup_loop(
        Arc::clone(&limiter),
        args.cleanup_every(),
        shutdown.clone(),
    ));

    let app = stylizer_gateway::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(%addr, provider_url = %args.provider_url, "Gateway listening");
    tracing::info!(
        max_requests = window.max_requests,
        window_secs = window.interval.as_secs(),
        "Rate limit configured"
    );
    tracing::info!(
        max_attempts = budget.max_attempts,
        poll_interval_ms = budget.poll_interval.as_millis() as u64,
        transport_retries = budget.transport_retries,
        "Job watch budget configured"
    );

    let signal = shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutdown requested");
        signal.cancel();
    })
    .await?;

    // covers the case where serve returned without the signal firing
    shutdown.cancel();
    if let Err(e) = cleanup.await {
        tracing::error!(error = %e, "Admission cleanup task panicked");
    }

    Ok(())
}
