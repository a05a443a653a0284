use axum::{Router, error_handling::HandleErrorLayer, extract::Path, routing::get};
use meshestra_relay::prelude::*;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

async fn health() -> &'static str {
    "ok"
}

/// Fails for missing files; the failure is reported and answered with a 500.
async fn read_file(ctx: LogContext, Path(name): Path<String>) -> Result<String, HandlerFailure> {
    ctx.insert("file", name.clone());
    let body = tokio::fs::read_to_string(format!("/tmp/relay-demo/{}", name)).await?;
    Ok(body)
}

/// A failure of the delivery path: passed through, never reported
async fn broken_delivery() -> Result<&'static str, HandlerFailure> {
    Err(ReportingFailure::new("queue unavailable").into())
}

async fn explode() -> &'static str {
    panic!("handler exploded")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl+C signal");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = RelayConfig::from_env()?;
    tracing::info!(environment = %config.environment, "Starting relay demo server...");

    let (relay, worker) = ErrorRelay::from_config(&config, Arc::new(TracingSink))?;
    let worker = worker.spawn();

    let app = Router::new()
        .route("/health", get(health))
        .route("/files/{name}", get(read_file))
        .route("/deliver", get(broken_delivery))
        .route("/panic", get(explode))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(HandleErrorLayer::new(handle_error))
                .layer(relay.layer()),
        );

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("{}:{}", host, port);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let stats = worker.shutdown().await?;
    tracing::info!(
        delivered = stats.delivered,
        dropped = stats.dropped,
        "Graceful shutdown complete"
    );
    Ok(())
}
