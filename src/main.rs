use std::env;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use tablechat_backend::core::logging;
use tablechat_backend::server::router::router;
use tablechat_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let state = AppState::initialize().await?;
    logging::init(&state.paths);

    let port = env::var("PORT")
        .ok()
        .and_then(|val| val.parse::<u16>().ok())
        .unwrap_or(state.config.server.port);
    let bind_addr = format!("127.0.0.1:{}", port);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    println!("TABLECHAT_PORT={}", addr.port());
    tracing::info!("Listening on {}", addr);

    let app: Router = router(state.clone());
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
