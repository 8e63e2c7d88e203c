use std::sync::Arc;

use image_schema_analyzer::{
    build_router, config::AppConfig, provider::OpenAiProvider, state::AppState,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;

    let provider = OpenAiProvider::new(
        &config.base_url,
        config.api_key.clone(),
        config.model.clone(),
        config.request_timeout,
    )?;
    tracing::info!(model = %config.model, endpoint = %provider.endpoint(), "provider ready");

    let state = AppState::new(Arc::new(provider), config.image_store());
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
