use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tryon_server::{
    config::AppConfig,
    faceswap::FaceSwapClient,
    openai::OpenAiImageClient,
    pipeline::GenerationPipeline,
    storage::{ArtifactStore, FileRecordStore, JsonCatalog, LocalFileStorage},
    web::{self, AppState},
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tryon_server=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();
    let storage = LocalFileStorage::new(config.data_dir.clone(), config.public_base_url.clone());
    tracing::info!(dir = %config.data_dir.display(), url = %config.public_base_url, "artifact storage ready");

    let artifacts = Arc::new(
        ArtifactStore::with_timeout(storage.clone(), config.upstream_timeout)
            .context("failed to build download client")?,
    );
    let catalog = Arc::new(JsonCatalog::new(storage.clone()));
    let records = Arc::new(FileRecordStore::new(storage.clone()));

    let pipeline = match (&config.openai, &config.faceswap) {
        (Some(openai), Some(faceswap)) => {
            let generator = OpenAiImageClient::with_timeout(
                openai.base_url.clone(),
                openai.api_key.clone(),
                openai.model.clone(),
                config.upstream_timeout,
            )
            .context("failed to build image generation client")?;
            let swapper = FaceSwapClient::with_timeout(
                faceswap.api_url.clone(),
                faceswap.api_key.clone(),
                faceswap.poll.clone(),
                config.upstream_timeout,
            )
            .context("failed to build face swap client")?;
            Some(Arc::new(GenerationPipeline::new(
                catalog.clone(),
                Arc::new(generator),
                Arc::new(swapper),
                artifacts.clone(),
                records.clone(),
            )))
        }
        _ => {
            tracing::warn!(
                missing = ?config.missing_provider_settings(),
                "provider settings missing, POST /generate is disabled"
            );
            None
        }
    };

    let state = AppState {
        artifacts,
        catalog,
        records,
        pipeline,
        missing_settings: config.missing_provider_settings(),
    };
    let router = web::router(state, &config.data_dir, config.max_upload_bytes);

    let tcp_listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address))?;
    tracing::info!("try-on server listening on http://{}", config.bind_address);

    axum::serve(tcp_listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;
    Ok(())
}
