//! Parley - conversational relay API
//!
//! Accepts a user message over HTTP, forwards it with the stored conversation
//! to a hosted model, persists both turns, and returns the reply.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod conversation;
mod core;
mod providers;
mod routes;
mod storage;

use config::{Config, StorageBackend};
use crate::core::{ChatEngine, ConversationStore, RetryPolicy};
use providers::{BedrockBackend, InferenceClient};
use rusty_s3::Credentials;
use storage::{DocumentStore, FileStore, ObjectStore, SqliteStore};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub chat_engine: Arc<ChatEngine>,
}

async fn open_storage(config: &Config) -> anyhow::Result<Arc<dyn DocumentStore>> {
    let storage = &config.storage;
    let store: Arc<dyn DocumentStore> = match storage.backend {
        StorageBackend::File => Arc::new(FileStore::new(&storage.data_dir)),
        StorageBackend::Sqlite => Arc::new(
            SqliteStore::new(&storage.data_dir.join("parley.db"))
                .await
                .context("Failed to open SQLite store")?,
        ),
        StorageBackend::Object => {
            let endpoint = storage
                .object_endpoint
                .clone()
                .unwrap_or_else(|| ObjectStore::regional_endpoint(&storage.object_region));
            let credentials = storage.object_credentials.as_ref().map(|c| match c.session_token {
                Some(ref token) => Credentials::new_with_token(
                    c.access_key.clone(),
                    c.secret_key.clone(),
                    token.clone(),
                ),
                None => Credentials::new(c.access_key.clone(), c.secret_key.clone()),
            });
            if credentials.is_none() {
                tracing::warn!("No object storage credentials set, requests will be anonymous");
            }
            Arc::new(
                ObjectStore::new(
                    &endpoint,
                    &storage.bucket,
                    &storage.object_region,
                    credentials,
                    config.inference.request_timeout,
                )
                .context("Failed to configure object storage")?,
            )
        }
    };
    Ok(store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let documents = open_storage(&config).await?;
    tracing::info!(backend = documents.name(), "Conversation storage ready");

    let inference = &config.inference;
    let endpoint = inference
        .endpoint
        .clone()
        .unwrap_or_else(|| BedrockBackend::regional_endpoint(&inference.region));
    let backend = BedrockBackend::new(
        endpoint,
        inference.model_id.clone(),
        inference.api_key.clone(),
        inference.request_timeout,
    )?;
    if inference.api_key.is_none() {
        tracing::warn!("AWS_BEARER_TOKEN_BEDROCK is not set, model requests will be unauthenticated");
    }

    let client = InferenceClient::new(
        Arc::new(backend),
        RetryPolicy::new(config.retry.max_attempts, config.retry.initial_delay),
    );

    let system_prompt = config::resolve_system_prompt(&config.prompt).await?;

    let chat_engine = Arc::new(ChatEngine::new(
        &config,
        ConversationStore::new(documents),
        client,
        system_prompt,
    ));

    tracing::info!(
        model = %inference.model_id,
        max_attempts = config.retry.max_attempts,
        "Model client ready"
    );

    let state = AppState {
        config,
        chat_engine,
    };

    let app = Router::new()
        .merge(routes::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("Parley API running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
