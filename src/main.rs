use std::sync::Arc;
use std::time::Duration;

use crate::api::AppState;
use crate::clients::gemini::GeminiClient;
use crate::config::Config;
use crate::services::conversation::{ConversationStore, InMemoryConversationStore};
use crate::services::jobs::{JobQueue, JobSettings};
use crate::services::workout::WorkoutService;
use crate::services::workout_agent::WorkoutAgent;

mod api;
mod clients;
mod config;
mod db;
mod error;
mod scheduler;
mod services;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let config = Config::from_env()?;

    let pool = db::initialize_db(&config.database_url).await?;

    let gemini_client = GeminiClient::new(config.gemini_api_key.clone(), config.gemini_model.clone())?;
    tracing::info!(model = %gemini_client.model(), "llm.configured");

    let conversations: Arc<dyn ConversationStore> = Arc::new(InMemoryConversationStore::new(
        Duration::from_secs(config.conversation_ttl_minutes.max(1) as u64 * 60),
        config.conversation_max_messages,
    ));

    let agent = WorkoutAgent::new(Arc::new(gemini_client), pool.clone(), conversations.clone());
    let workout_service = WorkoutService::new(pool, agent);
    let jobs = JobQueue::new(
        workout_service,
        JobSettings::new(config.job_delay_seconds, config.job_max_attempts),
    );

    let _scheduler = scheduler::start_scheduler(
        conversations,
        jobs.clone(),
        Duration::from_secs(config.job_retention_minutes.saturating_mul(60)),
    )
    .await?;

    let state = AppState { jobs: jobs.clone() };
    let app = api::router(state, &config.cors_allowed_origins);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = %config.port, "server.listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "server.signal_failed");
            }
            jobs.shutdown();
        })
        .await?;

    tracing::info!("server.stopped");
    Ok(())
}
