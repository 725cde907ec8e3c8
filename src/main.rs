use std::sync::Arc;

use replyflow::api::{api_routes, AppState};
use replyflow::approval::{spawn_expiry_task, TaskManager};
use replyflow::classify::LlmClassifier;
use replyflow::config::{EngineConfig, GenerationConfig, SmtpConfig};
use replyflow::dispatch::{Dispatcher, NullDispatcher, SmtpDispatcher};
use replyflow::draft::DraftGenerator;
use replyflow::knowledge::InMemoryKnowledgeStore;
use replyflow::llm::{GenerationBackend, HttpBackend};
use replyflow::pipeline::ReplyPipeline;
use replyflow::rules::RuleStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let engine_config = EngineConfig::from_env();
    let generation_config = GenerationConfig::from_env()?;

    let backend: Arc<dyn GenerationBackend> = Arc::new(HttpBackend::new(generation_config));
    let classifier = Arc::new(LlmClassifier::new(Arc::clone(&backend)));
    let knowledge = Arc::new(InMemoryKnowledgeStore::default());

    let dispatcher: Arc<dyn Dispatcher> = match SmtpConfig::from_env() {
        Some(config) => {
            tracing::info!(host = %config.host, "SMTP dispatch enabled");
            Arc::new(SmtpDispatcher::new(config))
        }
        None => {
            tracing::warn!("SMTP_HOST not set — approvals will report NO_SMTP_CONFIG");
            Arc::new(NullDispatcher)
        }
    };

    let rules = RuleStore::new();
    let generator = Arc::new(DraftGenerator::new(
        Arc::clone(&backend),
        knowledge,
        &engine_config,
    ));
    let manager = TaskManager::new(
        Arc::clone(&rules),
        Arc::clone(&dispatcher),
        Arc::clone(&generator),
    );

    spawn_expiry_task(Arc::clone(&manager), engine_config.sweep_interval_secs);

    let pipeline = Arc::new(ReplyPipeline::new(
        classifier,
        Arc::clone(&rules),
        generator,
        Arc::clone(&manager),
        dispatcher,
    ));

    let app = api_routes(AppState {
        pipeline,
        manager,
        rules,
        backend,
    });

    let addr = format!("0.0.0.0:{}", engine_config.port);
    tracing::info!(%addr, "replyflow listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
