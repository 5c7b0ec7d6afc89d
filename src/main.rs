//! hive 入口：装配各组件并启动 HTTP 服务

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hive::config::{load_config, AppConfig};
use hive::inference::{InferenceClient, MockInference, OllamaClient};
use hive::memory::{MemoryStore, SqliteMemoryStore};
use hive::orchestrator::{LoopSettings, RunCoordinator};
use hive::server::{router, AppState};
use hive::tools::{ExecutionService, HttpExecutionService, ToolLimits};

fn create_inference(cfg: &AppConfig) -> Arc<dyn InferenceClient> {
    if cfg.inference.provider.eq_ignore_ascii_case("mock") {
        tracing::warn!("provider = mock, using canned inference");
        return Arc::new(MockInference);
    }
    tracing::info!(
        base_url = %cfg.inference.base_url,
        model = %cfg.inference.model,
        "using Ollama inference"
    );
    Arc::new(OllamaClient::new(
        &cfg.inference.base_url,
        &cfg.inference.model,
        Duration::from_secs(cfg.inference.request_timeout_secs),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hive::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let inference = create_inference(&cfg);
    let service: Arc<dyn ExecutionService> =
        Arc::new(HttpExecutionService::new(&cfg.tools.service_url));
    let memory: Arc<dyn MemoryStore> = Arc::new(
        SqliteMemoryStore::open(&cfg.memory.db_path)
            .map_err(|e| anyhow::anyhow!("memory store init failed: {e}"))?,
    );

    let coordinator = Arc::new(RunCoordinator::new(
        inference,
        service.clone(),
        memory.clone(),
        ToolLimits::from_config(&cfg.tools),
        LoopSettings::from_config(&cfg),
    ));

    let state = AppState {
        coordinator,
        service,
        memory,
    };

    let addr = format!("{}:{}", cfg.server.host, cfg.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "hive listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
