//! Ant - Rust 多机器人共享环境模型服务
//!
//! 入口：初始化日志、加载配置、装配协作者并启动服务，直到 Ctrl+C。
//! 独立进程运行时使用进程内 Mock 协作者（真实传输由部署方注入）。

use std::sync::Arc;

use anyhow::Context;
use ant::external::mock::{
    MockActionEngine, MockComponentCatalog, MockPipeCatalog, MockRegistrar, MockSyncHub,
};
use ant::{config::load_config, Collaborators, ContextService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ant::observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });

    let repo_hub = MockSyncHub::new();
    let tracked_hub = MockSyncHub::new();
    let repo_inbound = repo_hub.subscribe().await;
    let tracked_inbound = tracked_hub.subscribe().await;

    let collaborators = Collaborators {
        registrar: Arc::new(MockRegistrar::new()),
        engine: Arc::new(MockActionEngine::new()),
        components: Arc::new(MockComponentCatalog::new()),
        pipes: Arc::new(MockPipeCatalog::new()),
        repo_channel: repo_hub.clone(),
        tracked_channel: tracked_hub.clone(),
    };

    let service = ContextService::start(&cfg, collaborators, repo_inbound, tracked_inbound);

    tokio::signal::ctrl_c()
        .await
        .context("Waiting for shutdown signal failed")?;
    tracing::info!("Shutting down namespace '{}'", service.namespace());
    service.shutdown();

    Ok(())
}
