//! 服务装配：主控入口
//!
//! 负责：按配置构建仓库 / 链接表 / 同步器 / 编排器，装配外部协作者，
//! 在共享取消令牌下挂起同步循环、后台链接与状态回报消费三个长期任务，
//! 并暴露请求边界操作（更新仓库、查询条目、跟踪 / 停止跟踪）。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::error::AntError;
use crate::external::{
    ActionEngine, ComponentCatalog, PipeCatalog, ResourceRegistrar, SyncChannel,
    TrackObjectResponse,
};
use crate::links::{run_linker, ComponentLinkRegistry};
use crate::repository::{Item, Repository};
use crate::sync::{RepositorySynchronizer, SyncEnvelope};
use crate::tracking::{TemplateLibrary, TrackingCoordinator};

/// 外部协作者句柄集合（真实传输或进程内 Mock）
pub struct Collaborators {
    pub registrar: Arc<dyn ResourceRegistrar>,
    pub engine: Arc<dyn ActionEngine>,
    pub components: Arc<dyn ComponentCatalog>,
    pub pipes: Arc<dyn PipeCatalog>,
    /// 仓库快照通道发布端
    pub repo_channel: Arc<dyn SyncChannel>,
    /// 跟踪对象通道发布端
    pub tracked_channel: Arc<dyn SyncChannel>,
}

/// 一个命名空间的环境模型服务实例
pub struct ContextService {
    namespace: String,
    repository: Arc<Repository>,
    links: Arc<ComponentLinkRegistry>,
    synchronizer: Arc<RepositorySynchronizer>,
    coordinator: Arc<TrackingCoordinator>,
    shutdown: CancellationToken,
}

impl ContextService {
    /// 构建服务并启动全部后台任务；需在 tokio 运行时内调用
    pub fn start(
        cfg: &AppConfig,
        collaborators: Collaborators,
        repo_inbound: mpsc::UnboundedReceiver<SyncEnvelope>,
        tracked_inbound: mpsc::UnboundedReceiver<SyncEnvelope>,
    ) -> Self {
        let namespace = cfg.app.namespace.clone();
        let repository = Arc::new(Repository::new());
        let links = Arc::new(ComponentLinkRegistry::new());

        let templates = TemplateLibrary::load(&cfg.actions.template_dir).unwrap_or_else(|e| {
            tracing::warn!("Task template load failed ({}), using defaults", e);
            TemplateLibrary::default()
        });

        let synchronizer = Arc::new(RepositorySynchronizer::new(
            namespace.clone(),
            repository.clone(),
            collaborators.repo_channel,
        ));
        let coordinator = Arc::new(TrackingCoordinator::new(
            namespace.clone(),
            repository.clone(),
            links.clone(),
            collaborators.registrar.clone(),
            collaborators.pipes,
            collaborators.engine,
            collaborators.tracked_channel,
            templates,
        ));

        let shutdown = CancellationToken::new();

        // 同步主循环：周期 RequestConfig + 入站合并
        tokio::spawn(synchronizer.clone().run(
            repo_inbound,
            Duration::from_secs(cfg.sync.request_interval_secs),
            shutdown.child_token(),
        ));

        // 跟踪对象通道入站处理
        {
            let coordinator = coordinator.clone();
            let token = shutdown.child_token();
            let mut inbound = tracked_inbound;
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        received = inbound.recv() => {
                            match received {
                                Some(envelope) => coordinator.handle_tracked_sync(envelope).await,
                                None => break,
                            }
                        }
                    }
                }
            });
        }

        // 后台组件链接任务
        tokio::spawn(run_linker(
            links.clone(),
            repository.clone(),
            collaborators.components,
            Duration::from_secs(cfg.linker.poll_interval_secs),
            shutdown.child_token(),
        ));

        // 资源状态回报消费
        {
            let coordinator = coordinator.clone();
            let token = shutdown.child_token();
            let mut status_rx = collaborators.registrar.subscribe_status();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        received = status_rx.recv() => {
                            match received {
                                Some(status) => coordinator.handle_resource_status(status).await,
                                None => break,
                            }
                        }
                    }
                }
            });
        }

        tracing::info!("Context service is ready in namespace '{}'", namespace);
        Self {
            namespace,
            repository,
            links,
            synchronizer,
            coordinator,
            shutdown,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// 本地发起的仓库批量更新；返回未能合并的条目
    pub async fn update_repository(&self, items: Vec<Item>) -> Vec<Item> {
        tracing::info!("Received a request to update {} item(s)", items.len());
        self.synchronizer.apply_local_update(items).await
    }

    /// 按名查询条目快照
    pub async fn get_item(&self, name: &str) -> Result<Item, AntError> {
        self.repository
            .get_by_name(name)
            .await
            .ok_or_else(|| AntError::UnknownItem(name.to_string()))
    }

    pub async fn track_object(&self, name: &str) -> Result<TrackObjectResponse, AntError> {
        self.coordinator.track(name).await
    }

    pub async fn untrack_object(&self, name: &str) -> Result<(), AntError> {
        self.coordinator.untrack(name).await
    }

    pub fn repository(&self) -> Arc<Repository> {
        self.repository.clone()
    }

    pub fn links(&self) -> Arc<ComponentLinkRegistry> {
        self.links.clone()
    }

    pub fn coordinator(&self) -> Arc<TrackingCoordinator> {
        self.coordinator.clone()
    }

    /// 停止全部后台任务
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for ContextService {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::mock::{
        MockActionEngine, MockComponentCatalog, MockPipeCatalog, MockRegistrar, MockSyncHub,
    };
    use crate::repository::{ItemPayload, ObjectPayload};

    async fn start_service(namespace: &str) -> (ContextService, Arc<MockSyncHub>, Arc<MockSyncHub>) {
        let repo_hub = MockSyncHub::new();
        let tracked_hub = MockSyncHub::new();
        let repo_inbound = repo_hub.subscribe().await;
        let tracked_inbound = tracked_hub.subscribe().await;

        let cfg = AppConfig {
            app: crate::config::AppSection {
                namespace: namespace.to_string(),
            },
            ..Default::default()
        };
        let collaborators = Collaborators {
            registrar: Arc::new(MockRegistrar::new()),
            engine: Arc::new(MockActionEngine::new()),
            components: Arc::new(MockComponentCatalog::new()),
            pipes: Arc::new(MockPipeCatalog::new()),
            repo_channel: repo_hub.clone(),
            tracked_channel: tracked_hub.clone(),
        };
        let service = ContextService::start(&cfg, collaborators, repo_inbound, tracked_inbound);
        (service, repo_hub, tracked_hub)
    }

    #[tokio::test]
    async fn test_update_then_get() {
        let (service, _repo_hub, _tracked_hub) = start_service("ns1").await;

        let failed = service
            .update_repository(vec![Item::new(
                "table",
                "",
                ItemPayload::Object(ObjectPayload::default()),
            )])
            .await;

        assert!(failed.is_empty());
        assert_eq!(service.get_item("table").await.unwrap().name, "table");
        let err = service.get_item("ghost").await.unwrap_err();
        assert!(matches!(err, AntError::UnknownItem(n) if n == "ghost"));

        service.shutdown();
    }

    #[tokio::test]
    async fn test_untrack_without_session_fails() {
        let (service, _repo_hub, _tracked_hub) = start_service("ns1").await;

        let err = service.untrack_object("ghost").await.unwrap_err();
        assert!(matches!(err, AntError::NoTrackersFound(n) if n == "ghost"));

        service.shutdown();
    }
}
