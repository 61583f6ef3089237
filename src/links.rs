//! 组件链接注册表与后台链接任务
//!
//! 外部发现的传感组件（名字 + 声明类型）与仓库条目之间的关联表。
//! 后台链接任务周期性写入，参数解析器并发读取；单把锁只覆盖表操作本身，
//! 不跨任何远程调用，链接任务失速不会阻塞解析。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::external::ComponentCatalog;
use crate::repository::{ItemKind, Repository};

/// 外部声明的传感组件描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentInfo {
    pub name: String,
    /// 组件声明类型（如 "camera"、"lidar"），多个组件可共享同一类型
    pub component_type: String,
}

/// 组件 -> 条目名 的单条链接
#[derive(Debug, Clone)]
pub struct ComponentLink {
    pub component: ComponentInfo,
    pub item_name: String,
}

/// 链接表：每个组件名至多一条链接
#[derive(Default)]
pub struct ComponentLinkRegistry {
    links: RwLock<Vec<ComponentLink>>,
}

impl ComponentLinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入链接；同名组件的已有链接被替换
    pub async fn add_link(&self, component: ComponentInfo, item_name: impl Into<String>) {
        let item_name = item_name.into();
        let mut links = self.links.write().await;
        if let Some(existing) = links.iter_mut().find(|l| l.component.name == component.name) {
            existing.component = component;
            existing.item_name = item_name;
        } else {
            links.push(ComponentLink { component, item_name });
        }
    }

    pub async fn has_link(&self, component_name: &str) -> bool {
        self.links
            .read()
            .await
            .iter()
            .any(|l| l.component.name == component_name)
    }

    /// 移除链接；不存在时返回 false
    pub async fn remove_link(&self, component_name: &str) -> bool {
        let mut links = self.links.write().await;
        let before = links.len();
        links.retain(|l| l.component.name != component_name);
        links.len() != before
    }

    /// 指定声明类型的所有已链接组件，按插入顺序（调用方取第一个作为平局规则）
    pub async fn links_by_type(&self, component_type: &str) -> Vec<ComponentInfo> {
        self.links
            .read()
            .await
            .iter()
            .filter(|l| l.component.component_type == component_type)
            .map(|l| l.component.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.links.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.links.read().await.is_empty()
    }

    async fn linked_component_names(&self) -> Vec<String> {
        self.links
            .read()
            .await
            .iter()
            .map(|l| l.component.name.clone())
            .collect()
    }
}

/// 后台链接循环：轮询外部组件目录，把发现的组件挂到同名 Component 条目上，
/// 并剪除目录中已消失组件的链接。收到取消信号后退出。
pub async fn run_linker(
    registry: Arc<ComponentLinkRegistry>,
    repository: Arc<Repository>,
    catalog: Arc<dyn ComponentCatalog>,
    poll_interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!("Component linker stopped");
                break;
            }
            _ = ticker.tick() => {
                let components = match catalog.list_components().await {
                    Ok(components) => components,
                    Err(e) => {
                        tracing::warn!("Component catalog query failed: {}", e);
                        continue;
                    }
                };

                for component in &components {
                    let Some(item) = repository.get_by_name(&component.name).await else {
                        continue;
                    };
                    if item.kind() != ItemKind::Component {
                        continue;
                    }
                    if !registry.has_link(&component.name).await {
                        tracing::info!(
                            "Linked component '{}' ({}) to item '{}'",
                            component.name, component.component_type, item.name
                        );
                    }
                    registry.add_link(component.clone(), item.name).await;
                }

                let alive: HashSet<&str> = components.iter().map(|c| c.name.as_str()).collect();
                for name in registry.linked_component_names().await {
                    if !alive.contains(name.as_str()) {
                        registry.remove_link(&name).await;
                        tracing::info!("Unlinked vanished component '{}'", name);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::mock::MockComponentCatalog;
    use crate::repository::{ComponentPayload, Item, ItemPayload};

    fn component(name: &str, component_type: &str) -> ComponentInfo {
        ComponentInfo {
            name: name.to_string(),
            component_type: component_type.to_string(),
        }
    }

    #[tokio::test]
    async fn test_add_link_replaces_same_component() {
        let registry = ComponentLinkRegistry::new();
        registry.add_link(component("cam0", "camera"), "sensor1").await;
        registry.add_link(component("cam0", "camera"), "sensor2").await;

        assert_eq!(registry.len().await, 1);
        assert!(registry.has_link("cam0").await);
    }

    #[tokio::test]
    async fn test_remove_link_reports_absence() {
        let registry = ComponentLinkRegistry::new();
        registry.add_link(component("cam0", "camera"), "sensor1").await;

        assert!(registry.remove_link("cam0").await);
        assert!(!registry.remove_link("cam0").await);
    }

    #[tokio::test]
    async fn test_links_by_type_keeps_insertion_order() {
        let registry = ComponentLinkRegistry::new();
        registry.add_link(component("cam0", "camera"), "s1").await;
        registry.add_link(component("lidar0", "lidar"), "s2").await;
        registry.add_link(component("cam1", "camera"), "s3").await;

        let cameras = registry.links_by_type("camera").await;
        assert_eq!(cameras.len(), 2);
        assert_eq!(cameras[0].name, "cam0");
        assert_eq!(cameras[1].name, "cam1");
    }

    #[tokio::test]
    async fn test_linker_links_and_prunes() {
        let registry = Arc::new(ComponentLinkRegistry::new());
        let repository = Arc::new(Repository::new());
        repository
            .add(Item::new("cam0", "", ItemPayload::Component(ComponentPayload::default())))
            .await
            .unwrap();

        let catalog = Arc::new(MockComponentCatalog::new());
        catalog.set_components(vec![component("cam0", "camera")]).await;

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_linker(
            registry.clone(),
            repository.clone(),
            catalog.clone(),
            Duration::from_millis(10),
            shutdown.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(registry.has_link("cam0").await);

        // 目录中消失的组件被剪除
        catalog.set_components(vec![]).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!registry.has_link("cam0").await);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
