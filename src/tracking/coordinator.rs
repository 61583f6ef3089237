//! 跟踪编排器
//!
//! 驱动单次跟踪请求的完整状态机：远程转发检查 -> 条目查找 -> 方法排序 ->
//! 逐方法尝试（目录缺失跳过 / 参数解析失败跳过 / 资源加载失败分类）->
//! 会话登记与任务启动 -> 跟踪对象通道广告。
//!
//! 可靠性历史与会话表都是本实例的显式状态，短临界区访问，不跨远程调用持锁。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::AntError;
use crate::external::{
    service_ids, ActionEngine, LoadPipeRequest, LoadPipeResponse, PipeCatalog, ResourceRegistrar,
    ResourceStatus, SyncChannel, TaskDescriptor, TrackObjectRequest, TrackObjectResponse,
};
use crate::links::ComponentLinkRegistry;
use crate::reliability::DetectionMethodTracker;
use crate::repository::Repository;
use crate::sync::{SyncAction, SyncEnvelope};
use crate::tracking::resolver::ParameterResolver;
use crate::tracking::templates::TemplateLibrary;

/// 本地活动跟踪会话
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTracker {
    pub item_name: String,
    pub pipe_category: String,
}

pub struct TrackingCoordinator {
    namespace: String,
    repository: Arc<Repository>,
    resolver: ParameterResolver,
    registrar: Arc<dyn ResourceRegistrar>,
    pipes: Arc<dyn PipeCatalog>,
    engine: Arc<dyn ActionEngine>,
    tracked_channel: Arc<dyn SyncChannel>,
    templates: TemplateLibrary,
    methods: RwLock<DetectionMethodTracker>,
    /// 资源 ID -> 本地会话
    local_sessions: RwLock<HashMap<String, ActiveTracker>>,
    /// 条目名 -> 拥有其跟踪的远程命名空间
    remote_tracked: RwLock<HashMap<String, String>>,
}

impl TrackingCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        namespace: impl Into<String>,
        repository: Arc<Repository>,
        links: Arc<ComponentLinkRegistry>,
        registrar: Arc<dyn ResourceRegistrar>,
        pipes: Arc<dyn PipeCatalog>,
        engine: Arc<dyn ActionEngine>,
        tracked_channel: Arc<dyn SyncChannel>,
        templates: TemplateLibrary,
    ) -> Self {
        let namespace = namespace.into();
        Self {
            resolver: ParameterResolver::new(namespace.clone(), repository.clone(), links),
            namespace,
            repository,
            registrar,
            pipes,
            engine,
            tracked_channel,
            templates,
            methods: RwLock::new(DetectionMethodTracker::new()),
            local_sessions: RwLock::new(HashMap::new()),
            remote_tracked: RwLock::new(HashMap::new()),
        }
    }

    /// 预置可靠性历史（测试与状态迁移用）
    pub fn with_method_tracker(mut self, tracker: DetectionMethodTracker) -> Self {
        self.methods = RwLock::new(tracker);
        self
    }

    /// 开始跟踪一个条目
    pub async fn track(&self, object_name: &str) -> Result<TrackObjectResponse, AntError> {
        let item_name = normalize_name(object_name);
        tracing::info!("Received a request to track '{}'", item_name);

        // 已由其他命名空间跟踪时原样转发，本地不接管
        let remote_owner = self.remote_owner(&item_name).await;
        if let Some(owner) = remote_owner.filter(|ns| !ns.is_empty()) {
            tracing::debug!(
                "'{}' is already tracked by '{}', forwarding the request",
                item_name, owner
            );
            let request = serde_json::to_value(TrackObjectRequest {
                object_name: item_name.clone(),
            })?;
            let response = self
                .registrar
                .call(&owner, service_ids::TRACK_OBJECT, request)
                .await
                .map_err(|e| {
                    e.forward(format!(
                        "forwarding track request for '{item_name}' to '{owner}' failed"
                    ))
                })?;
            return Ok(serde_json::from_value(response)?);
        }

        let item = self
            .repository
            .get_by_name(&item_name)
            .await
            .ok_or_else(|| AntError::UnknownItem(item_name.clone()))?;
        let declared = item
            .payload
            .detection_methods()
            .ok_or_else(|| AntError::UnsupportedType {
                name: item_name.clone(),
                kind: item.kind(),
            })?
            .to_vec();

        let ranked = {
            let mut methods = self.methods.write().await;
            methods.register_all(&declared);
            methods.rank(&declared)
        };

        let mut selected: Option<(String, LoadPipeResponse)> = None;
        let total = ranked.len();
        for (attempt, category) in ranked.iter().enumerate() {
            let Some(pipe) = self.pipes.pipe_for_category(category).await else {
                tracing::debug!("No pipes known in category '{}', skipping", category);
                continue;
            };

            let specifiers = match self.resolver.resolve(&pipe, &item_name).await {
                Ok(specifiers) => specifiers,
                Err(e) => {
                    tracing::debug!(
                        "Parameter resolution for '{}' via '{}' failed: {}",
                        item_name, category, e
                    );
                    continue;
                }
            };

            tracing::info!("Trying to track '{}' via '{}'", item_name, category);
            let request = serde_json::to_value(LoadPipeRequest {
                pipe_category: category.clone(),
                pipe_segment_specifiers: specifiers,
            })?;
            match self
                .registrar
                .call(&self.namespace, service_ids::LOAD_PIPE, request)
                .await
            {
                Ok(value) => {
                    let response: LoadPipeResponse = serde_json::from_value(value)?;
                    self.methods.write().await.record_success(category);
                    selected = Some((category.clone(), response));
                    break;
                }
                Err(e) => {
                    // 只有 no-trackers 才算方法本身不可靠；其他失败不计入历史
                    let no_trackers =
                        matches!(e.root_cause(), AntError::NoTrackersFound(_));
                    if no_trackers {
                        self.methods.write().await.record_failure(category);
                        if attempt + 1 < total {
                            tracing::debug!(
                                "No trackers available via '{}', trying the next method",
                                category
                            );
                            continue;
                        }
                    }
                    return Err(e.forward(format!(
                        "tracking '{item_name}' via '{category}' failed"
                    )));
                }
            }
        }

        // 所有候选都被跳过（目录缺失 / 参数不可解析）
        let Some((category, load_response)) = selected else {
            return Err(AntError::NoTrackersFound(item_name));
        };

        let object_topic = format!("{}/object_tracker/{}", self.namespace, item_name);
        self.local_sessions.write().await.insert(
            load_response.resource_id.clone(),
            ActiveTracker {
                item_name: item_name.clone(),
                pipe_category: category.clone(),
            },
        );

        let template = self.templates.track_template();
        let mut parameters = template.parameters.clone();
        parameters.insert("what".to_string(), item_name.clone());
        parameters.insert("pipe_category".to_string(), category.clone());
        parameters.insert("topic".to_string(), object_topic.clone());
        for (key, topic) in &load_response.output_topics {
            parameters.insert(format!("input_{}", key), topic.clone());
        }
        let task = TaskDescriptor {
            action: template.action.clone(),
            parameters,
        };
        if let Err(e) = self
            .engine
            .execute_graph(&item_name, vec![task], template.background)
            .await
        {
            self.local_sessions
                .write()
                .await
                .remove(&load_response.resource_id);
            return Err(e.forward(format!("starting tracking task for '{item_name}' failed")));
        }

        self.announce(SyncAction::AdvertiseConfig, &item_name).await;
        tracing::info!(
            "Tracking '{}' via '{}' (resource {})",
            item_name, category, load_response.resource_id
        );
        Ok(TrackObjectResponse {
            resource_id: load_response.resource_id,
            object_topic,
        })
    }

    /// 停止跟踪一个条目
    pub async fn untrack(&self, object_name: &str) -> Result<(), AntError> {
        let item_name = normalize_name(object_name);

        // 远程命名空间拥有的跟踪：本地无事可做
        if self
            .remote_owner(&item_name)
            .await
            .is_some_and(|ns| !ns.is_empty())
        {
            tracing::debug!("'{}' is tracked remotely, nothing to stop here", item_name);
            return Ok(());
        }

        let resource_id = {
            let sessions = self.local_sessions.read().await;
            sessions
                .iter()
                .find(|(_, session)| session.item_name == item_name)
                .map(|(id, _)| id.clone())
        };
        let Some(resource_id) = resource_id else {
            return Err(AntError::NoTrackersFound(item_name));
        };

        tracing::info!("Received a request to stop tracking '{}'", item_name);
        self.engine
            .stop(&item_name)
            .await
            .map_err(|e| e.forward(format!("stopping tracking task for '{item_name}' failed")))?;
        self.local_sessions.write().await.remove(&resource_id);
        self.announce(SyncAction::RemoveConfig, &item_name).await;
        Ok(())
    }

    /// 跟踪对象通道入站处理：纯 last-message-wins，无版本号；
    /// 两个命名空间并发认领同一条目的冲突不做调解（已知竞态）。
    pub async fn handle_tracked_sync(&self, envelope: SyncEnvelope) {
        if envelope.namespace == self.namespace {
            return;
        }
        let item_name: String = match serde_json::from_value(envelope.payload) {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!("Malformed tracked-objects payload: {}", e);
                return;
            }
        };
        match envelope.action {
            SyncAction::AdvertiseConfig => {
                tracing::debug!("'{}' is now tracked by '{}'", item_name, envelope.namespace);
                self.remote_tracked
                    .write()
                    .await
                    .insert(item_name, envelope.namespace);
            }
            SyncAction::RemoveConfig => {
                tracing::debug!(
                    "'{}' is no longer tracked by '{}'",
                    item_name, envelope.namespace
                );
                self.remote_tracked.write().await.remove(&item_name);
            }
            SyncAction::RequestConfig => {}
        }
    }

    /// 资源状态回报：记录日志，保留为将来重载逻辑的挂接点
    pub async fn handle_resource_status(&self, status: ResourceStatus) {
        let sessions = self.local_sessions.read().await;
        match sessions.get(&status.resource_id) {
            Some(session) => tracing::warn!(
                "Status for active tracker '{}' ({}): {}",
                session.item_name, status.resource_id, status.message
            ),
            None => tracing::debug!(
                "Status for unknown resource {}: {}",
                status.resource_id, status.message
            ),
        }
    }

    pub async fn remote_owner(&self, item_name: &str) -> Option<String> {
        self.remote_tracked.read().await.get(item_name).cloned()
    }

    pub async fn active_sessions(&self) -> HashMap<String, ActiveTracker> {
        self.local_sessions.read().await.clone()
    }

    pub async fn session_for_item(&self, item_name: &str) -> Option<(String, ActiveTracker)> {
        self.local_sessions
            .read()
            .await
            .iter()
            .find(|(_, session)| session.item_name == item_name)
            .map(|(id, session)| (id.clone(), session.clone()))
    }

    pub async fn method_score(&self, method: &str) -> Option<f64> {
        self.methods.read().await.score(method)
    }

    async fn announce(&self, action: SyncAction, item_name: &str) {
        let envelope = SyncEnvelope::new(self.namespace.clone(), action)
            .with_payload(serde_json::Value::String(item_name.to_string()));
        if let Err(e) = self.tracked_channel.publish(envelope).await {
            tracing::warn!("Tracked-objects announcement for '{}' failed: {}", item_name, e);
        }
    }
}

/// 条目名归一化：空格替换为下划线
fn normalize_name(name: &str) -> String {
    name.replace(' ', "_")
}
