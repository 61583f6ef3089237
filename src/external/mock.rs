//! 进程内 Mock 协作者
//!
//! 供测试与演示二进制使用：记录全部调用，支持按服务预置脚本化响应；
//! MockSyncHub 模拟把每条消息回送给所有订阅方（含发送方自身）的总线。

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};

use crate::error::AntError;
use crate::external::traits::{
    service_ids, ActionEngine, ComponentCatalog, LoadPipeResponse, PipeCatalog, ResourceRegistrar,
    ResourceStatus, SyncChannel, TaskDescriptor,
};
use crate::links::ComponentInfo;
use crate::sync::SyncEnvelope;
use crate::tracking::PipeDescriptor;

/// 记录调用并回放脚本化响应的资源注册器
#[derive(Default)]
pub struct MockRegistrar {
    /// (namespace, service_id, request) 调用日志
    calls: RwLock<Vec<(String, String, Value)>>,
    /// service_id -> 预置响应队列；队列空时走默认行为
    scripted: RwLock<HashMap<String, VecDeque<Result<Value, AntError>>>>,
    status_tx: RwLock<Vec<mpsc::UnboundedSender<ResourceStatus>>>,
}

impl MockRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为某服务追加一条脚本化响应（先进先出）
    pub async fn push_response(&self, service_id: &str, response: Result<Value, AntError>) {
        self.scripted
            .write()
            .await
            .entry(service_id.to_string())
            .or_default()
            .push_back(response);
    }

    pub async fn calls(&self) -> Vec<(String, String, Value)> {
        self.calls.read().await.clone()
    }

    pub async fn call_count(&self, service_id: &str) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|(_, s, _)| s == service_id)
            .count()
    }

    /// 推送一条资源状态回报给所有订阅者
    pub async fn emit_status(&self, status: ResourceStatus) {
        for tx in self.status_tx.read().await.iter() {
            let _ = tx.send(status.clone());
        }
    }
}

#[async_trait]
impl ResourceRegistrar for MockRegistrar {
    async fn call(
        &self,
        namespace: &str,
        service_id: &str,
        request: Value,
    ) -> Result<Value, AntError> {
        self.calls
            .write()
            .await
            .push((namespace.to_string(), service_id.to_string(), request));

        if let Some(queue) = self.scripted.write().await.get_mut(service_id) {
            if let Some(response) = queue.pop_front() {
                return response;
            }
        }

        // 默认行为：管线加载直接成功，发放新资源 ID
        if service_id == service_ids::LOAD_PIPE {
            let response = LoadPipeResponse {
                resource_id: format!("res_{}", uuid::Uuid::new_v4()),
                output_topics: HashMap::new(),
            };
            return Ok(serde_json::to_value(response)?);
        }
        Err(AntError::RemoteCall {
            service: service_id.to_string(),
            source: anyhow::anyhow!("no scripted response for '{service_id}'").into(),
        })
    }

    fn subscribe_status(&self) -> mpsc::UnboundedReceiver<ResourceStatus> {
        let (tx, rx) = mpsc::unbounded_channel();
        // blocking_write 不可用于异步上下文；订阅列表用 try_write，构造期无竞争
        if let Ok(mut senders) = self.status_tx.try_write() {
            senders.push(tx);
        }
        rx
    }
}

/// 记录执行与停止调用的动作引擎
#[derive(Default)]
pub struct MockActionEngine {
    executed: RwLock<Vec<(String, Vec<TaskDescriptor>, bool)>>,
    stopped: RwLock<Vec<String>>,
}

impl MockActionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn executed(&self) -> Vec<(String, Vec<TaskDescriptor>, bool)> {
        self.executed.read().await.clone()
    }

    pub async fn stopped(&self) -> Vec<String> {
        self.stopped.read().await.clone()
    }
}

#[async_trait]
impl ActionEngine for MockActionEngine {
    async fn execute_graph(
        &self,
        name: &str,
        tasks: Vec<TaskDescriptor>,
        background: bool,
    ) -> Result<String, AntError> {
        self.executed
            .write()
            .await
            .push((name.to_string(), tasks, background));
        Ok(format!("graph_{}", uuid::Uuid::new_v4()))
    }

    async fn stop(&self, name: &str) -> Result<(), AntError> {
        self.stopped.write().await.push(name.to_string());
        Ok(())
    }
}

/// 进程内同步总线：publish 把信封广播给所有订阅方（包括发送方命名空间，
/// 用于检验处理循环的自消息过滤），并留存日志供断言。
#[derive(Default)]
pub struct MockSyncHub {
    subscribers: RwLock<Vec<mpsc::UnboundedSender<SyncEnvelope>>>,
    log: RwLock<Vec<SyncEnvelope>>,
}

impl MockSyncHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<SyncEnvelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().await.push(tx);
        rx
    }

    pub async fn log(&self) -> Vec<SyncEnvelope> {
        self.log.read().await.clone()
    }
}

#[async_trait]
impl SyncChannel for MockSyncHub {
    async fn publish(&self, envelope: SyncEnvelope) -> Result<(), AntError> {
        self.log.write().await.push(envelope.clone());
        let subscribers = self.subscribers.read().await;
        for tx in subscribers.iter() {
            let _ = tx.send(envelope.clone());
        }
        Ok(())
    }
}

/// 可变组件清单目录
#[derive(Default)]
pub struct MockComponentCatalog {
    components: RwLock<Vec<ComponentInfo>>,
}

impl MockComponentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_components(&self, components: Vec<ComponentInfo>) {
        *self.components.write().await = components;
    }
}

#[async_trait]
impl ComponentCatalog for MockComponentCatalog {
    async fn list_components(&self) -> Result<Vec<ComponentInfo>, AntError> {
        Ok(self.components.read().await.clone())
    }
}

/// 类别 -> 管线描述 的静态目录
#[derive(Default)]
pub struct MockPipeCatalog {
    pipes: RwLock<HashMap<String, PipeDescriptor>>,
}

impl MockPipeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, pipe: PipeDescriptor) {
        self.pipes.write().await.insert(pipe.category.clone(), pipe);
    }
}

#[async_trait]
impl PipeCatalog for MockPipeCatalog {
    async fn pipe_for_category(&self, category: &str) -> Option<PipeDescriptor> {
        self.pipes.read().await.get(category).cloned()
    }
}
