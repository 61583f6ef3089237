//! 外部协作者抽象
//!
//! 传输、资源注册、动作引擎与组件/管线目录都在进程之外；核心只依赖这里的
//! trait。所有后端（真实传输 / 进程内 Mock）实现同一组接口。

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::AntError;
use crate::links::ComponentInfo;
use crate::sync::SyncEnvelope;
use crate::tracking::{PipeDescriptor, SegmentSpecifier};

/// 服务标识（跨命名空间调用的目标名）
pub mod service_ids {
    /// 目标跟踪服务
    pub const TRACK_OBJECT: &str = "track_object_server";
    /// 感知管线加载服务
    pub const LOAD_PIPE: &str = "load_pipe_server";
}

/// 管线加载请求：类别 + 解析完成的分段参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadPipeRequest {
    pub pipe_category: String,
    #[serde(default)]
    pub pipe_segment_specifiers: Vec<SegmentSpecifier>,
}

/// 管线加载响应：资源 ID 与各分段的输出话题
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadPipeResponse {
    pub resource_id: String,
    #[serde(default)]
    pub output_topics: HashMap<String, String>,
}

/// 跟踪请求（本地受理或转发至拥有该对象的命名空间）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackObjectRequest {
    pub object_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackObjectResponse {
    pub resource_id: String,
    /// 跟踪输出发布话题
    pub object_topic: String,
}

/// 资源状态回报（加载的资源失效、降级等）
#[derive(Debug, Clone)]
pub struct ResourceStatus {
    pub resource_id: String,
    pub message: String,
}

/// 资源注册器：跨命名空间的请求/响应调用入口
///
/// 加载/卸载回调对同一资源 ID 幂等；超时与重试归传输层，核心只分类结果。
#[async_trait]
pub trait ResourceRegistrar: Send + Sync {
    /// 调用指定命名空间的服务；请求与响应均为 JSON 值
    async fn call(&self, namespace: &str, service_id: &str, request: Value)
        -> Result<Value, AntError>;

    /// 订阅资源状态回报流
    fn subscribe_status(&self) -> mpsc::UnboundedReceiver<ResourceStatus>;
}

/// 声明式任务描述：动作名 + 参数表
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub action: String,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

/// 动作图执行引擎：启动后即为 fire-and-forget，停止按图名
#[async_trait]
pub trait ActionEngine: Send + Sync {
    async fn execute_graph(
        &self,
        name: &str,
        tasks: Vec<TaskDescriptor>,
        background: bool,
    ) -> Result<String, AntError>;

    async fn stop(&self, name: &str) -> Result<(), AntError>;
}

/// 同步通道发布端；入站消息由装配层以 mpsc 接收端交给各处理循环
#[async_trait]
pub trait SyncChannel: Send + Sync {
    async fn publish(&self, envelope: SyncEnvelope) -> Result<(), AntError>;
}

/// 外部组件目录：后台链接任务轮询的发现源
#[async_trait]
pub trait ComponentCatalog: Send + Sync {
    async fn list_components(&self) -> Result<Vec<ComponentInfo>, AntError>;
}

/// 管线目录：每个检测方法类别至多给出一个管线描述
/// （类别内的选择归目录所有方）
#[async_trait]
pub trait PipeCatalog: Send + Sync {
    async fn pipe_for_category(&self, category: &str) -> Option<PipeDescriptor>;
}
