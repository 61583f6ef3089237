//! 跨命名空间同步协议
//!
//! 两条逻辑通道共用同一种信封：仓库通道承载条目快照（RequestConfig /
//! AdvertiseConfig），跟踪对象通道承载条目名（AdvertiseConfig / RemoveConfig）。

pub mod synchronizer;

use serde::{Deserialize, Serialize};

pub use synchronizer::RepositorySynchronizer;

/// 同步动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncAction {
    /// 请求对端广告其全量状态
    RequestConfig,
    /// 广告自身状态（载荷依通道而定）
    AdvertiseConfig,
    /// 撤销先前广告的状态（仅跟踪对象通道使用）
    RemoveConfig,
}

/// 同步信封：发送方命名空间 + 动作 + JSON 载荷
///
/// 传输层可能把消息回送给发送方自身，处理方按 namespace 过滤。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEnvelope {
    pub namespace: String,
    pub action: SyncAction,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl SyncEnvelope {
    pub fn new(namespace: impl Into<String>, action: SyncAction) -> Self {
        Self {
            namespace: namespace.into(),
            action,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}
