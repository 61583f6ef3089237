//! 服务错误类型
//!
//! 与 TrackingCoordinator 配合：可恢复错误（NoTrackersFound / ParameterUnresolved）
//! 推进到下一个候选方法，其余错误中止当前请求并携带因果链向上传播。

use thiserror::Error;

use crate::repository::ItemKind;
use crate::tracking::ParamKey;

/// 服务运行过程中可能出现的错误（仓库校验、跟踪编排、参数解析、远程调用）
#[derive(Error, Debug)]
pub enum AntError {
    #[error("item name must not be empty")]
    EmptyName,

    #[error("no parent item '{0}' found in repository")]
    UnknownParent(String),

    #[error("item '{0}' not found in repository")]
    UnknownItem(String),

    /// 请求的操作与条目类型不匹配（如对 Component 条目请求检测方法）
    #[error("item '{name}' of kind {kind:?} has no detection methods")]
    UnsupportedType { name: String, kind: ItemKind },

    #[error("item '{name}' has no ancestor of kind {kind:?}")]
    NoSuchAncestor { name: String, kind: ItemKind },

    #[error("no trackers found for object '{0}'")]
    NoTrackersFound(String),

    /// 管线参数无法解析；仅在 Resolver 与 Coordinator 之间流转，不出编排层
    #[error("parameter '{key}' in segment {segment} could not be resolved")]
    ParameterUnresolved {
        segment: usize,
        key: ParamKey,
        #[source]
        source: Option<Box<AntError>>,
    },

    /// 远程调用失败（包裹底层传输错误，原因保留在因果链中）
    #[error("remote call '{service}' failed")]
    RemoteCall {
        service: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("sync payload could not be encoded or decoded")]
    Codec(#[from] serde_json::Error),

    /// 转发帧：在已有错误上叠加一层调用方上下文，形成有序因果链
    #[error("{context}")]
    Forwarded {
        context: String,
        #[source]
        source: Box<AntError>,
    },
}

impl AntError {
    /// 叠加一层上下文后继续向上传播
    pub fn forward(self, context: impl Into<String>) -> Self {
        Self::Forwarded {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// 剥掉所有 Forwarded 帧，返回最初的错误
    pub fn root_cause(&self) -> &AntError {
        match self {
            Self::Forwarded { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// 是否为可恢复错误：编排层据此推进到下一个候选方法而不是中止请求
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.root_cause(),
            Self::NoTrackersFound(_) | Self::ParameterUnresolved { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_preserves_root_cause() {
        let err = AntError::NoTrackersFound("cup".to_string())
            .forward("tracking 'cup' via 'camera' failed")
            .forward("track request failed");

        assert!(matches!(
            err.root_cause(),
            AntError::NoTrackersFound(name) if name == "cup"
        ));
        assert!(err.to_string().contains("track request failed"));
    }

    #[test]
    fn test_source_chain_is_ordered() {
        use std::error::Error as _;

        let err = AntError::UnknownItem("ghost".to_string()).forward("merge failed");
        let source = err.source().expect("forwarded error keeps its source");
        assert!(source.to_string().contains("ghost"));
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(AntError::NoTrackersFound("cup".to_string()).is_recoverable());
        assert!(AntError::ParameterUnresolved {
            segment: 0,
            key: ParamKey::FrameId,
            source: None,
        }
        .is_recoverable());

        assert!(!AntError::EmptyName.is_recoverable());
        assert!(!AntError::UnknownItem("cup".to_string()).is_recoverable());
        // 因果链不改变可恢复性判定
        assert!(AntError::NoTrackersFound("cup".to_string())
            .forward("attempt failed")
            .is_recoverable());
    }
}
