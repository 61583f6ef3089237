//! Ant - Rust 多机器人共享环境模型服务
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **error**: 错误分类与因果链
//! - **external**: 外部协作者抽象（资源注册器 / 动作引擎 / 同步传输 / 目录）与 Mock
//! - **links**: 组件链接注册表与后台链接任务
//! - **reliability**: 检测方法可靠性记录与排序
//! - **repository**: 类型化条目的层级仓库（扁平表 + 名字引用）
//! - **service**: 服务装配与请求边界
//! - **sync**: 跨命名空间 Request/Advertise 同步协议
//! - **tracking**: 跟踪编排器、管线参数解析器与任务模板

pub mod config;
pub mod error;
pub mod external;
pub mod links;
pub mod observability;
pub mod reliability;
pub mod repository;
pub mod service;
pub mod sync;
pub mod tracking;

pub use error::AntError;
pub use service::{Collaborators, ContextService};
