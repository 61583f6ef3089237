//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `ANT__*` 覆盖（双下划线表示嵌套，
//! 如 `ANT__APP__NAMESPACE=robot2`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub sync: SyncSection,
    pub linker: LinkerSection,
    pub actions: ActionsSection,
}

/// [app] 段：命名空间标识
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 本进程的命名空间名；跨进程同步的身份单位
    pub namespace: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            namespace: "ant".to_string(),
        }
    }
}

/// [sync] 段：RequestConfig 重发周期
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub request_interval_secs: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            request_interval_secs: 1,
        }
    }
}

/// [linker] 段：组件目录轮询周期
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkerSection {
    pub poll_interval_secs: u64,
}

impl Default for LinkerSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: 2,
        }
    }
}

/// [actions] 段：任务模板目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActionsSection {
    pub template_dir: PathBuf,
}

impl Default for ActionsSection {
    fn default() -> Self {
        Self {
            template_dir: PathBuf::from("config/actions"),
        }
    }
}

/// 从 config 目录加载配置，环境变量 ANT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 ANT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("ANT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.namespace, "ant");
        assert_eq!(cfg.sync.request_interval_secs, 1);
        assert_eq!(cfg.linker.poll_interval_secs, 2);
        assert_eq!(cfg.actions.template_dir, PathBuf::from("config/actions"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service.toml");
        std::fs::write(
            &path,
            r#"
[app]
namespace = "robot2"

[sync]
request_interval_secs = 5
"#,
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.app.namespace, "robot2");
        assert_eq!(cfg.sync.request_interval_secs, 5);
        // 未覆盖的段保持默认
        assert_eq!(cfg.linker.poll_interval_secs, 2);
    }
}
