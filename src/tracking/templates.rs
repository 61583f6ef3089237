//! 跟踪任务模板
//!
//! 从模板目录加载 *.toml 任务模板；目录缺失时使用内置的 track 模板。
//! 编排层在启动跟踪任务时以模板为底，填入条目名、管线类别与输出话题。

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

/// 单个任务模板（task.toml 的 [task] 段）
#[derive(Debug, Clone, Deserialize)]
pub struct TaskTemplate {
    /// 动作名（动作引擎据此选择实现）
    pub action: String,
    /// 是否作为后台长任务执行
    #[serde(default = "default_background")]
    pub background: bool,
    /// 模板自带的固定参数
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

fn default_background() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct TemplateToml {
    task: TaskTemplate,
}

/// 模板库：动作名 -> 模板，启动时加载一次，只读
#[derive(Debug, Clone)]
pub struct TemplateLibrary {
    templates: HashMap<String, TaskTemplate>,
}

impl Default for TemplateLibrary {
    fn default() -> Self {
        let builtin = TaskTemplate {
            action: "track".to_string(),
            background: true,
            parameters: HashMap::new(),
        };
        Self {
            templates: HashMap::from([(builtin.action.clone(), builtin)]),
        }
    }
}

impl TemplateLibrary {
    /// 从目录加载所有 *.toml 模板；目录不存在时返回内置默认库
    pub fn load(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        if !dir.exists() {
            return Ok(Self::default());
        }

        let mut library = Self::default();
        for entry in std::fs::read_dir(dir)?.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!("Skipping unreadable task template {:?}: {}", path, e);
                    continue;
                }
            };
            match toml::from_str::<TemplateToml>(&content) {
                Ok(parsed) => {
                    library
                        .templates
                        .insert(parsed.task.action.clone(), parsed.task);
                }
                Err(e) => {
                    tracing::warn!("Skipping malformed task template {:?}: {}", path, e);
                }
            }
        }
        tracing::info!("Loaded {} task templates", library.templates.len());
        Ok(library)
    }

    pub fn get(&self, action: &str) -> Option<&TaskTemplate> {
        self.templates.get(action)
    }

    /// 跟踪任务模板；库中没有时退回内置默认值
    pub fn track_template(&self) -> TaskTemplate {
        self.get("track").cloned().unwrap_or_else(|| TaskTemplate {
            action: "track".to_string(),
            background: true,
            parameters: HashMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_dir_falls_back_to_builtin() {
        let library = TemplateLibrary::load("does/not/exist").unwrap();
        let template = library.track_template();
        assert_eq!(template.action, "track");
        assert!(template.background);
    }

    #[test]
    fn test_load_overrides_builtin_track() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("track.toml"),
            r#"
[task]
action = "track"
background = false

[task.parameters]
rate = "30"
"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let library = TemplateLibrary::load(dir.path()).unwrap();
        let template = library.track_template();
        assert!(!template.background);
        assert_eq!(template.parameters.get("rate").unwrap(), "30");
    }

    #[test]
    fn test_malformed_template_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.toml"), "not a template").unwrap();

        let library = TemplateLibrary::load(dir.path()).unwrap();
        // 内置 track 模板仍然可用
        assert_eq!(library.track_template().action, "track");
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_template_does_not_abort_scan() {
        let dir = tempfile::tempdir().unwrap();
        // 悬空符号链接：读取失败但不中断整个目录扫描
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("dangling.toml"))
            .unwrap();
        std::fs::write(
            dir.path().join("follow.toml"),
            r#"
[task]
action = "follow"
"#,
        )
        .unwrap();

        let library = TemplateLibrary::load(dir.path()).unwrap();
        assert_eq!(library.get("follow").unwrap().action, "follow");
    }
}
