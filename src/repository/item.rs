//! 环境模型条目
//!
//! 条目类型是封闭和类型（Object / Map / Robot / Component），所有分发点穷尽匹配；
//! 新增类型时由编译器指出每一处需要更新的 match。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 三维位姿（位置 + 四元数朝向），相对于父条目坐标系
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub qx: f64,
    pub qy: f64,
    pub qz: f64,
    pub qw: f64,
}

impl Default for Pose {
    fn default() -> Self {
        // 单位四元数
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            qx: 0.0,
            qy: 0.0,
            qz: 0.0,
            qw: 1.0,
        }
    }
}

/// 条目类型判别（与 ItemPayload 变体一一对应）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ItemKind {
    Object,
    Map,
    Robot,
    Component,
}

/// 可被跟踪的普通物体
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectPayload {
    #[serde(default)]
    pub pose: Pose,
    /// 能跟踪该物体的检测方法（管线类别名），按声明顺序
    #[serde(default)]
    pub detection_methods: Vec<String>,
    /// 视觉标签 ID（如 AR tag），无标签物体为 None
    #[serde(default)]
    pub tag_id: Option<u32>,
}

/// 地图条目：提供全局坐标系与地图数据话题
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MapPayload {
    #[serde(default)]
    pub pose: Pose,
    /// 地图数据发布话题
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub detection_methods: Vec<String>,
}

/// 机器人条目：携带里程计与基座坐标系名
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RobotPayload {
    #[serde(default)]
    pub pose: Pose,
    #[serde(default)]
    pub odom_frame_id: String,
    #[serde(default)]
    pub base_frame_id: String,
    #[serde(default)]
    pub detection_methods: Vec<String>,
}

/// 传感组件条目（相机、激光雷达等）；没有检测方法
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComponentPayload {
    #[serde(default)]
    pub pose: Pose,
}

/// 条目载荷：类型特定字段的封闭和类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum ItemPayload {
    Object(ObjectPayload),
    Map(MapPayload),
    Robot(RobotPayload),
    Component(ComponentPayload),
}

impl ItemPayload {
    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Object(_) => ItemKind::Object,
            Self::Map(_) => ItemKind::Map,
            Self::Robot(_) => ItemKind::Robot,
            Self::Component(_) => ItemKind::Component,
        }
    }

    /// 检测方法列表；Component 没有检测方法，返回 None
    pub fn detection_methods(&self) -> Option<&[String]> {
        match self {
            Self::Object(p) => Some(&p.detection_methods),
            Self::Map(p) => Some(&p.detection_methods),
            Self::Robot(p) => Some(&p.detection_methods),
            Self::Component(_) => None,
        }
    }
}

/// 仓库存储单元：名字全局唯一（命名空间内），parent 为空表示根
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    /// 父条目名；空串 = 根条目。名字引用而非指针（扁平表 + 索引）
    #[serde(default)]
    pub parent: String,
    /// 对该条目派生输出（如位姿广播）负责的命名空间
    #[serde(default)]
    pub maintainer: String,
    /// 最后写入时间；合并时严格更新的时间戳才会覆盖
    pub stamp: DateTime<Utc>,
    pub payload: ItemPayload,
}

impl Item {
    pub fn new(name: impl Into<String>, parent: impl Into<String>, payload: ItemPayload) -> Self {
        Self {
            name: name.into(),
            parent: parent.into(),
            maintainer: String::new(),
            stamp: Utc::now(),
            payload,
        }
    }

    pub fn with_maintainer(mut self, maintainer: impl Into<String>) -> Self {
        self.maintainer = maintainer.into();
        self
    }

    pub fn with_stamp(mut self, stamp: DateTime<Utc>) -> Self {
        self.stamp = stamp;
        self
    }

    pub fn kind(&self) -> ItemKind {
        self.payload.kind()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_payload() {
        let item = Item::new("cam0", "robot1", ItemPayload::Component(ComponentPayload::default()));
        assert_eq!(item.kind(), ItemKind::Component);
        assert!(!item.is_root());
    }

    #[test]
    fn test_component_has_no_detection_methods() {
        let payload = ItemPayload::Component(ComponentPayload::default());
        assert!(payload.detection_methods().is_none());

        let payload = ItemPayload::Object(ObjectPayload {
            detection_methods: vec!["camera".to_string()],
            ..Default::default()
        });
        assert_eq!(payload.detection_methods(), Some(&["camera".to_string()][..]));
    }

    #[test]
    fn test_payload_serde_round_trip() {
        let item = Item::new(
            "map1",
            "",
            ItemPayload::Map(MapPayload {
                topic: "/map".to_string(),
                detection_methods: vec!["slam".to_string()],
                ..Default::default()
            }),
        )
        .with_maintainer("ns1");

        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("\"type\":\"MAP\""));

        let back: Item = serde_json::from_str(&json).unwrap();
        assert_eq!(back, item);
    }
}
