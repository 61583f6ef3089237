//! 管线参数解析器
//!
//! 把候选管线各分段声明的参数需求 + 被跟踪条目，解析为完整的分段参数
//! 覆盖列表。任何一步失败都让编排层丢弃该候选管线、尝试下一个方法。

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::AntError;
use crate::links::ComponentLinkRegistry;
use crate::repository::{Item, ItemKind, ItemPayload, Repository};

/// 分段参数词汇表（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKey {
    FrameId,
    OdomFrameId,
    BaseFrameId,
    MapTopic,
    GlobalFrameId,
    TfPrefix,
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FrameId => "frame_id",
            Self::OdomFrameId => "odom_frame_id",
            Self::BaseFrameId => "base_frame_id",
            Self::MapTopic => "map_topic",
            Self::GlobalFrameId => "global_frame_id",
            Self::TfPrefix => "tf_prefix",
        };
        f.write_str(s)
    }
}

/// 管线的一个处理分段：声明组件类型与所需参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipeSegment {
    /// 该分段期望的组件声明类型（frame_id 解析时查链接表用）
    pub segment_type: String,
    #[serde(default)]
    pub required_parameters: Vec<ParamKey>,
}

/// 管线描述：某检测方法类别下的有序分段序列
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipeDescriptor {
    pub category: String,
    pub segments: Vec<PipeSegment>,
}

/// 单个分段参数的解析结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentSpecifier {
    pub segment_index: usize,
    pub key: ParamKey,
    pub value: String,
}

/// 参数解析器：只读访问仓库与链接表
pub struct ParameterResolver {
    namespace: String,
    repository: Arc<Repository>,
    links: Arc<ComponentLinkRegistry>,
}

impl ParameterResolver {
    pub fn new(
        namespace: impl Into<String>,
        repository: Arc<Repository>,
        links: Arc<ComponentLinkRegistry>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            repository,
            links,
        }
    }

    /// 为 `item_name` 解析整条管线的参数
    ///
    /// frame_id 在有链接组件时就地解析（取第一个候选），无候选时先记为
    /// pending；扫描完成后 pending 参数从任一同键已解析值补齐（多个时取
    /// 最后一个）。其余参数键解析失败即整条管线失败。
    pub async fn resolve(
        &self,
        pipe: &PipeDescriptor,
        item_name: &str,
    ) -> Result<Vec<SegmentSpecifier>, AntError> {
        let item = self
            .repository
            .get_by_name(item_name)
            .await
            .ok_or_else(|| AntError::UnknownItem(item_name.to_string()))?;

        let mut resolved: Vec<SegmentSpecifier> = Vec::new();
        let mut pending: Vec<(usize, ParamKey)> = Vec::new();
        let mut in_place = 0usize;

        for (index, segment) in pipe.segments.iter().enumerate() {
            for key in &segment.required_parameters {
                match key {
                    ParamKey::FrameId => {
                        let candidates = self.links.links_by_type(&segment.segment_type).await;
                        match candidates.first() {
                            Some(component) => {
                                resolved.push(SegmentSpecifier {
                                    segment_index: index,
                                    key: ParamKey::FrameId,
                                    value: component.name.clone(),
                                });
                                in_place += 1;
                            }
                            None => pending.push((index, ParamKey::FrameId)),
                        }
                    }
                    ParamKey::OdomFrameId | ParamKey::BaseFrameId => {
                        let value = self.robot_frame(&item, index, *key)?;
                        resolved.push(SegmentSpecifier {
                            segment_index: index,
                            key: *key,
                            value,
                        });
                    }
                    ParamKey::MapTopic | ParamKey::GlobalFrameId => {
                        let value = self.map_field(item_name, index, *key).await?;
                        resolved.push(SegmentSpecifier {
                            segment_index: index,
                            key: *key,
                            value,
                        });
                    }
                    ParamKey::TfPrefix => {
                        resolved.push(SegmentSpecifier {
                            segment_index: index,
                            key: ParamKey::TfPrefix,
                            value: self.namespace.clone(),
                        });
                    }
                }
            }
        }

        if !pending.is_empty() {
            if in_place == 0 {
                let (segment, key) = pending[0];
                return Err(AntError::ParameterUnresolved {
                    segment,
                    key,
                    source: None,
                });
            }
            for (segment_index, key) in pending {
                // 同键取最后一个已解析值
                let donor = resolved
                    .iter()
                    .filter(|s| s.key == key)
                    .last()
                    .map(|s| s.value.clone());
                match donor {
                    Some(value) => resolved.push(SegmentSpecifier {
                        segment_index,
                        key,
                        value,
                    }),
                    None => {
                        return Err(AntError::ParameterUnresolved {
                            segment: segment_index,
                            key,
                            source: None,
                        })
                    }
                }
            }
        }

        Ok(resolved)
    }

    /// 机器人坐标系参数：条目必须是 Robot 且字段非空，值冠以本地命名空间
    fn robot_frame(&self, item: &Item, segment: usize, key: ParamKey) -> Result<String, AntError> {
        let ItemPayload::Robot(robot) = &item.payload else {
            return Err(AntError::ParameterUnresolved {
                segment,
                key,
                source: Some(Box::new(AntError::UnsupportedType {
                    name: item.name.clone(),
                    kind: item.kind(),
                })),
            });
        };
        let frame = match key {
            ParamKey::OdomFrameId => &robot.odom_frame_id,
            _ => &robot.base_frame_id,
        };
        if frame.is_empty() {
            return Err(AntError::ParameterUnresolved {
                segment,
                key,
                source: None,
            });
        }
        Ok(format!("{}/{}", self.namespace, frame))
    }

    /// 地图参数：最近的 Map 祖先提供话题（map_topic）或名字（global_frame_id）
    async fn map_field(
        &self,
        item_name: &str,
        segment: usize,
        key: ParamKey,
    ) -> Result<String, AntError> {
        let map_item = self
            .repository
            .nearest_ancestor_of_kind(item_name, ItemKind::Map)
            .await
            .map_err(|e| AntError::ParameterUnresolved {
                segment,
                key,
                source: Some(Box::new(e)),
            })?;
        match (&map_item.payload, key) {
            (ItemPayload::Map(map), ParamKey::MapTopic) => Ok(map.topic.clone()),
            (ItemPayload::Map(_), ParamKey::GlobalFrameId) => Ok(map_item.name.clone()),
            _ => Err(AntError::ParameterUnresolved {
                segment,
                key,
                source: None,
            }),
        }
    }
}
