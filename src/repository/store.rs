//! 环境模型仓库
//!
//! 扁平表存储：名字 -> 条目，父子关系是表内名字引用，不存在指针与环。
//! 写操作互斥、读操作并发，临界区只覆盖内存表操作，绝不跨远程调用持锁。
//! 合并语义：逐条 best-effort，时间戳严格更新者胜，重放旧状态是无操作。

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::AntError;
use crate::repository::item::{Item, ItemKind};

#[derive(Default)]
struct Tables {
    items: HashMap<String, Item>,
    /// 父条目名 -> 子条目名（插入顺序）
    children: HashMap<String, Vec<String>>,
    /// 根条目名（插入顺序）
    roots: Vec<String>,
}

/// 命名空间内的条目仓库
#[derive(Default)]
pub struct Repository {
    inner: RwLock<Tables>,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn has(&self, name: &str) -> bool {
        self.inner.read().await.items.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.items.is_empty()
    }

    /// 插入或按时间戳更新一个条目
    ///
    /// 名字为空返回 EmptyName；声明的父条目不存在返回 UnknownParent。
    /// 已存在同名条目时退化为 update 语义（时间戳门控，maintainer 保持首次插入值）。
    pub async fn add(&self, item: Item) -> Result<(), AntError> {
        let mut tables = self.inner.write().await;
        add_or_update(&mut tables, item, false)
    }

    /// 用更新的载荷替换已有条目；时间戳不严格更新时静默忽略（重放幂等）
    pub async fn update(&self, name: &str, mut item: Item) -> Result<(), AntError> {
        item.name = name.to_string();
        let mut tables = self.inner.write().await;
        if !tables.items.contains_key(name) {
            return Err(AntError::UnknownItem(name.to_string()));
        }
        apply_update(&mut tables, item, false);
        Ok(())
    }

    /// 批量合并：逐条隔离，失败的条目收集返回而不是抛错
    ///
    /// `update_time` 为真时，被接受的更新用合并时刻重新打戳（而不是发送方的时间戳）。
    pub async fn update_batch(&self, items: Vec<Item>, update_time: bool) -> Vec<Item> {
        let mut failed = Vec::new();
        for item in items {
            let result = {
                let mut tables = self.inner.write().await;
                add_or_update(&mut tables, item.clone(), update_time)
            };
            if let Err(e) = result {
                tracing::warn!("Item '{}' rejected during merge: {}", item.name, e);
                failed.push(item);
            }
        }
        failed
    }

    pub async fn get_by_name(&self, name: &str) -> Option<Item> {
        self.inner.read().await.items.get(name).cloned()
    }

    pub async fn get_roots(&self) -> Vec<Item> {
        let tables = self.inner.read().await;
        tables
            .roots
            .iter()
            .filter_map(|name| tables.items.get(name).cloned())
            .collect()
    }

    pub async fn get_all(&self) -> HashMap<String, Item> {
        self.inner.read().await.items.clone()
    }

    /// 由 `name` 向上（不含自身）沿父链查找第一个指定类型的祖先
    pub async fn nearest_ancestor_of_kind(
        &self,
        name: &str,
        kind: ItemKind,
    ) -> Result<Item, AntError> {
        let tables = self.inner.read().await;
        let item = tables
            .items
            .get(name)
            .ok_or_else(|| AntError::UnknownItem(name.to_string()))?;

        let mut current = item.parent.clone();
        while !current.is_empty() {
            match tables.items.get(&current) {
                Some(ancestor) if ancestor.kind() == kind => return Ok(ancestor.clone()),
                Some(ancestor) => current = ancestor.parent.clone(),
                None => break,
            }
        }
        Err(AntError::NoSuchAncestor {
            name: name.to_string(),
            kind,
        })
    }

    /// 展平整个森林：每个根先于其子树输出，保证快照内父条目总在子条目之前
    pub async fn flatten(&self) -> Vec<Item> {
        let tables = self.inner.read().await;
        let mut out = Vec::with_capacity(tables.items.len());
        for root in &tables.roots {
            flatten_into(&tables, root, &mut out);
        }
        out
    }

    /// 由指定命名空间维护的条目快照（位姿广播侧车消费）
    pub async fn maintained_by(&self, namespace: &str) -> Vec<Item> {
        let tables = self.inner.read().await;
        tables
            .items
            .values()
            .filter(|item| item.maintainer == namespace)
            .cloned()
            .collect()
    }
}

fn add_or_update(tables: &mut Tables, item: Item, update_time: bool) -> Result<(), AntError> {
    if item.name.is_empty() {
        return Err(AntError::EmptyName);
    }
    if !item.parent.is_empty() && !tables.items.contains_key(&item.parent) {
        return Err(AntError::UnknownParent(item.parent.clone()));
    }

    if tables.items.contains_key(&item.name) {
        apply_update(tables, item, update_time);
        return Ok(());
    }

    if item.parent.is_empty() {
        tables.roots.push(item.name.clone());
    } else {
        tables
            .children
            .entry(item.parent.clone())
            .or_default()
            .push(item.name.clone());
    }
    tables.items.insert(item.name.clone(), item);
    Ok(())
}

/// 时间戳门控的就地更新；parent 与 maintainer 保持存量值
fn apply_update(tables: &mut Tables, mut incoming: Item, update_time: bool) {
    let Some(stored) = tables.items.get_mut(&incoming.name) else {
        return;
    };
    if incoming.stamp <= stored.stamp {
        return;
    }
    if update_time {
        incoming.stamp = Utc::now();
    }
    stored.stamp = incoming.stamp;
    stored.payload = incoming.payload;
    tracing::debug!("Updated item '{}'", stored.name);
}

fn flatten_into(tables: &Tables, name: &str, out: &mut Vec<Item>) {
    let Some(item) = tables.items.get(name) else {
        return;
    };
    out.push(item.clone());
    if let Some(children) = tables.children.get(name) {
        for child in children {
            flatten_into(tables, child, out);
        }
    }
}
