//! 检测方法可靠性记录
//!
//! 每个检测方法（管线类别）维护一个有界的结果窗口，得分 = 窗口均值。
//! 首次引用即登记；排序输出供编排层决定尝试顺序。

use std::collections::{HashMap, VecDeque};

/// 未观测到任何结果时的初始得分
const DEFAULT_SCORE: f64 = 0.8;
/// 结果窗口容量；超过后最旧的观测滚出
const WINDOW_CAPACITY: usize = 20;

/// 单个检测方法的可靠性（滑动窗口均值，0.0..=1.0）
#[derive(Debug, Clone)]
pub struct Reliability {
    window: VecDeque<f64>,
}

impl Default for Reliability {
    fn default() -> Self {
        Self {
            window: VecDeque::with_capacity(WINDOW_CAPACITY),
        }
    }
}

impl Reliability {
    pub fn record(&mut self, success: bool) {
        if self.window.len() == WINDOW_CAPACITY {
            self.window.pop_front();
        }
        self.window.push_back(if success { 1.0 } else { 0.0 });
    }

    pub fn score(&self) -> f64 {
        if self.window.is_empty() {
            return DEFAULT_SCORE;
        }
        self.window.iter().sum::<f64>() / self.window.len() as f64
    }
}

/// 方法名 -> 可靠性 的登记表，归编排层所有
#[derive(Debug, Default)]
pub struct DetectionMethodTracker {
    methods: HashMap<String, Reliability>,
}

impl DetectionMethodTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个方法；已登记的保持原有历史
    pub fn register(&mut self, method: &str) {
        if !self.methods.contains_key(method) {
            self.methods.insert(method.to_string(), Reliability::default());
            tracing::debug!("Registered detection method '{}'", method);
        }
    }

    pub fn register_all(&mut self, methods: &[String]) {
        for method in methods {
            self.register(method);
        }
    }

    pub fn record_success(&mut self, method: &str) {
        self.methods.entry(method.to_string()).or_default().record(true);
    }

    pub fn record_failure(&mut self, method: &str) {
        self.methods.entry(method.to_string()).or_default().record(false);
    }

    pub fn score(&self, method: &str) -> Option<f64> {
        self.methods.get(method).map(Reliability::score)
    }

    /// 全部已登记方法，按得分降序；同分按名字字典序（确定性平局规则）
    pub fn ordered(&self) -> Vec<String> {
        let mut scored: Vec<(&String, f64)> = self
            .methods
            .iter()
            .map(|(name, rel)| (name, rel.score()))
            .collect();
        sort_by_score(&mut scored);
        scored.into_iter().map(|(name, _)| name.clone()).collect()
    }

    /// 给定子集按得分降序排序（未登记的方法被忽略）
    pub fn rank(&self, subset: &[String]) -> Vec<String> {
        let mut scored: Vec<(&String, f64)> = subset
            .iter()
            .filter_map(|name| self.methods.get(name).map(|rel| (name, rel.score())))
            .collect();
        sort_by_score(&mut scored);
        scored.into_iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

fn sort_by_score(scored: &mut [(&String, f64)]) {
    scored.sort_by(|(a_name, a_score), (b_name, b_score)| {
        b_score
            .partial_cmp(a_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a_name.cmp(b_name))
    });
}
