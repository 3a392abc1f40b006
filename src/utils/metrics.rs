//! 构建统计指标
//!
//! 收集一次 Star-Tree 构建各阶段的计数和耗时，支持：
//! - 日志输出
//! - JSON 导出

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// 单次构建统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildStats {
    /// 原始文档数
    pub raw_docs: u64,
    /// 原始行合并后的文档数
    pub condensed_raw_docs: u64,
    /// star 节点追加的文档数
    pub star_docs: u64,
    /// 节点聚合追加的文档数
    pub aggregated_docs: u64,
    /// 最终文档总数
    pub total_docs: u64,
    /// 节点总数
    pub node_count: u64,
    /// 叶子节点数
    pub leaf_count: u64,
    /// star 节点数
    pub star_node_count: u64,
    /// 最大深度（根为 0）
    pub max_depth: u64,
    /// 树文件字节数
    pub tree_bytes: u64,
    /// 构建耗时（毫秒）
    pub build_millis: u64,
    /// 序列化耗时（毫秒）
    pub serialize_millis: u64,
}

impl BuildStats {
    /// JSON 导出
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn log_summary(&self) {
        log::info!(
            "Star-tree stats: raw_docs={}, total_docs={}, nodes={}, leaves={}, star_nodes={}, depth={}, build={}ms",
            self.raw_docs,
            self.total_docs,
            self.node_count,
            self.leaf_count,
            self.star_node_count,
            self.max_depth,
            self.build_millis
        );
    }
}

/// 阶段计时器
#[derive(Debug)]
pub struct PhaseTimer {
    name: &'static str,
    start: Instant,
}

impl PhaseTimer {
    pub fn start(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
        }
    }

    /// 结束计时，返回毫秒数
    pub fn finish(self) -> u64 {
        let millis = self.start.elapsed().as_millis() as u64;
        log::debug!("Phase {} finished in {}ms", self.name, millis);
        millis
    }
}
