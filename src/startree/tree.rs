//! 已构建的 Star-Tree
//!
//! 持有记录存储、节点 arena 与构建参数，负责落盘：
//! 正排索引列 → 树文件 → 元数据（前两步成功后才提交元数据）。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::aggregation::AggregationFunctionColumnPair;
use super::builder::BuildContext;
use super::index_creator::{create_indexes, ColumnCreator};
use super::metadata::{self, PropertyStore};
use super::node::{NodeArena, NodeId, TreeNode};
use super::record::{MetricValue, Record, RecordStore};
use super::serializer::write_tree;
use super::split_order::SplitOrderPlan;
use crate::utils::config::StarTreeConfig;
use crate::utils::metrics::{BuildStats, PhaseTimer};
use crate::{Result, StarTreeError};

/// 已构建的 Star-Tree
#[derive(Debug)]
pub struct StarTree {
    config: StarTreeConfig,
    plan: SplitOrderPlan,
    ctx: BuildContext,
    store: RecordStore,
    arena: NodeArena,
    root: NodeId,
    stats: BuildStats,
}

impl StarTree {
    pub(crate) fn new(
        config: StarTreeConfig,
        plan: SplitOrderPlan,
        ctx: BuildContext,
        store: RecordStore,
        arena: NodeArena,
        root: NodeId,
        stats: BuildStats,
    ) -> Self {
        Self {
            config,
            plan,
            ctx,
            store,
            arena,
            root,
            stats,
        }
    }

    /// 树标识 `startree_<index>`
    pub fn tree_id(&self) -> String {
        metadata::tree_id(self.config.tree_index)
    }

    pub fn dimension_names(&self) -> &[String] {
        &self.config.dimensions
    }

    pub fn split_order(&self) -> &[usize] {
        &self.plan.split_order
    }

    pub fn plan(&self) -> &SplitOrderPlan {
        &self.plan
    }

    pub fn pairs(&self) -> &[AggregationFunctionColumnPair] {
        &self.ctx.pairs
    }

    pub fn max_leaf_records(&self) -> usize {
        self.ctx.max_leaf_records
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        self.arena.get(id)
    }

    pub fn nodes(&self) -> &NodeArena {
        &self.arena
    }

    pub fn records(&self) -> &RecordStore {
        &self.store
    }

    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    /// 节点聚合行
    pub fn aggregated_record(&self, id: NodeId) -> Option<&Record> {
        self.arena
            .get(id)
            .aggregated_doc_id
            .and_then(|doc_id| self.store.get(doc_id))
    }

    /// 节点上某个 函数/列 对的聚合值
    pub fn aggregated_value(&self, id: NodeId, pair_index: usize) -> Option<&MetricValue> {
        self.aggregated_record(id)?.metrics.get(pair_index)
    }

    /// 带树标识前缀的元数据
    pub fn metadata(&self) -> BTreeMap<String, String> {
        let index = self.config.tree_index;
        let names = self.dimension_names();
        let pairs = self
            .pairs()
            .iter()
            .map(|p| p.column_name())
            .collect::<Vec<_>>()
            .join(",");

        BTreeMap::from([
            (
                metadata::metadata_key(index, metadata::DOCS_COUNT),
                self.store.len().to_string(),
            ),
            (
                metadata::metadata_key(index, metadata::SPLIT_ORDER),
                self.plan.split_order_string(names),
            ),
            (
                metadata::metadata_key(index, metadata::SKIP_STAR_NODE_CREATION),
                self.plan.skip_star_string(names),
            ),
            (metadata::metadata_key(index, metadata::AGG_FUNC_COLUMN_PAIRS), pairs),
            (
                metadata::metadata_key(index, metadata::MAX_LEAF_RECORDS),
                self.ctx.max_leaf_records.to_string(),
            ),
        ])
    }

    /// 树文件路径 `<out_dir>/startree_<index>.tree`
    pub fn tree_file_path<P: AsRef<Path>>(&self, out_dir: P) -> PathBuf {
        out_dir.as_ref().join(metadata::tree_file_name(self.config.tree_index))
    }

    /// 写出正排索引列、树文件并提交元数据
    ///
    /// 任一步 IO 失败直接返回错误，不提交元数据；已写出的部分文件由调用方清理。
    pub fn serialize<C, P>(&mut self, out_dir: &Path, columns: &mut C, properties: &mut P) -> Result<PathBuf>
    where
        C: ColumnCreator + ?Sized,
        P: PropertyStore + ?Sized,
    {
        let timer = PhaseTimer::start("serialize");
        std::fs::create_dir_all(out_dir)?;

        create_indexes(
            columns,
            &self.store,
            &self.config.dimensions,
            &self.plan.cardinalities,
            &self.ctx.pairs,
        )?;

        let tree_path = self.tree_file_path(out_dir);
        self.stats.tree_bytes = write_tree(&tree_path, &self.config.dimensions, &self.arena, self.root)?;

        let existing = match properties.get_property(metadata::STAR_TREE_COUNT) {
            Some(value) => value.parse::<u32>().map_err(|e| {
                StarTreeError::Corrupted(format!("Invalid {}: {}", metadata::STAR_TREE_COUNT, e))
            })?,
            None => 0,
        };
        let count = existing.max(self.config.tree_index + 1);
        for (key, value) in self.metadata() {
            properties.set_property(&key, value);
        }
        properties.set_property(metadata::STAR_TREE_COUNT, count.to_string());
        properties.save()?;

        self.stats.serialize_millis = timer.finish();
        log::info!(
            "Star-tree {} committed: {} docs, {} nodes",
            self.tree_id(),
            self.store.len(),
            self.arena.len()
        );
        Ok(tree_path)
    }
}
