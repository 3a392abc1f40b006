//! Star-Tree 构建引擎
//!
//! 构建流程：
//! 1. 读取原始行（维度字典 ID + 原始指标值）
//! 2. 按切分顺序排序，合并维度完全相同的行
//! 3. 递归切分（[`construct`]），每层为切分维度合成 star 子节点
//! 4. 后序遍历（[`propagate`]）为每个节点追加一条聚合行
//!
//! 递归依赖全部通过 [`BuildContext`]（只读）和 `RecordStore`/`NodeArena`
//! （可变）显式传入。

use std::collections::{BTreeMap, HashSet};

use super::aggregation::{aggregate_records, AggregationFunctionColumnPair};
use super::node::{NodeArena, NodeId, TreeNode};
use super::record::{
    compare_dimensions, full_sort_order, MetricValue, Record, RecordStore, SKIP_VALUE, STAR_VALUE,
};
use super::split_order::SplitOrderPlan;
use super::tree::StarTree;
use crate::segment::{DataType, RawValue, SegmentReader};
use crate::utils::config::StarTreeConfig;
use crate::utils::metrics::{BuildStats, PhaseTimer};
use crate::{Result, StarTreeError};

/// 构建上下文（递归期间只读）
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// 每层切分维度
    pub split_order: Vec<usize>,
    /// split order + 其余维度，用于排序与合并
    pub sort_order: Vec<usize>,
    /// 不创建 star 子节点的维度
    pub skip_star_node_creation: HashSet<usize>,
    pub pairs: Vec<AggregationFunctionColumnPair>,
    pub max_leaf_records: usize,
    pub dimension_count: usize,
}

impl BuildContext {
    pub fn new(
        plan: &SplitOrderPlan,
        pairs: Vec<AggregationFunctionColumnPair>,
        max_leaf_records: usize,
        dimension_count: usize,
    ) -> Self {
        Self {
            split_order: plan.split_order.clone(),
            sort_order: full_sort_order(&plan.split_order, dimension_count),
            skip_star_node_creation: plan.skip_star_node_creation.clone(),
            pairs,
            max_leaf_records,
            dimension_count,
        }
    }

    #[inline]
    pub fn skips_star_node(&self, dimension_id: usize) -> bool {
        self.skip_star_node_creation.contains(&dimension_id)
    }
}

/// 排序后合并相邻且维度完全相同的行
///
/// 合并结果一律是 `Aggregated` 行；归约方式由每行的来源决定。
pub fn condense_records(
    records: Vec<Record>,
    pairs: &[AggregationFunctionColumnPair],
) -> Result<Vec<Record>> {
    let mut condensed = Vec::with_capacity(records.len());
    let mut group: Vec<Record> = Vec::new();

    for record in records {
        if group
            .first()
            .map_or(false, |first| first.dimensions != record.dimensions)
        {
            condensed.push(merge_group(&mut group, pairs)?);
        }
        group.push(record);
    }
    if !group.is_empty() {
        condensed.push(merge_group(&mut group, pairs)?);
    }
    Ok(condensed)
}

fn merge_group(group: &mut Vec<Record>, pairs: &[AggregationFunctionColumnPair]) -> Result<Record> {
    let metrics = aggregate_records(group.iter(), pairs)?;
    let dimensions = std::mem::take(&mut group[0].dimensions);
    group.clear();
    Ok(Record::aggregated(dimensions, metrics))
}

/// 校验 `[start, end)` 已按排序顺序有序
pub fn check_sorted(store: &RecordStore, start: usize, end: usize, sort_order: &[usize]) -> Result<()> {
    let records = store.range(start, end);
    for (offset, pair) in records.windows(2).enumerate() {
        if compare_dimensions(&pair[0].dimensions, &pair[1].dimensions, sort_order).is_gt() {
            return Err(StarTreeError::UnsortedInput(start + offset + 1));
        }
    }
    Ok(())
}

/// 单次线性扫描，按维度值切出连续区间
///
/// 依赖输入已按该维度分组，返回 `(value, start, end)`，顺序与出现顺序一致。
pub fn group_on_dimension(
    store: &RecordStore,
    start: usize,
    end: usize,
    dimension_id: usize,
) -> Vec<(i32, usize, usize)> {
    let mut groups = Vec::new();
    let records = store.range(start, end);
    let Some(first) = records.first() else {
        return groups;
    };

    let mut current_value = first.dimensions[dimension_id];
    let mut group_start = start;
    for (offset, record) in records.iter().enumerate().skip(1) {
        let value = record.dimensions[dimension_id];
        if value != current_value {
            let doc_id = start + offset;
            groups.push((current_value, group_start, doc_id));
            current_value = value;
            group_start = doc_id;
        }
    }
    groups.push((current_value, group_start, end));
    groups
}

/// 复制区间内的行，把切分维度置为 `STAR_VALUE` 后重新排序
fn star_records(
    store: &RecordStore,
    start: usize,
    end: usize,
    dimension_id: usize,
    sort_order: &[usize],
) -> Vec<Record> {
    let mut records: Vec<Record> = store
        .range(start, end)
        .iter()
        .map(|r| {
            let mut record = r.clone();
            record.dimensions[dimension_id] = STAR_VALUE;
            record
        })
        .collect();
    records.sort_by(|a, b| compare_dimensions(&a.dimensions, &b.dimensions, sort_order));
    records
}

/// 递归构建 `node` 的子树
///
/// 前置条件：`[start, end)` 按 `ctx.sort_order` 有序。入口处（`level == 0`）
/// 会校验，违反时返回 `UnsortedInput`。
pub fn construct(
    ctx: &BuildContext,
    store: &mut RecordStore,
    arena: &mut NodeArena,
    node: NodeId,
    start: usize,
    end: usize,
    level: usize,
) -> Result<()> {
    if level == 0 {
        check_sorted(store, start, end, &ctx.sort_order)?;
    }
    if level == ctx.split_order.len() || start == end {
        return Ok(());
    }

    let split_dimension = ctx.split_order[level];
    let groups = group_on_dimension(store, start, end, split_dimension);

    // 每个维度值一个子节点
    let mut children = BTreeMap::new();
    for (value, child_start, child_end) in groups {
        let child = arena.alloc(TreeNode {
            start_doc_id: child_start,
            end_doc_id: child_end,
            dimension_id: split_dimension as i32,
            dimension_value: value,
            child_dimension_id: -1,
            children: None,
            aggregated_doc_id: None,
            level: level + 1,
        });
        children.insert(value, child);
        if child_end - child_start > ctx.max_leaf_records {
            construct(ctx, store, arena, child, child_start, child_end, level + 1)?;
        }
    }

    if !ctx.skips_star_node(split_dimension) {
        let records = star_records(store, start, end, split_dimension, &ctx.sort_order);
        let condensed = condense_records(records, &ctx.pairs)?;
        let range = store.extend(condensed);

        let star = arena.alloc(TreeNode {
            start_doc_id: range.start,
            end_doc_id: range.end,
            dimension_id: split_dimension as i32,
            dimension_value: STAR_VALUE,
            child_dimension_id: -1,
            children: None,
            aggregated_doc_id: None,
            level: level + 1,
        });
        children.insert(STAR_VALUE, star);
        log::debug!(
            "Star node level={} dimension={} docs=[{}, {})",
            level + 1,
            split_dimension,
            range.start,
            range.end
        );
        if range.len() > ctx.max_leaf_records {
            construct(ctx, store, arena, star, range.start, range.end, level + 1)?;
        }
    }

    let parent = arena.get_mut(node);
    parent.child_dimension_id = split_dimension as i32;
    parent.children = Some(children);
    Ok(())
}

/// 后序遍历，为每个节点生成聚合行，返回 `node` 的聚合行 ID
///
/// star 子节点覆盖父区间的全部行，存在时其聚合行 ID 直接作为父节点的
/// 聚合行 ID，不再归约其他子节点。
pub fn propagate(
    ctx: &BuildContext,
    store: &mut RecordStore,
    arena: &mut NodeArena,
    node: NodeId,
) -> Result<usize> {
    let children = arena.children(node);

    let doc_id = if children.is_empty() {
        let (start, end) = {
            let n = arena.get(node);
            (n.start_doc_id, n.end_doc_id)
        };
        let metrics = aggregate_records(store.range(start, end), &ctx.pairs)?;
        store.push(aggregated_record(ctx, arena.get(node), metrics))
    } else {
        let mut child_docs = Vec::with_capacity(children.len());
        for child in &children {
            child_docs.push(propagate(ctx, store, arena, *child)?);
        }

        match arena.get(node).star_child() {
            Some(star) => arena.get(star).aggregated_doc_id.ok_or_else(|| {
                StarTreeError::Corrupted(format!("Star node {} has no aggregated doc", star))
            })?,
            None => {
                let metrics = aggregate_records(
                    child_docs.iter().filter_map(|&doc_id| store.get(doc_id)),
                    &ctx.pairs,
                )?;
                store.push(aggregated_record(ctx, arena.get(node), metrics))
            }
        }
    };

    arena.get_mut(node).aggregated_doc_id = Some(doc_id);
    Ok(doc_id)
}

/// 节点聚合行：除自身 (维度, 值) 外全部为 `SKIP_VALUE`
fn aggregated_record(ctx: &BuildContext, node: &TreeNode, metrics: Vec<MetricValue>) -> Record {
    let mut dimensions = vec![SKIP_VALUE; ctx.dimension_count];
    if let Ok(dim) = usize::try_from(node.dimension_id) {
        dimensions[dim] = node.dimension_value;
    }
    Record::aggregated(dimensions, metrics)
}

/// Star-Tree 构建器
pub struct StarTreeBuilder<'a, S: SegmentReader + ?Sized> {
    segment: &'a S,
    config: StarTreeConfig,
}

impl<'a, S: SegmentReader + ?Sized> StarTreeBuilder<'a, S> {
    pub fn new(segment: &'a S, config: StarTreeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { segment, config })
    }

    /// 读取原始行
    fn ingest(&self, pairs: &[AggregationFunctionColumnPair]) -> Result<Vec<Record>> {
        let num_docs = self.segment.num_docs();

        // 每个 pair 的源列及读取类型
        let mut sources: Vec<Option<(&str, DataType)>> = Vec::with_capacity(pairs.len());
        for pair in pairs {
            match pair.source_column() {
                Some(column) => sources.push(Some((column, self.segment.data_type(column)?))),
                None => sources.push(None),
            }
        }

        let mut records = Vec::with_capacity(num_docs);
        for doc_id in 0..num_docs {
            let dimensions = self
                .config
                .dimensions
                .iter()
                .map(|d| self.segment.dictionary_id(d, doc_id))
                .collect::<Result<Vec<_>>>()?;

            let mut metrics = Vec::with_capacity(pairs.len());
            for (pair, source) in pairs.iter().zip(&sources) {
                let value = match source {
                    Some((column, data_type)) => {
                        let raw = self.segment.read_value(column, doc_id, *data_type)?;
                        pair.function.raw_input(column, raw)?
                    }
                    None => pair.function.raw_input(&pair.column, RawValue::Long(1))?,
                };
                metrics.push(value);
            }
            records.push(Record::raw(dimensions, metrics));
        }
        Ok(records)
    }

    pub fn build(self) -> Result<StarTree> {
        let timer = PhaseTimer::start("build");
        let plan = SplitOrderPlan::from_segment(self.segment, &self.config)?;
        let pairs = self.config.aggregation_pairs()?;
        let dimension_count = self.config.dimensions.len();

        let num_docs = self.segment.num_docs();
        if num_docs == 0 {
            return Err(StarTreeError::InvalidConfig(
                "Segment has no documents".to_string(),
            ));
        }

        let mut stats = BuildStats {
            raw_docs: num_docs as u64,
            ..Default::default()
        };

        let ctx = BuildContext::new(&plan, pairs, self.config.max_leaf_records, dimension_count);

        let mut raw = self.ingest(&ctx.pairs)?;
        raw.sort_by(|a, b| compare_dimensions(&a.dimensions, &b.dimensions, &ctx.sort_order));
        let condensed = condense_records(raw, &ctx.pairs)?;
        stats.condensed_raw_docs = condensed.len() as u64;
        log::info!(
            "Ingested {} raw docs, {} after condense, split order {:?}",
            num_docs,
            condensed.len(),
            ctx.split_order
        );

        let mut store = RecordStore::with_capacity(condensed.len() * (ctx.split_order.len() + 1));
        let range = store.extend(condensed);

        let mut arena = NodeArena::new();
        let root = arena.alloc(TreeNode::root(range.start, range.end));
        construct(&ctx, &mut store, &mut arena, root, range.start, range.end, 0)?;
        stats.star_docs = (store.len() - range.len()) as u64;
        log::info!(
            "Constructed star-tree with {} nodes, {} star docs",
            arena.len(),
            stats.star_docs
        );

        let before_propagate = store.len();
        propagate(&ctx, &mut store, &mut arena, root)?;
        stats.aggregated_docs = (store.len() - before_propagate) as u64;
        stats.total_docs = store.len() as u64;

        stats.node_count = arena.len() as u64;
        for (_, node) in arena.iter() {
            if node.is_leaf() {
                stats.leaf_count += 1;
            }
            if node.is_star() {
                stats.star_node_count += 1;
            }
            stats.max_depth = stats.max_depth.max(node.level as u64);
        }
        stats.build_millis = timer.finish();
        stats.log_summary();

        Ok(StarTree::new(
            self.config,
            plan,
            ctx,
            store,
            arena,
            root,
            stats,
        ))
    }
}
