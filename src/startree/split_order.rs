//! 切分顺序规划
//!
//! - 维度名 → 维度下标
//! - 未显式配置时按字典基数降序（稳定排序，基数相同保留声明顺序）
//! - 不创建 star 节点的维度集合与顺序无关

use std::collections::HashSet;

use crate::segment::SegmentReader;
use crate::utils::config::StarTreeConfig;
use crate::{Result, StarTreeError};

/// 维度名列表 → 下标列表
pub fn enumerate_dimensions(dimension_names: &[String], selected: &[String]) -> Result<Vec<usize>> {
    selected
        .iter()
        .map(|name| {
            dimension_names
                .iter()
                .position(|d| d == name)
                .ok_or_else(|| StarTreeError::UnknownDimension(name.clone()))
        })
        .collect()
}

/// 默认切分顺序：基数高的维度先切分
pub fn compute_default_split_order(cardinalities: &[usize]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..cardinalities.len()).collect();
    order.sort_by(|&a, &b| cardinalities[b].cmp(&cardinalities[a]));
    order
}

/// 已解析的切分计划
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOrderPlan {
    /// 每层切分使用的维度下标
    pub split_order: Vec<usize>,
    /// 不创建 star 子节点的维度下标
    pub skip_star_node_creation: HashSet<usize>,
    /// 各维度字典基数（按维度声明顺序）
    pub cardinalities: Vec<usize>,
}

impl SplitOrderPlan {
    /// 由配置和维度基数解析
    pub fn resolve(dimension_names: &[String], config: &StarTreeConfig, cardinalities: &[usize]) -> Result<Self> {
        if cardinalities.len() != dimension_names.len() {
            return Err(StarTreeError::InvalidConfig(format!(
                "{} cardinalities for {} dimensions",
                cardinalities.len(),
                dimension_names.len()
            )));
        }

        let split_order = match config.split_order.as_deref() {
            Some(names) if !names.is_empty() => {
                let order = enumerate_dimensions(dimension_names, names)?;
                let unique: HashSet<usize> = order.iter().copied().collect();
                if unique.len() != order.len() {
                    return Err(StarTreeError::InvalidConfig(
                        "Duplicate dimension in split order".to_string(),
                    ));
                }
                order
            }
            _ => compute_default_split_order(cardinalities),
        };

        let skip_star_node_creation =
            enumerate_dimensions(dimension_names, &config.skip_star_node_creation)?
                .into_iter()
                .collect();

        Ok(Self {
            split_order,
            skip_star_node_creation,
            cardinalities: cardinalities.to_vec(),
        })
    }

    /// 从 Segment 读取基数后解析
    pub fn from_segment<S: SegmentReader + ?Sized>(
        segment: &S,
        config: &StarTreeConfig,
    ) -> Result<Self> {
        let cardinalities = config
            .dimensions
            .iter()
            .map(|d| segment.cardinality(d))
            .collect::<Result<Vec<_>>>()?;
        Self::resolve(&config.dimensions, config, &cardinalities)
    }

    /// 逗号拼接的切分顺序维度名（写入元数据）
    pub fn split_order_string(&self, dimension_names: &[String]) -> String {
        join_names(dimension_names, self.split_order.iter().copied())
    }

    /// 逗号拼接的 skip-star 维度名，按维度下标排序
    pub fn skip_star_string(&self, dimension_names: &[String]) -> String {
        let mut ids: Vec<usize> = self.skip_star_node_creation.iter().copied().collect();
        ids.sort_unstable();
        join_names(dimension_names, ids.into_iter())
    }
}

fn join_names(dimension_names: &[String], ids: impl Iterator<Item = usize>) -> String {
    ids.filter_map(|id| dimension_names.get(id).map(String::as_str))
        .collect::<Vec<_>>()
        .join(",")
}
