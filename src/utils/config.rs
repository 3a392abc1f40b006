//! 配置管理模块

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::startree::AggregationFunctionColumnPair;
use crate::{Result, StarTreeError};

/// 单棵 Star-Tree 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StarTreeConfig {
    /// 参与构建的维度列（顺序即维度下标）
    pub dimensions: Vec<String>,

    /// 切分顺序，为空时按基数降序自动推导
    #[serde(default)]
    pub split_order: Option<Vec<String>>,

    /// 不创建 star 节点的维度
    #[serde(default)]
    pub skip_star_node_creation: Vec<String>,

    /// `<FUNCTION>_<column>` 列表，如 `COUNT_*`、`SUM_revenue`
    #[serde(default = "default_function_column_pairs")]
    pub function_column_pairs: Vec<String>,

    /// 叶子节点最大记录数
    #[serde(default = "default_max_leaf_records")]
    pub max_leaf_records: usize,

    /// 同一 Segment 内的 Star-Tree 序号
    #[serde(default)]
    pub tree_index: u32,
}

impl Default for StarTreeConfig {
    fn default() -> Self {
        Self {
            dimensions: Vec::new(),
            split_order: None,
            skip_star_node_creation: Vec::new(),
            function_column_pairs: default_function_column_pairs(),
            max_leaf_records: default_max_leaf_records(),
            tree_index: 0,
        }
    }
}

impl StarTreeConfig {
    /// 解析 函数/列 对
    pub fn aggregation_pairs(&self) -> Result<Vec<AggregationFunctionColumnPair>> {
        self.function_column_pairs
            .iter()
            .map(|name| AggregationFunctionColumnPair::from_column_name(name))
            .collect()
    }

    /// 基本校验（不依赖 Segment）
    pub fn validate(&self) -> Result<()> {
        if self.dimensions.is_empty() {
            return Err(StarTreeError::InvalidConfig(
                "At least one dimension is required".to_string(),
            ));
        }
        if self.function_column_pairs.is_empty() {
            return Err(StarTreeError::InvalidConfig(
                "At least one function column pair is required".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for dim in &self.dimensions {
            if !seen.insert(dim.as_str()) {
                return Err(StarTreeError::InvalidConfig(format!(
                    "Duplicate dimension: {}",
                    dim
                )));
            }
        }
        self.aggregation_pairs().map(|_| ())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        toml::from_str(&content)
            .map_err(|e| StarTreeError::InvalidConfig(format!("Failed to parse config file: {}", e)))
    }
}

/// 构建程序配置文件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderFileConfig {
    /// Segment JSON 文件
    pub segment_path: PathBuf,

    /// 输出目录
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,

    /// Segment 元数据属性文件
    #[serde(default = "default_metadata_file")]
    pub metadata_file: PathBuf,

    pub star_tree: StarTreeConfig,
}

impl BuilderFileConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        toml::from_str(&content)
            .map_err(|e| StarTreeError::InvalidConfig(format!("Failed to parse config file: {}", e)))
    }

    pub fn load_default() -> Result<Self> {
        Self::load_from_file("config/startree.toml")
    }
}

// 默认值函数
fn default_function_column_pairs() -> Vec<String> {
    vec!["COUNT_*".to_string()]
}
fn default_max_leaf_records() -> usize {
    10000
}
fn default_out_dir() -> PathBuf {
    PathBuf::from("output")
}
fn default_metadata_file() -> PathBuf {
    PathBuf::from("output/metadata.properties")
}
