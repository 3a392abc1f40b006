// mmap-based Star-Tree 文件读取
//
// 查询时只需映射文件，按下标随机访问节点：
// - 节点记录定长，偏移 = header + index × 32
// - 子节点连续存放且按维度值有序，可二分查找
//
// `load_all` 从 Segment 元数据读出 startree_count 及每棵树的参数，逐个打开树文件。

use memmap2::Mmap;
use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};

use super::aggregation::AggregationFunctionColumnPair;
use super::metadata::{self, PropertyStore};
use super::serializer::{NodeRecord, NODE_RECORD_SIZE};
use crate::{Result, StarTreeError};

/// 只读 Star-Tree 文件
pub struct StarTreeFile {
    mmap: Mmap,
    dimension_names: Vec<String>,
    node_count: usize,
    nodes_offset: usize,
    file_path: PathBuf,
}

impl StarTreeFile {
    /// 打开 Star-Tree 文件（使用 mmap）
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mmap = unsafe { memmap2::MmapOptions::new().map(&file)? };

        let read_u32 = |offset: usize| -> Result<u32> {
            mmap.get(offset..offset + 4)
                .and_then(|b| b.try_into().ok())
                .map(u32::from_le_bytes)
                .ok_or_else(|| StarTreeError::Corrupted(format!("Truncated header at {}", offset)))
        };

        let dimension_count = read_u32(0)? as usize;
        let mut offset = 4;
        let mut dimension_names = Vec::with_capacity(dimension_count.min(1024));
        for _ in 0..dimension_count {
            let len = read_u32(offset)? as usize;
            offset += 4;
            let bytes = mmap
                .get(offset..offset + len)
                .ok_or_else(|| StarTreeError::Corrupted("Truncated dimension name".to_string()))?;
            let name = std::str::from_utf8(bytes)
                .map_err(|e| StarTreeError::Corrupted(format!("Invalid dimension name: {}", e)))?;
            dimension_names.push(name.to_string());
            offset += len;
        }

        let node_count = read_u32(offset)? as usize;
        let nodes_offset = offset + 4;
        let expected = nodes_offset + node_count * NODE_RECORD_SIZE;
        if mmap.len() != expected {
            return Err(StarTreeError::Corrupted(format!(
                "File size {} does not match {} nodes (expected {} bytes)",
                mmap.len(),
                node_count,
                expected
            )));
        }

        Ok(Self {
            mmap,
            dimension_names,
            node_count,
            nodes_offset,
            file_path: path.as_ref().to_path_buf(),
        })
    }

    pub fn dimension_names(&self) -> &[String] {
        &self.dimension_names
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// 读取第 `index` 个节点
    pub fn node(&self, index: usize) -> Result<NodeRecord> {
        if index >= self.node_count {
            return Err(StarTreeError::Corrupted(format!(
                "Node index {} out of range ({} nodes)",
                index, self.node_count
            )));
        }
        let offset = self.nodes_offset + index * NODE_RECORD_SIZE;
        NodeRecord::from_bytes(&self.mmap[offset..offset + NODE_RECORD_SIZE])
    }

    /// 根节点（下标 0）
    pub fn root(&self) -> Result<NodeRecord> {
        self.node(0)
    }

    /// 子节点下标区间
    pub fn children(&self, index: usize) -> Result<Range<usize>> {
        let node = self.node(index)?;
        if node.is_leaf() {
            return Ok(0..0);
        }
        let range = node.children_start_index as usize..node.children_end_index as usize;
        if range.start > range.end || range.end > self.node_count {
            return Err(StarTreeError::Corrupted(format!(
                "Node {} has invalid children range {:?}",
                index, range
            )));
        }
        Ok(range)
    }

    /// 按维度值查找子节点（`STAR_VALUE` 查找 star 子节点）
    pub fn find_child(&self, index: usize, dimension_value: i32) -> Result<Option<usize>> {
        let range = self.children(index)?;
        let (mut lo, mut hi) = (range.start, range.end);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let value = self.node(mid)?.dimension_value;
            if value == dimension_value {
                return Ok(Some(mid));
            } else if value < dimension_value {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(None)
    }

    /// 获取文件大小
    pub fn file_size(&self) -> usize {
        self.mmap.len()
    }
}

/// 按元数据加载的一棵 Star-Tree
pub struct LoadedStarTree {
    pub tree_index: u32,
    pub docs_count: usize,
    pub split_order: Vec<String>,
    pub skip_star_node_creation: Vec<String>,
    pub pairs: Vec<AggregationFunctionColumnPair>,
    pub max_leaf_records: usize,
    pub file: StarTreeFile,
}

/// 读取 `startree_count` 及每棵树的元数据，打开 `<out_dir>/startree_<i>.tree`
///
/// 没有 `startree_count` 时返回空列表。
pub fn load_all<P: PropertyStore + ?Sized>(properties: &P, out_dir: &Path) -> Result<Vec<LoadedStarTree>> {
    let count = match properties.get_property(metadata::STAR_TREE_COUNT) {
        Some(value) => parse_number::<u32>(metadata::STAR_TREE_COUNT, value)?,
        None => return Ok(Vec::new()),
    };

    let mut trees = Vec::with_capacity(count as usize);
    for tree_index in 0..count {
        let docs_count = parse_number(
            metadata::DOCS_COUNT,
            required(properties, tree_index, metadata::DOCS_COUNT)?,
        )?;
        let max_leaf_records = parse_number(
            metadata::MAX_LEAF_RECORDS,
            required(properties, tree_index, metadata::MAX_LEAF_RECORDS)?,
        )?;
        let split_order = split_names(required(properties, tree_index, metadata::SPLIT_ORDER)?);
        let skip_star_node_creation = split_names(
            properties
                .get_property(&metadata::metadata_key(tree_index, metadata::SKIP_STAR_NODE_CREATION))
                .unwrap_or(""),
        );
        let pairs = split_names(required(properties, tree_index, metadata::AGG_FUNC_COLUMN_PAIRS)?)
            .iter()
            .map(|name| AggregationFunctionColumnPair::from_column_name(name))
            .collect::<Result<Vec<_>>>()?;

        let file = StarTreeFile::open(out_dir.join(metadata::tree_file_name(tree_index)))?;
        if let Some(missing) = split_order
            .iter()
            .find(|name| !file.dimension_names().contains(name))
        {
            return Err(StarTreeError::Corrupted(format!(
                "Split dimension {} not in {:?}",
                missing,
                file.file_path()
            )));
        }

        log::debug!(
            "Loaded star-tree {} with {} nodes",
            metadata::tree_id(tree_index),
            file.node_count()
        );
        trees.push(LoadedStarTree {
            tree_index,
            docs_count,
            split_order,
            skip_star_node_creation,
            pairs,
            max_leaf_records,
            file,
        });
    }
    Ok(trees)
}

fn required<'a, P: PropertyStore + ?Sized>(properties: &'a P, tree_index: u32, key: &str) -> Result<&'a str> {
    let key = metadata::metadata_key(tree_index, key);
    properties
        .get_property(&key)
        .ok_or_else(|| StarTreeError::Corrupted(format!("Missing metadata {}", key)))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| StarTreeError::Corrupted(format!("Invalid {}: {}", key, value)))
}

fn split_names(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
