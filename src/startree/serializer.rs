//! Star-Tree 二进制序列化
//!
//! 文件格式（小端）：
//! ```text
//! [dimension_count: u32]
//! [name_len: u32][name: utf8] × dimension_count
//! [node_count: u32]
//! [NodeRecord: 32 bytes] × node_count
//! ```
//!
//! 节点按广度优先排列，同一父节点的子节点连续且按维度值升序
//! （star 在最前），父节点记录子节点下标区间 `[start, end)`。

use memmap2::{MmapMut, MmapOptions};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::Path;

use super::node::{NodeArena, NodeId};
use crate::{Result, StarTreeError};

/// 单个节点记录字节数（8 × i32）
pub const NODE_RECORD_SIZE: usize = 32;

/// 定长节点记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRecord {
    pub dimension_id: i32,
    pub dimension_value: i32,
    pub start_doc_id: i32,
    pub end_doc_id: i32,
    pub aggregated_doc_id: i32,
    /// 叶子为 -1
    pub child_dimension_id: i32,
    /// 叶子为 -1
    pub children_start_index: i32,
    /// 叶子为 -1
    pub children_end_index: i32,
}

impl NodeRecord {
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children_start_index < 0
    }

    pub fn num_children(&self) -> usize {
        if self.is_leaf() {
            0
        } else {
            (self.children_end_index - self.children_start_index) as usize
        }
    }

    pub fn to_bytes(&self) -> [u8; NODE_RECORD_SIZE] {
        let mut bytes = [0u8; NODE_RECORD_SIZE];
        let fields = [
            self.dimension_id,
            self.dimension_value,
            self.start_doc_id,
            self.end_doc_id,
            self.aggregated_doc_id,
            self.child_dimension_id,
            self.children_start_index,
            self.children_end_index,
        ];
        for (i, field) in fields.iter().enumerate() {
            bytes[i * 4..i * 4 + 4].copy_from_slice(&field.to_le_bytes());
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < NODE_RECORD_SIZE {
            return Err(StarTreeError::Corrupted("Invalid node record size".to_string()));
        }
        let field = |i: usize| {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&bytes[i * 4..i * 4 + 4]);
            i32::from_le_bytes(buf)
        };
        Ok(Self {
            dimension_id: field(0),
            dimension_value: field(1),
            start_doc_id: field(2),
            end_doc_id: field(3),
            aggregated_doc_id: field(4),
            child_dimension_id: field(5),
            children_start_index: field(6),
            children_end_index: field(7),
        })
    }
}

/// Header 字节数
pub fn header_size(dimension_names: &[String]) -> usize {
    4 + dimension_names.iter().map(|n| 4 + n.len()).sum::<usize>() + 4
}

fn to_i32(value: usize, what: &str) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| StarTreeError::Serialization(format!("{} {} exceeds i32 range", what, value)))
}

/// 广度优先排列节点并生成定长记录
pub fn layout_nodes(arena: &NodeArena, root: NodeId) -> Result<Vec<NodeRecord>> {
    let order = arena.breadth_first(root);
    let index: HashMap<NodeId, usize> = order.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    order
        .iter()
        .map(|&id| {
            let node = arena.get(id);
            let aggregated_doc_id = node.aggregated_doc_id.ok_or_else(|| {
                StarTreeError::Serialization(format!("Node {} has no aggregated doc", id))
            })?;

            let children = arena.children(id);
            let (child_dimension_id, children_start_index, children_end_index) =
                match (children.first(), children.last()) {
                    (Some(first), Some(last)) => (
                        node.child_dimension_id,
                        to_i32(index[first], "child index")?,
                        to_i32(index[last] + 1, "child index")?,
                    ),
                    _ => (-1, -1, -1),
                };

            Ok(NodeRecord {
                dimension_id: node.dimension_id,
                dimension_value: node.dimension_value,
                start_doc_id: to_i32(node.start_doc_id, "doc id")?,
                end_doc_id: to_i32(node.end_doc_id, "doc id")?,
                aggregated_doc_id: to_i32(aggregated_doc_id, "doc id")?,
                child_dimension_id,
                children_start_index,
                children_end_index,
            })
        })
        .collect()
}

/// 可写映射区域，任何退出路径都会 flush 后释放
struct MappedRegion {
    mmap: Option<MmapMut>,
}

impl MappedRegion {
    fn as_mut(&mut self) -> &mut [u8] {
        self.mmap.as_deref_mut().unwrap_or_default()
    }

    /// 显式 flush，返回错误
    fn finish(mut self) -> Result<()> {
        if let Some(mmap) = self.mmap.take() {
            mmap.flush()?;
        }
        Ok(())
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        if let Some(mmap) = self.mmap.take() {
            if let Err(e) = mmap.flush() {
                log::warn!("Flush star-tree mmap on drop failed: {}", e);
            }
        }
    }
}

/// 写出 Star-Tree 文件，返回文件字节数
pub fn write_tree<P: AsRef<Path>>(
    path: P,
    dimension_names: &[String],
    arena: &NodeArena,
    root: NodeId,
) -> Result<u64> {
    let records = layout_nodes(arena, root)?;
    let header_bytes = header_size(dimension_names);
    let total_bytes = header_bytes + records.len() * NODE_RECORD_SIZE;

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path.as_ref())?;
    file.set_len(total_bytes as u64)?;

    let mmap = unsafe { MmapOptions::new().len(total_bytes).map_mut(&file)? };
    let mut region = MappedRegion { mmap: Some(mmap) };
    let buf = region.as_mut();

    let mut offset = 0usize;
    let mut put = |bytes: &[u8]| {
        buf[offset..offset + bytes.len()].copy_from_slice(bytes);
        offset += bytes.len();
    };

    put(&(dimension_names.len() as u32).to_le_bytes());
    for name in dimension_names {
        put(&(name.len() as u32).to_le_bytes());
        put(name.as_bytes());
    }
    put(&(records.len() as u32).to_le_bytes());
    for record in &records {
        put(&record.to_bytes());
    }

    region.finish()?;
    log::info!(
        "Serialized {} star-tree nodes ({} bytes) to {:?}",
        records.len(),
        total_bytes,
        path.as_ref()
    );
    Ok(total_bytes as u64)
}
