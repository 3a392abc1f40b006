//! Star-Tree 元数据
//!
//! 元数据以 `startree_<index>_<key>` 形式合并进 Segment 属性存储：
//! - docs_count: 记录总数
//! - split_order: 切分顺序维度名（逗号拼接）
//! - skip_star_node_creation: 不创建 star 节点的维度名
//! - agg_func_column_pairs: 函数/列 对名称
//! - max_leaf_records: 叶子阈值
//!
//! 另有全局 `startree_count`。

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::Result;

pub const STAR_TREE_PREFIX: &str = "startree";
pub const STAR_TREE_COUNT: &str = "startree_count";

pub const DOCS_COUNT: &str = "docs_count";
pub const SPLIT_ORDER: &str = "split_order";
pub const SKIP_STAR_NODE_CREATION: &str = "skip_star_node_creation";
pub const AGG_FUNC_COLUMN_PAIRS: &str = "agg_func_column_pairs";
pub const MAX_LEAF_RECORDS: &str = "max_leaf_records";

/// 树标识 `startree_<index>`
pub fn tree_id(tree_index: u32) -> String {
    format!("{}_{}", STAR_TREE_PREFIX, tree_index)
}

/// 树文件名 `startree_<index>.tree`
pub fn tree_file_name(tree_index: u32) -> String {
    format!("{}.tree", tree_id(tree_index))
}

/// 带树标识前缀的元数据键
pub fn metadata_key(tree_index: u32, key: &str) -> String {
    format!("{}_{}", tree_id(tree_index), key)
}

/// Segment 属性存储（外部协作者）
pub trait PropertyStore {
    fn set_property(&mut self, key: &str, value: String);
    fn get_property(&self, key: &str) -> Option<&str>;
    /// 持久化
    fn save(&mut self) -> Result<()>;
}

/// 内存属性存储
#[derive(Debug, Clone, Default)]
pub struct InMemoryProperties {
    properties: BTreeMap<String, String>,
    save_count: usize,
}

impl InMemoryProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// save 调用次数
    pub fn save_count(&self) -> usize {
        self.save_count
    }
}

impl PropertyStore for InMemoryProperties {
    fn set_property(&mut self, key: &str, value: String) {
        self.properties.insert(key.to_string(), value);
    }

    fn get_property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    fn save(&mut self) -> Result<()> {
        self.save_count += 1;
        Ok(())
    }
}

/// `key = value` 属性文件
///
/// 打开时加载已有内容，保存时先写临时文件再 rename。
#[derive(Debug, Clone)]
pub struct PropertiesFile {
    path: PathBuf,
    properties: BTreeMap<String, String>,
}

impl PropertiesFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut properties = BTreeMap::new();

        if path.exists() {
            let content = fs::read_to_string(&path)?;
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    properties.insert(key.trim().to_string(), value.trim().to_string());
                }
            }
        }

        Ok(Self { path, properties })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }
}

impl PropertyStore for PropertiesFile {
    fn set_property(&mut self, key: &str, value: String) {
        self.properties.insert(key.to_string(), value);
    }

    fn get_property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    fn save(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            for (key, value) in &self.properties {
                writeln!(file, "{} = {}", key, value)?;
            }
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        log::debug!("Saved {} properties to {:?}", self.properties.len(), self.path);
        Ok(())
    }
}
