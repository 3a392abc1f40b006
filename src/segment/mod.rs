//! Segment 读取边界
//!
//! Star-Tree 构建只通过 [`SegmentReader`] 访问原始列：
//! - 维度列：字典基数 + 逐行字典 ID
//! - 指标列：按数据类型逐行读取原始值
//!
//! Segment 和字典在整个构建期间只读。

pub mod memory;

pub use memory::{ColumnSpec, InMemorySegment};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Result;

/// 列数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    Int,
    Long,
    Float,
    Double,
    String,
    Bytes,
}

impl DataType {
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Int => "INT",
            DataType::Long => "LONG",
            DataType::Float => "FLOAT",
            DataType::Double => "DOUBLE",
            DataType::String => "STRING",
            DataType::Bytes => "BYTES",
        }
    }

    /// 是否为数值类型
    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Int | DataType::Long | DataType::Float | DataType::Double
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 单元格原始值
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl RawValue {
    pub fn data_type(&self) -> DataType {
        match self {
            RawValue::Int(_) => DataType::Int,
            RawValue::Long(_) => DataType::Long,
            RawValue::Float(_) => DataType::Float,
            RawValue::Double(_) => DataType::Double,
            RawValue::String(_) => DataType::String,
            RawValue::Bytes(_) => DataType::Bytes,
        }
    }

    /// 数值类型转换为 f64，非数值返回 None
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawValue::Int(v) => Some(*v as f64),
            RawValue::Long(v) => Some(*v as f64),
            RawValue::Float(v) => Some(*v as f64),
            RawValue::Double(v) => Some(*v),
            RawValue::String(_) | RawValue::Bytes(_) => None,
        }
    }
}

/// Segment 读取接口（外部协作者）
pub trait SegmentReader {
    /// 原始文档总数
    fn num_docs(&self) -> usize;

    /// 列字典基数
    fn cardinality(&self, column: &str) -> Result<usize>;

    /// 列数据类型
    fn data_type(&self, column: &str) -> Result<DataType>;

    /// 读取某行的字典 ID
    fn dictionary_id(&self, column: &str, doc_id: usize) -> Result<i32>;

    /// 按数据类型读取某行原始值
    fn read_value(&self, column: &str, doc_id: usize, data_type: DataType) -> Result<RawValue>;
}
