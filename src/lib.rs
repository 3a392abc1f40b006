//! # STARTREE-RS
//!
//! 列式 Segment 的 Star-Tree 预聚合索引构建器
//!
//! ## 核心能力
//!
//! - **记录存储**: 维度字典 ID + 指标值，追加写入
//! - **聚合函数**: COUNT / MIN / MAX / SUM / DISTINCT_COUNT
//! - **切分顺序**: 显式配置或按基数降序自动推导
//! - **树构建**: 按维度递归切分，合成 star (通配) 节点
//! - **聚合传播**: 后序遍历，为每个节点生成一条聚合记录
//! - **二进制序列化**: 固定 Header + 定长节点表，mmap 写入
//!
//! ## 架构设计
//!
//! ```text
//! SegmentReader (segment/)
//!     ↓ 字典 ID + 原始指标
//! RecordStore (startree/record.rs)
//!     ↓ 排序 + 合并
//! construct (startree/builder.rs) ← SplitOrderPlan / AggregationFunctionType
//!     ↓
//! propagate (startree/builder.rs)
//!     ↓
//! serializer / index_creator / metadata
//! ```

// ============================================================================
// 内部模块
// ============================================================================

/// Segment 读取边界（字典、列值）
pub mod segment;

/// Star-Tree 构建与序列化
pub mod startree;

/// 工具模块（配置、构建统计）
pub mod utils;

// ============================================================================
// 重导出常用类型
// ============================================================================

pub use segment::{DataType, InMemorySegment, RawValue, SegmentReader};
pub use startree::{
    AggregationFunctionColumnPair, AggregationFunctionType, StarTree, StarTreeBuilder,
    StarTreeFile,
};
pub use utils::config::StarTreeConfig;

// ============================================================================
// 全局错误类型
// ============================================================================

/// Star-Tree 错误类型
#[derive(Debug, thiserror::Error)]
pub enum StarTreeError {
    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Unsupported data type {data_type} for column {column}")]
    UnsupportedType { column: String, data_type: String },

    #[error("Unknown dimension: {0}")]
    UnknownDimension(String),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Unknown aggregation function: {0}")]
    UnknownFunction(String),

    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    #[error("Records not sorted by split order at doc {0}")]
    UnsortedInput(usize),

    #[error("Aggregation over empty input: {0}")]
    EmptyAggregation(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Corrupted star-tree file: {0}")]
    Corrupted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, StarTreeError>;
