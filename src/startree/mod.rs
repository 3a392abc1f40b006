// Star-Tree Module - 多维预聚合索引
//
// 构建链路：
// 1. record      - 记录存储（追加写入）
// 2. aggregation - 聚合函数（闭合枚举）
// 3. split_order - 切分顺序规划
// 4. builder     - 递归切分 + star 节点合成 + 聚合传播
// 5. serializer  - 定长节点表，mmap 写入
// 6. reader      - mmap 只读加载
// 7. index_creator / metadata - 正排索引列与元数据

pub mod aggregation;
pub mod builder;
pub mod index_creator;
pub mod metadata;
pub mod node;
pub mod reader;
pub mod record;
pub mod serializer;
pub mod split_order;
pub mod tree;

pub use aggregation::{AggregationFunctionColumnPair, AggregationFunctionType};
pub use builder::{BuildContext, StarTreeBuilder};
pub use index_creator::{ColumnCreator, FileColumnCreator, ForwardIndexWriter};
pub use metadata::{InMemoryProperties, PropertiesFile, PropertyStore};
pub use node::{NodeArena, NodeId, TreeNode};
pub use reader::{load_all, LoadedStarTree, StarTreeFile};
pub use record::{
    MetricValue, Record, RecordKind, RecordStore, PLACEHOLDER_DICT_ID, ROOT_DIMENSION_ID,
    SKIP_VALUE, STAR_VALUE,
};
pub use serializer::{NodeRecord, NODE_RECORD_SIZE};
pub use split_order::SplitOrderPlan;
pub use tree::StarTree;
