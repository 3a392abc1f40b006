//! 记录存储
//!
//! 构建期间所有行（原始行、star 合并行、节点聚合行）都追加到同一个
//! [`RecordStore`]。只在尾部追加，已分配出去的 `[start, end)` 区间始终有效。

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::ops::Range;

/// 通配（star）维度值，不与任何字典 ID 冲突
pub const STAR_VALUE: i32 = -1;

/// 聚合行中“该维度不适用”
pub const SKIP_VALUE: i32 = -2;

/// 根节点的维度 ID
pub const ROOT_DIMENSION_ID: i32 = -1;

/// 写正排索引时哨兵值替换成的合法字典 ID
pub const PLACEHOLDER_DICT_ID: i32 = 0;

/// 指标值
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Long(i64),
    Double(f64),
    Bytes(Vec<u8>),
    /// DISTINCT_COUNT 的中间结果：去重后的规范化字节
    DistinctSet(BTreeSet<Vec<u8>>),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Long(v) => Some(*v as f64),
            MetricValue::Double(v) => Some(*v),
            MetricValue::Bytes(_) | MetricValue::DistinctSet(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetricValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            MetricValue::Long(_) => "LONG",
            MetricValue::Double(_) => "DOUBLE",
            MetricValue::Bytes(_) => "BYTES",
            MetricValue::DistinctSet(_) => "DISTINCT_SET",
        }
    }
}

/// 行来源：原始列值 or 聚合函数输出
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Raw,
    Aggregated,
}

/// 单行记录
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// 维度字典 ID（长度 = 维度数）
    pub dimensions: Vec<i32>,
    /// 每个 函数/列 对一个值
    pub metrics: Vec<MetricValue>,
    pub kind: RecordKind,
}

impl Record {
    pub fn raw(dimensions: Vec<i32>, metrics: Vec<MetricValue>) -> Self {
        Self {
            dimensions,
            metrics,
            kind: RecordKind::Raw,
        }
    }

    pub fn aggregated(dimensions: Vec<i32>, metrics: Vec<MetricValue>) -> Self {
        Self {
            dimensions,
            metrics,
            kind: RecordKind::Aggregated,
        }
    }
}

/// 追加式记录存储
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: Vec<Record>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
        }
    }

    /// 追加一行，返回其 doc id
    #[inline]
    pub fn push(&mut self, record: Record) -> usize {
        self.records.push(record);
        self.records.len() - 1
    }

    /// 批量追加，返回新区间
    pub fn extend(&mut self, records: Vec<Record>) -> Range<usize> {
        let start = self.records.len();
        self.records.extend(records);
        start..self.records.len()
    }

    #[inline]
    pub fn get(&self, doc_id: usize) -> Option<&Record> {
        self.records.get(doc_id)
    }

    /// 区间切片（越界时截断）
    pub fn range(&self, start: usize, end: usize) -> &[Record] {
        let end = end.min(self.records.len());
        let start = start.min(end);
        &self.records[start..end]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }
}

/// 按 split order 比较维度，再按剩余维度下标比较
///
/// `sort_order` 必须覆盖全部维度（见 [`full_sort_order`]）。
#[inline]
pub fn compare_dimensions(a: &[i32], b: &[i32], sort_order: &[usize]) -> Ordering {
    for &dim in sort_order {
        match a[dim].cmp(&b[dim]) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// split order 之后补齐未参与切分的维度
pub fn full_sort_order(split_order: &[usize], dimension_count: usize) -> Vec<usize> {
    let mut order = split_order.to_vec();
    order.extend((0..dimension_count).filter(|d| !split_order.contains(d)));
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_keeps_ranges_valid() {
        let mut store = RecordStore::new();
        let first = store.extend(vec![
            Record::raw(vec![0, 1], vec![MetricValue::Long(1)]),
            Record::raw(vec![1, 1], vec![MetricValue::Long(1)]),
        ]);
        assert_eq!(first, 0..2);

        let id = store.push(Record::aggregated(vec![STAR_VALUE, 1], vec![MetricValue::Long(2)]));
        assert_eq!(id, 2);

        // 追加后原区间仍指向同样的行
        assert_eq!(store.range(first.start, first.end)[1].dimensions, vec![1, 1]);
        assert_eq!(store.range(1, 100).len(), 2);
        assert_eq!(store.get(2).map(|r| r.kind), Some(RecordKind::Aggregated));
    }

    #[test]
    fn test_compare_dimensions_follows_sort_order() {
        let order = full_sort_order(&[1], 3);
        assert_eq!(order, vec![1, 0, 2]);

        assert_eq!(compare_dimensions(&[5, 0, 0], &[0, 1, 0], &order), Ordering::Less);
        assert_eq!(compare_dimensions(&[0, 1, 3], &[0, 1, 2], &order), Ordering::Greater);
        assert_eq!(compare_dimensions(&[2, 2, 2], &[2, 2, 2], &order), Ordering::Equal);
    }
}
