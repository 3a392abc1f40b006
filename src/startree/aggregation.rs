//! 聚合函数
//!
//! 闭合枚举 [`AggregationFunctionType`]，每种函数提供两种归约：
//! - `aggregate_raw`: 对原始列值归约
//! - `aggregate_pre_aggregated`: 对已有聚合结果归约（必须满足结合律，
//!   且与对原始值并集直接 `aggregate_raw` 结果一致）
//!
//! 只有变长字节编码的函数（DISTINCT_COUNT）支持 `serialize`/`deserialize`，
//! 其余返回 `NotSupported`，列写入器据此选择编码路径。

use std::collections::BTreeSet;
use std::fmt;

use super::record::{MetricValue, Record, RecordKind};
use crate::segment::{DataType, RawValue};
use crate::{Result, StarTreeError};

/// COUNT 不读取源列
pub const COUNT_STAR_COLUMN: &str = "*";

/// 聚合函数类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AggregationFunctionType {
    Count,
    Min,
    Max,
    Sum,
    DistinctCount,
}

impl AggregationFunctionType {
    pub const ALL: [AggregationFunctionType; 5] = [
        AggregationFunctionType::Count,
        AggregationFunctionType::Min,
        AggregationFunctionType::Max,
        AggregationFunctionType::Sum,
        AggregationFunctionType::DistinctCount,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AggregationFunctionType::Count => "COUNT",
            AggregationFunctionType::Min => "MIN",
            AggregationFunctionType::Max => "MAX",
            AggregationFunctionType::Sum => "SUM",
            AggregationFunctionType::DistinctCount => "DISTINCT_COUNT",
        }
    }

    /// 按名称查找（大小写不敏感）
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| StarTreeError::UnknownFunction(name.to_string()))
    }

    /// 输出值类型
    pub fn value_type(&self) -> DataType {
        match self {
            AggregationFunctionType::Count => DataType::Long,
            AggregationFunctionType::Min
            | AggregationFunctionType::Max
            | AggregationFunctionType::Sum => DataType::Double,
            AggregationFunctionType::DistinctCount => DataType::Bytes,
        }
    }

    /// 单条序列化结果的最大字节数，变长编码返回 None
    pub fn longest_entry_size(&self) -> Option<usize> {
        match self {
            AggregationFunctionType::Count => Some(std::mem::size_of::<i64>()),
            AggregationFunctionType::Min
            | AggregationFunctionType::Max
            | AggregationFunctionType::Sum => Some(std::mem::size_of::<f64>()),
            AggregationFunctionType::DistinctCount => None,
        }
    }

    /// 原始单元格 → 原始行中的指标值
    ///
    /// 数值函数遇到非数值列返回 `UnsupportedType`。
    pub fn raw_input(&self, column: &str, value: RawValue) -> Result<MetricValue> {
        match self {
            AggregationFunctionType::Count => Ok(MetricValue::Long(1)),
            AggregationFunctionType::DistinctCount => Ok(MetricValue::Bytes(canonical_bytes(&value))),
            _ => match value {
                RawValue::Int(v) => Ok(MetricValue::Long(v as i64)),
                RawValue::Long(v) => Ok(MetricValue::Long(v)),
                RawValue::Float(v) => Ok(MetricValue::Double(v as f64)),
                RawValue::Double(v) => Ok(MetricValue::Double(v)),
                other => Err(StarTreeError::UnsupportedType {
                    column: column.to_string(),
                    data_type: other.data_type().to_string(),
                }),
            },
        }
    }

    /// 对原始值归约
    pub fn aggregate_raw(&self, values: &[MetricValue]) -> Result<MetricValue> {
        match self {
            AggregationFunctionType::Count => Ok(MetricValue::Long(values.len() as i64)),
            AggregationFunctionType::Min => {
                fold_numeric(self, values, f64::min).map(MetricValue::Double)
            }
            AggregationFunctionType::Max => {
                fold_numeric(self, values, f64::max).map(MetricValue::Double)
            }
            AggregationFunctionType::Sum => {
                let mut sum = 0.0;
                for v in values {
                    sum += numeric(self, v)?;
                }
                Ok(MetricValue::Double(sum))
            }
            AggregationFunctionType::DistinctCount => {
                let mut set = BTreeSet::new();
                for v in values {
                    set.insert(canonical_metric_bytes(self, v)?);
                }
                Ok(MetricValue::DistinctSet(set))
            }
        }
    }

    /// 对已聚合结果归约
    pub fn aggregate_pre_aggregated(&self, values: &[MetricValue]) -> Result<MetricValue> {
        match self {
            AggregationFunctionType::Count => {
                let mut count = 0i64;
                for v in values {
                    count += v.as_i64().ok_or_else(|| mismatch(self, v))?;
                }
                Ok(MetricValue::Long(count))
            }
            AggregationFunctionType::Min => {
                fold_numeric(self, values, f64::min).map(MetricValue::Double)
            }
            AggregationFunctionType::Max => {
                fold_numeric(self, values, f64::max).map(MetricValue::Double)
            }
            AggregationFunctionType::Sum => {
                let mut sum = 0.0;
                for v in values {
                    sum += numeric(self, v)?;
                }
                Ok(MetricValue::Double(sum))
            }
            AggregationFunctionType::DistinctCount => {
                let mut set = BTreeSet::new();
                for v in values {
                    match v {
                        MetricValue::DistinctSet(s) => set.extend(s.iter().cloned()),
                        MetricValue::Bytes(b) => match self.deserialize(b)? {
                            MetricValue::DistinctSet(s) => set.extend(s),
                            other => return Err(mismatch(self, &other)),
                        },
                        other => return Err(mismatch(self, other)),
                    }
                }
                Ok(MetricValue::DistinctSet(set))
            }
        }
    }

    /// 变长字节编码：`u32 个数` + 每项 `u32 长度 + 字节`
    pub fn serialize(&self, value: &MetricValue) -> Result<Vec<u8>> {
        match (self, value) {
            (AggregationFunctionType::DistinctCount, MetricValue::DistinctSet(set)) => {
                let mut bytes = Vec::with_capacity(4 + set.iter().map(|e| 4 + e.len()).sum::<usize>());
                bytes.extend_from_slice(&(set.len() as u32).to_le_bytes());
                for entry in set {
                    bytes.extend_from_slice(&(entry.len() as u32).to_le_bytes());
                    bytes.extend_from_slice(entry);
                }
                Ok(bytes)
            }
            (AggregationFunctionType::DistinctCount, other) => Err(mismatch(self, other)),
            _ => Err(StarTreeError::NotSupported(format!(
                "{} uses native fixed-width encoding",
                self.name()
            ))),
        }
    }

    pub fn deserialize(&self, bytes: &[u8]) -> Result<MetricValue> {
        if *self != AggregationFunctionType::DistinctCount {
            return Err(StarTreeError::NotSupported(format!(
                "{} uses native fixed-width encoding",
                self.name()
            )));
        }

        let corrupted = || StarTreeError::Corrupted("Truncated DISTINCT_COUNT entry".to_string());
        let read_u32 = |offset: usize| -> Result<u32> {
            bytes
                .get(offset..offset + 4)
                .and_then(|b| b.try_into().ok())
                .map(u32::from_le_bytes)
                .ok_or_else(corrupted)
        };

        let count = read_u32(0)? as usize;
        let mut offset = 4;
        let mut set = BTreeSet::new();
        for _ in 0..count {
            let len = read_u32(offset)? as usize;
            offset += 4;
            let entry = bytes.get(offset..offset + len).ok_or_else(corrupted)?;
            set.insert(entry.to_vec());
            offset += len;
        }
        Ok(MetricValue::DistinctSet(set))
    }
}

impl fmt::Display for AggregationFunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 函数/列 对
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregationFunctionColumnPair {
    pub function: AggregationFunctionType,
    pub column: String,
}

impl AggregationFunctionColumnPair {
    pub fn new(function: AggregationFunctionType, column: impl Into<String>) -> Self {
        let column = column.into();
        let column = if function == AggregationFunctionType::Count {
            COUNT_STAR_COLUMN.to_string()
        } else {
            column
        };
        Self { function, column }
    }

    pub fn count_star() -> Self {
        Self::new(AggregationFunctionType::Count, COUNT_STAR_COLUMN)
    }

    /// 规范名 `<FUNCTION>_<column>`
    pub fn column_name(&self) -> String {
        format!("{}_{}", self.function.name(), self.column)
    }

    /// 解析规范名，函数名取最长匹配前缀（DISTINCT_COUNT 自身含下划线）
    pub fn from_column_name(name: &str) -> Result<Self> {
        let function = AggregationFunctionType::ALL
            .iter()
            .copied()
            .filter(|f| {
                name.len() > f.name().len() + 1
                    && name
                        .get(..f.name().len())
                        .map_or(false, |prefix| prefix.eq_ignore_ascii_case(f.name()))
                    && name.as_bytes()[f.name().len()] == b'_'
            })
            .max_by_key(|f| f.name().len())
            .ok_or_else(|| StarTreeError::UnknownFunction(name.to_string()))?;

        Ok(Self::new(function, &name[function.name().len() + 1..]))
    }

    /// 源列（COUNT 无源列）
    pub fn source_column(&self) -> Option<&str> {
        match self.function {
            AggregationFunctionType::Count => None,
            _ => Some(&self.column),
        }
    }
}

impl fmt::Display for AggregationFunctionColumnPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.function.name(), self.column)
    }
}

/// 对一组记录按 函数/列 对逐列归约
///
/// 原始行先用 `aggregate_raw` 归约成一个中间值，再与聚合行一起
/// `aggregate_pre_aggregated`，因此混合来源的区间也能得到正确结果。
pub fn aggregate_records<'a, I>(
    records: I,
    pairs: &[AggregationFunctionColumnPair],
) -> Result<Vec<MetricValue>>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut raw: Vec<Vec<MetricValue>> = vec![Vec::new(); pairs.len()];
    let mut aggregated: Vec<Vec<MetricValue>> = vec![Vec::new(); pairs.len()];

    for record in records {
        if record.metrics.len() != pairs.len() {
            return Err(StarTreeError::Corrupted(format!(
                "Record has {} metrics, expected {}",
                record.metrics.len(),
                pairs.len()
            )));
        }
        let bucket = match record.kind {
            RecordKind::Raw => &mut raw,
            RecordKind::Aggregated => &mut aggregated,
        };
        for (j, value) in record.metrics.iter().enumerate() {
            bucket[j].push(value.clone());
        }
    }

    pairs
        .iter()
        .enumerate()
        .map(|(j, pair)| {
            let function = pair.function;
            if aggregated[j].is_empty() {
                return function.aggregate_raw(&raw[j]);
            }
            let mut values = std::mem::take(&mut aggregated[j]);
            if !raw[j].is_empty() {
                values.push(function.aggregate_raw(&raw[j])?);
            }
            function.aggregate_pre_aggregated(&values)
        })
        .collect()
}

fn numeric(function: &AggregationFunctionType, value: &MetricValue) -> Result<f64> {
    value.as_f64().ok_or_else(|| mismatch(function, value))
}

/// MIN/MAX 空输入没有合法结果，不返回 ±inf 哨兵
fn fold_numeric(
    function: &AggregationFunctionType,
    values: &[MetricValue],
    op: fn(f64, f64) -> f64,
) -> Result<f64> {
    let (first, rest) = values
        .split_first()
        .ok_or_else(|| StarTreeError::EmptyAggregation(function.name().to_string()))?;
    let mut acc = numeric(function, first)?;
    for v in rest {
        acc = op(acc, numeric(function, v)?);
    }
    Ok(acc)
}

fn mismatch(function: &AggregationFunctionType, value: &MetricValue) -> StarTreeError {
    StarTreeError::TypeMismatch(format!(
        "{} cannot aggregate {} value",
        function.name(),
        value.type_name()
    ))
}

fn canonical_bytes(value: &RawValue) -> Vec<u8> {
    match value {
        RawValue::Int(v) => (*v as i64).to_le_bytes().to_vec(),
        RawValue::Long(v) => v.to_le_bytes().to_vec(),
        RawValue::Float(v) => (*v as f64).to_le_bytes().to_vec(),
        RawValue::Double(v) => v.to_le_bytes().to_vec(),
        RawValue::String(s) => s.as_bytes().to_vec(),
        RawValue::Bytes(b) => b.clone(),
    }
}

fn canonical_metric_bytes(function: &AggregationFunctionType, value: &MetricValue) -> Result<Vec<u8>> {
    match value {
        MetricValue::Long(v) => Ok(v.to_le_bytes().to_vec()),
        MetricValue::Double(v) => Ok(v.to_le_bytes().to_vec()),
        MetricValue::Bytes(b) => Ok(b.clone()),
        MetricValue::DistinctSet(_) => Err(mismatch(function, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doubles(values: &[f64]) -> Vec<MetricValue> {
        values.iter().map(|v| MetricValue::Double(*v)).collect()
    }

    #[test]
    fn test_count() {
        let f = AggregationFunctionType::Count;
        let raw = vec![MetricValue::Long(1); 4];
        assert_eq!(f.aggregate_raw(&raw).unwrap(), MetricValue::Long(4));
        assert_eq!(f.aggregate_raw(&[]).unwrap(), MetricValue::Long(0));
        assert_eq!(
            f.aggregate_pre_aggregated(&[MetricValue::Long(3), MetricValue::Long(2)])
                .unwrap(),
            MetricValue::Long(5)
        );
    }

    #[test]
    fn test_min_max_sum() {
        let values = doubles(&[3.0, -1.5, 7.25]);
        assert_eq!(
            AggregationFunctionType::Min.aggregate_raw(&values).unwrap(),
            MetricValue::Double(-1.5)
        );
        assert_eq!(
            AggregationFunctionType::Max.aggregate_raw(&values).unwrap(),
            MetricValue::Double(7.25)
        );
        assert_eq!(
            AggregationFunctionType::Sum.aggregate_raw(&values).unwrap(),
            MetricValue::Double(8.75)
        );
        // Long 原始值同样参与数值归约
        assert_eq!(
            AggregationFunctionType::Max
                .aggregate_raw(&[MetricValue::Long(9), MetricValue::Double(2.0)])
                .unwrap(),
            MetricValue::Double(9.0)
        );
    }

    #[test]
    fn test_min_empty_input_is_error() {
        assert!(matches!(
            AggregationFunctionType::Min.aggregate_raw(&[]),
            Err(StarTreeError::EmptyAggregation(_))
        ));
        assert!(matches!(
            AggregationFunctionType::Max.aggregate_pre_aggregated(&[]),
            Err(StarTreeError::EmptyAggregation(_))
        ));
        assert_eq!(
            AggregationFunctionType::Sum.aggregate_pre_aggregated(&[]).unwrap(),
            MetricValue::Double(0.0)
        );
    }

    #[test]
    fn test_pre_aggregated_matches_raw_union() {
        let part_a = doubles(&[4.0, 1.0]);
        let part_b = doubles(&[6.0, 2.0, 0.5]);
        let union: Vec<MetricValue> = part_a.iter().chain(part_b.iter()).cloned().collect();

        for f in [
            AggregationFunctionType::Min,
            AggregationFunctionType::Max,
            AggregationFunctionType::Sum,
            AggregationFunctionType::Count,
        ] {
            let partials = vec![
                f.aggregate_raw(&part_a).unwrap(),
                f.aggregate_raw(&part_b).unwrap(),
            ];
            assert_eq!(
                f.aggregate_pre_aggregated(&partials).unwrap(),
                f.aggregate_raw(&union).unwrap(),
                "{}",
                f
            );
        }
    }

    #[test]
    fn test_distinct_count_serialize_round_trip() {
        let f = AggregationFunctionType::DistinctCount;
        let raw: Vec<MetricValue> = ["a", "b", "a", "c"]
            .iter()
            .map(|s| f.raw_input("user", RawValue::String(s.to_string())).unwrap())
            .collect();
        let value = f.aggregate_raw(&raw).unwrap();
        match &value {
            MetricValue::DistinctSet(set) => assert_eq!(set.len(), 3),
            other => panic!("unexpected {:?}", other),
        }

        let bytes = f.serialize(&value).unwrap();
        assert_eq!(f.deserialize(&bytes).unwrap(), value);

        // 序列化后的字节也可以参与预聚合
        let other = f
            .aggregate_raw(&[f.raw_input("user", RawValue::String("d".into())).unwrap()])
            .unwrap();
        match f
            .aggregate_pre_aggregated(&[MetricValue::Bytes(bytes), other])
            .unwrap()
        {
            MetricValue::DistinctSet(set) => assert_eq!(set.len(), 4),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            f.deserialize(&[3, 0, 0, 0, 9]),
            Err(StarTreeError::Corrupted(_))
        ));
    }

    #[test]
    fn test_fixed_width_functions_not_supported() {
        for f in [
            AggregationFunctionType::Count,
            AggregationFunctionType::Min,
            AggregationFunctionType::Max,
            AggregationFunctionType::Sum,
        ] {
            assert!(matches!(
                f.serialize(&MetricValue::Double(1.0)),
                Err(StarTreeError::NotSupported(_))
            ));
            assert!(matches!(f.deserialize(&[]), Err(StarTreeError::NotSupported(_))));
        }
    }

    #[test]
    fn test_raw_input_unsupported_type() {
        let result = AggregationFunctionType::Sum.raw_input("name", RawValue::String("x".into()));
        assert!(matches!(result, Err(StarTreeError::UnsupportedType { .. })));
        assert_eq!(
            AggregationFunctionType::Count
                .raw_input("*", RawValue::String("x".into()))
                .unwrap(),
            MetricValue::Long(1)
        );
    }

    #[test]
    fn test_pair_names() {
        let pair = AggregationFunctionColumnPair::from_column_name("SUM_revenue").unwrap();
        assert_eq!(pair.function, AggregationFunctionType::Sum);
        assert_eq!(pair.column, "revenue");
        assert_eq!(pair.column_name(), "SUM_revenue");

        let pair = AggregationFunctionColumnPair::from_column_name("distinct_count_user_id").unwrap();
        assert_eq!(pair.function, AggregationFunctionType::DistinctCount);
        assert_eq!(pair.column, "user_id");

        assert_eq!(AggregationFunctionColumnPair::count_star().column_name(), "COUNT_*");
        assert!(AggregationFunctionColumnPair::from_column_name("AVG_x").is_err());
        assert!(AggregationFunctionColumnPair::from_column_name("SUM").is_err());
    }

    #[test]
    fn test_aggregate_records_mixed_provenance() {
        let pairs = vec![
            AggregationFunctionColumnPair::count_star(),
            AggregationFunctionColumnPair::new(AggregationFunctionType::Sum, "m"),
        ];
        let records = vec![
            Record::raw(vec![0], vec![MetricValue::Long(1), MetricValue::Long(5)]),
            Record::raw(vec![0], vec![MetricValue::Long(1), MetricValue::Double(2.5)]),
            Record::aggregated(vec![0], vec![MetricValue::Long(3), MetricValue::Double(10.0)]),
        ];
        let values = aggregate_records(&records, &pairs).unwrap();
        assert_eq!(values, vec![MetricValue::Long(5), MetricValue::Double(17.5)]);
    }
}
