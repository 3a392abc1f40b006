//! 内存 Segment 实现
//!
//! 每列保存原始值和排序后的字典，字典 ID 即值在字典中的下标。
//! 可从 JSON 文件加载：
//!
//! ```text
//! {
//!   "columns": [
//!     { "name": "country", "data_type": "STRING", "values": ["CN", "US", "CN"] },
//!     { "name": "clicks",  "data_type": "LONG",   "values": [3, 5, 1] }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::{DataType, RawValue, SegmentReader};
use crate::{Result, StarTreeError};

/// JSON 列定义
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: DataType,
    pub values: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SegmentFile {
    columns: Vec<ColumnSpec>,
}

/// 单列数据（原始值 + 字典编码）
#[derive(Debug, Clone)]
struct ColumnData {
    data_type: DataType,
    values: Vec<RawValue>,
    dictionary: Vec<RawValue>,
    dict_ids: Vec<i32>,
}

/// 内存 Segment
#[derive(Debug, Clone, Default)]
pub struct InMemorySegment {
    num_docs: usize,
    columns: HashMap<String, ColumnData>,
    column_order: Vec<String>,
}

impl InMemorySegment {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加一列（所有列行数必须一致）
    pub fn add_column(
        &mut self,
        name: impl Into<String>,
        data_type: DataType,
        values: Vec<RawValue>,
    ) -> Result<()> {
        let name = name.into();
        if self.columns.contains_key(&name) {
            return Err(StarTreeError::InvalidConfig(format!(
                "Duplicate column: {}",
                name
            )));
        }
        if !self.columns.is_empty() && values.len() != self.num_docs {
            return Err(StarTreeError::InvalidConfig(format!(
                "Column {} has {} values, expected {}",
                name,
                values.len(),
                self.num_docs
            )));
        }
        if let Some(bad) = values.iter().find(|v| v.data_type() != data_type) {
            return Err(StarTreeError::TypeMismatch(format!(
                "Column {} declared {} but holds {}",
                name,
                data_type,
                bad.data_type()
            )));
        }

        let mut dictionary = values.clone();
        dictionary.sort_by(compare_raw);
        dictionary.dedup_by(|a, b| compare_raw(a, b) == Ordering::Equal);

        let dict_ids = values
            .iter()
            .map(|v| {
                dictionary
                    .binary_search_by(|probe| compare_raw(probe, v))
                    .map(|idx| idx as i32)
                    .map_err(|_| StarTreeError::Corrupted(format!("Dictionary miss in {}", name)))
            })
            .collect::<Result<Vec<_>>>()?;

        self.num_docs = values.len();
        self.column_order.push(name.clone());
        self.columns.insert(
            name,
            ColumnData {
                data_type,
                values,
                dictionary,
                dict_ids,
            },
        );
        Ok(())
    }

    /// 构建器风格添加列
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        data_type: DataType,
        values: Vec<RawValue>,
    ) -> Result<Self> {
        self.add_column(name, data_type, values)?;
        Ok(self)
    }

    /// 从 JSON 文件加载
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let file: SegmentFile = serde_json::from_str(&content)
            .map_err(|e| StarTreeError::Serialization(format!("Parse segment file failed: {}", e)))?;

        let mut segment = Self::new();
        for spec in file.columns {
            let values = spec
                .values
                .iter()
                .map(|v| json_to_raw(&spec.name, spec.data_type, v))
                .collect::<Result<Vec<_>>>()?;
            segment.add_column(spec.name, spec.data_type, values)?;
        }
        Ok(segment)
    }

    /// 列名（按添加顺序）
    pub fn column_names(&self) -> &[String] {
        &self.column_order
    }

    /// 字典 ID 反查原始值
    pub fn dictionary_value(&self, column: &str, dict_id: i32) -> Option<&RawValue> {
        let col = self.columns.get(column)?;
        usize::try_from(dict_id)
            .ok()
            .and_then(|idx| col.dictionary.get(idx))
    }

    fn column(&self, column: &str) -> Result<&ColumnData> {
        self.columns
            .get(column)
            .ok_or_else(|| StarTreeError::UnknownColumn(column.to_string()))
    }
}

impl SegmentReader for InMemorySegment {
    fn num_docs(&self) -> usize {
        self.num_docs
    }

    fn cardinality(&self, column: &str) -> Result<usize> {
        Ok(self.column(column)?.dictionary.len())
    }

    fn data_type(&self, column: &str) -> Result<DataType> {
        Ok(self.column(column)?.data_type)
    }

    fn dictionary_id(&self, column: &str, doc_id: usize) -> Result<i32> {
        let col = self.column(column)?;
        col.dict_ids.get(doc_id).copied().ok_or_else(|| {
            StarTreeError::InvalidConfig(format!("Doc {} out of range for {}", doc_id, column))
        })
    }

    fn read_value(&self, column: &str, doc_id: usize, data_type: DataType) -> Result<RawValue> {
        let col = self.column(column)?;
        let value = col.values.get(doc_id).ok_or_else(|| {
            StarTreeError::InvalidConfig(format!("Doc {} out of range for {}", doc_id, column))
        })?;

        if value.data_type() == data_type {
            return Ok(value.clone());
        }

        // 数值列允许按其他数值类型读取
        let numeric = value.as_f64().filter(|_| data_type.is_numeric()).ok_or_else(|| {
            StarTreeError::TypeMismatch(format!(
                "Cannot read {} column {} as {}",
                col.data_type, column, data_type
            ))
        })?;
        Ok(match data_type {
            DataType::Int => RawValue::Int(numeric as i32),
            DataType::Long => RawValue::Long(numeric as i64),
            DataType::Float => RawValue::Float(numeric as f32),
            _ => RawValue::Double(numeric),
        })
    }
}

/// 字典排序：数值按数值大小，字符串/字节按字典序
fn compare_raw(a: &RawValue, b: &RawValue) -> Ordering {
    match (a, b) {
        (RawValue::String(x), RawValue::String(y)) => x.cmp(y),
        (RawValue::Bytes(x), RawValue::Bytes(y)) => x.cmp(y),
        (RawValue::Int(x), RawValue::Int(y)) => x.cmp(y),
        (RawValue::Long(x), RawValue::Long(y)) => x.cmp(y),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => a.data_type().name().cmp(b.data_type().name()),
        },
    }
}

fn json_to_raw(column: &str, data_type: DataType, value: &serde_json::Value) -> Result<RawValue> {
    let mismatch = || {
        StarTreeError::TypeMismatch(format!(
            "Column {} expects {} but got {}",
            column, data_type, value
        ))
    };
    Ok(match data_type {
        DataType::Int => RawValue::Int(
            value
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .ok_or_else(mismatch)?,
        ),
        DataType::Long => RawValue::Long(value.as_i64().ok_or_else(mismatch)?),
        DataType::Float => RawValue::Float(value.as_f64().ok_or_else(mismatch)? as f32),
        DataType::Double => RawValue::Double(value.as_f64().ok_or_else(mismatch)?),
        DataType::String => RawValue::String(value.as_str().ok_or_else(mismatch)?.to_string()),
        DataType::Bytes => RawValue::Bytes(value.as_str().ok_or_else(mismatch)?.as_bytes().to_vec()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_dictionary_encoding() {
        let segment = InMemorySegment::new()
            .with_column(
                "country",
                DataType::String,
                vec![
                    RawValue::String("US".into()),
                    RawValue::String("CN".into()),
                    RawValue::String("US".into()),
                ],
            )
            .unwrap();

        assert_eq!(segment.num_docs(), 3);
        assert_eq!(segment.cardinality("country").unwrap(), 2);
        // 字典有序：CN=0, US=1
        assert_eq!(segment.dictionary_id("country", 0).unwrap(), 1);
        assert_eq!(segment.dictionary_id("country", 1).unwrap(), 0);
        assert_eq!(
            segment.dictionary_value("country", 1),
            Some(&RawValue::String("US".into()))
        );
    }

    #[test]
    fn test_read_value_numeric_widening() {
        let segment = InMemorySegment::new()
            .with_column("clicks", DataType::Int, vec![RawValue::Int(7)])
            .unwrap();

        assert_eq!(
            segment.read_value("clicks", 0, DataType::Double).unwrap(),
            RawValue::Double(7.0)
        );
        assert!(matches!(
            segment.read_value("clicks", 0, DataType::String),
            Err(StarTreeError::TypeMismatch(_))
        ));
        assert!(matches!(
            segment.cardinality("missing"),
            Err(StarTreeError::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_column_length_mismatch() {
        let mut segment = InMemorySegment::new();
        segment
            .add_column("a", DataType::Int, vec![RawValue::Int(1), RawValue::Int(2)])
            .unwrap();
        let result = segment.add_column("b", DataType::Int, vec![RawValue::Int(1)]);
        assert!(matches!(result, Err(StarTreeError::InvalidConfig(_))));
    }

    #[test]
    fn test_load_from_json_file() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let path = tmp_dir.path().join("segment.json");
        let mut file = fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"columns": [
                {{"name": "d", "data_type": "STRING", "values": ["x", "y", "x"]}},
                {{"name": "m", "data_type": "DOUBLE", "values": [1.5, 2.0, 3]}}
            ]}}"#
        )
        .unwrap();

        let segment = InMemorySegment::load_from_file(&path).unwrap();
        assert_eq!(segment.num_docs(), 3);
        assert_eq!(segment.column_names(), &["d".to_string(), "m".to_string()]);
        assert_eq!(
            segment.read_value("m", 2, DataType::Double).unwrap(),
            RawValue::Double(3.0)
        );
    }
}
