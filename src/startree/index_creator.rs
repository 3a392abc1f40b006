//! 正排索引列写入
//!
//! 每个维度一列、每个 函数/列 对一列，行号即 Star-Tree 记录 ID。
//! 物理编码由 [`ColumnCreator`] 实现决定；本模块只负责：
//! - 列名推导（维度名 / `<FUNCTION>_<column>`）
//! - 目标类型与行数
//! - 哨兵维度值替换为合法字典 ID
//!
//! [`FileColumnCreator`] 文件格式：
//! ```text
//! [data_type: u8][num_docs: u32][entry_size: u32]
//! 定长列: num_docs × entry_size 字节（小端）
//! BYTES 列: num_docs × ([len: u32][bytes])
//! ```

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::aggregation::AggregationFunctionColumnPair;
use super::record::{MetricValue, RecordStore, PLACEHOLDER_DICT_ID};
use crate::segment::DataType;
use crate::{Result, StarTreeError};

/// 单列写入器
pub trait ForwardIndexWriter {
    fn index_int(&mut self, doc_id: usize, value: i32) -> Result<()>;
    fn index_long(&mut self, doc_id: usize, value: i64) -> Result<()>;
    fn index_double(&mut self, doc_id: usize, value: f64) -> Result<()>;
    fn index_bytes(&mut self, doc_id: usize, value: &[u8]) -> Result<()>;
    fn close(self: Box<Self>) -> Result<()>;
}

/// 列创建接口（宿主存储引擎）
pub trait ColumnCreator {
    fn dimension_writer(
        &mut self,
        column: &str,
        cardinality: usize,
        num_docs: usize,
    ) -> Result<Box<dyn ForwardIndexWriter>>;

    fn metric_writer(
        &mut self,
        column: &str,
        data_type: DataType,
        num_docs: usize,
        longest_entry_size: usize,
    ) -> Result<Box<dyn ForwardIndexWriter>>;
}

/// 把全部记录写入正排索引列
pub fn create_indexes<C: ColumnCreator + ?Sized>(
    creator: &mut C,
    store: &RecordStore,
    dimension_names: &[String],
    cardinalities: &[usize],
    pairs: &[AggregationFunctionColumnPair],
) -> Result<()> {
    let num_docs = store.len();

    let mut dimension_writers = Vec::with_capacity(dimension_names.len());
    for (name, cardinality) in dimension_names.iter().zip(cardinalities) {
        dimension_writers.push(creator.dimension_writer(name, *cardinality, num_docs)?);
    }

    let mut metric_writers = Vec::with_capacity(pairs.len());
    for (j, pair) in pairs.iter().enumerate() {
        let function = pair.function;
        let longest = match function.longest_entry_size() {
            Some(size) => size,
            None => {
                let mut longest = 0;
                for record in store.iter() {
                    longest = longest.max(function.serialize(&record.metrics[j])?.len());
                }
                longest
            }
        };
        metric_writers.push(creator.metric_writer(
            &pair.column_name(),
            function.value_type(),
            num_docs,
            longest,
        )?);
    }

    for (doc_id, record) in store.iter().enumerate() {
        for (writer, &value) in dimension_writers.iter_mut().zip(&record.dimensions) {
            let value = if value < 0 { PLACEHOLDER_DICT_ID } else { value };
            writer.index_int(doc_id, value)?;
        }

        for ((writer, pair), value) in metric_writers.iter_mut().zip(pairs).zip(&record.metrics) {
            if pair.function.value_type() == DataType::Bytes {
                writer.index_bytes(doc_id, &pair.function.serialize(value)?)?;
                continue;
            }
            match value {
                MetricValue::Long(v) => writer.index_long(doc_id, *v)?,
                MetricValue::Double(v) => writer.index_double(doc_id, *v)?,
                other => {
                    return Err(StarTreeError::TypeMismatch(format!(
                        "{} cannot store {} value",
                        pair.column_name(),
                        other.type_name()
                    )))
                }
            }
        }
    }

    for writer in dimension_writers.into_iter().chain(metric_writers) {
        writer.close()?;
    }
    log::info!(
        "Created {} dimension and {} metric columns for {} docs",
        dimension_names.len(),
        pairs.len(),
        num_docs
    );
    Ok(())
}

fn file_safe_name(column: &str) -> String {
    column
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

fn type_code(data_type: DataType) -> u8 {
    match data_type {
        DataType::Int => 0,
        DataType::Long => 1,
        DataType::Float => 2,
        DataType::Double => 3,
        DataType::String => 4,
        DataType::Bytes => 5,
    }
}

fn type_from_code(code: u8) -> Result<DataType> {
    Ok(match code {
        0 => DataType::Int,
        1 => DataType::Long,
        2 => DataType::Float,
        3 => DataType::Double,
        4 => DataType::String,
        5 => DataType::Bytes,
        other => {
            return Err(StarTreeError::Corrupted(format!(
                "Unknown column type code {}",
                other
            )))
        }
    })
}

/// 文件列创建器：`<dir>/<column>.fwd`
#[derive(Debug, Clone)]
pub struct FileColumnCreator {
    dir: PathBuf,
}

impl FileColumnCreator {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    /// 列文件路径，文件系统保留字符（如 `COUNT_*` 中的 `*`）替换为 `_`
    pub fn column_path(&self, column: &str) -> PathBuf {
        self.dir.join(format!("{}.fwd", file_safe_name(column)))
    }

    fn open(
        &self,
        column: &str,
        data_type: DataType,
        num_docs: usize,
        entry_size: usize,
    ) -> Result<Box<dyn ForwardIndexWriter>> {
        let path = self.column_path(column);
        let mut file = BufWriter::new(File::create(&path)?);
        file.write_all(&[type_code(data_type)])?;
        file.write_all(&(num_docs as u32).to_le_bytes())?;
        file.write_all(&(entry_size as u32).to_le_bytes())?;

        Ok(Box::new(FileForwardIndexWriter {
            file,
            path,
            data_type,
            num_docs,
            next_doc_id: 0,
        }))
    }
}

impl ColumnCreator for FileColumnCreator {
    fn dimension_writer(
        &mut self,
        column: &str,
        _cardinality: usize,
        num_docs: usize,
    ) -> Result<Box<dyn ForwardIndexWriter>> {
        self.open(column, DataType::Int, num_docs, std::mem::size_of::<i32>())
    }

    fn metric_writer(
        &mut self,
        column: &str,
        data_type: DataType,
        num_docs: usize,
        longest_entry_size: usize,
    ) -> Result<Box<dyn ForwardIndexWriter>> {
        self.open(column, data_type, num_docs, longest_entry_size)
    }
}

/// 顺序写入的文件列
struct FileForwardIndexWriter {
    file: BufWriter<File>,
    path: PathBuf,
    data_type: DataType,
    num_docs: usize,
    next_doc_id: usize,
}

impl FileForwardIndexWriter {
    fn check(&mut self, doc_id: usize, data_type: DataType) -> Result<()> {
        if data_type != self.data_type {
            return Err(StarTreeError::TypeMismatch(format!(
                "{:?} is a {} column, got {}",
                self.path, self.data_type, data_type
            )));
        }
        if doc_id != self.next_doc_id || doc_id >= self.num_docs {
            return Err(StarTreeError::InvalidConfig(format!(
                "{:?} expects doc {}, got {}",
                self.path, self.next_doc_id, doc_id
            )));
        }
        self.next_doc_id += 1;
        Ok(())
    }
}

impl ForwardIndexWriter for FileForwardIndexWriter {
    fn index_int(&mut self, doc_id: usize, value: i32) -> Result<()> {
        self.check(doc_id, DataType::Int)?;
        self.file.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    fn index_long(&mut self, doc_id: usize, value: i64) -> Result<()> {
        self.check(doc_id, DataType::Long)?;
        self.file.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    fn index_double(&mut self, doc_id: usize, value: f64) -> Result<()> {
        self.check(doc_id, DataType::Double)?;
        self.file.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    fn index_bytes(&mut self, doc_id: usize, value: &[u8]) -> Result<()> {
        self.check(doc_id, DataType::Bytes)?;
        self.file.write_all(&(value.len() as u32).to_le_bytes())?;
        self.file.write_all(value)?;
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        if self.next_doc_id != self.num_docs {
            return Err(StarTreeError::InvalidConfig(format!(
                "{:?} closed after {} of {} docs",
                self.path, self.next_doc_id, self.num_docs
            )));
        }
        self.file.flush()?;
        Ok(())
    }
}

/// 读取 [`FileColumnCreator`] 写出的列，返回类型与逐行值
///
/// INT/LONG 列读为 `MetricValue::Long`。
pub fn read_column_file<P: AsRef<Path>>(path: P) -> Result<(DataType, Vec<MetricValue>)> {
    let bytes = fs::read(path.as_ref())?;
    let corrupted = || StarTreeError::Corrupted(format!("Truncated column file {:?}", path.as_ref()));
    let read_u32 = |offset: usize| -> Result<u32> {
        bytes
            .get(offset..offset + 4)
            .and_then(|b| b.try_into().ok())
            .map(u32::from_le_bytes)
            .ok_or_else(corrupted)
    };
    let slice = |offset: usize, len: usize| bytes.get(offset..offset + len).ok_or_else(corrupted);

    let data_type = type_from_code(*bytes.first().ok_or_else(corrupted)?)?;
    let num_docs = read_u32(1)? as usize;
    let mut offset = 9;
    let mut values = Vec::with_capacity(num_docs);

    for _ in 0..num_docs {
        let value = match data_type {
            DataType::Int => {
                let v = i32::from_le_bytes(slice(offset, 4)?.try_into().map_err(|_| corrupted())?);
                offset += 4;
                MetricValue::Long(v as i64)
            }
            DataType::Long => {
                let v = i64::from_le_bytes(slice(offset, 8)?.try_into().map_err(|_| corrupted())?);
                offset += 8;
                MetricValue::Long(v)
            }
            DataType::Double => {
                let v = f64::from_le_bytes(slice(offset, 8)?.try_into().map_err(|_| corrupted())?);
                offset += 8;
                MetricValue::Double(v)
            }
            DataType::Bytes => {
                let len = read_u32(offset)? as usize;
                let v = slice(offset + 4, len)?.to_vec();
                offset += 4 + len;
                MetricValue::Bytes(v)
            }
            other => {
                return Err(StarTreeError::UnsupportedType {
                    column: path.as_ref().display().to_string(),
                    data_type: other.to_string(),
                })
            }
        };
        values.push(value);
    }
    Ok((data_type, values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::startree::record::{Record, SKIP_VALUE, STAR_VALUE};
    use crate::startree::AggregationFunctionType;
    use std::collections::BTreeSet;

    #[test]
    fn test_create_indexes_writes_columns() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let mut creator = FileColumnCreator::new(tmp_dir.path().join("startree_0")).unwrap();

        let pairs = vec![
            AggregationFunctionColumnPair::count_star(),
            AggregationFunctionColumnPair::new(AggregationFunctionType::Max, "latency"),
            AggregationFunctionColumnPair::new(AggregationFunctionType::DistinctCount, "user"),
        ];
        let set: BTreeSet<Vec<u8>> = [b"u1".to_vec(), b"u2".to_vec()].into_iter().collect();
        let mut store = RecordStore::new();
        store.push(Record::aggregated(
            vec![3, STAR_VALUE],
            vec![
                MetricValue::Long(2),
                MetricValue::Double(1.5),
                MetricValue::DistinctSet(set.clone()),
            ],
        ));
        store.push(Record::aggregated(
            vec![SKIP_VALUE, 1],
            vec![
                MetricValue::Long(7),
                MetricValue::Double(9.0),
                MetricValue::DistinctSet(BTreeSet::new()),
            ],
        ));

        let names = vec!["country".to_string(), "os".to_string()];
        create_indexes(&mut creator, &store, &names, &[4, 2], &pairs).unwrap();

        let (data_type, country) = read_column_file(creator.column_path("country")).unwrap();
        assert_eq!(data_type, DataType::Int);
        assert_eq!(country, vec![MetricValue::Long(3), MetricValue::Long(0)]);

        let (_, os) = read_column_file(creator.column_path("os")).unwrap();
        assert_eq!(os, vec![MetricValue::Long(0), MetricValue::Long(1)]);

        let (data_type, counts) = read_column_file(creator.column_path("COUNT_*")).unwrap();
        assert_eq!(data_type, DataType::Long);
        assert_eq!(counts, vec![MetricValue::Long(2), MetricValue::Long(7)]);

        let (_, max) = read_column_file(creator.column_path("MAX_latency")).unwrap();
        assert_eq!(max, vec![MetricValue::Double(1.5), MetricValue::Double(9.0)]);

        let (data_type, distinct) = read_column_file(creator.column_path("DISTINCT_COUNT_user")).unwrap();
        assert_eq!(data_type, DataType::Bytes);
        let decoded = match &distinct[0] {
            MetricValue::Bytes(b) => AggregationFunctionType::DistinctCount.deserialize(b).unwrap(),
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(decoded, MetricValue::DistinctSet(set));
    }

    #[test]
    fn test_writer_rejects_out_of_order_docs() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let mut creator = FileColumnCreator::new(tmp_dir.path()).unwrap();
        let mut writer = creator.dimension_writer("d", 2, 2).unwrap();

        assert!(writer.index_int(1, 0).is_err());
        writer.index_int(0, 0).unwrap();
        assert!(matches!(
            writer.index_long(1, 5),
            Err(StarTreeError::TypeMismatch(_))
        ));
        // 只写了 1 行就关闭
        assert!(writer.close().is_err());
    }

    #[test]
    fn test_column_path_is_file_safe() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let creator = FileColumnCreator::new(tmp_dir.path()).unwrap();

        assert_eq!(creator.column_path("COUNT_*"), tmp_dir.path().join("COUNT__.fwd"));
        assert_eq!(creator.column_path("a/b:c"), tmp_dir.path().join("a_b_c.fwd"));
        assert_eq!(
            creator.column_path("DISTINCT_COUNT_user"),
            tmp_dir.path().join("DISTINCT_COUNT_user.fwd")
        );
    }
}
