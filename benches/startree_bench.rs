// Star-Tree 构建性能基准测试
//
// 使用 Criterion 框架测试：
// - 不同数据量下的完整构建（排序 + 合并 + 切分 + 传播）
// - 不同叶子阈值对构建的影响
// - 树文件 + 正排列落盘
//
// 运行: cargo bench --bench startree_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use startree::startree::{FileColumnCreator, InMemoryProperties};
use startree::{DataType, InMemorySegment, RawValue, StarTreeBuilder, StarTreeConfig};

/// 生成 3 个维度 + 1 个指标列的随机 Segment
fn generate_segment(num_docs: usize) -> InMemorySegment {
    let mut rng = StdRng::seed_from_u64(2024);
    let mut segment = InMemorySegment::new();

    for (name, cardinality) in [("country", 20), ("browser", 8), ("device", 4)] {
        let values = (0..num_docs)
            .map(|_| RawValue::Int(rng.gen_range(0..cardinality)))
            .collect();
        segment.add_column(name, DataType::Int, values).unwrap();
    }
    let clicks = (0..num_docs)
        .map(|_| RawValue::Long(rng.gen_range(0..1000)))
        .collect();
    segment.add_column("clicks", DataType::Long, clicks).unwrap();
    segment
}

fn bench_config(max_leaf_records: usize) -> StarTreeConfig {
    StarTreeConfig {
        dimensions: vec!["country".into(), "browser".into(), "device".into()],
        function_column_pairs: vec![
            "COUNT_*".into(),
            "SUM_clicks".into(),
            "MAX_clicks".into(),
        ],
        max_leaf_records,
        ..StarTreeConfig::default()
    }
}

fn benchmark_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("startree_build");

    for num_docs in [1_000, 10_000, 100_000] {
        let segment = generate_segment(num_docs);
        group.throughput(Throughput::Elements(num_docs as u64));
        group.bench_with_input(BenchmarkId::from_parameter(num_docs), &segment, |b, segment| {
            b.iter(|| {
                let tree = StarTreeBuilder::new(segment, bench_config(100))
                    .unwrap()
                    .build()
                    .unwrap();
                black_box(tree.records().len())
            })
        });
    }

    group.finish();
}

fn benchmark_leaf_threshold(c: &mut Criterion) {
    let mut group = c.benchmark_group("startree_leaf_threshold");
    let segment = generate_segment(50_000);

    for max_leaf_records in [1, 100, 10_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(max_leaf_records),
            &max_leaf_records,
            |b, &max_leaf_records| {
                b.iter(|| {
                    let tree = StarTreeBuilder::new(&segment, bench_config(max_leaf_records))
                        .unwrap()
                        .build()
                        .unwrap();
                    black_box(tree.nodes().len())
                })
            },
        );
    }

    group.finish();
}

fn benchmark_serialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("startree_serialize");
    group.sample_size(20);

    let tmp_dir = tempfile::tempdir().unwrap();
    let segment = generate_segment(50_000);

    group.bench_function("columns_and_tree", |b| {
        b.iter_batched(
            || {
                StarTreeBuilder::new(&segment, bench_config(100))
                    .unwrap()
                    .build()
                    .unwrap()
            },
            |mut tree| {
                let mut columns = FileColumnCreator::new(tmp_dir.path().join(tree.tree_id())).unwrap();
                let mut properties = InMemoryProperties::new();
                tree.serialize(tmp_dir.path(), &mut columns, &mut properties)
                    .unwrap()
            },
            criterion::BatchSize::LargeInput,
        )
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_build,
    benchmark_leaf_threshold,
    benchmark_serialize
);
criterion_main!(benches);
