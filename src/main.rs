//! Star-Tree 构建程序
//!
//! 流程：
//! 1. 加载 TOML 配置
//! 2. 加载 Segment（JSON）
//! 3. 构建 Star-Tree
//! 4. 写出正排索引列、树文件，合并元数据
//!
//! 运行: cargo run --bin startree-builder -- config/startree.toml

use anyhow::Context;
use startree::startree::{FileColumnCreator, PropertiesFile, StarTreeBuilder};
use startree::utils::config::BuilderFileConfig;
use startree::InMemorySegment;
use std::env;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match env::args().nth(1) {
        Some(path) => BuilderFileConfig::load_from_file(&path)
            .with_context(|| format!("Failed to load config {}", path))?,
        None => BuilderFileConfig::load_default().context("Failed to load config/startree.toml")?,
    };

    log::info!("Loading segment from {:?}", config.segment_path);
    let segment = InMemorySegment::load_from_file(&config.segment_path)
        .with_context(|| format!("Failed to load segment {:?}", config.segment_path))?;

    let mut tree = StarTreeBuilder::new(&segment, config.star_tree.clone())?
        .build()
        .context("Star-tree build failed")?;

    let mut columns = FileColumnCreator::new(config.out_dir.join(tree.tree_id()))?;
    let mut properties = PropertiesFile::open(&config.metadata_file)?;
    let tree_path = tree
        .serialize(&config.out_dir, &mut columns, &mut properties)
        .context("Star-tree serialize failed")?;

    log::info!("Star-tree written to {:?}", tree_path);
    println!("{}", tree.stats().to_json());
    Ok(())
}
