//! 工具模块

pub mod config;
pub mod metrics;
