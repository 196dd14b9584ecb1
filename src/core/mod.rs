//! 核心功能模块
//!
//! 本模块提供 GPU 核心层依赖的环境功能：日志系统、配置管理和错误处理。
//! 这些模块独立于具体的图形 API。
//!
//! # 模块组织
//!
//! - `log`：日志系统，基于 tracing 的结构化日志
//! - `config`：配置管理，支持从配置文件与命令行加载
//! - `error`：错误处理，定义统一的错误类型

pub mod log;
pub mod config;
pub mod error;

// 重新导出常用类型，方便使用
pub use error::{Result, DistGpuError, GraphicsError, SyncError, ConfigError};
pub use config::{Config, BackendSelection};
