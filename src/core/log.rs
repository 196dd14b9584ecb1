//! 日志系统模块
//!
//! 基于 `tracing` 提供结构化的日志记录功能。
//!
//! GPU 核心层的日志约定：
//!
//! - `gpu_error!`：只用于致命的、不可恢复的原生 API 失败
//! - `gpu_warn!`：可恢复的误用（跳过该操作后继续运行）
//! - `gpu_info!`：生命周期事件（设备选择、交换链创建、退出）
//!
//! # 使用示例
//!
//! ```no_run
//! use dist_gpu::core::log;
//! use dist_gpu::core::config::LogLevel;
//!
//! log::init_logger(LogLevel::Info, false, None);
//! tracing::info!(width = 800, height = 600, "Swapchain created");
//! ```

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use std::path::Path;

use super::config::LogLevel;

/// 日志目标名，GPU 核心层的所有日志都归到这个 target 下
pub const GPU_TARGET: &str = "dist_gpu::gpu";

/// 初始化日志系统
///
/// 必须在程序开始时调用一次；重复调用会被忽略。
///
/// # 参数
///
/// * `level` - 日志级别
/// * `file_output` - 是否输出到文件
/// * `log_file_path` - 日志文件路径（可选，默认为 "dist_gpu.log"）
pub fn init_logger(level: LogLevel, file_output: bool, log_file_path: Option<&str>) {
    let filter = EnvFilter::new(level_directive(level));

    if file_output {
        let log_path = log_file_path.unwrap_or("dist_gpu.log");
        let path = Path::new(log_path);
        let directory = path.parent().unwrap_or(Path::new("."));
        let filename = path.file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("dist_gpu.log");

        // 每天滚动
        let file_appender = RollingFileAppender::new(
            Rotation::DAILY,
            directory,
            filename
        );

        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_ansi(true);

        let file_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_ansi(false)
            .with_writer(file_appender);

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .try_init();
    } else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(true);

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init();
    }
}

fn level_directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

/// GPU 核心日志 - Info 级别
#[macro_export]
macro_rules! gpu_info {
    ($($arg:tt)*) => {
        tracing::info!(target: "dist_gpu::gpu", $($arg)*)
    };
}

/// GPU 核心日志 - Warn 级别（可恢复的误用）
#[macro_export]
macro_rules! gpu_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: "dist_gpu::gpu", $($arg)*)
    };
}

/// GPU 核心日志 - Error 级别（致命的原生 API 失败）
#[macro_export]
macro_rules! gpu_error {
    ($($arg:tt)*) => {
        tracing::error!(target: "dist_gpu::gpu", $($arg)*)
    };
}

/// 日志级别转换
impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(Level::from(LogLevel::Info), Level::INFO);
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
        assert_eq!(level_directive(LogLevel::Warn), "warn");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_logger(LogLevel::Warn, false, None);
        init_logger(LogLevel::Debug, false, None);
        gpu_warn!(target_heap = "RTV", "logger still usable");
    }
}
