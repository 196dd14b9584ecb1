//! 配置管理模块
//!
//! 提供 GPU 核心层配置的加载、解析和管理功能。
//! 支持从 TOML 配置文件加载，也支持命令行参数覆盖。
//! `debug_enabled` 与 `buffer_count` 在 `Context::new` 之后视为不可变。
//!
//! # 配置文件格式 (config.toml)
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 720
//!
//! [graphics]
//! backend = "dx12"    # dx12, vulkan, headless
//! debug_enabled = false
//! buffer_count = 2
//! vsync = true
//!
//! [logging]
//! level = "info"      # trace, debug, info, warn, error
//! file_output = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::{ConfigError, Result};

/// DXGI 翻转模型允许的最大交换链缓冲数
pub const MAX_BUFFER_COUNT: u32 = 16;

/// 引擎配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// 窗口（交换链表面）配置
    #[serde(default)]
    pub window: WindowConfig,

    /// 图形配置
    #[serde(default)]
    pub graphics: GraphicsConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 窗口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// 交换链宽度
    #[serde(default = "default_width")]
    pub width: u32,

    /// 交换链高度
    #[serde(default = "default_height")]
    pub height: u32,
}

/// 图形配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphicsConfig {
    /// 图形后端选择
    #[serde(default = "default_backend")]
    pub backend: BackendSelection,

    /// 是否启用调试层
    #[serde(default)]
    pub debug_enabled: bool,

    /// 同时在飞的帧数（交换链缓冲数）
    #[serde(default = "default_buffer_count")]
    pub buffer_count: u32,

    /// 垂直同步
    #[serde(default = "default_vsync")]
    pub vsync: bool,

    /// RTV 堆容量
    #[serde(default = "default_rtv_heap_size")]
    pub rtv_heap_size: u32,

    /// DSV 堆容量
    #[serde(default = "default_dsv_heap_size")]
    pub dsv_heap_size: u32,

    /// CBV/SRV/UAV 堆容量
    #[serde(default = "default_cbv_srv_uav_heap_size")]
    pub cbv_srv_uav_heap_size: u32,
}

/// 启动时选择的后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendSelection {
    /// DirectX 12 后端
    Dx12,
    /// Vulkan 后端
    Vulkan,
    /// 无头后端（模拟 D3D12 对象模型，不需要 GPU）
    Headless,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// 是否输出到文件
    #[serde(default)]
    pub file_output: bool,

    /// 日志文件路径
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

// 默认值函数
fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_backend() -> BackendSelection { BackendSelection::Dx12 }
fn default_buffer_count() -> u32 { 2 }
fn default_vsync() -> bool { true }
fn default_rtv_heap_size() -> u32 { 1024 }
fn default_dsv_heap_size() -> u32 { 1024 }
fn default_cbv_srv_uav_heap_size() -> u32 { 1_000_000 }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_log_file() -> String { "dist_gpu.log".to_string() }

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            debug_enabled: false,
            buffer_count: default_buffer_count(),
            vsync: default_vsync(),
            rtv_heap_size: default_rtv_heap_size(),
            dsv_heap_size: default_dsv_heap_size(),
            cbv_srv_uav_heap_size: default_cbv_srv_uav_heap_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: false,
            log_file: default_log_file(),
        }
    }
}

impl Config {
    /// 从配置文件加载
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let contents = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path_str.clone()))?;

        Self::from_toml_str(&contents)
    }

    /// 从 TOML 字符串解析
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// 从配置文件加载，如果文件不存在则使用默认配置
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_default()
    }

    /// 保存配置到文件
    #[allow(dead_code)]
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// 从命令行参数覆盖配置
    ///
    /// 支持的参数：
    /// - `--dx12`: 使用 DirectX 12 后端
    /// - `--headless`: 使用无头后端
    /// - `--debug`: 启用调试层
    /// - `--width <value>` / `--height <value>`: 交换链尺寸
    /// - `--buffers <value>`: 同时在飞的帧数
    pub fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();

        if args.iter().any(|a| a == "--dx12") {
            self.graphics.backend = BackendSelection::Dx12;
        }

        if args.iter().any(|a| a == "--headless") {
            self.graphics.backend = BackendSelection::Headless;
        }

        if args.iter().any(|a| a == "--debug") {
            self.graphics.debug_enabled = true;
        }

        if let Some(width) = parse_flag_value(&args, "--width") {
            self.window.width = width;
        }

        if let Some(height) = parse_flag_value(&args, "--height") {
            self.window.height = height;
        }

        if let Some(count) = parse_flag_value(&args, "--buffers") {
            self.graphics.buffer_count = count;
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::InvalidValue {
                field: "window.width/height".to_string(),
                reason: "Swapchain dimensions must be greater than 0".to_string(),
            }.into());
        }

        if !(2..=MAX_BUFFER_COUNT).contains(&self.graphics.buffer_count) {
            return Err(ConfigError::InvalidValue {
                field: "graphics.buffer_count".to_string(),
                reason: format!("Buffer count must be between 2 and {}", MAX_BUFFER_COUNT),
            }.into());
        }

        let heaps = [
            ("graphics.rtv_heap_size", self.graphics.rtv_heap_size),
            ("graphics.dsv_heap_size", self.graphics.dsv_heap_size),
            ("graphics.cbv_srv_uav_heap_size", self.graphics.cbv_srv_uav_heap_size),
        ];
        for (field, size) in heaps {
            if size == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: "Descriptor heap capacity must be greater than 0".to_string(),
                }.into());
            }
        }

        // 交换链的每个缓冲都需要一个 RTV
        if self.graphics.rtv_heap_size < self.graphics.buffer_count {
            return Err(ConfigError::InvalidValue {
                field: "graphics.rtv_heap_size".to_string(),
                reason: "RTV heap must hold at least one view per swapchain buffer".to_string(),
            }.into());
        }

        Ok(())
    }
}

fn parse_flag_value(args: &[String], flag: &str) -> Option<u32> {
    let idx = args.iter().position(|a| a == flag)?;
    args.get(idx + 1)?.parse().ok()
}

impl BackendSelection {
    /// 获取后端名称
    pub fn name(&self) -> &'static str {
        match self {
            BackendSelection::Dx12 => "DirectX 12",
            BackendSelection::Vulkan => "Vulkan",
            BackendSelection::Headless => "Headless",
        }
    }
}
