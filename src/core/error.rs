//! 错误处理模块
//!
//! 定义了 GPU 核心层使用的统一错误类型。
//!
//! # 错误分类
//!
//! - **致命设备错误**：任何原生对象创建失败（适配器、设备、队列、堆、资源、视图、Fence），
//!   在失败点以 error 级别记录，然后通过 `?` 向上传播，进程无法继续渲染
//! - **误用**：可恢复的调用方错误（状态不对、用法不对），记录警告后跳过
//! - **同步失败**：无法获得等待原语，视为致命错误（无法保证 GPU 已用完资源）
//!
//! 核心层中没有任何重试：原生图形 API 的失败在本引擎模型中不是瞬时的。

use std::fmt;

/// 引擎统一的 Result 类型
pub type Result<T> = std::result::Result<T, DistGpuError>;

/// GPU 核心层的错误类型
#[derive(Debug)]
pub enum DistGpuError {
    /// 配置错误
    Config(ConfigError),

    /// 图形 API 错误
    Graphics(GraphicsError),

    /// 同步错误
    Sync(SyncError),

    /// IO 错误
    Io(std::io::Error),

    /// CPU 图像解码错误
    Image(String),

    /// 初始化错误
    Initialization(String),
}

/// 配置相关的错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置文件未找到
    FileNotFound(String),

    /// 配置文件解析失败
    ParseError(String),

    /// 配置值无效
    InvalidValue { field: String, reason: String },
}

/// 图形 API 相关的错误
#[derive(Debug)]
pub enum GraphicsError {
    /// 没有可用的硬件适配器
    AdapterSelection(String),

    /// 设备创建失败
    DeviceCreation(String),

    /// 命令队列创建失败
    QueueCreation(String),

    /// 命令分配器 / 命令列表创建、重置或关闭失败
    CommandAllocation(String),

    /// 资源创建失败
    ResourceCreation(String),

    /// 视图创建失败
    ViewCreation(String),

    /// 描述符堆已满
    DescriptorHeapExhausted { heap: &'static str, capacity: u32 },

    /// 交换链错误
    SwapchainError(String),

    /// 命令提交失败
    CommandExecution(String),

    /// 在错误的状态下调用（例如 `end` 之后继续录制）
    InvalidState(String),

    /// 资源用法与操作不符（例如对深度图执行 clear_color）
    InvalidUsage(String),
}

/// 同步相关的错误
#[derive(Debug)]
pub enum SyncError {
    /// Fence 创建失败
    FenceCreation(String),

    /// 无法创建等待事件
    WaitEventCreation(String),

    /// 等待失败
    Wait(String),
}

impl DistGpuError {
    /// 是否为致命错误
    ///
    /// 致命错误意味着当前进程无法继续渲染；
    /// 非致命错误是调用方误用，记录后可以继续运行。
    pub fn is_fatal(&self) -> bool {
        match self {
            DistGpuError::Graphics(GraphicsError::InvalidState(_))
            | DistGpuError::Graphics(GraphicsError::InvalidUsage(_)) => false,
            DistGpuError::Graphics(_) | DistGpuError::Sync(_) => true,
            DistGpuError::Initialization(_) => true,
            DistGpuError::Config(_) | DistGpuError::Io(_) | DistGpuError::Image(_) => false,
        }
    }
}

impl fmt::Display for DistGpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistGpuError::Config(e) => write!(f, "Configuration error: {}", e),
            DistGpuError::Graphics(e) => write!(f, "Graphics error: {}", e),
            DistGpuError::Sync(e) => write!(f, "Synchronization error: {}", e),
            DistGpuError::Io(e) => write!(f, "IO error: {}", e),
            DistGpuError::Image(msg) => write!(f, "Image decode error: {}", msg),
            DistGpuError::Initialization(msg) => write!(f, "Initialization error: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {}", path),
            ConfigError::ParseError(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphicsError::AdapterSelection(msg) => write!(f, "Adapter selection failed: {}", msg),
            GraphicsError::DeviceCreation(msg) => write!(f, "Device creation failed: {}", msg),
            GraphicsError::QueueCreation(msg) => write!(f, "Queue creation failed: {}", msg),
            GraphicsError::CommandAllocation(msg) => write!(f, "Command allocation failed: {}", msg),
            GraphicsError::ResourceCreation(msg) => write!(f, "Resource creation failed: {}", msg),
            GraphicsError::ViewCreation(msg) => write!(f, "View creation failed: {}", msg),
            GraphicsError::DescriptorHeapExhausted { heap, capacity } => {
                write!(f, "{} descriptor heap exhausted ({} slots)", heap, capacity)
            }
            GraphicsError::SwapchainError(msg) => write!(f, "Swapchain error: {}", msg),
            GraphicsError::CommandExecution(msg) => write!(f, "Command execution failed: {}", msg),
            GraphicsError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            GraphicsError::InvalidUsage(msg) => write!(f, "Invalid usage: {}", msg),
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::FenceCreation(msg) => write!(f, "Fence creation failed: {}", msg),
            SyncError::WaitEventCreation(msg) => write!(f, "Failed to create wait event: {}", msg),
            SyncError::Wait(msg) => write!(f, "Fence wait failed: {}", msg),
        }
    }
}

impl std::error::Error for DistGpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DistGpuError::Config(e) => Some(e),
            DistGpuError::Graphics(e) => Some(e),
            DistGpuError::Sync(e) => Some(e),
            DistGpuError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ConfigError {}
impl std::error::Error for GraphicsError {}
impl std::error::Error for SyncError {}

impl From<std::io::Error> for DistGpuError {
    fn from(err: std::io::Error) -> Self {
        DistGpuError::Io(err)
    }
}

impl From<ConfigError> for DistGpuError {
    fn from(err: ConfigError) -> Self {
        DistGpuError::Config(err)
    }
}

impl From<GraphicsError> for DistGpuError {
    fn from(err: GraphicsError) -> Self {
        DistGpuError::Graphics(err)
    }
}

impl From<SyncError> for DistGpuError {
    fn from(err: SyncError) -> Self {
        DistGpuError::Sync(err)
    }
}

impl From<image::ImageError> for DistGpuError {
    fn from(err: image::ImageError) -> Self {
        DistGpuError::Image(err.to_string())
    }
}
