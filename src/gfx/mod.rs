//! 图形后端模块
//!
//! 本模块封装了原生图形 API 的底层实现，包括：
//! - DirectX 12：Windows 平台的高性能图形 API
//! - headless：进程内模拟的 D3D12 对象模型，用于测试和没有图形 API 的平台
//!
//! 所有后端都实现了统一的 `GpuDevice` trait，
//! 上层的命令缓冲、资源与同步代码对它泛型，在编译期单态化。

pub mod backend;
pub mod headless;
#[cfg(target_os = "windows")]
pub mod dx12;

pub use backend::{GpuBackend, GpuDevice};
pub use headless::HeadlessDevice;
#[cfg(target_os = "windows")]
pub use dx12::Dx12Device;
