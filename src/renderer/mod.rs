//! 渲染器核心模块
//!
//! 与具体图形 API 无关的命令缓冲、资源状态跟踪与同步层。
//! 所有类型都对 `D: GpuDevice` 泛型，后端在 `gfx` 模块中实现。
//!
//! # 数据流
//!
//! `Context` 创建图像与缓冲 → 向 `CommandBuffer` 录制操作（读写图像的布局状态）
//! → 提交到同类型的队列 → signal 一个 `Fence` 值 → 复用或销毁资源前等待该值。

pub mod sync;
pub mod descriptor;
pub mod resource;
pub mod command;
pub mod context;

pub use command::{CommandBuffer, CommandBufferState, CommandBufferType};
pub use context::{Context, FrameResources, Queue, SurfaceDesc};
pub use descriptor::{DescriptorHeap, DescriptorHeapType, DescriptorIndex};
pub use resource::{Buffer, BufferType, CpuImage, Image, ImageFormat, ImageLayout, ImageUsage};
pub use sync::{Fence, FenceValue};
