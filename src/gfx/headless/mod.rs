//! 无头后端
//!
//! 不依赖任何原生图形 API 的 `GpuDevice` 实现，模拟 D3D12 的对象模型
//! 并记录每一次原生调用。测试和没有可用图形 API 的平台都使用它。

mod device;
mod journal;

pub use device::{
    CompletionMode, HeadlessCommandAllocator, HeadlessCommandList, HeadlessDescriptorHeap,
    HeadlessDevice, HeadlessFence, HeadlessQueue, HeadlessResource, HeadlessSwapChain,
};
pub use journal::{Journal, NativeCall, ObjectKind, ViewKind};
