//! DirectX 12 原生后端
//!
//! 仅在 Windows 上编译。

mod command;
mod conversion;
mod descriptor;
mod device;
mod swapchain;

pub use command::Dx12CommandList;
pub use descriptor::Dx12DescriptorHeap;
pub use device::{Dx12Device, Dx12Resource};
pub use swapchain::Dx12SwapChain;
