//! DirectX 12 交换链
//!
//! 有窗口时使用 DXGI flip 模型交换链；没有窗口时用一组普通渲染目标纹理代替，
//! 呈现只是轮转当前缓冲索引。

use windows::core::Interface;
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;

use crate::core::error::{GraphicsError, Result};
use crate::gfx::backend::{SwapChainDesc, TextureDesc};
use crate::renderer::resource::ImageLayout;
use crate::gpu_error;

use super::conversion::dxgi_format;
use super::device::Dx12Device;

enum Target {
    Window(IDXGISwapChain3),
    Offscreen {
        buffers: Vec<ID3D12Resource>,
        current: u32,
    },
}

pub struct Dx12SwapChain {
    target: Target,
    desc: SwapChainDesc,
}

fn swap_chain_err(what: &str, e: windows::core::Error) -> GraphicsError {
    gpu_error!("DXGI: {} failed: {:?}", what, e);
    GraphicsError::SwapchainError(format!("{}: {:?}", what, e))
}

fn offscreen_buffers(device: &Dx12Device, desc: &SwapChainDesc) -> Result<Vec<ID3D12Resource>> {
    let texture = TextureDesc {
        width: desc.width,
        height: desc.height,
        array_layers: 1,
        format: desc.format,
        allow_render_target: true,
        allow_depth_stencil: false,
        allow_unordered_access: false,
    };
    (0..desc.buffer_count)
        .map(|_| device.create_committed_texture(&texture, ImageLayout::Present))
        .collect()
}

impl Dx12SwapChain {
    pub(crate) fn for_window(
        device: &Dx12Device,
        queue: &ID3D12CommandQueue,
        hwnd: HWND,
        desc: &SwapChainDesc,
    ) -> Result<Self> {
        let native_desc = DXGI_SWAP_CHAIN_DESC1 {
            Width: desc.width,
            Height: desc.height,
            Format: dxgi_format(desc.format),
            BufferCount: desc.buffer_count,
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            ..Default::default()
        };

        unsafe {
            let swap_chain: IDXGISwapChain1 = device
                .factory()
                .CreateSwapChainForHwnd(queue, hwnd, &native_desc, None, None::<&IDXGIOutput>)
                .map_err(|e| swap_chain_err("CreateSwapChainForHwnd", e))?;
            let swap_chain: IDXGISwapChain3 = swap_chain
                .cast()
                .map_err(|e| swap_chain_err("IDXGISwapChain3 query", e))?;
            Ok(Self {
                target: Target::Window(swap_chain),
                desc: *desc,
            })
        }
    }

    pub(crate) fn offscreen(device: &Dx12Device, desc: &SwapChainDesc) -> Result<Self> {
        let buffers = offscreen_buffers(device, desc)?;
        Ok(Self {
            target: Target::Offscreen { buffers, current: 0 },
            desc: *desc,
        })
    }

    pub fn extent(&self) -> (u32, u32) {
        (self.desc.width, self.desc.height)
    }

    pub(crate) fn buffer(&self, index: u32) -> Result<ID3D12Resource> {
        match &self.target {
            Target::Window(swap_chain) => unsafe {
                swap_chain
                    .GetBuffer(index)
                    .map_err(|e| swap_chain_err("IDXGISwapChain::GetBuffer", e).into())
            },
            Target::Offscreen { buffers, .. } => buffers.get(index as usize).cloned().ok_or_else(|| {
                GraphicsError::SwapchainError(format!("swapchain buffer {} out of range", index)).into()
            }),
        }
    }

    pub(crate) fn current_index(&self) -> u32 {
        match &self.target {
            Target::Window(swap_chain) => unsafe { swap_chain.GetCurrentBackBufferIndex() },
            Target::Offscreen { current, .. } => *current,
        }
    }

    pub(crate) fn present(&mut self, vsync: bool) -> Result<()> {
        match &mut self.target {
            Target::Window(swap_chain) => unsafe {
                let interval = if vsync { 1 } else { 0 };
                swap_chain
                    .Present(interval, DXGI_PRESENT(0))
                    .ok()
                    .map_err(|e| swap_chain_err("IDXGISwapChain::Present", e).into())
            },
            Target::Offscreen { current, .. } => {
                *current = (*current + 1) % self.desc.buffer_count;
                Ok(())
            }
        }
    }

    /// 调用前必须释放全部缓冲引用
    pub(crate) fn resize(&mut self, device: &Dx12Device, width: u32, height: u32) -> Result<()> {
        self.desc.width = width;
        self.desc.height = height;
        match &mut self.target {
            Target::Window(swap_chain) => unsafe {
                swap_chain
                    .ResizeBuffers(
                        self.desc.buffer_count,
                        width,
                        height,
                        dxgi_format(self.desc.format),
                        DXGI_SWAP_CHAIN_FLAG(0),
                    )
                    .map_err(|e| swap_chain_err("IDXGISwapChain::ResizeBuffers", e).into())
            },
            Target::Offscreen { buffers, current } => {
                buffers.clear();
                *buffers = offscreen_buffers(device, &self.desc)?;
                *current = 0;
                Ok(())
            }
        }
    }
}
