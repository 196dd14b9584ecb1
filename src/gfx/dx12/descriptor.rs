//! DirectX 12 描述符堆与视图描述
//!
//! 槽位分配由核心层的 `DescriptorHeap` 负责，这里只封装原生堆和各类视图的描述结构。

use windows::Win32::Graphics::Direct3D12::*;

use crate::core::error::{GraphicsError, Result};
use crate::gfx::backend::{DescriptorHeapLayout, ViewDimension};
use crate::renderer::descriptor::{CpuDescriptorHandle, DescriptorHeapType};
use crate::renderer::resource::ImageFormat;

use super::conversion::dxgi_format;

/// DX12 描述符堆
pub struct Dx12DescriptorHeap {
    pub(crate) heap: ID3D12DescriptorHeap,
    pub(crate) kind: DescriptorHeapType,
    /// 描述符增量大小
    pub(crate) increment: u32,
}

impl Dx12DescriptorHeap {
    pub fn heap(&self) -> &ID3D12DescriptorHeap {
        &self.heap
    }

    pub(crate) fn layout(&self) -> DescriptorHeapLayout {
        unsafe {
            let cpu_start = self.heap.GetCPUDescriptorHandleForHeapStart().ptr;
            // 只有着色器可见的堆才有 GPU 句柄
            let gpu_start = if self.kind.is_shader_visible() {
                Some(self.heap.GetGPUDescriptorHandleForHeapStart().ptr)
            } else {
                None
            };
            DescriptorHeapLayout {
                cpu_start,
                gpu_start,
                increment: self.increment,
            }
        }
    }
}

pub(crate) fn cpu_handle(handle: CpuDescriptorHandle) -> D3D12_CPU_DESCRIPTOR_HANDLE {
    D3D12_CPU_DESCRIPTOR_HANDLE { ptr: handle.ptr }
}

pub(crate) fn render_target_desc(format: ImageFormat) -> D3D12_RENDER_TARGET_VIEW_DESC {
    D3D12_RENDER_TARGET_VIEW_DESC {
        Format: dxgi_format(format),
        ViewDimension: D3D12_RTV_DIMENSION_TEXTURE2D,
        Anonymous: D3D12_RENDER_TARGET_VIEW_DESC_0 {
            Texture2D: D3D12_TEX2D_RTV { MipSlice: 0, PlaneSlice: 0 },
        },
    }
}

/// 深度视图固定为 D32_FLOAT
pub(crate) fn depth_stencil_desc() -> D3D12_DEPTH_STENCIL_VIEW_DESC {
    D3D12_DEPTH_STENCIL_VIEW_DESC {
        Format: dxgi_format(ImageFormat::Depth32),
        ViewDimension: D3D12_DSV_DIMENSION_TEXTURE2D,
        Flags: D3D12_DSV_FLAG_NONE,
        Anonymous: D3D12_DEPTH_STENCIL_VIEW_DESC_0 {
            Texture2D: D3D12_TEX2D_DSV { MipSlice: 0 },
        },
    }
}

pub(crate) fn shader_resource_desc(
    format: ImageFormat,
    dimension: ViewDimension,
) -> D3D12_SHADER_RESOURCE_VIEW_DESC {
    let (view_dimension, anonymous) = match dimension {
        ViewDimension::Texture2D => (
            D3D12_SRV_DIMENSION_TEXTURE2D,
            D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                Texture2D: D3D12_TEX2D_SRV {
                    MostDetailedMip: 0,
                    MipLevels: 1,
                    PlaneSlice: 0,
                    ResourceMinLODClamp: 0.0,
                },
            },
        ),
        ViewDimension::Texture2DArray { layers } => (
            D3D12_SRV_DIMENSION_TEXTURE2DARRAY,
            D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                Texture2DArray: D3D12_TEX2D_ARRAY_SRV {
                    MostDetailedMip: 0,
                    MipLevels: 1,
                    FirstArraySlice: 0,
                    ArraySize: layers,
                    PlaneSlice: 0,
                    ResourceMinLODClamp: 0.0,
                },
            },
        ),
        ViewDimension::TextureCube => (
            D3D12_SRV_DIMENSION_TEXTURECUBE,
            D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                TextureCube: D3D12_TEXCUBE_SRV {
                    MostDetailedMip: 0,
                    MipLevels: 1,
                    ResourceMinLODClamp: 0.0,
                },
            },
        ),
    };

    D3D12_SHADER_RESOURCE_VIEW_DESC {
        Format: dxgi_format(format),
        ViewDimension: view_dimension,
        Shader4ComponentMapping: D3D12_DEFAULT_SHADER_4_COMPONENT_MAPPING,
        Anonymous: anonymous,
    }
}

pub(crate) fn unordered_access_desc(
    format: ImageFormat,
    dimension: ViewDimension,
) -> Result<D3D12_UNORDERED_ACCESS_VIEW_DESC> {
    let (view_dimension, anonymous) = match dimension {
        ViewDimension::Texture2D => (
            D3D12_UAV_DIMENSION_TEXTURE2D,
            D3D12_UNORDERED_ACCESS_VIEW_DESC_0 {
                Texture2D: D3D12_TEX2D_UAV { MipSlice: 0, PlaneSlice: 0 },
            },
        ),
        ViewDimension::Texture2DArray { layers } => (
            D3D12_UAV_DIMENSION_TEXTURE2DARRAY,
            D3D12_UNORDERED_ACCESS_VIEW_DESC_0 {
                Texture2DArray: D3D12_TEX2D_ARRAY_UAV {
                    MipSlice: 0,
                    FirstArraySlice: 0,
                    ArraySize: layers,
                    PlaneSlice: 0,
                },
            },
        ),
        ViewDimension::TextureCube => {
            return Err(GraphicsError::InvalidUsage(
                "unordered access views cannot be cube views".to_string(),
            )
            .into())
        }
    };

    Ok(D3D12_UNORDERED_ACCESS_VIEW_DESC {
        Format: dxgi_format(format),
        ViewDimension: view_dimension,
        Anonymous: anonymous,
    })
}
