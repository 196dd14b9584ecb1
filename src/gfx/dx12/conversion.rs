//! 核心层枚举到 D3D12 / DXGI 常量的转换

use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;

use crate::renderer::command::CommandBufferType;
use crate::renderer::descriptor::DescriptorHeapType;
use crate::renderer::resource::{ImageFormat, ImageLayout};

pub(crate) fn list_type(kind: CommandBufferType) -> D3D12_COMMAND_LIST_TYPE {
    match kind {
        CommandBufferType::Graphics => D3D12_COMMAND_LIST_TYPE_DIRECT,
        CommandBufferType::Compute => D3D12_COMMAND_LIST_TYPE_COMPUTE,
        CommandBufferType::Upload => D3D12_COMMAND_LIST_TYPE_COPY,
    }
}

pub(crate) fn dxgi_format(format: ImageFormat) -> DXGI_FORMAT {
    match format {
        ImageFormat::Rgba8 => DXGI_FORMAT_R8G8B8A8_UNORM,
        ImageFormat::Rgba32Float => DXGI_FORMAT_R32G32B32A32_FLOAT,
        ImageFormat::Rgba16Float => DXGI_FORMAT_R16G16B16A16_FLOAT,
        ImageFormat::Depth32 => DXGI_FORMAT_D32_FLOAT,
    }
}

/// 布局到资源状态；注意 PRESENT 与 COMMON 在 D3D12 中是同一个值
pub(crate) fn resource_state(layout: ImageLayout) -> D3D12_RESOURCE_STATES {
    match layout {
        ImageLayout::CopyDest => D3D12_RESOURCE_STATE_COPY_DEST,
        ImageLayout::CopySource => D3D12_RESOURCE_STATE_COPY_SOURCE,
        ImageLayout::Depth => D3D12_RESOURCE_STATE_DEPTH_WRITE,
        ImageLayout::Present => D3D12_RESOURCE_STATE_PRESENT,
        ImageLayout::RenderTarget => D3D12_RESOURCE_STATE_RENDER_TARGET,
        ImageLayout::ShaderResource => D3D12_RESOURCE_STATE_ALL_SHADER_RESOURCE,
        ImageLayout::Storage => D3D12_RESOURCE_STATE_UNORDERED_ACCESS,
        ImageLayout::Common => D3D12_RESOURCE_STATE_COMMON,
    }
}

pub(crate) fn heap_type(kind: DescriptorHeapType) -> D3D12_DESCRIPTOR_HEAP_TYPE {
    match kind {
        DescriptorHeapType::Rtv => D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
        DescriptorHeapType::Dsv => D3D12_DESCRIPTOR_HEAP_TYPE_DSV,
        DescriptorHeapType::CbvSrvUav => D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
    }
}

/// UTF-16 适配器名称（以 NUL 结尾）转为 String
pub(crate) fn wide_to_string(wide: &[u16]) -> String {
    let len = wide.iter().position(|c| *c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..len])
}
