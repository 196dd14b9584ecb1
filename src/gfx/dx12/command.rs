//! DirectX 12 命令列表录制

use std::mem::ManuallyDrop;

use windows::Win32::Foundation::RECT;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;

use crate::gfx::backend::{HeapKind, IndexFormat, NativeCommandList, TextureFootprint, Viewport};
use crate::renderer::descriptor::CpuDescriptorHandle;
use crate::renderer::resource::ImageLayout;

use super::conversion::{dxgi_format, resource_state};
use super::device::Dx12Resource;

pub struct Dx12CommandList {
    pub(crate) list: ID3D12GraphicsCommandList,
}

/// 借用资源指针构造屏障；不增加引用计数，屏障不能活得比 `resource` 久
fn transition_barrier(
    resource: &ID3D12Resource,
    before: D3D12_RESOURCE_STATES,
    after: D3D12_RESOURCE_STATES,
) -> D3D12_RESOURCE_BARRIER {
    D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                pResource: unsafe { std::mem::transmute_copy(resource) },
                Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
                StateBefore: before,
                StateAfter: after,
            }),
        },
    }
}

fn subresource_location(resource: &ID3D12Resource) -> D3D12_TEXTURE_COPY_LOCATION {
    D3D12_TEXTURE_COPY_LOCATION {
        pResource: unsafe { std::mem::transmute_copy(resource) },
        Type: D3D12_TEXTURE_COPY_TYPE_SUBRESOURCE_INDEX,
        Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 { SubresourceIndex: 0 },
    }
}

impl NativeCommandList for Dx12CommandList {
    type Resource = Dx12Resource;

    fn set_vertex_buffer(&mut self, buffer: &Dx12Resource, size: u64, stride: u32) {
        unsafe {
            let view = D3D12_VERTEX_BUFFER_VIEW {
                BufferLocation: buffer.resource.GetGPUVirtualAddress(),
                SizeInBytes: size as u32,
                StrideInBytes: stride,
            };
            self.list.IASetVertexBuffers(0, Some(&[view]));
        }
    }

    fn set_index_buffer(&mut self, buffer: &Dx12Resource, size: u64, format: IndexFormat) {
        unsafe {
            let view = D3D12_INDEX_BUFFER_VIEW {
                BufferLocation: buffer.resource.GetGPUVirtualAddress(),
                SizeInBytes: size as u32,
                Format: match format {
                    IndexFormat::U16 => DXGI_FORMAT_R16_UINT,
                    IndexFormat::U32 => DXGI_FORMAT_R32_UINT,
                },
            };
            self.list.IASetIndexBuffer(Some(&view));
        }
    }

    fn clear_render_target(&mut self, rtv: CpuDescriptorHandle, color: [f32; 4]) {
        unsafe {
            let handle = D3D12_CPU_DESCRIPTOR_HANDLE { ptr: rtv.ptr };
            self.list.ClearRenderTargetView(handle, &color, None);
        }
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        let native = D3D12_VIEWPORT {
            TopLeftX: viewport.x,
            TopLeftY: viewport.y,
            Width: viewport.width,
            Height: viewport.height,
            MinDepth: viewport.min_depth,
            MaxDepth: viewport.max_depth,
        };
        // 裁剪矩形与视口一致
        let scissor = RECT {
            left: viewport.x as i32,
            top: viewport.y as i32,
            right: (viewport.x + viewport.width) as i32,
            bottom: (viewport.y + viewport.height) as i32,
        };
        unsafe {
            self.list.RSSetViewports(&[native]);
            self.list.RSSetScissorRects(&[scissor]);
        }
    }

    fn draw(&mut self, vertex_count: u32) {
        unsafe { self.list.DrawInstanced(vertex_count, 1, 0, 0) }
    }

    fn draw_indexed(&mut self, index_count: u32) {
        unsafe { self.list.DrawIndexedInstanced(index_count, 1, 0, 0, 0) }
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        unsafe { self.list.Dispatch(x, y, z) }
    }

    fn resource_barrier(&mut self, resource: &Dx12Resource, before: ImageLayout, after: ImageLayout) {
        // 上传堆资源固定在 GENERIC_READ
        if resource.heap == HeapKind::Upload {
            return;
        }
        let (before, after) = (resource_state(before), resource_state(after));
        // D3D12 拒绝前后状态相同的转换
        if before == after {
            return;
        }
        let barrier = transition_barrier(&resource.resource, before, after);
        unsafe { self.list.ResourceBarrier(&[barrier]) }
    }

    fn copy_texture(&mut self, source: &Dx12Resource, dest: &Dx12Resource) {
        let src = subresource_location(&source.resource);
        let dst = subresource_location(&dest.resource);
        unsafe { self.list.CopyTextureRegion(&dst, 0, 0, 0, &src, None) }
    }

    fn copy_buffer_to_texture(
        &mut self,
        source: &Dx12Resource,
        dest: &Dx12Resource,
        footprint: &TextureFootprint,
    ) {
        let src = D3D12_TEXTURE_COPY_LOCATION {
            pResource: unsafe { std::mem::transmute_copy(&source.resource) },
            Type: D3D12_TEXTURE_COPY_TYPE_PLACED_FOOTPRINT,
            Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 {
                PlacedFootprint: D3D12_PLACED_SUBRESOURCE_FOOTPRINT {
                    Offset: footprint.offset,
                    Footprint: D3D12_SUBRESOURCE_FOOTPRINT {
                        Format: dxgi_format(footprint.format),
                        Width: footprint.width,
                        Height: footprint.height,
                        Depth: 1,
                        RowPitch: footprint.row_pitch,
                    },
                },
            },
        };
        let dst = subresource_location(&dest.resource);
        unsafe { self.list.CopyTextureRegion(&dst, 0, 0, 0, &src, None) }
    }
}
