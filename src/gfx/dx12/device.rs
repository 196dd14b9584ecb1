//! DirectX 12 设备
//!
//! 负责适配器选择、调试层安装，以及 `GpuDevice` 所需的全部原生对象创建。
//! 资源统一使用 CommittedResource；上传堆资源常驻 GENERIC_READ 状态。

use std::ffi::c_void;
use std::sync::Arc;
use std::time::Duration;

use raw_window_handle::RawWindowHandle;
use windows::core::Interface;
use windows::Win32::Foundation::{CloseHandle, HWND};
use windows::Win32::Graphics::Direct3D::D3D_FEATURE_LEVEL_11_0;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;
use windows::Win32::System::Threading::{CreateEventA, WaitForSingleObject, INFINITE};

use crate::core::error::{GraphicsError, Result, SyncError};
use crate::gfx::backend::{
    BufferDesc, DescriptorHeapLayout, DeviceDesc, GpuBackend, GpuDevice, HeapKind, SwapChainDesc,
    TextureDesc, ViewDimension,
};
use crate::renderer::command::CommandBufferType;
use crate::renderer::descriptor::{CpuDescriptorHandle, DescriptorHeapType};
use crate::renderer::resource::{ImageFormat, ImageLayout};
use crate::{gpu_error, gpu_info, gpu_warn};

use super::command::Dx12CommandList;
use super::conversion::{dxgi_format, heap_type, list_type, resource_state, wide_to_string};
use super::descriptor::{self, Dx12DescriptorHeap};
use super::swapchain::Dx12SwapChain;

/// 提交资源及其所在的堆
#[derive(Clone)]
pub struct Dx12Resource {
    pub(crate) resource: ID3D12Resource,
    pub(crate) heap: HeapKind,
    pub(crate) size: u64,
}

struct DeviceInner {
    // 字段顺序即释放顺序：设备 -> 工厂 -> 适配器 -> 调试层
    device: ID3D12Device,
    factory: IDXGIFactory4,
    _adapter: IDXGIAdapter1,
    debug: Option<ID3D12Debug>,
    adapter_name: String,
}

#[derive(Clone)]
pub struct Dx12Device {
    inner: Arc<DeviceInner>,
}

unsafe impl Send for Dx12Device {}
unsafe impl Sync for Dx12Device {}

fn graphics_err(ctor: fn(String) -> GraphicsError, what: &str, e: windows::core::Error) -> GraphicsError {
    gpu_error!("D3D12: {} failed: {:?}", what, e);
    ctor(format!("{}: {:?}", what, e))
}

/// 对一个适配器尝试创建 11_0 特性级别的设备；软件适配器直接跳过
fn try_adapter(adapter: &IDXGIAdapter1) -> Option<(ID3D12Device, String)> {
    unsafe {
        let desc = adapter.GetDesc1().ok()?;
        if (desc.Flags & DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32) != 0 {
            return None;
        }
        let mut device: Option<ID3D12Device> = None;
        D3D12CreateDevice(adapter, D3D_FEATURE_LEVEL_11_0, &mut device).ok()?;
        device.map(|device| (device, wide_to_string(&desc.Description)))
    }
}

fn select_adapter(factory: &IDXGIFactory4) -> Result<(IDXGIAdapter1, ID3D12Device, String)> {
    unsafe {
        // 优先按高性能偏好枚举
        if let Ok(factory6) = factory.cast::<IDXGIFactory6>() {
            let mut index = 0;
            while let Ok(adapter) = factory6
                .EnumAdapterByGpuPreference::<IDXGIAdapter1>(index, DXGI_GPU_PREFERENCE_HIGH_PERFORMANCE)
            {
                if let Some((device, name)) = try_adapter(&adapter) {
                    return Ok((adapter, device, name));
                }
                index += 1;
            }
        }

        let mut index = 0;
        while let Ok(adapter) = factory.EnumAdapters1(index) {
            if let Some((device, name)) = try_adapter(&adapter) {
                return Ok((adapter, device, name));
            }
            index += 1;
        }
    }

    gpu_error!("D3D12: no hardware adapter supports feature level 11_0");
    Err(GraphicsError::AdapterSelection(
        "no hardware adapter supports feature level 11_0".to_string(),
    )
    .into())
}

/// 屏蔽 INFO 级别消息以及几条已知无害的警告
fn install_message_filter(device: &ID3D12Device) {
    let Ok(info_queue) = device.cast::<ID3D12InfoQueue>() else {
        gpu_warn!("D3D12: info queue unavailable, message filter not installed");
        return;
    };

    let mut severities = [D3D12_MESSAGE_SEVERITY_INFO];
    let mut ids = [
        D3D12_MESSAGE_ID_CLEARRENDERTARGETVIEW_MISMATCHINGCLEARVALUE,
        D3D12_MESSAGE_ID_CLEARDEPTHSTENCILVIEW_MISMATCHINGCLEARVALUE,
        D3D12_MESSAGE_ID_MAP_INVALID_NULLRANGE,
        D3D12_MESSAGE_ID_UNMAP_INVALID_NULLRANGE,
    ];
    let filter = D3D12_INFO_QUEUE_FILTER {
        AllowList: D3D12_INFO_QUEUE_FILTER_DESC::default(),
        DenyList: D3D12_INFO_QUEUE_FILTER_DESC {
            NumCategories: 0,
            pCategoryList: std::ptr::null_mut(),
            NumSeverities: severities.len() as u32,
            pSeverityList: severities.as_mut_ptr(),
            NumIDs: ids.len() as u32,
            pIDList: ids.as_mut_ptr(),
        },
    };
    unsafe {
        if let Err(e) = info_queue.PushStorageFilter(&filter) {
            gpu_warn!("D3D12: failed to push info queue filter: {:?}", e);
        }
    }
}

impl Dx12Device {
    pub fn native(&self) -> &ID3D12Device {
        &self.inner.device
    }

    pub(crate) fn factory(&self) -> &IDXGIFactory4 {
        &self.inner.factory
    }

    fn heap_properties(heap: HeapKind) -> D3D12_HEAP_PROPERTIES {
        D3D12_HEAP_PROPERTIES {
            Type: match heap {
                HeapKind::Default => D3D12_HEAP_TYPE_DEFAULT,
                HeapKind::Upload => D3D12_HEAP_TYPE_UPLOAD,
            },
            ..Default::default()
        }
    }

    pub(crate) fn create_committed_texture(
        &self,
        desc: &TextureDesc,
        initial: ImageLayout,
    ) -> Result<ID3D12Resource> {
        let mut flags = D3D12_RESOURCE_FLAG_NONE;
        if desc.allow_render_target {
            flags |= D3D12_RESOURCE_FLAG_ALLOW_RENDER_TARGET;
        }
        if desc.allow_depth_stencil {
            flags |= D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL;
        }
        if desc.allow_unordered_access {
            flags |= D3D12_RESOURCE_FLAG_ALLOW_UNORDERED_ACCESS;
        }

        let resource_desc = D3D12_RESOURCE_DESC {
            Dimension: D3D12_RESOURCE_DIMENSION_TEXTURE2D,
            Alignment: 0,
            Width: desc.width as u64,
            Height: desc.height,
            DepthOrArraySize: desc.array_layers,
            MipLevels: 1,
            Format: dxgi_format(desc.format),
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            Layout: D3D12_TEXTURE_LAYOUT_UNKNOWN,
            Flags: flags,
        };
        let heap_props = Self::heap_properties(HeapKind::Default);

        let mut resource: Option<ID3D12Resource> = None;
        unsafe {
            self.inner
                .device
                .CreateCommittedResource(
                    &heap_props,
                    D3D12_HEAP_FLAG_NONE,
                    &resource_desc,
                    resource_state(initial),
                    None,
                    &mut resource,
                )
                .map_err(|e| graphics_err(GraphicsError::ResourceCreation, "CreateCommittedResource (texture)", e))?;
        }
        resource.ok_or_else(|| {
            GraphicsError::ResourceCreation("CreateCommittedResource returned no texture".to_string()).into()
        })
    }
}

impl GpuDevice for Dx12Device {
    type Queue = ID3D12CommandQueue;
    type Fence = ID3D12Fence;
    type CommandAllocator = ID3D12CommandAllocator;
    type CommandList = Dx12CommandList;
    type Resource = Dx12Resource;
    type DescriptorHeap = Dx12DescriptorHeap;
    type SwapChain = Dx12SwapChain;

    fn create(desc: &DeviceDesc) -> Result<Self> {
        unsafe {
            let mut debug: Option<ID3D12Debug> = None;
            if desc.debug_enabled {
                match D3D12GetDebugInterface(&mut debug) {
                    Ok(()) => {
                        if let Some(debug) = &debug {
                            debug.EnableDebugLayer();
                            gpu_info!("D3D12 debug layer enabled");
                        }
                    }
                    Err(e) => gpu_warn!("D3D12: debug layer unavailable: {:?}", e),
                }
            }

            let factory_flags = if debug.is_some() {
                DXGI_CREATE_FACTORY_DEBUG
            } else {
                DXGI_CREATE_FACTORY_FLAGS(0)
            };
            let factory: IDXGIFactory4 = CreateDXGIFactory2(factory_flags)
                .map_err(|e| graphics_err(GraphicsError::DeviceCreation, "CreateDXGIFactory2", e))?;

            let (adapter, device, adapter_name) = select_adapter(&factory)?;
            if debug.is_some() {
                install_message_filter(&device);
            }
            gpu_info!("D3D12 device created on adapter: {}", adapter_name);

            Ok(Self {
                inner: Arc::new(DeviceInner {
                    device,
                    factory,
                    _adapter: adapter,
                    debug,
                    adapter_name,
                }),
            })
        }
    }

    fn backend(&self) -> GpuBackend {
        GpuBackend::DirectX12
    }

    fn adapter_name(&self) -> String {
        self.inner.adapter_name.clone()
    }

    fn create_queue(&self, kind: CommandBufferType) -> Result<ID3D12CommandQueue> {
        let desc = D3D12_COMMAND_QUEUE_DESC {
            Type: list_type(kind),
            Priority: D3D12_COMMAND_QUEUE_PRIORITY_NORMAL.0,
            Flags: D3D12_COMMAND_QUEUE_FLAG_NONE,
            NodeMask: 0,
        };
        unsafe {
            self.inner
                .device
                .CreateCommandQueue(&desc)
                .map_err(|e| graphics_err(GraphicsError::QueueCreation, "CreateCommandQueue", e).into())
        }
    }

    fn destroy_queue(&self, _queue: ID3D12CommandQueue) {}

    fn execute_command_list(&self, queue: &ID3D12CommandQueue, list: &Dx12CommandList) -> Result<()> {
        unsafe {
            queue.ExecuteCommandLists(&[Some(list.list.clone().into())]);
        }
        Ok(())
    }

    fn create_fence(&self, initial_value: u64) -> Result<ID3D12Fence> {
        unsafe {
            self.inner
                .device
                .CreateFence(initial_value, D3D12_FENCE_FLAG_NONE)
                .map_err(|e| {
                    gpu_error!("D3D12: CreateFence failed: {:?}", e);
                    SyncError::FenceCreation(format!("{:?}", e)).into()
                })
        }
    }

    fn destroy_fence(&self, _fence: ID3D12Fence) {}

    fn signal_fence(&self, queue: &ID3D12CommandQueue, fence: &ID3D12Fence, value: u64) -> Result<()> {
        unsafe {
            queue
                .Signal(fence, value)
                .map_err(|e| graphics_err(GraphicsError::CommandExecution, "ID3D12CommandQueue::Signal", e).into())
        }
    }

    fn fence_completed_value(&self, fence: &ID3D12Fence) -> u64 {
        unsafe { fence.GetCompletedValue() }
    }

    fn wait_fence(&self, fence: &ID3D12Fence, value: u64, timeout: Option<Duration>) -> Result<()> {
        let millis = timeout
            .map(|t| t.as_millis().min((INFINITE - 1) as u128) as u32)
            .unwrap_or(INFINITE);
        unsafe {
            let event = CreateEventA(None, false, false, None).map_err(|e| {
                gpu_error!("Failed to create fence wait event: {:?}", e);
                SyncError::WaitEventCreation(format!("{:?}", e))
            })?;
            let armed = fence.SetEventOnCompletion(value, event);
            if armed.is_ok() {
                WaitForSingleObject(event, millis);
            }
            let _ = CloseHandle(event);
            armed.map_err(|e| {
                gpu_error!("SetEventOnCompletion failed: {:?}", e);
                SyncError::Wait(format!("{:?}", e)).into()
            })
        }
    }

    fn create_command_allocator(&self, kind: CommandBufferType) -> Result<ID3D12CommandAllocator> {
        unsafe {
            self.inner
                .device
                .CreateCommandAllocator(list_type(kind))
                .map_err(|e| graphics_err(GraphicsError::CommandAllocation, "CreateCommandAllocator", e).into())
        }
    }

    fn destroy_command_allocator(&self, _allocator: ID3D12CommandAllocator) {}

    fn create_command_list(
        &self,
        kind: CommandBufferType,
        allocator: &ID3D12CommandAllocator,
    ) -> Result<Dx12CommandList> {
        unsafe {
            let list: ID3D12GraphicsCommandList = self
                .inner
                .device
                .CreateCommandList(0, list_type(kind), allocator, None::<&ID3D12PipelineState>)
                .map_err(|e| graphics_err(GraphicsError::CommandAllocation, "CreateCommandList", e))?;
            Ok(Dx12CommandList { list })
        }
    }

    fn destroy_command_list(&self, _list: Dx12CommandList) {}

    fn reset_command_allocator(&self, allocator: &ID3D12CommandAllocator) -> Result<()> {
        unsafe {
            allocator
                .Reset()
                .map_err(|e| graphics_err(GraphicsError::InvalidState, "ID3D12CommandAllocator::Reset", e).into())
        }
    }

    fn reset_command_list(&self, list: &mut Dx12CommandList, allocator: &ID3D12CommandAllocator) -> Result<()> {
        unsafe {
            list.list
                .Reset(allocator, None::<&ID3D12PipelineState>)
                .map_err(|e| graphics_err(GraphicsError::InvalidState, "ID3D12GraphicsCommandList::Reset", e).into())
        }
    }

    fn close_command_list(&self, list: &mut Dx12CommandList) -> Result<()> {
        unsafe {
            list.list
                .Close()
                .map_err(|e| graphics_err(GraphicsError::InvalidState, "ID3D12GraphicsCommandList::Close", e).into())
        }
    }

    fn create_texture(&self, desc: &TextureDesc, initial: ImageLayout) -> Result<Dx12Resource> {
        let resource = self.create_committed_texture(desc, initial)?;
        let size = desc.width as u64 * desc.height as u64 * desc.array_layers as u64
            * desc.format.bytes_per_pixel() as u64;
        Ok(Dx12Resource { resource, heap: HeapKind::Default, size })
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Dx12Resource> {
        let resource_desc = D3D12_RESOURCE_DESC {
            Dimension: D3D12_RESOURCE_DIMENSION_BUFFER,
            Alignment: 0,
            Width: desc.size,
            Height: 1,
            DepthOrArraySize: 1,
            MipLevels: 1,
            Format: DXGI_FORMAT_UNKNOWN,
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            Layout: D3D12_TEXTURE_LAYOUT_ROW_MAJOR,
            Flags: D3D12_RESOURCE_FLAG_NONE,
        };
        let heap_props = Self::heap_properties(desc.heap);
        let initial = match desc.heap {
            HeapKind::Upload => D3D12_RESOURCE_STATE_GENERIC_READ,
            HeapKind::Default => D3D12_RESOURCE_STATE_COMMON,
        };

        let mut resource: Option<ID3D12Resource> = None;
        unsafe {
            self.inner
                .device
                .CreateCommittedResource(
                    &heap_props,
                    D3D12_HEAP_FLAG_NONE,
                    &resource_desc,
                    initial,
                    None,
                    &mut resource,
                )
                .map_err(|e| graphics_err(GraphicsError::ResourceCreation, "CreateCommittedResource (buffer)", e))?;
        }
        let resource = resource.ok_or_else(|| {
            GraphicsError::ResourceCreation("CreateCommittedResource returned no buffer".to_string())
        })?;
        Ok(Dx12Resource { resource, heap: desc.heap, size: desc.size })
    }

    fn write_buffer(&self, buffer: &Dx12Resource, offset: u64, data: &[u8]) -> Result<()> {
        if buffer.heap != HeapKind::Upload {
            return Err(GraphicsError::InvalidUsage("only upload-heap buffers are CPU writable".to_string()).into());
        }
        let end = offset + data.len() as u64;
        if end > buffer.size {
            return Err(GraphicsError::InvalidUsage(format!(
                "write of {} bytes at offset {} exceeds buffer size {}",
                data.len(),
                offset,
                buffer.size
            ))
            .into());
        }

        unsafe {
            // CPU 不读回，读范围为空
            let read_range = D3D12_RANGE { Begin: 0, End: 0 };
            let mut mapped: *mut c_void = std::ptr::null_mut();
            buffer
                .resource
                .Map(0, Some(&read_range), Some(&mut mapped))
                .map_err(|e| graphics_err(GraphicsError::ResourceCreation, "ID3D12Resource::Map", e))?;
            if mapped.is_null() {
                buffer.resource.Unmap(0, None);
                return Err(GraphicsError::ResourceCreation("Map returned a null pointer".to_string()).into());
            }
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                (mapped as *mut u8).add(offset as usize),
                data.len(),
            );
            buffer.resource.Unmap(0, None);
        }
        Ok(())
    }

    fn destroy_resource(&self, _resource: Dx12Resource) {}

    fn create_descriptor_heap(&self, kind: DescriptorHeapType, capacity: u32) -> Result<Dx12DescriptorHeap> {
        let desc = D3D12_DESCRIPTOR_HEAP_DESC {
            Type: heap_type(kind),
            NumDescriptors: capacity,
            Flags: if kind.is_shader_visible() {
                D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE
            } else {
                D3D12_DESCRIPTOR_HEAP_FLAG_NONE
            },
            NodeMask: 0,
        };
        unsafe {
            let heap: ID3D12DescriptorHeap = self
                .inner
                .device
                .CreateDescriptorHeap(&desc)
                .map_err(|e| graphics_err(GraphicsError::ResourceCreation, "CreateDescriptorHeap", e))?;
            let increment = self.inner.device.GetDescriptorHandleIncrementSize(heap_type(kind));
            Ok(Dx12DescriptorHeap { heap, kind, increment })
        }
    }

    fn descriptor_heap_layout(&self, heap: &Dx12DescriptorHeap) -> DescriptorHeapLayout {
        heap.layout()
    }

    fn destroy_descriptor_heap(&self, _heap: Dx12DescriptorHeap) {}

    fn create_render_target_view(
        &self,
        resource: &Dx12Resource,
        format: ImageFormat,
        dest: CpuDescriptorHandle,
    ) -> Result<()> {
        let desc = descriptor::render_target_desc(format);
        unsafe {
            self.inner
                .device
                .CreateRenderTargetView(&resource.resource, Some(&desc), descriptor::cpu_handle(dest));
        }
        Ok(())
    }

    fn create_depth_stencil_view(
        &self,
        resource: &Dx12Resource,
        _format: ImageFormat,
        dest: CpuDescriptorHandle,
    ) -> Result<()> {
        let desc = descriptor::depth_stencil_desc();
        unsafe {
            self.inner
                .device
                .CreateDepthStencilView(&resource.resource, Some(&desc), descriptor::cpu_handle(dest));
        }
        Ok(())
    }

    fn create_shader_resource_view(
        &self,
        resource: &Dx12Resource,
        format: ImageFormat,
        dimension: ViewDimension,
        dest: CpuDescriptorHandle,
    ) -> Result<()> {
        let desc = descriptor::shader_resource_desc(format, dimension);
        unsafe {
            self.inner
                .device
                .CreateShaderResourceView(&resource.resource, Some(&desc), descriptor::cpu_handle(dest));
        }
        Ok(())
    }

    fn create_unordered_access_view(
        &self,
        resource: &Dx12Resource,
        format: ImageFormat,
        dimension: ViewDimension,
        dest: CpuDescriptorHandle,
    ) -> Result<()> {
        let desc = descriptor::unordered_access_desc(format, dimension)?;
        unsafe {
            self.inner.device.CreateUnorderedAccessView(
                &resource.resource,
                None::<&ID3D12Resource>,
                Some(&desc),
                descriptor::cpu_handle(dest),
            );
        }
        Ok(())
    }

    fn create_swap_chain(&self, queue: &ID3D12CommandQueue, desc: &SwapChainDesc) -> Result<Dx12SwapChain> {
        match desc.window {
            Some(RawWindowHandle::Win32(handle)) => {
                let hwnd = HWND(handle.hwnd.get() as *mut c_void);
                Dx12SwapChain::for_window(self, queue, hwnd, desc)
            }
            Some(other) => Err(GraphicsError::SwapchainError(format!(
                "unsupported window handle for DirectX 12: {:?}",
                other
            ))
            .into()),
            None => Dx12SwapChain::offscreen(self, desc),
        }
    }

    fn swap_chain_buffer(&self, swap_chain: &Dx12SwapChain, index: u32) -> Result<Dx12Resource> {
        let resource = swap_chain.buffer(index)?;
        let (width, height) = swap_chain.extent();
        let size = width as u64 * height as u64 * ImageFormat::Rgba8.bytes_per_pixel() as u64;
        Ok(Dx12Resource { resource, heap: HeapKind::Default, size })
    }

    fn swap_chain_current_index(&self, swap_chain: &Dx12SwapChain) -> u32 {
        swap_chain.current_index()
    }

    fn present(&self, swap_chain: &mut Dx12SwapChain, vsync: bool) -> Result<()> {
        swap_chain.present(vsync)
    }

    fn resize_swap_chain(&self, swap_chain: &mut Dx12SwapChain, width: u32, height: u32) -> Result<()> {
        swap_chain.resize(self, width, height)
    }

    fn destroy_swap_chain(&self, _swap_chain: Dx12SwapChain) {}

    fn report_live_objects(&self) {
        if self.inner.debug.is_none() {
            return;
        }
        unsafe {
            match self.inner.device.cast::<ID3D12DebugDevice>() {
                Ok(debug_device) => {
                    if let Err(e) = debug_device.ReportLiveDeviceObjects(D3D12_RLDO_DETAIL | D3D12_RLDO_IGNORE_INTERNAL) {
                        gpu_warn!("ReportLiveDeviceObjects failed: {:?}", e);
                    }
                }
                Err(e) => gpu_warn!("D3D12 debug device unavailable: {:?}", e),
            }
        }
    }
}
