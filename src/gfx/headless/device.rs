//! 无头设备实现
//!
//! 在进程内模拟 D3D12 的对象模型：命令列表有打开 / 关闭状态，
//! 队列只接受同类型的命令列表，Fence 的完成值由队列推进，
//! 交换链缓冲在 resize 前必须全部释放。

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::core::error::{GraphicsError, Result, SyncError};
use crate::gfx::backend::{
    BufferDesc, DescriptorHeapLayout, DeviceDesc, GpuBackend, GpuDevice, HeapKind, IndexFormat,
    NativeCommandList, SwapChainDesc, TextureDesc, TextureFootprint, ViewDimension, Viewport,
};
use crate::renderer::command::CommandBufferType;
use crate::renderer::descriptor::{CpuDescriptorHandle, DescriptorHeapType};
use crate::renderer::resource::{ImageFormat, ImageLayout};
use crate::{gpu_error, gpu_info, gpu_warn};

use super::journal::{Journal, NativeCall, ObjectKind, ViewKind};

/// 队列上的工作何时完成
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// signal 立即完成
    Immediate,
    /// signal 挂起，直到调用 `retire_all` 或切回 `Immediate`
    ///
    /// 此模式下所有阻塞等待都会一直阻塞，包括 `Context::wait`、`exit`
    /// 以及 `Context` 的 `Drop`。释放上下文前必须有其他线程调用 `retire_all`，
    /// 或先切回 `Immediate`。
    Deferred,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counter {
    created: u64,
    destroyed: u64,
}

struct FenceState {
    completed: Mutex<u64>,
    cond: Condvar,
}

impl FenceState {
    fn complete(&self, value: u64) {
        let mut completed = self.completed.lock().unwrap_or_else(|e| e.into_inner());
        if value > *completed {
            *completed = value;
        }
        self.cond.notify_all();
    }
}

struct State {
    next_id: u64,
    mode: CompletionMode,
    debug_enabled: bool,
    journal: Journal,
    counters: HashMap<ObjectKind, Counter>,
    pending: Vec<(Arc<FenceState>, u64)>,
    fail_creation: HashSet<ObjectKind>,
    fail_next_wait_event: bool,
    /// 交换链 id -> 尚未释放的缓冲引用数
    swap_chain_refs: HashMap<u64, u32>,
}

impl State {
    fn record(&mut self, call: NativeCall) {
        self.journal.push(call);
    }

    /// 登记一次对象创建；若该种类被注入了失败则返回 None
    fn create(&mut self, kind: ObjectKind) -> Option<u64> {
        if self.fail_creation.remove(&kind) {
            return None;
        }
        self.next_id += 1;
        let id = self.next_id;
        self.counters.entry(kind).or_default().created += 1;
        self.record(NativeCall::Create { kind, id });
        Some(id)
    }

    fn destroy(&mut self, kind: ObjectKind, id: u64) {
        self.counters.entry(kind).or_default().destroyed += 1;
        self.record(NativeCall::Destroy { kind, id });
    }
}

/// 无头设备
///
/// 克隆共享同一份状态，可以跨线程使用（测试中由另一个线程推进 GPU 完成进度）。
#[derive(Clone)]
pub struct HeadlessDevice {
    shared: Arc<Mutex<State>>,
}

impl HeadlessDevice {
    /// 创建立即完成模式的设备
    pub fn new() -> Self {
        Self::with_mode(CompletionMode::Immediate)
    }

    pub fn with_mode(mode: CompletionMode) -> Self {
        Self {
            shared: Arc::new(Mutex::new(State {
                next_id: 0,
                mode,
                debug_enabled: false,
                journal: Journal::default(),
                counters: HashMap::new(),
                pending: Vec::new(),
                fail_creation: HashSet::new(),
                fail_next_wait_event: false,
                swap_chain_refs: HashMap::new(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 切回 `Immediate` 时同时完成所有挂起的 signal
    pub fn set_completion_mode(&self, mode: CompletionMode) {
        self.state().mode = mode;
        if mode == CompletionMode::Immediate {
            self.retire_all();
        }
    }

    /// 完成所有挂起的 signal
    pub fn retire_all(&self) {
        let pending = std::mem::take(&mut self.state().pending);
        for (fence, value) in pending {
            fence.complete(value);
        }
    }

    /// 挂起中的 signal 数量
    pub fn pending_signals(&self) -> usize {
        self.state().pending.len()
    }

    /// 让下一次创建指定种类的对象失败
    pub fn fail_creation(&self, kind: ObjectKind) {
        self.state().fail_creation.insert(kind);
    }

    /// 让下一次等待时的事件创建失败
    pub fn fail_next_wait_event(&self) {
        self.state().fail_next_wait_event = true;
    }

    /// 调用日志快照
    pub fn journal(&self) -> Journal {
        self.state().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.state().journal.clear();
    }

    pub fn created_count(&self, kind: ObjectKind) -> u64 {
        self.state().counters.get(&kind).map(|c| c.created).unwrap_or(0)
    }

    pub fn destroyed_count(&self, kind: ObjectKind) -> u64 {
        self.state().counters.get(&kind).map(|c| c.destroyed).unwrap_or(0)
    }

    /// 指定种类仍然存活的对象数
    pub fn live_count(&self, kind: ObjectKind) -> u64 {
        let state = self.state();
        state
            .counters
            .get(&kind)
            .map(|c| c.created.saturating_sub(c.destroyed))
            .unwrap_or(0)
    }

    /// 所有种类存活对象的总数
    pub fn total_live(&self) -> u64 {
        ObjectKind::ALL.iter().map(|kind| self.live_count(*kind)).sum()
    }

    fn creation_failed(&self, operation: &str) -> String {
        let message = format!("D3D12: Failed to {}", operation);
        gpu_error!("{}", message);
        message
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HeadlessDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessDevice")
            .field("live_objects", &self.total_live())
            .finish()
    }
}

pub struct HeadlessQueue {
    id: u64,
    kind: CommandBufferType,
}

pub struct HeadlessFence {
    id: u64,
    state: Arc<FenceState>,
}

pub struct HeadlessCommandAllocator {
    id: u64,
}

pub struct HeadlessCommandList {
    id: u64,
    kind: CommandBufferType,
    open: bool,
    shared: Arc<Mutex<State>>,
}

impl HeadlessCommandList {
    fn record(&self, call: NativeCall) {
        if !self.open {
            gpu_warn!(list = self.id, "Recording into a closed command list");
        }
        self.shared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(call);
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// 模拟的 GPU 资源（纹理、缓冲或交换链缓冲）
pub struct HeadlessResource {
    id: u64,
    heap: HeapKind,
    size: u64,
    swap_chain: Option<u64>,
}

impl HeadlessResource {
    pub fn id(&self) -> u64 {
        self.id
    }
}

pub struct HeadlessDescriptorHeap {
    id: u64,
    layout: DescriptorHeapLayout,
}

pub struct HeadlessSwapChain {
    id: u64,
    width: u32,
    height: u32,
    buffer_count: u32,
    current: u32,
}

impl HeadlessSwapChain {
    pub fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// 不同堆类型的描述符跨度，取常见硬件上的值
fn descriptor_increment(kind: DescriptorHeapType) -> u32 {
    match kind {
        DescriptorHeapType::Rtv => 32,
        DescriptorHeapType::Dsv => 8,
        DescriptorHeapType::CbvSrvUav => 32,
    }
}

impl NativeCommandList for HeadlessCommandList {
    type Resource = HeadlessResource;

    fn set_vertex_buffer(&mut self, buffer: &HeadlessResource, _size: u64, stride: u32) {
        self.record(NativeCall::SetVertexBuffer {
            list: self.id,
            resource: buffer.id,
            stride,
        });
    }

    fn set_index_buffer(&mut self, buffer: &HeadlessResource, _size: u64, format: IndexFormat) {
        self.record(NativeCall::SetIndexBuffer {
            list: self.id,
            resource: buffer.id,
            format,
        });
    }

    fn clear_render_target(&mut self, rtv: CpuDescriptorHandle, color: [f32; 4]) {
        self.record(NativeCall::ClearRenderTarget {
            list: self.id,
            rtv: rtv.ptr,
            color,
        });
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.record(NativeCall::SetViewport {
            list: self.id,
            width: viewport.width,
            height: viewport.height,
        });
    }

    fn draw(&mut self, vertex_count: u32) {
        self.record(NativeCall::Draw {
            list: self.id,
            vertex_count,
        });
    }

    fn draw_indexed(&mut self, index_count: u32) {
        self.record(NativeCall::DrawIndexed {
            list: self.id,
            index_count,
        });
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.record(NativeCall::Dispatch { list: self.id, x, y, z });
    }

    fn resource_barrier(&mut self, resource: &HeadlessResource, before: ImageLayout, after: ImageLayout) {
        self.record(NativeCall::ResourceBarrier {
            list: self.id,
            resource: resource.id,
            before,
            after,
        });
    }

    fn copy_texture(&mut self, source: &HeadlessResource, dest: &HeadlessResource) {
        self.record(NativeCall::CopyTexture {
            list: self.id,
            source: source.id,
            dest: dest.id,
        });
    }

    fn copy_buffer_to_texture(
        &mut self,
        source: &HeadlessResource,
        dest: &HeadlessResource,
        footprint: &TextureFootprint,
    ) {
        let needed = footprint.offset + footprint.row_pitch as u64 * footprint.height as u64;
        if needed > source.size {
            gpu_warn!(
                needed,
                size = source.size,
                "Copy footprint exceeds the source buffer"
            );
        }
        self.record(NativeCall::CopyBufferToTexture {
            list: self.id,
            source: source.id,
            dest: dest.id,
            footprint: *footprint,
        });
    }
}

impl GpuDevice for HeadlessDevice {
    type Queue = HeadlessQueue;
    type Fence = HeadlessFence;
    type CommandAllocator = HeadlessCommandAllocator;
    type CommandList = HeadlessCommandList;
    type Resource = HeadlessResource;
    type DescriptorHeap = HeadlessDescriptorHeap;
    type SwapChain = HeadlessSwapChain;

    fn create(desc: &DeviceDesc) -> Result<Self> {
        let device = Self::new();
        device.state().debug_enabled = desc.debug_enabled;
        gpu_info!(debug = desc.debug_enabled, "Headless device created");
        Ok(device)
    }

    fn backend(&self) -> GpuBackend {
        GpuBackend::DirectX12
    }

    fn adapter_name(&self) -> String {
        "Headless Adapter".to_string()
    }

    fn create_queue(&self, kind: CommandBufferType) -> Result<HeadlessQueue> {
        let id = self
            .state()
            .create(ObjectKind::Queue)
            .ok_or_else(|| GraphicsError::QueueCreation(self.creation_failed("create command queue")))?;
        self.state().record(NativeCall::CreateQueue { id, kind });
        Ok(HeadlessQueue { id, kind })
    }

    fn destroy_queue(&self, queue: HeadlessQueue) {
        self.state().destroy(ObjectKind::Queue, queue.id);
    }

    fn execute_command_list(&self, queue: &HeadlessQueue, list: &HeadlessCommandList) -> Result<()> {
        if list.open {
            return Err(GraphicsError::CommandExecution(
                "D3D12: ExecuteCommandLists called with an open command list".to_string(),
            )
            .into());
        }
        if list.kind != queue.kind {
            return Err(GraphicsError::CommandExecution(format!(
                "D3D12: {:?} command list executed on a {:?} queue",
                list.kind, queue.kind
            ))
            .into());
        }
        self.state().record(NativeCall::ExecuteCommandList {
            queue: queue.kind,
            list: list.id,
        });
        Ok(())
    }

    fn create_fence(&self, initial_value: u64) -> Result<HeadlessFence> {
        let id = self
            .state()
            .create(ObjectKind::Fence)
            .ok_or_else(|| SyncError::FenceCreation(self.creation_failed("create fence")))?;
        Ok(HeadlessFence {
            id,
            state: Arc::new(FenceState {
                completed: Mutex::new(initial_value),
                cond: Condvar::new(),
            }),
        })
    }

    fn destroy_fence(&self, fence: HeadlessFence) {
        self.state().destroy(ObjectKind::Fence, fence.id);
    }

    fn signal_fence(&self, queue: &HeadlessQueue, fence: &HeadlessFence, value: u64) -> Result<()> {
        let mode = {
            let mut state = self.state();
            state.record(NativeCall::Signal {
                queue: queue.kind,
                fence: fence.id,
                value,
            });
            if state.mode == CompletionMode::Deferred {
                state.pending.push((Arc::clone(&fence.state), value));
            }
            state.mode
        };
        if mode == CompletionMode::Immediate {
            fence.state.complete(value);
        }
        Ok(())
    }

    fn fence_completed_value(&self, fence: &HeadlessFence) -> u64 {
        *fence.state.completed.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wait_fence(&self, fence: &HeadlessFence, value: u64, timeout: Option<Duration>) -> Result<()> {
        {
            let mut state = self.state();
            if std::mem::take(&mut state.fail_next_wait_event) {
                let message = "D3D12: Failed to create fence event".to_string();
                gpu_error!("{}", message);
                return Err(SyncError::WaitEventCreation(message).into());
            }
            state.record(NativeCall::WaitFence { fence: fence.id, value });
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        let mut completed = fence.state.completed.lock().unwrap_or_else(|e| e.into_inner());
        while *completed < value {
            match deadline {
                None => {
                    completed = fence
                        .state
                        .cond
                        .wait(completed)
                        .unwrap_or_else(|e| e.into_inner());
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    completed = fence
                        .state
                        .cond
                        .wait_timeout(completed, deadline - now)
                        .unwrap_or_else(|e| e.into_inner())
                        .0;
                }
            }
        }
        Ok(())
    }

    fn create_command_allocator(&self, _kind: CommandBufferType) -> Result<HeadlessCommandAllocator> {
        let id = self.state().create(ObjectKind::CommandAllocator).ok_or_else(|| {
            GraphicsError::CommandAllocation(self.creation_failed("create command allocator"))
        })?;
        Ok(HeadlessCommandAllocator { id })
    }

    fn destroy_command_allocator(&self, allocator: HeadlessCommandAllocator) {
        self.state().destroy(ObjectKind::CommandAllocator, allocator.id);
    }

    fn create_command_list(
        &self,
        kind: CommandBufferType,
        _allocator: &HeadlessCommandAllocator,
    ) -> Result<HeadlessCommandList> {
        let id = self.state().create(ObjectKind::CommandList).ok_or_else(|| {
            GraphicsError::CommandAllocation(self.creation_failed("create command list"))
        })?;
        // D3D12 创建出来的命令列表处于打开状态
        Ok(HeadlessCommandList {
            id,
            kind,
            open: true,
            shared: Arc::clone(&self.shared),
        })
    }

    fn destroy_command_list(&self, list: HeadlessCommandList) {
        self.state().destroy(ObjectKind::CommandList, list.id);
    }

    fn reset_command_allocator(&self, allocator: &HeadlessCommandAllocator) -> Result<()> {
        self.state().record(NativeCall::ResetCommandAllocator {
            allocator: allocator.id,
        });
        Ok(())
    }

    fn reset_command_list(
        &self,
        list: &mut HeadlessCommandList,
        _allocator: &HeadlessCommandAllocator,
    ) -> Result<()> {
        if list.open {
            return Err(GraphicsError::CommandAllocation(
                "D3D12: Failed to reset command list: list is still open".to_string(),
            )
            .into());
        }
        list.open = true;
        self.state().record(NativeCall::ResetCommandList { list: list.id });
        Ok(())
    }

    fn close_command_list(&self, list: &mut HeadlessCommandList) -> Result<()> {
        if !list.open {
            return Err(GraphicsError::CommandAllocation(
                "D3D12: Failed to close command list: list is already closed".to_string(),
            )
            .into());
        }
        list.open = false;
        self.state().record(NativeCall::CloseCommandList { list: list.id });
        Ok(())
    }

    fn create_texture(&self, desc: &TextureDesc, initial: ImageLayout) -> Result<HeadlessResource> {
        let mut state = self.state();
        let id = match state.create(ObjectKind::Resource) {
            Some(id) => id,
            None => {
                drop(state);
                return Err(GraphicsError::ResourceCreation(self.creation_failed("create texture")).into());
            }
        };
        state.record(NativeCall::CreateTexture {
            id,
            desc: *desc,
            initial,
        });
        let size = desc.width as u64
            * desc.height as u64
            * desc.array_layers as u64
            * desc.format.bytes_per_pixel() as u64;
        Ok(HeadlessResource {
            id,
            heap: HeapKind::Default,
            size,
            swap_chain: None,
        })
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<HeadlessResource> {
        let mut state = self.state();
        let id = match state.create(ObjectKind::Resource) {
            Some(id) => id,
            None => {
                drop(state);
                return Err(GraphicsError::ResourceCreation(self.creation_failed("create buffer")).into());
            }
        };
        state.record(NativeCall::CreateBuffer { id, desc: *desc });
        Ok(HeadlessResource {
            id,
            heap: desc.heap,
            size: desc.size,
            swap_chain: None,
        })
    }

    fn write_buffer(&self, buffer: &HeadlessResource, offset: u64, data: &[u8]) -> Result<()> {
        if buffer.heap != HeapKind::Upload {
            return Err(GraphicsError::ResourceCreation(
                "D3D12: Failed to map buffer: resource is not CPU visible".to_string(),
            )
            .into());
        }
        if offset + data.len() as u64 > buffer.size {
            return Err(GraphicsError::ResourceCreation(format!(
                "D3D12: write of {} bytes at offset {} exceeds buffer size {}",
                data.len(),
                offset,
                buffer.size
            ))
            .into());
        }
        self.state().record(NativeCall::WriteBuffer {
            resource: buffer.id,
            offset,
            len: data.len(),
        });
        Ok(())
    }

    fn destroy_resource(&self, resource: HeadlessResource) {
        let mut state = self.state();
        if let Some(swap_chain) = resource.swap_chain {
            if let Some(refs) = state.swap_chain_refs.get_mut(&swap_chain) {
                *refs = refs.saturating_sub(1);
            }
        }
        state.destroy(ObjectKind::Resource, resource.id);
    }

    fn create_descriptor_heap(&self, kind: DescriptorHeapType, capacity: u32) -> Result<HeadlessDescriptorHeap> {
        let mut state = self.state();
        let id = match state.create(ObjectKind::DescriptorHeap) {
            Some(id) => id,
            None => {
                drop(state);
                return Err(GraphicsError::ResourceCreation(
                    self.creation_failed("create descriptor heap"),
                )
                .into());
            }
        };
        state.record(NativeCall::CreateDescriptorHeap { id, kind, capacity });

        // 每个堆一段互不重叠的假地址
        let base = (id as usize) << 32;
        Ok(HeadlessDescriptorHeap {
            id,
            layout: DescriptorHeapLayout {
                cpu_start: base,
                gpu_start: kind.is_shader_visible().then_some(base as u64 | 0x8000_0000),
                increment: descriptor_increment(kind),
            },
        })
    }

    fn descriptor_heap_layout(&self, heap: &HeadlessDescriptorHeap) -> DescriptorHeapLayout {
        heap.layout
    }

    fn destroy_descriptor_heap(&self, heap: HeadlessDescriptorHeap) {
        self.state().destroy(ObjectKind::DescriptorHeap, heap.id);
    }

    fn create_render_target_view(
        &self,
        resource: &HeadlessResource,
        _format: ImageFormat,
        dest: CpuDescriptorHandle,
    ) -> Result<()> {
        self.state().record(NativeCall::CreateView {
            kind: ViewKind::RenderTarget,
            resource: resource.id,
            dest: dest.ptr,
        });
        Ok(())
    }

    fn create_depth_stencil_view(
        &self,
        resource: &HeadlessResource,
        _format: ImageFormat,
        dest: CpuDescriptorHandle,
    ) -> Result<()> {
        self.state().record(NativeCall::CreateView {
            kind: ViewKind::DepthStencil,
            resource: resource.id,
            dest: dest.ptr,
        });
        Ok(())
    }

    fn create_shader_resource_view(
        &self,
        resource: &HeadlessResource,
        _format: ImageFormat,
        dimension: ViewDimension,
        dest: CpuDescriptorHandle,
    ) -> Result<()> {
        self.state().record(NativeCall::CreateView {
            kind: ViewKind::ShaderResource(dimension),
            resource: resource.id,
            dest: dest.ptr,
        });
        Ok(())
    }

    fn create_unordered_access_view(
        &self,
        resource: &HeadlessResource,
        _format: ImageFormat,
        dimension: ViewDimension,
        dest: CpuDescriptorHandle,
    ) -> Result<()> {
        self.state().record(NativeCall::CreateView {
            kind: ViewKind::UnorderedAccess(dimension),
            resource: resource.id,
            dest: dest.ptr,
        });
        Ok(())
    }

    fn create_swap_chain(&self, queue: &HeadlessQueue, desc: &SwapChainDesc) -> Result<HeadlessSwapChain> {
        if queue.kind != CommandBufferType::Graphics {
            return Err(GraphicsError::SwapchainError(
                "D3D12: swap chain requires a direct command queue".to_string(),
            )
            .into());
        }
        let mut state = self.state();
        let id = match state.create(ObjectKind::SwapChain) {
            Some(id) => id,
            None => {
                drop(state);
                return Err(GraphicsError::SwapchainError(self.creation_failed("create swap chain")).into());
            }
        };
        state.swap_chain_refs.insert(id, 0);
        Ok(HeadlessSwapChain {
            id,
            width: desc.width,
            height: desc.height,
            buffer_count: desc.buffer_count,
            current: 0,
        })
    }

    fn swap_chain_buffer(&self, swap_chain: &HeadlessSwapChain, index: u32) -> Result<HeadlessResource> {
        if index >= swap_chain.buffer_count {
            return Err(GraphicsError::SwapchainError(format!(
                "D3D12: Failed to get swap chain buffer {} of {}",
                index, swap_chain.buffer_count
            ))
            .into());
        }
        let mut state = self.state();
        let id = match state.create(ObjectKind::Resource) {
            Some(id) => id,
            None => {
                drop(state);
                return Err(GraphicsError::SwapchainError(
                    self.creation_failed("get swap chain buffer"),
                )
                .into());
            }
        };
        *state.swap_chain_refs.entry(swap_chain.id).or_insert(0) += 1;
        state.record(NativeCall::GetSwapChainBuffer {
            swap_chain: swap_chain.id,
            index,
            resource: id,
        });
        let size = swap_chain.width as u64 * swap_chain.height as u64 * 4;
        Ok(HeadlessResource {
            id,
            heap: HeapKind::Default,
            size,
            swap_chain: Some(swap_chain.id),
        })
    }

    fn swap_chain_current_index(&self, swap_chain: &HeadlessSwapChain) -> u32 {
        swap_chain.current
    }

    fn present(&self, swap_chain: &mut HeadlessSwapChain, vsync: bool) -> Result<()> {
        self.state().record(NativeCall::Present {
            swap_chain: swap_chain.id,
            vsync,
        });
        swap_chain.current = (swap_chain.current + 1) % swap_chain.buffer_count.max(1);
        Ok(())
    }

    fn resize_swap_chain(&self, swap_chain: &mut HeadlessSwapChain, width: u32, height: u32) -> Result<()> {
        let mut state = self.state();
        let refs = state.swap_chain_refs.get(&swap_chain.id).copied().unwrap_or(0);
        if refs > 0 {
            drop(state);
            let message = format!(
                "D3D12: Failed to resize swap chain: {} buffer references still held",
                refs
            );
            gpu_error!("{}", message);
            return Err(GraphicsError::SwapchainError(message).into());
        }
        state.record(NativeCall::ResizeSwapChain {
            swap_chain: swap_chain.id,
            width,
            height,
        });
        swap_chain.width = width;
        swap_chain.height = height;
        swap_chain.current = 0;
        Ok(())
    }

    fn destroy_swap_chain(&self, swap_chain: HeadlessSwapChain) {
        let mut state = self.state();
        state.swap_chain_refs.remove(&swap_chain.id);
        state.destroy(ObjectKind::SwapChain, swap_chain.id);
    }

    fn report_live_objects(&self) {
        let debug_enabled = {
            let mut state = self.state();
            state.record(NativeCall::ReportLiveObjects);
            state.debug_enabled
        };
        if debug_enabled {
            for kind in ObjectKind::ALL {
                let live = self.live_count(kind);
                if live > 0 {
                    gpu_warn!(kind = ?kind, live, "Live object reported at device release");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_command_list_open_close_rules() {
        let device = HeadlessDevice::new();
        let allocator = device.create_command_allocator(CommandBufferType::Graphics).unwrap();
        let mut list = device
            .create_command_list(CommandBufferType::Graphics, &allocator)
            .unwrap();
        let queue = device.create_queue(CommandBufferType::Graphics).unwrap();

        // 打开状态下不能提交，也不能重置
        assert!(device.execute_command_list(&queue, &list).is_err());
        assert!(device.reset_command_list(&mut list, &allocator).is_err());

        device.close_command_list(&mut list).unwrap();
        assert!(device.close_command_list(&mut list).is_err());
        device.execute_command_list(&queue, &list).unwrap();

        device.destroy_command_list(list);
        device.destroy_command_allocator(allocator);
        device.destroy_queue(queue);
        assert_eq!(device.total_live(), 0);
    }

    #[test]
    fn test_queue_rejects_other_list_type() {
        let device = HeadlessDevice::new();
        let allocator = device.create_command_allocator(CommandBufferType::Graphics).unwrap();
        let mut list = device
            .create_command_list(CommandBufferType::Graphics, &allocator)
            .unwrap();
        device.close_command_list(&mut list).unwrap();
        let upload = device.create_queue(CommandBufferType::Upload).unwrap();

        let err = device.execute_command_list(&upload, &list).unwrap_err();
        assert!(err.to_string().contains("Upload"));
    }

    #[test]
    fn test_deferred_signal_completes_on_retire() {
        let device = HeadlessDevice::with_mode(CompletionMode::Deferred);
        let queue = device.create_queue(CommandBufferType::Graphics).unwrap();
        let fence = device.create_fence(0).unwrap();

        device.signal_fence(&queue, &fence, 1).unwrap();
        assert_eq!(device.fence_completed_value(&fence), 0);
        assert_eq!(device.pending_signals(), 1);

        device.retire_all();
        assert_eq!(device.fence_completed_value(&fence), 1);
        assert_eq!(device.pending_signals(), 0);
    }

    #[test]
    fn test_leaving_deferred_mode_retires_pending() {
        let device = HeadlessDevice::with_mode(CompletionMode::Deferred);
        let queue = device.create_queue(CommandBufferType::Upload).unwrap();
        let fence = device.create_fence(0).unwrap();
        device.signal_fence(&queue, &fence, 1).unwrap();
        device.signal_fence(&queue, &fence, 2).unwrap();

        device.set_completion_mode(CompletionMode::Deferred);
        assert_eq!(device.pending_signals(), 2);

        device.set_completion_mode(CompletionMode::Immediate);
        assert_eq!(device.pending_signals(), 0);
        assert_eq!(device.fence_completed_value(&fence), 2);
        device.wait_fence(&fence, 2, None).unwrap();
    }

    #[test]
    fn test_wait_blocks_until_retired() {
        let device = HeadlessDevice::with_mode(CompletionMode::Deferred);
        let queue = device.create_queue(CommandBufferType::Compute).unwrap();
        let fence = device.create_fence(0).unwrap();
        device.signal_fence(&queue, &fence, 1).unwrap();

        let retirer = device.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            retirer.retire_all();
        });

        device.wait_fence(&fence, 1, None).unwrap();
        assert_eq!(device.fence_completed_value(&fence), 1);
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_times_out() {
        let device = HeadlessDevice::with_mode(CompletionMode::Deferred);
        let fence = device.create_fence(0).unwrap();
        device
            .wait_fence(&fence, 5, Some(Duration::from_millis(5)))
            .unwrap();
        assert_eq!(device.fence_completed_value(&fence), 0);
    }

    #[test]
    fn test_injected_failures() {
        let device = HeadlessDevice::new();
        device.fail_creation(ObjectKind::Fence);
        assert!(device.create_fence(0).is_err());
        // 注入只生效一次
        let fence = device.create_fence(0).unwrap();

        device.fail_next_wait_event();
        let err = device.wait_fence(&fence, 0, None).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("event"));
    }

    #[test]
    fn test_swap_chain_resize_requires_released_buffers() {
        let device = HeadlessDevice::new();
        let queue = device.create_queue(CommandBufferType::Graphics).unwrap();
        let mut swap_chain = device
            .create_swap_chain(
                &queue,
                &SwapChainDesc {
                    width: 64,
                    height: 64,
                    buffer_count: 2,
                    format: ImageFormat::Rgba8,
                    window: None,
                },
            )
            .unwrap();

        let buffer = device.swap_chain_buffer(&swap_chain, 1).unwrap();
        assert!(device.swap_chain_buffer(&swap_chain, 2).is_err());
        assert!(device.resize_swap_chain(&mut swap_chain, 32, 32).is_err());

        device.destroy_resource(buffer);
        device.resize_swap_chain(&mut swap_chain, 32, 32).unwrap();
        assert_eq!(swap_chain.extent(), (32, 32));

        device.present(&mut swap_chain, true).unwrap();
        assert_eq!(device.swap_chain_current_index(&swap_chain), 1);
        device.present(&mut swap_chain, true).unwrap();
        assert_eq!(device.swap_chain_current_index(&swap_chain), 0);
    }

    #[test]
    fn test_write_buffer_bounds() {
        let device = HeadlessDevice::new();
        let upload = device
            .create_buffer(&BufferDesc { size: 16, heap: HeapKind::Upload })
            .unwrap();
        let local = device
            .create_buffer(&BufferDesc { size: 16, heap: HeapKind::Default })
            .unwrap();

        device.write_buffer(&upload, 0, &[0u8; 16]).unwrap();
        assert!(device.write_buffer(&upload, 8, &[0u8; 16]).is_err());
        assert!(device.write_buffer(&local, 0, &[0u8; 4]).is_err());
    }
}
