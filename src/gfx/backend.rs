//! 图形后端的统一抽象接口
//!
//! 本模块定义了所有原生图形后端（DirectX 12、无头模拟设备）必须实现的接口。
//! 上层的 `Fence`、`CommandBuffer`、`Image`、`Context` 都是对 `D: GpuDevice` 泛型的，
//! 后端在进程启动时选定一次，之后所有调用都是单态化的静态分发，没有逐调用的虚函数开销。
//!
//! 原生对象以关联类型的形式由公开句柄按值持有，销毁接口按值接收对象，
//! 因此一个原生对象只能被销毁一次。

use std::time::Duration;

use raw_window_handle::RawWindowHandle;

use crate::core::error::Result;
use crate::renderer::command::CommandBufferType;
use crate::renderer::descriptor::{CpuDescriptorHandle, DescriptorHeapType};
use crate::renderer::resource::{ImageFormat, ImageLayout};

/// 后端能力查询结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuBackend {
    DirectX12,
    Vulkan,
}

impl GpuBackend {
    /// 获取后端名称
    pub fn name(&self) -> &'static str {
        match self {
            GpuBackend::DirectX12 => "DirectX 12",
            GpuBackend::Vulkan => "Vulkan",
        }
    }
}

/// 设备创建参数
#[derive(Debug, Clone, Copy)]
pub struct DeviceDesc {
    /// 是否安装验证 / 调试层
    pub debug_enabled: bool,
}

/// 资源所在的内存堆
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapKind {
    /// GPU 本地内存
    Default,
    /// CPU 可写、GPU 可读的上传堆
    Upload,
}

/// 二维纹理（或纹理数组）的创建描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    /// 数组层数，立方体贴图为 6
    pub array_layers: u16,
    pub format: ImageFormat,
    pub allow_render_target: bool,
    pub allow_depth_stencil: bool,
    pub allow_unordered_access: bool,
}

/// 线性缓冲区的创建描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    pub size: u64,
    pub heap: HeapKind,
}

/// 着色器视图的维度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewDimension {
    Texture2D,
    Texture2DArray { layers: u32 },
    TextureCube,
}

/// 描述符堆的地址布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHeapLayout {
    /// CPU 句柄基址
    pub cpu_start: usize,
    /// GPU 句柄基址（仅着色器可见的堆）
    pub gpu_start: Option<u64>,
    /// 每个槽位的字节跨度
    pub increment: u32,
}

/// 视口
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

/// 索引格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    U16,
    U32,
}

/// 缓冲区到纹理拷贝时，缓冲区中像素数据的布局
///
/// D3D12 要求行跨度按 256 字节对齐。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureFootprint {
    pub offset: u64,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub row_pitch: u32,
}

/// 交换链创建描述
#[derive(Debug, Clone, Copy)]
pub struct SwapChainDesc {
    pub width: u32,
    pub height: u32,
    pub buffer_count: u32,
    pub format: ImageFormat,
    /// 没有窗口时后端创建离屏缓冲
    pub window: Option<RawWindowHandle>,
}

/// 原生命令列表的录制接口
///
/// 录制调用本身不会失败；状态检查由上层的 `CommandBuffer` 负责。
pub trait NativeCommandList {
    type Resource;

    fn set_vertex_buffer(&mut self, buffer: &Self::Resource, size: u64, stride: u32);
    fn set_index_buffer(&mut self, buffer: &Self::Resource, size: u64, format: IndexFormat);
    fn clear_render_target(&mut self, rtv: CpuDescriptorHandle, color: [f32; 4]);
    fn set_viewport(&mut self, viewport: Viewport);
    fn draw(&mut self, vertex_count: u32);
    fn draw_indexed(&mut self, index_count: u32);
    fn dispatch(&mut self, x: u32, y: u32, z: u32);
    /// 覆盖全部子资源的状态转换
    fn resource_barrier(&mut self, resource: &Self::Resource, before: ImageLayout, after: ImageLayout);
    /// 子资源 0 到子资源 0 的整体拷贝
    fn copy_texture(&mut self, source: &Self::Resource, dest: &Self::Resource);
    fn copy_buffer_to_texture(
        &mut self,
        source: &Self::Resource,
        dest: &Self::Resource,
        footprint: &TextureFootprint,
    );
}

/// 原生图形设备接口
///
/// 实现者的 `Clone` 必须是廉价的引用计数克隆（COM 指针或 `Arc`），
/// 命令缓冲、Fence 等对象各自持有一份设备克隆。
pub trait GpuDevice: Clone + Sized {
    type Queue;
    type Fence;
    type CommandAllocator;
    type CommandList: NativeCommandList<Resource = Self::Resource>;
    type Resource;
    type DescriptorHeap;
    type SwapChain;

    /// 选择适配器并创建设备
    fn create(desc: &DeviceDesc) -> Result<Self>;
    fn backend(&self) -> GpuBackend;
    fn adapter_name(&self) -> String;

    // 队列
    fn create_queue(&self, kind: CommandBufferType) -> Result<Self::Queue>;
    fn destroy_queue(&self, queue: Self::Queue);
    fn execute_command_list(&self, queue: &Self::Queue, list: &Self::CommandList) -> Result<()>;

    // Fence
    fn create_fence(&self, initial_value: u64) -> Result<Self::Fence>;
    fn destroy_fence(&self, fence: Self::Fence);
    /// 在队列上排入一个 signal，队列执行到这里时 Fence 的完成值变为 `value`
    fn signal_fence(&self, queue: &Self::Queue, fence: &Self::Fence, value: u64) -> Result<()>;
    fn fence_completed_value(&self, fence: &Self::Fence) -> u64;
    /// 阻塞在操作系统事件上，直到完成值达到 `value` 或超时（`None` 表示无限等待）
    fn wait_fence(&self, fence: &Self::Fence, value: u64, timeout: Option<Duration>) -> Result<()>;

    // 命令分配器 / 命令列表
    fn create_command_allocator(&self, kind: CommandBufferType) -> Result<Self::CommandAllocator>;
    fn destroy_command_allocator(&self, allocator: Self::CommandAllocator);
    fn create_command_list(
        &self,
        kind: CommandBufferType,
        allocator: &Self::CommandAllocator,
    ) -> Result<Self::CommandList>;
    fn destroy_command_list(&self, list: Self::CommandList);
    fn reset_command_allocator(&self, allocator: &Self::CommandAllocator) -> Result<()>;
    fn reset_command_list(
        &self,
        list: &mut Self::CommandList,
        allocator: &Self::CommandAllocator,
    ) -> Result<()>;
    fn close_command_list(&self, list: &mut Self::CommandList) -> Result<()>;

    // 资源
    fn create_texture(&self, desc: &TextureDesc, initial: ImageLayout) -> Result<Self::Resource>;
    fn create_buffer(&self, desc: &BufferDesc) -> Result<Self::Resource>;
    fn write_buffer(&self, buffer: &Self::Resource, offset: u64, data: &[u8]) -> Result<()>;
    fn destroy_resource(&self, resource: Self::Resource);

    // 描述符
    fn create_descriptor_heap(&self, kind: DescriptorHeapType, capacity: u32) -> Result<Self::DescriptorHeap>;
    fn descriptor_heap_layout(&self, heap: &Self::DescriptorHeap) -> DescriptorHeapLayout;
    fn destroy_descriptor_heap(&self, heap: Self::DescriptorHeap);
    fn create_render_target_view(
        &self,
        resource: &Self::Resource,
        format: ImageFormat,
        dest: CpuDescriptorHandle,
    ) -> Result<()>;
    fn create_depth_stencil_view(
        &self,
        resource: &Self::Resource,
        format: ImageFormat,
        dest: CpuDescriptorHandle,
    ) -> Result<()>;
    fn create_shader_resource_view(
        &self,
        resource: &Self::Resource,
        format: ImageFormat,
        dimension: ViewDimension,
        dest: CpuDescriptorHandle,
    ) -> Result<()>;
    fn create_unordered_access_view(
        &self,
        resource: &Self::Resource,
        format: ImageFormat,
        dimension: ViewDimension,
        dest: CpuDescriptorHandle,
    ) -> Result<()>;

    // 交换链
    fn create_swap_chain(&self, queue: &Self::Queue, desc: &SwapChainDesc) -> Result<Self::SwapChain>;
    fn swap_chain_buffer(&self, swap_chain: &Self::SwapChain, index: u32) -> Result<Self::Resource>;
    fn swap_chain_current_index(&self, swap_chain: &Self::SwapChain) -> u32;
    fn present(&self, swap_chain: &mut Self::SwapChain, vsync: bool) -> Result<()>;
    fn resize_swap_chain(&self, swap_chain: &mut Self::SwapChain, width: u32, height: u32) -> Result<()>;
    fn destroy_swap_chain(&self, swap_chain: Self::SwapChain);

    /// 报告设备认为仍然存活的对象（仅调试层启用时有输出）
    fn report_live_objects(&self);
}
