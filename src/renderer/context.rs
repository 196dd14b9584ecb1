//! 设备上下文
//!
//! 显式构造、显式传递的设备上下文，没有全局实例。
//!
//! # 主要组件
//!
//! - 设备：由 `GpuDevice::create` 选择适配器并创建
//! - 三个队列（graphics / compute / upload），各自带一个 Fence；graphics 队列的 Fence 兼作设备 Fence
//! - 三个描述符堆（RTV / DSV / CBV-SRV-UAV）
//! - 交换链及其渲染目标图像
//! - 每个在途帧一份 `FrameResources`：图形命令缓冲、帧 Fence 与最后一次 signal 的值
//!
//! # 初始化流程
//!
//! 1. 创建设备（可选调试层）
//! 2. 创建队列与队列 Fence
//! 3. 创建每帧的命令缓冲与 Fence
//! 4. 创建描述符堆
//! 5. 创建交换链，把每个缓冲包装为 RenderTarget 图像
//!
//! # 销毁顺序
//!
//! 交换链图像 → 交换链 → 描述符堆 → 每帧命令缓冲与 Fence → 队列 Fence → 队列 → 设备。
//! 由 `Drop` 保证，`exit` 只是显式的入口。

use raw_window_handle::RawWindowHandle;

use crate::core::config::{Config, GraphicsConfig};
use crate::core::error::{DistGpuError, GraphicsError, Result};
use crate::gfx::backend::{DeviceDesc, GpuBackend, GpuDevice, SwapChainDesc};
use crate::renderer::command::{CommandBuffer, CommandBufferType};
use crate::renderer::descriptor::{DescriptorHeap, DescriptorHeapType};
use crate::renderer::resource::{Image, ImageFormat, ImageLayout};
use crate::renderer::sync::{Fence, FenceValue};
use crate::{gpu_error, gpu_info, gpu_warn};

/// 交换链的像素格式
pub const SWAP_CHAIN_FORMAT: ImageFormat = ImageFormat::Rgba8;

/// 呈现表面的描述
#[derive(Debug, Clone, Copy)]
pub struct SurfaceDesc {
    pub width: u32,
    pub height: u32,
    /// 没有窗口时交换链使用离屏缓冲
    pub window: Option<RawWindowHandle>,
}

impl SurfaceDesc {
    /// 没有窗口的离屏表面
    pub fn offscreen(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            window: None,
        }
    }
}

/// 命令队列及其 Fence
pub struct Queue<D: GpuDevice> {
    native: D::Queue,
    kind: CommandBufferType,
    fence: Fence<D>,
}

impl<D: GpuDevice> Queue<D> {
    fn new(device: &D, kind: CommandBufferType) -> Result<Self> {
        let native = device.create_queue(kind).map_err(|e| {
            gpu_error!(queue = kind.name(), "D3D12: Failed to create command queue: {}", e);
            e
        })?;
        let fence = match Fence::new(device) {
            Ok(fence) => fence,
            Err(e) => {
                gpu_error!(queue = kind.name(), "D3D12: Failed to create queue fence: {}", e);
                device.destroy_queue(native);
                return Err(e);
            }
        };
        Ok(Self { native, kind, fence })
    }

    pub fn kind(&self) -> CommandBufferType {
        self.kind
    }

    pub fn native(&self) -> &D::Queue {
        &self.native
    }

    pub fn fence(&self) -> &Fence<D> {
        &self.fence
    }

    /// 在本队列上 signal 本队列的 Fence
    pub fn signal(&mut self) -> Result<FenceValue> {
        self.fence.signal(&self.native)
    }

    /// 排空本队列上已提交的全部工作
    pub fn flush(&mut self) -> Result<()> {
        self.fence.flush(&self.native)
    }
}

/// 每个在途帧的资源
pub struct FrameResources<D: GpuDevice> {
    command_buffer: CommandBuffer<D>,
    fence: Fence<D>,
    fence_value: FenceValue,
}

impl<D: GpuDevice> FrameResources<D> {
    fn new(device: &D) -> Result<Self> {
        let command_buffer = CommandBuffer::new(device, CommandBufferType::Graphics)?;
        let fence = match Fence::new(device) {
            Ok(fence) => fence,
            Err(e) => {
                command_buffer.free();
                return Err(e);
            }
        };
        Ok(Self {
            command_buffer,
            fence,
            fence_value: FenceValue::default(),
        })
    }

    pub fn command_buffer(&self) -> &CommandBuffer<D> {
        &self.command_buffer
    }

    /// 该帧最后一次 signal 的值
    pub fn fence_value(&self) -> FenceValue {
        self.fence_value
    }

    fn free(self) {
        self.command_buffer.free();
        self.fence.free();
    }
}

/// 堆类型在 `heaps` 中的位置
fn heap_slot(kind: DescriptorHeapType) -> usize {
    match kind {
        DescriptorHeapType::Rtv => 0,
        DescriptorHeapType::Dsv => 1,
        DescriptorHeapType::CbvSrvUav => 2,
    }
}

/// 队列类型在 `queues` 中的位置
fn queue_slot(kind: CommandBufferType) -> usize {
    match kind {
        CommandBufferType::Graphics => 0,
        CommandBufferType::Compute => 1,
        CommandBufferType::Upload => 2,
    }
}

fn missing_swap_chain_image(index: usize) -> DistGpuError {
    gpu_warn!(index, "No swap chain image for the current frame");
    GraphicsError::SwapchainError(format!("no swap chain image at index {}", index)).into()
}

/// 交换链图像在 resize 失败后可能缺失
fn swap_chain_slot<D: GpuDevice>(images: &mut [Image<D>], index: usize) -> Result<&mut Image<D>> {
    images.get_mut(index).ok_or_else(|| missing_swap_chain_image(index))
}

/// 设备上下文
pub struct Context<D: GpuDevice> {
    device: D,
    graphics: GraphicsConfig,
    queues: Vec<Queue<D>>,
    frames: Vec<FrameResources<D>>,
    heaps: Vec<DescriptorHeap<D>>,
    swap_chain: Option<D::SwapChain>,
    swap_chain_images: Vec<Image<D>>,
    frame_index: usize,
    width: u32,
    height: u32,
}

impl<D: GpuDevice> Context<D> {
    /// 创建设备并初始化上下文
    pub fn new(config: &Config, surface: SurfaceDesc) -> Result<Self> {
        let device = D::create(&DeviceDesc {
            debug_enabled: config.graphics.debug_enabled,
        })?;
        Self::with_device(device, config, surface)
    }

    /// 在已经创建好的设备上初始化上下文
    ///
    /// 任何一步失败时，已经创建的对象按销毁顺序释放，然后返回该步的错误。
    pub fn with_device(device: D, config: &Config, surface: SurfaceDesc) -> Result<Self> {
        config.validate()?;
        gpu_info!(
            adapter = %device.adapter_name(),
            backend = device.backend().name(),
            debug = config.graphics.debug_enabled,
            "GPU device selected"
        );

        let mut ctx = Self {
            device,
            graphics: config.graphics.clone(),
            queues: Vec::with_capacity(CommandBufferType::ALL.len()),
            frames: Vec::with_capacity(config.graphics.buffer_count as usize),
            heaps: Vec::with_capacity(3),
            swap_chain: None,
            swap_chain_images: Vec::new(),
            frame_index: 0,
            width: surface.width,
            height: surface.height,
        };

        for kind in CommandBufferType::ALL {
            let queue = Queue::new(&ctx.device, kind)?;
            ctx.queues.push(queue);
        }

        for _ in 0..config.graphics.buffer_count {
            let frame = FrameResources::new(&ctx.device)?;
            ctx.frames.push(frame);
        }

        let heap_sizes = [
            (DescriptorHeapType::Rtv, config.graphics.rtv_heap_size),
            (DescriptorHeapType::Dsv, config.graphics.dsv_heap_size),
            (DescriptorHeapType::CbvSrvUav, config.graphics.cbv_srv_uav_heap_size),
        ];
        for (kind, capacity) in heap_sizes {
            let heap = DescriptorHeap::new(&ctx.device, kind, capacity)?;
            ctx.heaps.push(heap);
        }

        let swap_chain = ctx
            .device
            .create_swap_chain(
                ctx.queues[queue_slot(CommandBufferType::Graphics)].native(),
                &SwapChainDesc {
                    width: surface.width,
                    height: surface.height,
                    buffer_count: config.graphics.buffer_count,
                    format: SWAP_CHAIN_FORMAT,
                    window: surface.window,
                },
            )
            .map_err(|e| {
                gpu_error!("D3D12: Failed to create swap chain: {}", e);
                e
            })?;
        ctx.swap_chain = Some(swap_chain);
        ctx.acquire_swap_chain_images()?;

        gpu_info!(
            width = surface.width,
            height = surface.height,
            buffers = config.graphics.buffer_count,
            windowed = surface.window.is_some(),
            "Swapchain created"
        );
        Ok(ctx)
    }

    fn acquire_swap_chain_images(&mut self) -> Result<()> {
        for index in 0..self.graphics.buffer_count {
            let native = {
                let swap_chain = self.swap_chain_ref()?;
                self.device.swap_chain_buffer(swap_chain, index)?
            };
            let (width, height) = (self.width, self.height);
            let image = Image::from_swap_chain(self, native, width, height, SWAP_CHAIN_FORMAT)?;
            self.swap_chain_images.push(image);
        }
        let swap_chain = self.swap_chain_ref()?;
        self.frame_index = self.device.swap_chain_current_index(swap_chain) as usize;
        Ok(())
    }

    fn release_swap_chain_images(&mut self) {
        for image in std::mem::take(&mut self.swap_chain_images) {
            image.free(self);
        }
    }

    fn swap_chain_ref(&self) -> Result<&D::SwapChain> {
        self.swap_chain
            .as_ref()
            .ok_or_else(|| GraphicsError::SwapchainError("swap chain already released".to_string()).into())
    }

    /// 开始一帧
    ///
    /// 等待当前帧上一次提交完成，开始录制它的命令缓冲，
    /// 并把交换链图像从 Present 转换到 RenderTarget。
    pub fn begin_frame(&mut self) -> Result<()> {
        let index = self.frame_index;
        let frame = &mut self.frames[index];
        frame.fence.sync(frame.fence_value)?;
        let image = swap_chain_slot(&mut self.swap_chain_images, index)?;
        frame.command_buffer.begin()?;
        frame.command_buffer.image_barrier(image, ImageLayout::RenderTarget)
    }

    /// 结束一帧：交换链图像转回 Present，结束录制并提交到图形队列
    pub fn end_frame(&mut self) -> Result<()> {
        let index = self.frame_index;
        let frame = &mut self.frames[index];
        let image = swap_chain_slot(&mut self.swap_chain_images, index)?;
        frame.command_buffer.image_barrier(image, ImageLayout::Present)?;
        frame.command_buffer.end()?;
        frame
            .command_buffer
            .submit(&self.queues[queue_slot(CommandBufferType::Graphics)])
    }

    /// 呈现并推进到交换链的下一个缓冲
    pub fn present(&mut self) -> Result<()> {
        let vsync = self.graphics.vsync;
        let swap_chain = self
            .swap_chain
            .as_mut()
            .ok_or_else(|| GraphicsError::SwapchainError("swap chain already released".to_string()))?;
        self.device.present(swap_chain, vsync).map_err(|e| {
            gpu_error!("D3D12: Failed to present: {}", e);
            e
        })?;

        let graphics = &self.queues[queue_slot(CommandBufferType::Graphics)];
        let frame = &mut self.frames[self.frame_index];
        frame.fence_value = frame.fence.signal(graphics.native())?;

        self.frame_index = self.device.swap_chain_current_index(swap_chain) as usize;
        Ok(())
    }

    /// 排空所有队列
    pub fn wait(&mut self) -> Result<()> {
        for queue in &mut self.queues {
            queue.flush()?;
        }
        Ok(())
    }

    /// 调整交换链大小；宽或高为 0（例如窗口最小化）时忽略
    ///
    /// 失败后上下文不再持有交换链图像，帧操作返回 `SwapchainError`，
    /// 再次成功的 `resize` 可以恢复。
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            gpu_warn!(width, height, "Ignoring resize to a zero extent");
            return Ok(());
        }

        self.wait()?;
        self.release_swap_chain_images();

        let swap_chain = self
            .swap_chain
            .as_mut()
            .ok_or_else(|| GraphicsError::SwapchainError("swap chain already released".to_string()))?;
        self.device
            .resize_swap_chain(swap_chain, width, height)
            .map_err(|e| {
                gpu_error!(width, height, "D3D12: Failed to resize swap chain: {}", e);
                e
            })?;

        self.width = width;
        self.height = height;
        if let Err(e) = self.acquire_swap_chain_images() {
            gpu_error!(width, height, "Failed to re-acquire swap chain images: {}", e);
            self.release_swap_chain_images();
            return Err(e);
        }
        gpu_info!(width, height, "Swapchain resized");
        Ok(())
    }

    /// 当前帧的交换链图像
    pub fn swap_chain_image(&self) -> Result<&Image<D>> {
        self.swap_chain_images
            .get(self.frame_index)
            .ok_or_else(|| missing_swap_chain_image(self.frame_index))
    }

    /// 当前帧的图形命令缓冲
    pub fn image_command_buffer(&mut self) -> &mut CommandBuffer<D> {
        &mut self.frames[self.frame_index].command_buffer
    }

    /// 同时借出当前帧的命令缓冲与交换链图像，用于对交换链图像录制屏障
    pub fn frame_mut(&mut self) -> Result<(&mut CommandBuffer<D>, &mut Image<D>)> {
        let index = self.frame_index;
        let image = swap_chain_slot(&mut self.swap_chain_images, index)?;
        Ok((&mut self.frames[index].command_buffer, image))
    }

    pub fn frame(&self, index: usize) -> Option<&FrameResources<D>> {
        self.frames.get(index)
    }

    /// 把命令缓冲提交到与它类型相同的队列
    pub fn submit(&mut self, command_buffer: &mut CommandBuffer<D>) -> Result<()> {
        let queue = &self.queues[queue_slot(command_buffer.kind())];
        command_buffer.submit(queue)
    }

    /// 阻塞直到指定队列排空
    pub fn flush_queue(&mut self, kind: CommandBufferType) -> Result<()> {
        self.queues[queue_slot(kind)].flush()
    }

    pub fn queue(&self, kind: CommandBufferType) -> &Queue<D> {
        &self.queues[queue_slot(kind)]
    }

    pub fn heap(&self, kind: DescriptorHeapType) -> &DescriptorHeap<D> {
        &self.heaps[heap_slot(kind)]
    }

    pub(crate) fn heap_mut(&mut self, kind: DescriptorHeapType) -> &mut DescriptorHeap<D> {
        &mut self.heaps[heap_slot(kind)]
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn buffer_count(&self) -> u32 {
        self.graphics.buffer_count
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn backend(&self) -> GpuBackend {
        self.device.backend()
    }

    /// 等待 GPU 空闲后销毁上下文
    pub fn exit(self) {
        gpu_info!("Context exit");
        drop(self);
    }

    fn teardown(&mut self) {
        self.release_swap_chain_images();
        if let Some(swap_chain) = self.swap_chain.take() {
            self.device.destroy_swap_chain(swap_chain);
        }

        for heap in std::mem::take(&mut self.heaps) {
            heap.free(&self.device);
        }

        for frame in std::mem::take(&mut self.frames) {
            frame.free();
        }

        let queues = std::mem::take(&mut self.queues);
        let mut natives = Vec::with_capacity(queues.len());
        for queue in queues {
            queue.fence.free();
            natives.push(queue.native);
        }
        for native in natives {
            self.device.destroy_queue(native);
        }

        self.device.report_live_objects();
    }
}

impl<D: GpuDevice> Drop for Context<D> {
    fn drop(&mut self) {
        if let Err(e) = self.wait() {
            gpu_error!("Failed to drain queues before teardown: {}", e);
        }
        self.teardown();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::gfx::headless::{CompletionMode, HeadlessDevice, NativeCall, ObjectKind};
    use std::thread;
    use std::time::Duration;

    pub(crate) fn headless_context_with(config: &Config) -> Context<HeadlessDevice> {
        Context::with_device(HeadlessDevice::new(), config, SurfaceDesc::offscreen(64, 64)).unwrap()
    }

    pub(crate) fn headless_context() -> Context<HeadlessDevice> {
        headless_context_with(&Config::default())
    }

    #[test]
    fn test_context_creation() {
        let ctx = headless_context();
        let device = ctx.device().clone();
        let buffers = ctx.buffer_count() as u64;

        assert_eq!(ctx.backend(), GpuBackend::DirectX12);
        assert_eq!(ctx.dimensions(), (64, 64));
        assert_eq!(device.live_count(ObjectKind::Queue), 3);
        assert_eq!(device.live_count(ObjectKind::Fence), 3 + buffers);
        assert_eq!(device.live_count(ObjectKind::CommandList), buffers);
        assert_eq!(device.live_count(ObjectKind::DescriptorHeap), 3);
        assert_eq!(device.live_count(ObjectKind::SwapChain), 1);
        assert_eq!(ctx.heap(DescriptorHeapType::Rtv).used() as u64, buffers);
        assert_eq!(ctx.swap_chain_image().unwrap().layout(), ImageLayout::Present);

        ctx.exit();
        assert_eq!(device.total_live(), 0);
    }

    #[test]
    fn test_clear_and_present() {
        let mut ctx = headless_context();
        let device = ctx.device().clone();

        ctx.begin_frame().unwrap();
        let (commands, image) = ctx.frame_mut().unwrap();
        commands.clear_color(image, 0.1, 0.2, 0.3, 1.0).unwrap();
        device.clear_journal();
        ctx.end_frame().unwrap();
        ctx.present().unwrap();

        let journal = device.journal();
        assert_eq!(
            journal.count(|c| matches!(
                c,
                NativeCall::ResourceBarrier {
                    before: ImageLayout::RenderTarget,
                    after: ImageLayout::Present,
                    ..
                }
            )),
            1
        );
        assert_eq!(journal.count(|c| matches!(c, NativeCall::Present { .. })), 1);

        // present 之后推进到下一个缓冲，上一帧的图像处于 Present
        assert_eq!(ctx.frame_index(), 1);
        let previous = ctx.frame(0).unwrap();
        assert_eq!(previous.fence_value().value(), 1);

        ctx.exit();
        assert_eq!(device.total_live(), 0);
    }

    #[test]
    fn test_frame_pacing_waits_for_gpu() {
        let mut ctx = headless_context();
        let device = ctx.device().clone();
        device.set_completion_mode(CompletionMode::Deferred);

        for _ in 0..2 {
            ctx.begin_frame().unwrap();
            ctx.end_frame().unwrap();
            ctx.present().unwrap();
        }
        assert_eq!(ctx.frame_index(), 0);
        assert!(device.pending_signals() > 0);

        let retirer = device.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            retirer.retire_all();
        });

        // 帧 0 的 Fence 尚未完成，begin_frame 必须阻塞到退役线程推进进度
        ctx.begin_frame().unwrap();
        assert!(ctx.frame(0).unwrap().fence_value().value() >= 1);
        handle.join().unwrap();

        ctx.end_frame().unwrap();
        device.set_completion_mode(CompletionMode::Immediate);
        ctx.exit();
        assert_eq!(device.total_live(), 0);
    }

    #[test]
    fn test_drop_after_leaving_deferred_mode() {
        let mut ctx = headless_context();
        let device = ctx.device().clone();
        device.set_completion_mode(CompletionMode::Deferred);

        ctx.begin_frame().unwrap();
        ctx.end_frame().unwrap();
        ctx.present().unwrap();
        assert!(device.pending_signals() > 0);

        // 挂起的 signal 在切回 Immediate 时完成，Drop 中的等待不会阻塞
        device.set_completion_mode(CompletionMode::Immediate);
        assert_eq!(device.pending_signals(), 0);
        drop(ctx);
        assert_eq!(device.total_live(), 0);
    }

    #[test]
    fn test_resize() {
        let mut ctx = headless_context();
        let device = ctx.device().clone();
        let rtv_used = ctx.heap(DescriptorHeapType::Rtv).used();

        ctx.resize(0, 100).unwrap();
        assert_eq!(ctx.dimensions(), (64, 64));

        ctx.resize(128, 96).unwrap();
        assert_eq!(ctx.dimensions(), (128, 96));
        assert_eq!(ctx.swap_chain_image().unwrap().width(), 128);
        assert_eq!(ctx.heap(DescriptorHeapType::Rtv).used(), rtv_used);
        assert_eq!(
            device
                .journal()
                .count(|c| matches!(c, NativeCall::ResizeSwapChain { width: 128, height: 96, .. })),
            1
        );

        ctx.exit();
        assert_eq!(device.total_live(), 0);
    }

    #[test]
    fn test_failed_resize_leaves_frames_recoverable() {
        let mut ctx = headless_context();
        let device = ctx.device().clone();
        let rtv_used = ctx.heap(DescriptorHeapType::Rtv).used();

        device.fail_creation(ObjectKind::Resource);
        let err = ctx.resize(128, 128).unwrap_err();
        assert!(err.to_string().contains("swap chain buffer"));
        assert_eq!(ctx.heap(DescriptorHeapType::Rtv).used(), rtv_used - ctx.buffer_count());

        // 没有交换链图像时帧操作返回错误而不是越界
        let err = ctx.begin_frame().unwrap_err();
        assert!(matches!(err, DistGpuError::Graphics(GraphicsError::SwapchainError(_))));
        assert!(ctx.end_frame().is_err());
        assert!(ctx.swap_chain_image().is_err());
        assert!(ctx.frame_mut().is_err());

        ctx.resize(128, 128).unwrap();
        assert_eq!(ctx.heap(DescriptorHeapType::Rtv).used(), rtv_used);
        assert_eq!(ctx.swap_chain_image().unwrap().width(), 128);
        ctx.begin_frame().unwrap();
        ctx.end_frame().unwrap();
        ctx.present().unwrap();

        ctx.exit();
        assert_eq!(device.total_live(), 0);
    }

    #[test]
    fn test_teardown_order() {
        let ctx = headless_context();
        let device = ctx.device().clone();
        device.clear_journal();
        ctx.exit();

        let journal = device.journal();
        let last_destroy = |kind: ObjectKind| {
            journal
                .last_position(|c| matches!(c, NativeCall::Destroy { kind: k, .. } if *k == kind))
                .unwrap()
        };
        let first_destroy = |kind: ObjectKind| {
            journal
                .position(|c| matches!(c, NativeCall::Destroy { kind: k, .. } if *k == kind))
                .unwrap()
        };

        assert!(last_destroy(ObjectKind::Resource) < first_destroy(ObjectKind::SwapChain));
        assert!(first_destroy(ObjectKind::SwapChain) < first_destroy(ObjectKind::DescriptorHeap));
        assert!(last_destroy(ObjectKind::DescriptorHeap) < first_destroy(ObjectKind::CommandList));
        assert!(last_destroy(ObjectKind::CommandAllocator) < first_destroy(ObjectKind::Queue));
        assert!(last_destroy(ObjectKind::Fence) < first_destroy(ObjectKind::Queue));

        let report = journal
            .position(|c| matches!(c, NativeCall::ReportLiveObjects))
            .unwrap();
        assert_eq!(report, journal.len() - 1);
        assert_eq!(device.total_live(), 0);
    }

    #[test]
    fn test_creation_failure_cleans_up() {
        for kind in [ObjectKind::Queue, ObjectKind::DescriptorHeap, ObjectKind::SwapChain] {
            let device = HeadlessDevice::new();
            device.fail_creation(kind);
            let result = Context::with_device(
                device.clone(),
                &Config::default(),
                SurfaceDesc::offscreen(32, 32),
            );
            let err = result.err().unwrap();
            assert!(err.is_fatal(), "{:?}", kind);
            assert_eq!(device.total_live(), 0, "{:?}", kind);
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.graphics.buffer_count = 1;
        let result = Context::with_device(HeadlessDevice::new(), &config, SurfaceDesc::offscreen(8, 8));
        assert!(result.is_err());
    }

    #[test]
    fn test_wait_flushes_every_queue() {
        let mut ctx = headless_context();
        let device = ctx.device().clone();
        device.clear_journal();
        ctx.wait().unwrap();

        let journal = device.journal();
        for kind in CommandBufferType::ALL {
            assert_eq!(
                journal.count(|c| matches!(c, NativeCall::Signal { queue, .. } if *queue == kind)),
                1
            );
        }
    }
}
