//! 命令缓冲区管理模块
//!
//! 封装原生命令分配器与命令列表，提供带状态检查的录制接口。
//!
//! # 状态机
//!
//! ```text
//! new ──(立即关闭)──▶ Closed ──begin──▶ Recording ──end──▶ Closed ──submit──▶ Submitted
//!                                         ▲                                    │
//!                                         └───────────────begin────────────────┘
//! ```
//!
//! 录制操作只在 `Recording` 状态下被接受，其他状态返回 `GraphicsError::InvalidState`。
//! 对同一个实例的录制需要 `&mut`，因此同一时刻只有一个录制者。
//!
//! # 命令缓冲区类型
//!
//! - **Graphics**: 图形和计算命令，提交到直接队列
//! - **Compute**: 计算专用命令
//! - **Upload**: 拷贝专用命令

use crate::core::error::{GraphicsError, Result};
use crate::gfx::backend::{GpuDevice, IndexFormat, NativeCommandList, TextureFootprint, Viewport};
use crate::renderer::context::Queue;
use crate::renderer::resource::{Buffer, BufferType, Image, ImageLayout};
use crate::{gpu_error, gpu_warn};

/// D3D12 纹理拷贝要求的行跨度对齐
pub const TEXTURE_PITCH_ALIGNMENT: u32 = 256;

/// 命令缓冲区类型
///
/// 决定原生命令列表的种类（direct / compute / copy）以及它提交到的队列。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandBufferType {
    Graphics,
    Compute,
    Upload,
}

impl CommandBufferType {
    pub const ALL: [CommandBufferType; 3] = [
        CommandBufferType::Graphics,
        CommandBufferType::Compute,
        CommandBufferType::Upload,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CommandBufferType::Graphics => "graphics",
            CommandBufferType::Compute => "compute",
            CommandBufferType::Upload => "upload",
        }
    }
}

/// 命令缓冲区状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferState {
    /// 初始状态（原生列表刚创建，尚未关闭）
    Initial,
    /// 正在记录
    Recording,
    /// 已完成记录，可以提交
    Closed,
    /// 已提交到队列
    Submitted,
}

/// 按 `alignment`（2 的幂）向上对齐
pub fn align_up(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) & !(alignment - 1)
}

/// 命令缓冲区
///
/// 独占一个原生命令分配器和一个原生命令列表。
pub struct CommandBuffer<D: GpuDevice> {
    device: D,
    kind: CommandBufferType,
    allocator: D::CommandAllocator,
    list: D::CommandList,
    state: CommandBufferState,
}

impl<D: GpuDevice> CommandBuffer<D> {
    /// 创建命令缓冲区
    ///
    /// 原生命令列表创建后处于打开状态，这里立即关闭它，
    /// 使第一次 `begin` 与之后的复用走同一条路径。
    pub fn new(device: &D, kind: CommandBufferType) -> Result<Self> {
        let allocator = device.create_command_allocator(kind)?;
        let list = match device.create_command_list(kind, &allocator) {
            Ok(list) => list,
            Err(e) => {
                device.destroy_command_allocator(allocator);
                return Err(e);
            }
        };

        let mut buffer = Self {
            device: device.clone(),
            kind,
            allocator,
            list,
            state: CommandBufferState::Initial,
        };

        if let Err(e) = buffer.device.close_command_list(&mut buffer.list) {
            gpu_error!(kind = kind.name(), "D3D12: Failed to close command list: {}", e);
            buffer.free();
            return Err(e);
        }
        buffer.state = CommandBufferState::Closed;
        Ok(buffer)
    }

    /// 开始录制
    ///
    /// 复用已提交的缓冲区之前，调用方必须先等待上一次提交对应的 Fence，
    /// 否则重置分配器会破坏 GPU 仍在读取的命令内存。
    pub fn begin(&mut self) -> Result<()> {
        if self.state == CommandBufferState::Recording {
            gpu_warn!(kind = self.kind.name(), "begin called while already recording");
            return Err(GraphicsError::InvalidState(
                "begin called while already recording".to_string(),
            )
            .into());
        }

        self.device.reset_command_allocator(&self.allocator).map_err(|e| {
            gpu_error!(kind = self.kind.name(), "D3D12: Failed to reset command allocator: {}", e);
            e
        })?;
        self.device
            .reset_command_list(&mut self.list, &self.allocator)
            .map_err(|e| {
                gpu_error!(kind = self.kind.name(), "D3D12: Failed to reset command list: {}", e);
                e
            })?;

        self.state = CommandBufferState::Recording;
        Ok(())
    }

    /// 结束录制
    pub fn end(&mut self) -> Result<()> {
        self.ensure_recording("end")?;
        self.device.close_command_list(&mut self.list).map_err(|e| {
            gpu_error!(kind = self.kind.name(), "D3D12: Failed to close command list: {}", e);
            e
        })?;
        self.state = CommandBufferState::Closed;
        Ok(())
    }

    /// 提交到 `queue`，不等待
    pub fn submit(&mut self, queue: &Queue<D>) -> Result<()> {
        if self.state != CommandBufferState::Closed {
            gpu_warn!(kind = self.kind.name(), state = ?self.state, "submit requires a closed command buffer");
            return Err(GraphicsError::InvalidState(format!(
                "submit requires a closed command buffer, found {:?}",
                self.state
            ))
            .into());
        }
        if queue.kind() != self.kind {
            gpu_warn!(
                kind = self.kind.name(),
                queue = queue.kind().name(),
                "Command buffer submitted to a queue of another type"
            );
            return Err(GraphicsError::InvalidUsage(format!(
                "{} command buffer submitted to the {} queue",
                self.kind.name(),
                queue.kind().name()
            ))
            .into());
        }

        self.device
            .execute_command_list(queue.native(), &self.list)
            .map_err(|e| {
                gpu_error!(queue = queue.kind().name(), "D3D12: Failed to execute command list: {}", e);
                e
            })?;
        self.state = CommandBufferState::Submitted;
        Ok(())
    }

    /// 绑定顶点或索引缓冲区
    ///
    /// 其他类型的缓冲区不能绑定到输入装配阶段，记录警告后忽略。
    pub fn bind_buffer(&mut self, buffer: &Buffer<D>) -> Result<()> {
        self.ensure_recording("bind_buffer")?;
        match buffer.kind() {
            BufferType::Vertex => {
                self.list
                    .set_vertex_buffer(buffer.native(), buffer.size(), buffer.stride());
            }
            BufferType::Index => {
                let format = match buffer.stride() {
                    4 => IndexFormat::U32,
                    2 => IndexFormat::U16,
                    stride => {
                        gpu_warn!(stride, "Index buffer stride must be 2 or 4, bind ignored");
                        return Ok(());
                    }
                };
                self.list.set_index_buffer(buffer.native(), buffer.size(), format);
            }
            other => {
                gpu_warn!(kind = ?other, "Only vertex and index buffers can be bound, bind ignored");
            }
        }
        Ok(())
    }

    /// 用给定颜色清空图像的渲染目标视图
    pub fn clear_color(&mut self, image: &Image<D>, r: f32, g: f32, b: f32, a: f32) -> Result<()> {
        self.ensure_recording("clear_color")?;
        let rtv = image.rtv_handle().ok_or_else(|| {
            gpu_warn!(usage = ?image.usage(), "clear_color on an image without a render target view");
            GraphicsError::InvalidUsage(format!(
                "clear_color requires a render target view, image usage is {:?}",
                image.usage()
            ))
        })?;
        self.list.clear_render_target(rtv, [r, g, b, a]);
        Ok(())
    }

    /// 设置视口，深度范围固定为 [0, 1]
    pub fn set_viewport(&mut self, width: f32, height: f32, x: f32, y: f32) -> Result<()> {
        self.ensure_recording("set_viewport")?;
        self.list.set_viewport(Viewport {
            x,
            y,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        Ok(())
    }

    pub fn draw(&mut self, vertex_count: u32) -> Result<()> {
        self.ensure_recording("draw")?;
        self.list.draw(vertex_count);
        Ok(())
    }

    pub fn draw_indexed(&mut self, index_count: u32) -> Result<()> {
        self.ensure_recording("draw_indexed")?;
        self.list.draw_indexed(index_count);
        Ok(())
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        self.ensure_recording("dispatch")?;
        self.list.dispatch(x, y, z);
        Ok(())
    }

    /// 记录图像从当前布局到 `new_layout` 的转换（覆盖全部子资源）
    ///
    /// `image.layout()` 在录制时就被更新，而不是在 GPU 执行时。
    /// 如果录制后的命令缓冲区被丢弃而没有提交，跟踪的布局会与 GPU 实际状态不一致。
    /// 相同布局之间的转换也会被记录。
    pub fn image_barrier(&mut self, image: &mut Image<D>, new_layout: ImageLayout) -> Result<()> {
        self.ensure_recording("image_barrier")?;
        self.list
            .resource_barrier(image.native(), image.layout(), new_layout);
        image.set_layout(new_layout);
        Ok(())
    }

    /// 缓冲区的布局转换，语义同 `image_barrier`
    pub fn buffer_barrier(&mut self, buffer: &mut Buffer<D>, new_layout: ImageLayout) -> Result<()> {
        self.ensure_recording("buffer_barrier")?;
        self.list
            .resource_barrier(buffer.native(), buffer.layout(), new_layout);
        buffer.set_layout(new_layout);
        Ok(())
    }

    /// 子资源 0 到子资源 0 的整体拷贝，不插入任何屏障
    pub fn blit(&mut self, source: &Image<D>, dest: &Image<D>) -> Result<()> {
        self.ensure_recording("blit")?;
        self.list.copy_texture(source.native(), dest.native());
        Ok(())
    }

    /// 把按 256 字节行跨度排列的暂存缓冲拷贝到图像的子资源 0
    pub fn copy_buffer_to_image(&mut self, source: &Buffer<D>, dest: &Image<D>) -> Result<()> {
        self.ensure_recording("copy_buffer_to_image")?;
        let row_pitch = align_up(
            dest.width() * dest.format().bytes_per_pixel(),
            TEXTURE_PITCH_ALIGNMENT,
        );
        let footprint = TextureFootprint {
            offset: 0,
            width: dest.width(),
            height: dest.height(),
            format: dest.format(),
            row_pitch,
        };

        let required = row_pitch as u64 * dest.height() as u64;
        if source.size() < required {
            gpu_warn!(required, size = source.size(), "Staging buffer too small for image copy");
            return Err(GraphicsError::InvalidUsage(format!(
                "staging buffer holds {} bytes, copy needs {}",
                source.size(),
                required
            ))
            .into());
        }

        self.list
            .copy_buffer_to_texture(source.native(), dest.native(), &footprint);
        Ok(())
    }

    pub fn kind(&self) -> CommandBufferType {
        self.kind
    }

    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    pub fn native_list(&self) -> &D::CommandList {
        &self.list
    }

    /// 先销毁命令列表，再销毁分配器
    pub fn free(self) {
        self.device.destroy_command_list(self.list);
        self.device.destroy_command_allocator(self.allocator);
    }

    fn ensure_recording(&self, operation: &str) -> Result<()> {
        if self.state == CommandBufferState::Recording {
            return Ok(());
        }
        gpu_warn!(
            kind = self.kind.name(),
            state = ?self.state,
            "{} rejected: command buffer is not recording",
            operation
        );
        Err(GraphicsError::InvalidState(format!(
            "{} requires a recording command buffer, found {:?}",
            operation, self.state
        ))
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::DistGpuError;
    use crate::gfx::headless::{HeadlessDevice, NativeCall, ObjectKind};
    use crate::renderer::context::tests::headless_context;
    use crate::renderer::resource::{ImageFormat, ImageUsage};

    fn is_invalid_state(err: &DistGpuError) -> bool {
        matches!(err, DistGpuError::Graphics(GraphicsError::InvalidState(_)))
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(8, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
        assert_eq!(align_up(0, 256), 0);
    }

    #[test]
    fn test_new_closes_list() {
        let device = HeadlessDevice::new();
        let buffer = CommandBuffer::new(&device, CommandBufferType::Graphics).unwrap();
        assert_eq!(buffer.state(), CommandBufferState::Closed);

        let journal = device.journal();
        assert_eq!(
            journal.count(|c| matches!(c, NativeCall::CloseCommandList { .. })),
            1
        );
        buffer.free();
    }

    #[test]
    fn test_state_machine() {
        let device = HeadlessDevice::new();
        let mut buffer = CommandBuffer::new(&device, CommandBufferType::Compute).unwrap();

        // 未 begin 时录制被拒绝
        assert!(is_invalid_state(&buffer.dispatch(1, 1, 1).unwrap_err()));
        assert!(is_invalid_state(&buffer.end().unwrap_err()));

        buffer.begin().unwrap();
        assert_eq!(buffer.state(), CommandBufferState::Recording);
        assert!(is_invalid_state(&buffer.begin().unwrap_err()));
        buffer.dispatch(8, 8, 1).unwrap();
        buffer.end().unwrap();

        // end 之后录制被拒绝
        assert!(is_invalid_state(&buffer.draw(3).unwrap_err()));
        assert_eq!(buffer.state(), CommandBufferState::Closed);

        // 被拒绝的录制不会到达原生列表
        let journal = device.journal();
        assert_eq!(journal.count(|c| matches!(c, NativeCall::Dispatch { .. })), 1);
        assert_eq!(journal.count(|c| matches!(c, NativeCall::Draw { .. })), 0);
        buffer.free();
    }

    #[test]
    fn test_new_and_free_balance() {
        let device = HeadlessDevice::new();
        for kind in CommandBufferType::ALL {
            let buffer = CommandBuffer::new(&device, kind).unwrap();
            buffer.free();
        }
        assert_eq!(device.created_count(ObjectKind::CommandList), 3);
        assert_eq!(device.destroyed_count(ObjectKind::CommandList), 3);
        assert_eq!(device.live_count(ObjectKind::CommandAllocator), 0);
    }

    #[test]
    fn test_creation_failure_releases_allocator() {
        let device = HeadlessDevice::new();
        device.fail_creation(ObjectKind::CommandList);
        let err = CommandBuffer::new(&device, CommandBufferType::Graphics)
            .err()
            .unwrap();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("create command list"));
        assert_eq!(device.live_count(ObjectKind::CommandAllocator), 0);
    }

    #[test]
    fn test_submit_checks_state_and_queue() {
        let mut ctx = headless_context();
        let mut buffer = CommandBuffer::new(ctx.device(), CommandBufferType::Upload).unwrap();

        // 还没有录制过，Closed 状态可以提交，但必须是同类型队列
        let err = buffer.submit(ctx.queue(CommandBufferType::Graphics)).unwrap_err();
        assert!(!err.is_fatal());

        buffer.begin().unwrap();
        let err = buffer.submit(ctx.queue(CommandBufferType::Upload)).unwrap_err();
        assert!(is_invalid_state(&err));

        buffer.end().unwrap();
        buffer.submit(ctx.queue(CommandBufferType::Upload)).unwrap();
        assert_eq!(buffer.state(), CommandBufferState::Submitted);

        ctx.flush_queue(CommandBufferType::Upload).unwrap();
        buffer.begin().unwrap();
        buffer.end().unwrap();
        buffer.free();
    }

    #[test]
    fn test_image_barrier_sets_layout() {
        let mut ctx = headless_context();
        let mut image = Image::new(&mut ctx, 16, 16, ImageFormat::Rgba8, ImageUsage::RenderTarget).unwrap();
        let mut buffer = CommandBuffer::new(ctx.device(), CommandBufferType::Graphics).unwrap();
        buffer.begin().unwrap();

        let layouts = [
            ImageLayout::CopyDest,
            ImageLayout::CopySource,
            ImageLayout::Depth,
            ImageLayout::Present,
            ImageLayout::RenderTarget,
            ImageLayout::ShaderResource,
            ImageLayout::Storage,
            ImageLayout::Common,
        ];
        for from in layouts {
            for to in layouts {
                buffer.image_barrier(&mut image, from).unwrap();
                buffer.image_barrier(&mut image, to).unwrap();
                assert_eq!(image.layout(), to);
            }
        }

        // 相同布局的转换也被记录
        ctx.device().clear_journal();
        buffer.image_barrier(&mut image, ImageLayout::Common).unwrap();
        let journal = ctx.device().journal();
        assert!(journal.calls().iter().any(|c| matches!(
            c,
            NativeCall::ResourceBarrier {
                before: ImageLayout::Common,
                after: ImageLayout::Common,
                ..
            }
        )));

        buffer.end().unwrap();
        buffer.free();
        image.free(&mut ctx);
    }

    #[test]
    fn test_clear_color_requires_rtv() {
        let mut ctx = headless_context();
        let depth = Image::new(&mut ctx, 8, 8, ImageFormat::Depth32, ImageUsage::DepthTarget).unwrap();
        let mut buffer = CommandBuffer::new(ctx.device(), CommandBufferType::Graphics).unwrap();
        buffer.begin().unwrap();

        let err = buffer.clear_color(&depth, 0.0, 0.0, 0.0, 1.0).unwrap_err();
        assert!(matches!(
            err,
            DistGpuError::Graphics(GraphicsError::InvalidUsage(_))
        ));

        buffer.end().unwrap();
        buffer.free();
        depth.free(&mut ctx);
    }

    #[test]
    fn test_bind_buffer_views() {
        let mut ctx = headless_context();
        let vertices = Buffer::new(&mut ctx, BufferType::Vertex, 96, 12).unwrap();
        let indices16 = Buffer::new(&mut ctx, BufferType::Index, 12, 2).unwrap();
        let indices32 = Buffer::new(&mut ctx, BufferType::Index, 24, 4).unwrap();
        let constants = Buffer::new(&mut ctx, BufferType::Constant, 64, 0).unwrap();

        let mut buffer = CommandBuffer::new(ctx.device(), CommandBufferType::Graphics).unwrap();
        ctx.device().clear_journal();
        buffer.begin().unwrap();
        buffer.bind_buffer(&vertices).unwrap();
        buffer.bind_buffer(&indices16).unwrap();
        buffer.bind_buffer(&indices32).unwrap();
        buffer.bind_buffer(&constants).unwrap();
        buffer.draw_indexed(6).unwrap();
        buffer.end().unwrap();

        let journal = ctx.device().journal();
        assert_eq!(
            journal.count(|c| matches!(c, NativeCall::SetVertexBuffer { stride: 12, .. })),
            1
        );
        assert_eq!(
            journal.count(|c| matches!(c, NativeCall::SetIndexBuffer { format: IndexFormat::U16, .. })),
            1
        );
        assert_eq!(
            journal.count(|c| matches!(c, NativeCall::SetIndexBuffer { format: IndexFormat::U32, .. })),
            1
        );
        // 常量缓冲区绑定被忽略
        assert_eq!(
            journal.count(|c| matches!(
                c,
                NativeCall::SetVertexBuffer { .. } | NativeCall::SetIndexBuffer { .. }
            )),
            2
        );

        buffer.free();
        for b in [vertices, indices16, indices32, constants] {
            b.free();
        }
    }

    #[test]
    fn test_blit_inserts_no_barriers() {
        let mut ctx = headless_context();
        let source = Image::new_copy(&mut ctx, 4, 4).unwrap();
        let dest = Image::new_copy(&mut ctx, 4, 4).unwrap();
        let mut buffer = CommandBuffer::new(ctx.device(), CommandBufferType::Graphics).unwrap();

        ctx.device().clear_journal();
        buffer.begin().unwrap();
        buffer.blit(&source, &dest).unwrap();
        buffer.end().unwrap();

        let journal = ctx.device().journal();
        assert_eq!(journal.count(|c| matches!(c, NativeCall::CopyTexture { .. })), 1);
        assert_eq!(journal.count(|c| matches!(c, NativeCall::ResourceBarrier { .. })), 0);

        buffer.free();
        source.free(&mut ctx);
        dest.free(&mut ctx);
    }

    #[test]
    fn test_viewport_depth_range() {
        let device = HeadlessDevice::new();
        let mut buffer = CommandBuffer::new(&device, CommandBufferType::Graphics).unwrap();
        buffer.begin().unwrap();
        buffer.set_viewport(640.0, 480.0, 0.0, 0.0).unwrap();
        buffer.draw(3).unwrap();
        buffer.end().unwrap();

        let journal = device.journal();
        assert!(journal.calls().iter().any(|c| matches!(
            c,
            NativeCall::SetViewport { width, height, .. } if *width == 640.0 && *height == 480.0
        )));
        buffer.free();
    }
}
