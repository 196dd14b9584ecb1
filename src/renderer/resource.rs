//! 资源管理模块
//!
//! GPU 图像与缓冲区。
//!
//! # 设计原则
//!
//! - **布局跟踪**：每个资源记录自己当前的访问状态，屏障从这里读取转换的起点
//! - **视图随用法**：图像持有的视图恰好是用法所要求的那几种
//! - **自动对齐**：常量缓冲区对齐到 256 字节，纹理上传的行跨度对齐到 256 字节
//! - **显式释放**：`free` 消费句柄，归还描述符槽位并销毁原生资源

use std::path::Path;

use bytemuck::Pod;

use crate::core::error::{GraphicsError, Result};
use crate::gfx::backend::{BufferDesc, GpuDevice, HeapKind, TextureDesc, ViewDimension};
use crate::renderer::command::{align_up, CommandBuffer, CommandBufferType, TEXTURE_PITCH_ALIGNMENT};
use crate::renderer::context::Context;
use crate::renderer::descriptor::{CpuDescriptorHandle, DescriptorHeapType, DescriptorIndex};
use crate::{gpu_error, gpu_warn};

/// D3D12 常量缓冲区的放置对齐
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

/// 像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// 8 位 RGBA（UNORM）
    Rgba8,
    /// 32 位浮点 RGBA
    Rgba32Float,
    /// 16 位浮点 RGBA
    Rgba16Float,
    /// 32 位浮点深度
    Depth32,
}

impl ImageFormat {
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            ImageFormat::Rgba8 => 4,
            ImageFormat::Rgba32Float => 16,
            ImageFormat::Rgba16Float => 8,
            ImageFormat::Depth32 => 4,
        }
    }

    pub fn is_depth(&self) -> bool {
        matches!(self, ImageFormat::Depth32)
    }
}

/// 图像用法，创建时固定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageUsage {
    RenderTarget,
    DepthTarget,
    ShaderResource,
    Storage,
    Copy,
}

impl ImageUsage {
    /// 新建图像的初始布局
    ///
    /// ShaderResource 图像以 CopyDest 开始：它们必须先通过上传填充内容，
    /// 再由调用方转换到 ShaderResource 后才能被着色器读取。
    /// 经 `Image::from_cpu` 上传后布局为 Common（拷贝队列的状态衰减）。
    pub fn initial_layout(&self) -> ImageLayout {
        match self {
            ImageUsage::RenderTarget => ImageLayout::RenderTarget,
            ImageUsage::DepthTarget => ImageLayout::Depth,
            ImageUsage::ShaderResource => ImageLayout::CopyDest,
            ImageUsage::Storage => ImageLayout::Storage,
            ImageUsage::Copy => ImageLayout::Common,
        }
    }
}

/// 资源的访问状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    CopyDest,
    CopySource,
    Depth,
    Present,
    RenderTarget,
    ShaderResource,
    Storage,
    Common,
}

/// 缓冲区类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferType {
    /// 顶点缓冲区
    Vertex,
    /// 索引缓冲区
    Index,
    /// 常量缓冲区
    Constant,
    /// 上传缓冲区（CPU -> GPU）
    Upload,
}

/// 图像持有的描述符槽位
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageViews {
    pub rtv: Option<DescriptorIndex>,
    pub dsv: Option<DescriptorIndex>,
    pub srv: Option<DescriptorIndex>,
    pub uav: Option<DescriptorIndex>,
}

/// GPU 图像
pub struct Image<D: GpuDevice> {
    native: D::Resource,
    width: u32,
    height: u32,
    array_layers: u16,
    format: ImageFormat,
    usage: ImageUsage,
    layout: ImageLayout,
    views: ImageViews,
    rtv_handle: Option<CpuDescriptorHandle>,
}

impl<D: GpuDevice> std::fmt::Debug for Image<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("array_layers", &self.array_layers)
            .field("format", &self.format)
            .field("usage", &self.usage)
            .field("layout", &self.layout)
            .field("views", &self.views)
            .field("rtv_handle", &self.rtv_handle)
            .finish_non_exhaustive()
    }
}

impl<D: GpuDevice> Image<D> {
    /// 创建二维图像，并按用法创建视图
    ///
    /// - RenderTarget: RTV + SRV + UAV
    /// - DepthTarget: DSV
    /// - ShaderResource: SRV
    /// - Storage: UAV
    /// - Copy: 无
    pub fn new(
        ctx: &mut Context<D>,
        width: u32,
        height: u32,
        format: ImageFormat,
        usage: ImageUsage,
    ) -> Result<Self> {
        Self::check_format(format, usage)?;
        let mut image = Self::create(ctx, width, height, 1, format, usage)?;
        if let Err(e) = image.create_views(ctx, ViewDimension::Texture2D, ViewDimension::Texture2D) {
            image.free(ctx);
            return Err(e);
        }
        Ok(image)
    }

    /// 创建 6 面的立方体贴图
    ///
    /// ShaderResource 得到立方体 SRV，Storage 得到 6 层的二维数组 UAV。
    /// 立方体贴图不能作为渲染目标或深度目标。
    pub fn new_cube_map(
        ctx: &mut Context<D>,
        width: u32,
        height: u32,
        format: ImageFormat,
        usage: ImageUsage,
    ) -> Result<Self> {
        if matches!(usage, ImageUsage::RenderTarget | ImageUsage::DepthTarget) {
            gpu_warn!(usage = ?usage, "Cube maps cannot be used as render or depth targets");
            return Err(GraphicsError::InvalidUsage(format!(
                "cube map with {:?} usage is not supported",
                usage
            ))
            .into());
        }
        Self::check_format(format, usage)?;

        let mut image = Self::create(ctx, width, height, 6, format, usage)?;
        if let Err(e) = image.create_views(
            ctx,
            ViewDimension::TextureCube,
            ViewDimension::Texture2DArray { layers: 6 },
        ) {
            image.free(ctx);
            return Err(e);
        }
        Ok(image)
    }

    /// 创建只用于拷贝的 RGBA8 图像，不分配任何描述符
    ///
    /// 图像放在默认堆上：D3D12 不允许在上传堆上创建纹理。
    pub fn new_copy(ctx: &mut Context<D>, width: u32, height: u32) -> Result<Self> {
        Self::create(ctx, width, height, 1, ImageFormat::Rgba8, ImageUsage::Copy)
    }

    /// 从 CPU 像素数据创建 ShaderResource 图像
    ///
    /// 像素先按 256 字节行跨度写入临时上传缓冲，再通过上传队列拷贝到图像，
    /// 函数在拷贝完成后才返回。拷贝队列上访问过的资源在执行完成后衰减回 COMMON，
    /// 所以返回的图像处于 Common 布局，被着色器读取前需要调用方转换到 ShaderResource。
    ///
    /// 宽或高为 0、像素字节数与尺寸不符、或尺寸字节数溢出时返回 `InvalidUsage`。
    pub fn from_cpu(ctx: &mut Context<D>, source: &CpuImage) -> Result<Self> {
        let format = if source.is_float {
            ImageFormat::Rgba32Float
        } else {
            ImageFormat::Rgba8
        };

        if source.width == 0 || source.height == 0 {
            gpu_warn!(width = source.width, height = source.height, "CPU image has a zero extent");
            return Err(GraphicsError::InvalidUsage(format!(
                "CPU image extent {}x{} is empty",
                source.width, source.height
            ))
            .into());
        }

        let extent_bytes = source
            .width
            .checked_mul(format.bytes_per_pixel())
            .and_then(|row| (row as usize).checked_mul(source.height as usize).map(|total| (row, total)));
        let (row_bytes, expected) = match extent_bytes {
            Some(sizes) => sizes,
            None => {
                gpu_warn!(width = source.width, height = source.height, "CPU image extent overflows");
                return Err(GraphicsError::InvalidUsage(format!(
                    "CPU image extent {}x{} {:?} is too large",
                    source.width, source.height, format
                ))
                .into());
            }
        };
        if source.pixels.len() != expected {
            gpu_warn!(
                expected,
                actual = source.pixels.len(),
                "CPU image pixel data does not match its extent"
            );
            return Err(GraphicsError::InvalidUsage(format!(
                "CPU image has {} bytes, {}x{} {:?} needs {}",
                source.pixels.len(),
                source.width,
                source.height,
                format,
                expected
            ))
            .into());
        }

        let row_pitch = align_up(row_bytes, TEXTURE_PITCH_ALIGNMENT);
        let mut staged = vec![0u8; row_pitch as usize * source.height as usize];
        for (row, pixels) in source.pixels.chunks_exact(row_bytes as usize).enumerate() {
            let start = row * row_pitch as usize;
            staged[start..start + pixels.len()].copy_from_slice(pixels);
        }

        let mut image = Self::new(ctx, source.width, source.height, format, ImageUsage::ShaderResource)?;

        let mut staging = match Buffer::new(ctx, BufferType::Upload, staged.len() as u64, 0) {
            Ok(buffer) => buffer,
            Err(e) => {
                image.free(ctx);
                return Err(e);
            }
        };
        let mut commands = match CommandBuffer::new(ctx.device(), CommandBufferType::Upload) {
            Ok(commands) => commands,
            Err(e) => {
                staging.free();
                image.free(ctx);
                return Err(e);
            }
        };

        let uploaded = Self::upload(ctx, &mut commands, &mut staging, &staged, &image);

        commands.free();
        staging.free();

        match uploaded {
            Ok(()) => {
                image.layout = ImageLayout::Common;
                Ok(image)
            }
            Err(e) => {
                gpu_error!(
                    width = source.width,
                    height = source.height,
                    "Image upload failed: {}",
                    e
                );
                image.free(ctx);
                Err(e)
            }
        }
    }

    fn upload(
        ctx: &mut Context<D>,
        commands: &mut CommandBuffer<D>,
        staging: &mut Buffer<D>,
        bytes: &[u8],
        image: &Image<D>,
    ) -> Result<()> {
        staging.write(0, bytes)?;
        commands.begin()?;
        commands.buffer_barrier(staging, ImageLayout::CopySource)?;
        commands.copy_buffer_to_image(staging, image)?;
        commands.end()?;
        ctx.submit(commands)?;
        // 阻塞到上传队列排空，之后临时缓冲才能释放
        ctx.flush_queue(CommandBufferType::Upload)
    }

    /// 把交换链缓冲包装成只带 RTV 的渲染目标图像
    pub(crate) fn from_swap_chain(
        ctx: &mut Context<D>,
        native: D::Resource,
        width: u32,
        height: u32,
        format: ImageFormat,
    ) -> Result<Self> {
        let mut image = Self {
            native,
            width,
            height,
            array_layers: 1,
            format,
            usage: ImageUsage::RenderTarget,
            layout: ImageLayout::Present,
            views: ImageViews::default(),
            rtv_handle: None,
        };
        if let Err(e) = image.create_rtv(ctx) {
            image.free(ctx);
            return Err(e);
        }
        Ok(image)
    }

    fn check_format(format: ImageFormat, usage: ImageUsage) -> Result<()> {
        let depth_usage = usage == ImageUsage::DepthTarget;
        if format.is_depth() != depth_usage {
            gpu_warn!(format = ?format, usage = ?usage, "Image format does not match its usage");
            return Err(GraphicsError::InvalidUsage(format!(
                "{:?} format cannot be used with {:?} usage",
                format, usage
            ))
            .into());
        }
        Ok(())
    }

    fn create(
        ctx: &mut Context<D>,
        width: u32,
        height: u32,
        array_layers: u16,
        format: ImageFormat,
        usage: ImageUsage,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            gpu_warn!(width, height, usage = ?usage, "Image extent must be non-zero");
            return Err(GraphicsError::InvalidUsage(format!("image extent {}x{} is empty", width, height)).into());
        }
        let desc = TextureDesc {
            width,
            height,
            array_layers,
            format,
            allow_render_target: usage == ImageUsage::RenderTarget,
            allow_depth_stencil: usage == ImageUsage::DepthTarget,
            allow_unordered_access: matches!(usage, ImageUsage::RenderTarget | ImageUsage::Storage),
        };
        let layout = usage.initial_layout();
        let native = ctx.device().create_texture(&desc, layout).map_err(|e| {
            gpu_error!(width, height, format = ?format, "D3D12: Failed to create texture: {}", e);
            e
        })?;

        Ok(Self {
            native,
            width,
            height,
            array_layers,
            format,
            usage,
            layout,
            views: ImageViews::default(),
            rtv_handle: None,
        })
    }

    fn create_views(
        &mut self,
        ctx: &mut Context<D>,
        srv_dimension: ViewDimension,
        uav_dimension: ViewDimension,
    ) -> Result<()> {
        match self.usage {
            ImageUsage::RenderTarget => {
                self.create_rtv(ctx)?;
                self.create_srv(ctx, srv_dimension)?;
                self.create_uav(ctx, uav_dimension)?;
            }
            ImageUsage::DepthTarget => {
                let index = ctx.heap_mut(DescriptorHeapType::Dsv).alloc()?;
                self.views.dsv = Some(index);
                let dest = ctx.heap(DescriptorHeapType::Dsv).cpu(index);
                ctx.device()
                    .create_depth_stencil_view(&self.native, self.format, dest)?;
            }
            ImageUsage::ShaderResource => self.create_srv(ctx, srv_dimension)?,
            ImageUsage::Storage => self.create_uav(ctx, uav_dimension)?,
            ImageUsage::Copy => {}
        }
        Ok(())
    }

    fn create_rtv(&mut self, ctx: &mut Context<D>) -> Result<()> {
        let index = ctx.heap_mut(DescriptorHeapType::Rtv).alloc()?;
        self.views.rtv = Some(index);
        let dest = ctx.heap(DescriptorHeapType::Rtv).cpu(index);
        ctx.device()
            .create_render_target_view(&self.native, self.format, dest)?;
        self.rtv_handle = Some(dest);
        Ok(())
    }

    fn create_srv(&mut self, ctx: &mut Context<D>, dimension: ViewDimension) -> Result<()> {
        let index = ctx.heap_mut(DescriptorHeapType::CbvSrvUav).alloc()?;
        self.views.srv = Some(index);
        let dest = ctx.heap(DescriptorHeapType::CbvSrvUav).cpu(index);
        ctx.device()
            .create_shader_resource_view(&self.native, self.format, dimension, dest)
    }

    fn create_uav(&mut self, ctx: &mut Context<D>, dimension: ViewDimension) -> Result<()> {
        let index = ctx.heap_mut(DescriptorHeapType::CbvSrvUav).alloc()?;
        self.views.uav = Some(index);
        let dest = ctx.heap(DescriptorHeapType::CbvSrvUav).cpu(index);
        ctx.device()
            .create_unordered_access_view(&self.native, self.format, dimension, dest)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn array_layers(&self) -> u16 {
        self.array_layers
    }

    pub fn is_cube_map(&self) -> bool {
        self.array_layers == 6
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn usage(&self) -> ImageUsage {
        self.usage
    }

    /// 当前跟踪的布局，由 `CommandBuffer::image_barrier` 在录制时更新
    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    pub(crate) fn set_layout(&mut self, layout: ImageLayout) {
        self.layout = layout;
    }

    pub fn views(&self) -> &ImageViews {
        &self.views
    }

    /// 渲染目标视图的 CPU 地址
    pub fn rtv_handle(&self) -> Option<CpuDescriptorHandle> {
        self.rtv_handle
    }

    pub fn native(&self) -> &D::Resource {
        &self.native
    }

    /// 归还所有描述符槽位并销毁原生资源
    pub fn free(self, ctx: &mut Context<D>) {
        let slots = [
            (DescriptorHeapType::Rtv, self.views.rtv),
            (DescriptorHeapType::Dsv, self.views.dsv),
            (DescriptorHeapType::CbvSrvUav, self.views.srv),
            (DescriptorHeapType::CbvSrvUav, self.views.uav),
        ];
        for (heap, index) in slots {
            if let Some(index) = index {
                ctx.heap_mut(heap).free_space(index);
            }
        }
        ctx.device().destroy_resource(self.native);
    }
}

/// GPU 缓冲区
///
/// 所有类型都放在上传堆上，CPU 可以直接写入。
pub struct Buffer<D: GpuDevice> {
    device: D,
    native: D::Resource,
    kind: BufferType,
    size: u64,
    stride: u32,
    layout: ImageLayout,
}

impl<D: GpuDevice> Buffer<D> {
    /// 创建缓冲区
    ///
    /// `stride` 只对顶点 / 索引缓冲区有意义，常量缓冲区的大小向上对齐到 256 字节。
    pub fn new(ctx: &Context<D>, kind: BufferType, size: u64, stride: u32) -> Result<Self> {
        if size == 0 {
            gpu_warn!(kind = ?kind, "Zero-sized buffer requested");
            return Err(GraphicsError::InvalidUsage("buffer size must be non-zero".to_string()).into());
        }

        let size = aligned_size(kind, size);
        let native = ctx
            .device()
            .create_buffer(&BufferDesc {
                size,
                heap: HeapKind::Upload,
            })
            .map_err(|e| {
                gpu_error!(size, kind = ?kind, "D3D12: Failed to create buffer: {}", e);
                e
            })?;

        Ok(Self {
            device: ctx.device().clone(),
            native,
            kind,
            size,
            stride,
            layout: ImageLayout::Common,
        })
    }

    /// 把字节写入缓冲区的 `offset` 处
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.device.write_buffer(&self.native, offset, data)
    }

    /// 按元素类型写入，例如顶点数组或常量结构体
    pub fn write_slice<T: Pod>(&self, offset: u64, data: &[T]) -> Result<()> {
        self.write(offset, bytemuck::cast_slice(data))
    }

    pub fn kind(&self) -> BufferType {
        self.kind
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    pub(crate) fn set_layout(&mut self, layout: ImageLayout) {
        self.layout = layout;
    }

    pub fn native(&self) -> &D::Resource {
        &self.native
    }

    pub fn free(self) {
        self.device.destroy_resource(self.native);
    }
}

/// 计算对齐后的大小（DirectX 12 常量缓冲区要求 256 字节对齐）
pub fn aligned_size(kind: BufferType, size: u64) -> u64 {
    if kind == BufferType::Constant {
        (size + CONSTANT_BUFFER_ALIGNMENT - 1) & !(CONSTANT_BUFFER_ALIGNMENT - 1)
    } else {
        size
    }
}

/// 解码后的 CPU 图像，RGBA 排列，行与行紧密相连
#[derive(Debug, Clone, PartialEq)]
pub struct CpuImage {
    pub width: u32,
    pub height: u32,
    /// true 时每个通道是 f32，否则是 u8
    pub is_float: bool,
    pub pixels: Vec<u8>,
}

impl CpuImage {
    /// 从文件解码
    ///
    /// HDR / EXR 这类浮点图像解码为 RGBA32F，其余格式解码为 RGBA8。
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let decoded = image::open(path.as_ref())?;
        let is_float = matches!(
            decoded.color(),
            image::ColorType::Rgb32F | image::ColorType::Rgba32F
        );

        if is_float {
            let rgba = decoded.to_rgba32f();
            let (width, height) = rgba.dimensions();
            Ok(Self {
                width,
                height,
                is_float: true,
                pixels: bytemuck::cast_slice(rgba.as_raw().as_slice()).to_vec(),
            })
        } else {
            let rgba = decoded.to_rgba8();
            let (width, height) = rgba.dimensions();
            Ok(Self {
                width,
                height,
                is_float: false,
                pixels: rgba.into_raw(),
            })
        }
    }

    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            is_float: false,
            pixels,
        }
    }

    pub fn from_rgba32f(width: u32, height: u32, pixels: &[f32]) -> Self {
        Self {
            width,
            height,
            is_float: true,
            pixels: bytemuck::cast_slice(pixels).to_vec(),
        }
    }
}
