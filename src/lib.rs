//! dist_gpu - 游戏引擎的图形设备抽象层
//!
//! 把原生 GPU API（DirectX 12）封装在与后端无关的接口之后，
//! 提供命令录制、资源创建、同步与呈现。
//!
//! # 模块结构
//!
//! - `core`: 环境功能（日志、配置、错误处理）
//! - `gfx`: 原生设备接口与后端实现（DirectX 12、headless）
//! - `renderer`: 命令缓冲、图像 / 缓冲、描述符堆、Fence 与设备上下文
//!
//! # 使用示例
//!
//! ```no_run
//! use dist_gpu::core::Config;
//! use dist_gpu::gfx::HeadlessDevice;
//! use dist_gpu::renderer::{Context, SurfaceDesc};
//!
//! # fn main() -> dist_gpu::core::Result<()> {
//! let config = Config::default();
//! let mut ctx = Context::<HeadlessDevice>::new(&config, SurfaceDesc::offscreen(1280, 720))?;
//!
//! ctx.begin_frame()?;
//! let (commands, image) = ctx.frame_mut()?;
//! commands.clear_color(image, 0.0, 0.2, 0.4, 1.0)?;
//! ctx.end_frame()?;
//! ctx.present()?;
//!
//! ctx.exit();
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod gfx;
pub mod renderer;
