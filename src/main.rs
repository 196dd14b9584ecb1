//! dist_gpu - GPU 核心层演示程序
//!
//! 创建设备上下文，把交换链图像清屏为随时间变化的颜色，运行若干帧后退出。
//!
//! # 使用方法
//!
//! ```bash
//! # 使用配置文件
//! cargo run
//!
//! # 无头后端，运行 10 帧
//! cargo run -- --headless --frames 10
//! ```
//!
//! # 命令行参数
//!
//! - `--dx12`: 使用 DirectX 12 后端（仅 Windows）
//! - `--headless`: 使用无头后端
//! - `--debug`: 启用调试层
//! - `--width <value>` / `--height <value>`: 交换链尺寸
//! - `--buffers <value>`: 同时在飞的帧数
//! - `--frames <value>`: 运行的帧数（默认 120）

use anyhow::{bail, Context as _};
use tracing::{debug, info};

use dist_gpu::core::{log, BackendSelection, Config};
use dist_gpu::gfx::{GpuDevice, HeadlessDevice};
use dist_gpu::renderer::{Context, SurfaceDesc};

const DEFAULT_FRAMES: u32 = 120;

fn parse_frames(args: &[String]) -> u32 {
    args.iter()
        .position(|a| a == "--frames")
        .and_then(|idx| args.get(idx + 1))
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_FRAMES)
}

/// 第 `frame` 帧的清屏颜色
fn animated_color(frame: u32) -> [f32; 4] {
    let t = frame as f32 * 0.05;
    [
        0.5 + 0.5 * t.sin(),
        0.5 + 0.5 * (t + 2.094).sin(),
        0.5 + 0.5 * (t + 4.188).sin(),
        1.0,
    ]
}

fn run<D: GpuDevice>(config: &Config, frames: u32) -> anyhow::Result<()> {
    let surface = SurfaceDesc::offscreen(config.window.width, config.window.height);
    let mut ctx = Context::<D>::new(config, surface).context("Failed to create GPU context")?;

    info!(
        backend = ctx.backend().name(),
        adapter = %ctx.device().adapter_name(),
        frames,
        "Entering frame loop"
    );

    for frame in 0..frames {
        ctx.begin_frame()?;
        let [r, g, b, a] = animated_color(frame);
        let (commands, image) = ctx.frame_mut()?;
        commands.clear_color(image, r, g, b, a)?;
        ctx.end_frame()?;
        ctx.present()?;
        debug!(frame, index = ctx.frame_index(), "Frame presented");
    }

    ctx.wait()?;
    ctx.exit();
    info!("GPU context released");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let mut config = Config::from_file_or_default("config.toml");
    config.apply_args(&args);
    config.validate().context("Invalid configuration")?;

    let log_file = if config.logging.file_output {
        Some(config.logging.log_file.as_str())
    } else {
        None
    };
    log::init_logger(config.logging.level, config.logging.file_output, log_file);
    info!(version = env!("CARGO_PKG_VERSION"), "dist_gpu starting...");
    info!(
        backend = config.graphics.backend.name(),
        width = config.window.width,
        height = config.window.height,
        buffers = config.graphics.buffer_count,
        "Graphics configuration"
    );

    let frames = parse_frames(&args);

    match config.graphics.backend {
        #[cfg(target_os = "windows")]
        BackendSelection::Dx12 => run::<dist_gpu::gfx::Dx12Device>(&config, frames),
        #[cfg(not(target_os = "windows"))]
        BackendSelection::Dx12 => {
            info!("DirectX 12 is unavailable on this platform, falling back to the headless device");
            run::<HeadlessDevice>(&config, frames)
        }
        BackendSelection::Headless => run::<HeadlessDevice>(&config, frames),
        BackendSelection::Vulkan => {
            bail!(dist_gpu::core::DistGpuError::Initialization(
                "the Vulkan backend is not available in this build".to_string()
            ))
        }
    }
}
