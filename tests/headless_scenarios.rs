//! 基于无头设备的端到端场景

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dist_gpu::core::Config;
use dist_gpu::gfx::headless::{CompletionMode, HeadlessDevice, NativeCall, ObjectKind};
use dist_gpu::gfx::GpuDevice;
use dist_gpu::renderer::{
    Buffer, BufferType, CommandBuffer, CommandBufferType, Context, CpuImage, DescriptorHeap,
    DescriptorHeapType, Fence, Image, ImageFormat, ImageLayout, ImageUsage, SurfaceDesc,
};

fn context(device: &HeadlessDevice) -> Context<HeadlessDevice> {
    Context::with_device(device.clone(), &Config::default(), SurfaceDesc::offscreen(320, 240)).unwrap()
}

/// 后台线程周期性地退役挂起的 signal，模拟 GPU 异步完成
struct Retirer {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Retirer {
    fn spawn(device: &HeadlessDevice) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let device = device.clone();
        let handle = thread::spawn(move || {
            while !flag.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
                device.retire_all();
            }
        });
        Self { stop, handle: Some(handle) }
    }
}

impl Drop for Retirer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[test]
fn clear_then_present() {
    let device = HeadlessDevice::new();
    let mut ctx = context(&device);

    ctx.begin_frame().unwrap();
    device.clear_journal();
    let (commands, image) = ctx.frame_mut().unwrap();
    commands.clear_color(image, 0.0, 0.2, 0.4, 1.0).unwrap();
    ctx.end_frame().unwrap();

    let presented_index = ctx.frame_index();
    ctx.present().unwrap();

    let journal = device.journal();
    assert_eq!(
        journal.count(|c| matches!(c, NativeCall::ClearRenderTarget { color, .. } if *color == [0.0, 0.2, 0.4, 1.0])),
        1
    );
    assert_eq!(
        journal.count(|c| matches!(
            c,
            NativeCall::ResourceBarrier { before: ImageLayout::RenderTarget, after: ImageLayout::Present, .. }
        )),
        1
    );

    let clear = journal.position(|c| matches!(c, NativeCall::ClearRenderTarget { .. })).unwrap();
    let to_present = journal
        .position(|c| matches!(c, NativeCall::ResourceBarrier { after: ImageLayout::Present, .. }))
        .unwrap();
    let execute = journal
        .position(|c| matches!(c, NativeCall::ExecuteCommandList { queue: CommandBufferType::Graphics, .. }))
        .unwrap();
    let present = journal.position(|c| matches!(c, NativeCall::Present { .. })).unwrap();
    assert!(clear < to_present && to_present < execute && execute < present);

    // 刚呈现的图像回到 Present 布局
    assert_ne!(ctx.frame_index(), presented_index);
    ctx.begin_frame().unwrap();
    ctx.end_frame().unwrap();
    ctx.present().unwrap();
    assert_eq!(ctx.swap_chain_image().unwrap().layout(), ImageLayout::Present);

    ctx.exit();
    assert_eq!(device.total_live(), 0);
}

#[test]
fn upload_from_cpu_waits_for_completion() {
    let device = HeadlessDevice::with_mode(CompletionMode::Deferred);
    let mut ctx = {
        let _retirer = Retirer::spawn(&device);
        context(&device)
    };

    let pixels: Vec<u8> = (0..16).collect();
    let source = CpuImage::from_rgba8(2, 2, pixels);

    device.clear_journal();
    let image = {
        let _retirer = Retirer::spawn(&device);
        Image::from_cpu(&mut ctx, &source).unwrap()
    };

    // 返回时上传已经完成，没有挂起的工作
    assert_eq!(device.pending_signals(), 0);
    let upload_fence = ctx.queue(CommandBufferType::Upload).fence();
    assert!(upload_fence.reached(upload_fence.value()));
    assert_eq!(image.layout(), ImageLayout::Common);
    assert_eq!(image.format(), ImageFormat::Rgba8);

    let journal = device.journal();
    let staging = journal
        .calls()
        .iter()
        .find_map(|c| match c {
            NativeCall::CreateBuffer { id, desc } => {
                // 2 像素 * 4 字节的行按 256 字节对齐
                assert_eq!(desc.size, 512);
                Some(*id)
            }
            _ => None,
        })
        .unwrap();

    let reset = journal.position(|c| matches!(c, NativeCall::ResetCommandList { .. })).unwrap();
    let barrier = journal
        .position(|c| matches!(
            c,
            NativeCall::ResourceBarrier { resource, before: ImageLayout::Common, after: ImageLayout::CopySource, .. }
                if *resource == staging
        ))
        .unwrap();
    let copy = journal
        .position(|c| matches!(c, NativeCall::CopyBufferToTexture { source, footprint, .. }
            if *source == staging && footprint.row_pitch == 256))
        .unwrap();
    let close = journal.last_position(|c| matches!(c, NativeCall::CloseCommandList { .. })).unwrap();
    let execute = journal
        .position(|c| matches!(c, NativeCall::ExecuteCommandList { queue: CommandBufferType::Upload, .. }))
        .unwrap();
    let signal = journal
        .position(|c| matches!(c, NativeCall::Signal { queue: CommandBufferType::Upload, .. }))
        .unwrap();
    let wait = journal.position(|c| matches!(c, NativeCall::WaitFence { .. })).unwrap();
    let list_released = journal
        .position(|c| matches!(c, NativeCall::Destroy { kind: ObjectKind::CommandList, .. }))
        .unwrap();
    let staging_released = journal
        .position(|c| matches!(c, NativeCall::Destroy { kind: ObjectKind::Resource, id } if *id == staging))
        .unwrap();

    assert!(reset < barrier);
    assert!(barrier < copy);
    assert!(copy < close);
    assert!(close < execute);
    assert!(execute < signal);
    assert!(signal < wait);
    assert!(wait < list_released);
    assert!(list_released < staging_released);

    image.free(&mut ctx);
    device.set_completion_mode(CompletionMode::Immediate);
    ctx.exit();
    assert_eq!(device.total_live(), 0);
}

#[test]
fn upload_rejects_mismatched_pixels() {
    let device = HeadlessDevice::new();
    let mut ctx = context(&device);
    let live_before = device.total_live();

    let source = CpuImage::from_rgba8(4, 4, vec![0; 10]);
    let err = Image::from_cpu(&mut ctx, &source).err().unwrap();
    assert!(!err.is_fatal());
    assert_eq!(device.total_live(), live_before);

    ctx.exit();
}

#[test]
fn every_resource_kind_is_released() {
    let device = HeadlessDevice::new();
    let mut ctx = context(&device);

    let images = vec![
        Image::new(&mut ctx, 64, 64, ImageFormat::Rgba8, ImageUsage::RenderTarget).unwrap(),
        Image::new(&mut ctx, 64, 64, ImageFormat::Depth32, ImageUsage::DepthTarget).unwrap(),
        Image::new(&mut ctx, 64, 64, ImageFormat::Rgba16Float, ImageUsage::Storage).unwrap(),
        Image::new_cube_map(&mut ctx, 32, 32, ImageFormat::Rgba8, ImageUsage::ShaderResource).unwrap(),
        Image::new_copy(&mut ctx, 64, 64).unwrap(),
    ];
    let vertices = Buffer::new(&ctx, BufferType::Vertex, 1024, 16).unwrap();
    let constants = Buffer::new(&ctx, BufferType::Constant, 100, 0).unwrap();
    assert_eq!(constants.size(), 256);

    let mut commands = CommandBuffer::new(ctx.device(), CommandBufferType::Graphics).unwrap();
    commands.begin().unwrap();
    commands.bind_buffer(&vertices).unwrap();
    commands.set_viewport(64.0, 64.0, 0.0, 0.0).unwrap();
    commands.draw(3).unwrap();
    commands.end().unwrap();
    ctx.submit(&mut commands).unwrap();
    ctx.flush_queue(CommandBufferType::Graphics).unwrap();

    commands.free();
    vertices.free();
    constants.free();
    for image in images {
        image.free(&mut ctx);
    }
    assert_eq!(ctx.heap(DescriptorHeapType::Dsv).used(), 0);
    assert_eq!(ctx.heap(DescriptorHeapType::CbvSrvUav).used(), 0);

    ctx.exit();
    assert_eq!(device.total_live(), 0);
    for kind in ObjectKind::ALL {
        assert_eq!(device.created_count(kind), device.destroyed_count(kind), "{:?}", kind);
    }
}

#[test]
fn fence_values_and_blocking() {
    let device = HeadlessDevice::with_mode(CompletionMode::Deferred);
    let queue = device.create_queue(CommandBufferType::Compute).unwrap();
    let mut fence = Fence::new(&device).unwrap();

    let values: Vec<u64> = (0..3).map(|_| fence.signal(&queue).unwrap().value()).collect();
    assert_eq!(values, vec![1, 2, 3]);

    let last = fence.value();
    assert!(!fence.reached(last));
    assert!(!fence.wait(last, Duration::from_millis(10)).unwrap());

    let retirer = device.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        retirer.retire_all();
    });
    fence.sync(last).unwrap();
    assert!(fence.reached(last));
    handle.join().unwrap();

    fence.free();
    device.destroy_queue(queue);
    assert_eq!(device.total_live(), 0);
}

#[test]
fn descriptor_heap_capacity() {
    let device = HeadlessDevice::new();
    let mut heap = DescriptorHeap::new(&device, DescriptorHeapType::CbvSrvUav, 4).unwrap();

    let slots: Vec<_> = (0..4).map(|_| heap.alloc().unwrap()).collect();
    assert!(heap.alloc().is_err());

    heap.free_space(slots[2]);
    let reused = heap.alloc().unwrap();
    assert_eq!(reused, slots[2]);
    assert!(heap.gpu(reused).is_some());

    heap.free(&device);
    assert_eq!(device.total_live(), 0);
}

#[test]
fn recording_outside_begin_is_rejected() {
    let device = HeadlessDevice::new();
    let mut commands = CommandBuffer::new(&device, CommandBufferType::Compute).unwrap();

    let err = commands.dispatch(1, 1, 1).err().unwrap();
    assert!(!err.is_fatal());

    commands.begin().unwrap();
    commands.dispatch(8, 8, 1).unwrap();
    commands.end().unwrap();
    assert!(commands.dispatch(1, 1, 1).is_err());

    commands.free();
    assert_eq!(device.total_live(), 0);
}
