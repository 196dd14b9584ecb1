//! GPU 同步机制模块
//!
//! 提供 CPU-GPU 同步用的 Fence。
//!
//! # 设计原则
//!
//! - Fence 持有一个单调递增的计数器，每次 `signal` 加一并在队列上排入同值的 signal
//! - 设备报告的完成值 ≥ V 时，V 之前排入队列的所有工作都已完成
//! - `sync` 只在真正完成后返回，阻塞等待在操作系统事件上而不是忙等
//!
//! # 使用场景
//!
//! 1. **帧同步**：确保 GPU 完成前一帧才重置该帧的命令分配器
//! 2. **资源更新**：确保上传完成后才释放临时缓冲
//! 3. **退出**：销毁对象前排空所有队列

use std::time::Duration;

use crate::core::error::Result;
use crate::gfx::backend::GpuDevice;
use crate::gpu_error;

/// Fence 值
///
/// 用于 CPU-GPU 同步的单调递增值。
/// CPU 可以等待 GPU 完成特定 Fence 值对应的工作。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FenceValue(u64);

impl FenceValue {
    /// 创建新的Fence值
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// 获取内部值
    pub fn value(&self) -> u64 {
        self.0
    }

    /// 下一个Fence值
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

/// GPU Fence
///
/// 持有原生 Fence 与 CPU 侧计数器。销毁通过消费式的 `free` 完成，
/// 因此原生对象只会被销毁一次。
pub struct Fence<D: GpuDevice> {
    device: D,
    native: D::Fence,
    value: FenceValue,
}

impl<D: GpuDevice> Fence<D> {
    /// 创建初始值为 0 的 Fence
    pub fn new(device: &D) -> Result<Self> {
        let native = device.create_fence(0)?;
        Ok(Self {
            device: device.clone(),
            native,
            value: FenceValue::default(),
        })
    }

    /// 计数器加一，并在 `queue` 上排入新值的 signal
    ///
    /// 返回调用方需要等待的值；同一个 Fence 返回的值严格递增，从 1 开始。
    pub fn signal(&mut self, queue: &D::Queue) -> Result<FenceValue> {
        let next = self.value.next();
        self.device.signal_fence(queue, &self.native, next.value())?;
        self.value = next;
        Ok(next)
    }

    /// 非阻塞查询
    pub fn reached(&self, value: FenceValue) -> bool {
        self.device.fence_completed_value(&self.native) >= value.value()
    }

    /// 阻塞直到 `value` 完成
    pub fn sync(&self, value: FenceValue) -> Result<()> {
        while !self.reached(value) {
            self.device.wait_fence(&self.native, value.value(), None)?;
        }
        Ok(())
    }

    /// 排入一个新的 signal 并等待它完成，即排空 `queue` 上已提交的全部工作
    pub fn flush(&mut self, queue: &D::Queue) -> Result<()> {
        let value = self.signal(queue)?;
        self.sync(value)
    }

    /// 带超时的等待，返回目标值是否已经完成
    pub fn wait(&self, target: FenceValue, timeout: Duration) -> Result<bool> {
        if self.reached(target) {
            return Ok(true);
        }
        self.device
            .wait_fence(&self.native, target.value(), Some(timeout))
            .map_err(|e| {
                gpu_error!(target = target.value(), "Fence wait failed: {}", e);
                e
            })?;
        Ok(self.reached(target))
    }

    /// 设备报告的已完成值
    pub fn completed_value(&self) -> FenceValue {
        FenceValue::new(self.device.fence_completed_value(&self.native))
    }

    /// 最近一次 signal 的值
    pub fn value(&self) -> FenceValue {
        self.value
    }

    pub fn native(&self) -> &D::Fence {
        &self.native
    }

    /// 销毁原生 Fence
    pub fn free(self) {
        self.device.destroy_fence(self.native);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::headless::{CompletionMode, HeadlessDevice, ObjectKind};
    use crate::renderer::command::CommandBufferType;
    use std::thread;

    #[test]
    fn test_fence_value() {
        let value = FenceValue::new(1);
        assert_eq!(value.value(), 1);
        assert_eq!(value.next().value(), 2);
        assert!(value < value.next());
        assert_eq!(FenceValue::default().value(), 0);
    }

    #[test]
    fn test_signal_values_strictly_increase() {
        let device = HeadlessDevice::new();
        let queue = device.create_queue(CommandBufferType::Graphics).unwrap();
        let mut fence = Fence::new(&device).unwrap();

        let mut previous = FenceValue::default();
        for expected in 1..=5u64 {
            let value = fence.signal(&queue).unwrap();
            assert_eq!(value.value(), expected);
            assert!(value > previous);
            previous = value;
        }
        assert_eq!(fence.value().value(), 5);
    }

    #[test]
    fn test_reached_tracks_completion() {
        let device = HeadlessDevice::with_mode(CompletionMode::Deferred);
        let queue = device.create_queue(CommandBufferType::Graphics).unwrap();
        let mut fence = Fence::new(&device).unwrap();

        let value = fence.signal(&queue).unwrap();
        assert!(!fence.reached(value));
        assert_eq!(fence.completed_value().value(), 0);

        device.retire_all();
        assert!(fence.reached(value));
    }

    #[test]
    fn test_sync_does_not_return_early() {
        let device = HeadlessDevice::with_mode(CompletionMode::Deferred);
        let queue = device.create_queue(CommandBufferType::Compute).unwrap();
        let mut fence = Fence::new(&device).unwrap();
        let value = fence.signal(&queue).unwrap();

        let retirer = device.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(40));
            retirer.retire_all();
        });

        fence.sync(value).unwrap();
        assert!(fence.reached(value));
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_with_timeout() {
        let device = HeadlessDevice::with_mode(CompletionMode::Deferred);
        let queue = device.create_queue(CommandBufferType::Upload).unwrap();
        let mut fence = Fence::new(&device).unwrap();
        let value = fence.signal(&queue).unwrap();

        assert!(!fence.wait(value, Duration::from_millis(5)).unwrap());
        device.retire_all();
        assert!(fence.wait(value, Duration::from_millis(5)).unwrap());
    }

    #[test]
    fn test_wait_event_failure_is_fatal() {
        let device = HeadlessDevice::with_mode(CompletionMode::Deferred);
        let queue = device.create_queue(CommandBufferType::Graphics).unwrap();
        let mut fence = Fence::new(&device).unwrap();
        let value = fence.signal(&queue).unwrap();

        device.fail_next_wait_event();
        let err = fence.sync(value).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_flush_and_free() {
        let device = HeadlessDevice::new();
        let queue = device.create_queue(CommandBufferType::Graphics).unwrap();
        let mut fence = Fence::new(&device).unwrap();

        fence.flush(&queue).unwrap();
        fence.flush(&queue).unwrap();
        assert_eq!(fence.completed_value().value(), 2);

        fence.free();
        assert_eq!(device.created_count(ObjectKind::Fence), 1);
        assert_eq!(device.destroyed_count(ObjectKind::Fence), 1);
    }

    #[test]
    fn test_creation_failure() {
        let device = HeadlessDevice::new();
        device.fail_creation(ObjectKind::Fence);
        assert!(Fence::new(&device).is_err());
    }
}
