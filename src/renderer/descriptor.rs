//! 描述符堆分配器
//!
//! 固定容量的槽位分配器，管理 GPU 可见的资源视图句柄。
//!
//! # 不变式
//!
//! - 分配返回的句柄在该堆当前存活的句柄中唯一
//! - 释放的句柄回到空闲集合，之后才能被重新分配
//! - 容量在创建时固定，没有增长；耗尽是硬性的分配失败
//! - 句柄到描述符地址的换算是 O(1) 的：基址 + 索引 × 跨度
//!
//! # DirectX 12 描述符堆类型
//!
//! - **RTV** (Render Target View)：渲染目标视图
//! - **DSV** (Depth Stencil View)：深度模板视图
//! - **CBV/SRV/UAV**：常量缓冲 / 着色资源 / 无序访问视图，着色器可见

use crate::core::error::{GraphicsError, Result};
use crate::gfx::backend::GpuDevice;
use crate::{gpu_error, gpu_warn};

/// 描述符堆类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorHeapType {
    /// 渲染目标视图 (RTV)
    Rtv,
    /// 深度模板视图 (DSV)
    Dsv,
    /// 常量缓冲 / 着色资源 / 无序访问视图
    CbvSrvUav,
}

impl DescriptorHeapType {
    /// 描述符类型是否需要着色器可见
    pub fn is_shader_visible(&self) -> bool {
        matches!(self, DescriptorHeapType::CbvSrvUav)
    }

    /// 获取描述符堆类型名称
    pub fn name(&self) -> &'static str {
        match self {
            DescriptorHeapType::Rtv => "RTV",
            DescriptorHeapType::Dsv => "DSV",
            DescriptorHeapType::CbvSrvUav => "CBV/SRV/UAV",
        }
    }
}

/// 堆内的槽位索引
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorIndex(pub u32);

/// 描述符句柄（CPU 可见）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuDescriptorHandle {
    /// 句柄指针值
    pub ptr: usize,
}

/// 描述符句柄（GPU 可见）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuDescriptorHandle {
    /// 句柄指针值
    pub ptr: u64,
}

/// 描述符堆统计信息
#[derive(Debug, Clone)]
pub struct DescriptorHeapStats {
    pub heap_type: DescriptorHeapType,
    pub capacity: u32,
    pub used: u32,
    pub available: u32,
    /// 使用率 (0.0 - 1.0)
    pub usage_ratio: f32,
}

impl DescriptorHeapStats {
    pub fn new(heap_type: DescriptorHeapType, capacity: u32, used: u32) -> Self {
        let available = capacity.saturating_sub(used);
        let usage_ratio = if capacity > 0 {
            used as f32 / capacity as f32
        } else {
            0.0
        };

        Self {
            heap_type,
            capacity,
            used,
            available,
            usage_ratio,
        }
    }
}

/// 槽位簿记，与原生堆无关
///
/// 先复用已释放的槽位，再向后递增分配。
#[derive(Debug)]
pub(crate) struct SlotAllocator {
    capacity: u32,
    /// 已经分配过的最大索引 + 1
    next: u32,
    free: Vec<u32>,
    live: Vec<bool>,
    used: u32,
}

impl SlotAllocator {
    pub(crate) fn new(capacity: u32) -> Self {
        Self {
            capacity,
            next: 0,
            free: Vec::new(),
            live: Vec::new(),
            used: 0,
        }
    }

    pub(crate) fn alloc(&mut self) -> Option<u32> {
        let index = match self.free.pop() {
            Some(index) => index,
            None if self.next < self.capacity => {
                let index = self.next;
                self.next += 1;
                self.live.push(false);
                index
            }
            None => return None,
        };

        self.live[index as usize] = true;
        self.used += 1;
        Some(index)
    }

    /// 释放成功返回 true；重复释放或释放从未分配的槽位返回 false
    pub(crate) fn free(&mut self, index: u32) -> bool {
        match self.live.get_mut(index as usize) {
            Some(live) if *live => {
                *live = false;
                self.free.push(index);
                self.used -= 1;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn is_live(&self, index: u32) -> bool {
        self.live.get(index as usize).copied().unwrap_or(false)
    }

    pub(crate) fn used(&self) -> u32 {
        self.used
    }

    pub(crate) fn capacity(&self) -> u32 {
        self.capacity
    }
}

/// 描述符堆
///
/// 持有原生描述符堆和槽位簿记。分配与释放需要 `&mut self`，
/// 由持有它的 `Context` 保证单写者。
pub struct DescriptorHeap<D: GpuDevice> {
    native: D::DescriptorHeap,
    heap_type: DescriptorHeapType,
    cpu_start: usize,
    gpu_start: Option<u64>,
    increment: u32,
    slots: SlotAllocator,
}

impl<D: GpuDevice> DescriptorHeap<D> {
    /// 创建固定容量的描述符堆
    pub fn new(device: &D, heap_type: DescriptorHeapType, capacity: u32) -> Result<Self> {
        let native = device.create_descriptor_heap(heap_type, capacity).map_err(|e| {
            gpu_error!(heap = heap_type.name(), capacity, "D3D12: Failed to create descriptor heap: {}", e);
            e
        })?;
        let layout = device.descriptor_heap_layout(&native);

        Ok(Self {
            native,
            heap_type,
            cpu_start: layout.cpu_start,
            gpu_start: layout.gpu_start,
            increment: layout.increment,
            slots: SlotAllocator::new(capacity),
        })
    }

    /// 分配一个槽位；堆满时返回致命错误
    pub fn alloc(&mut self) -> Result<DescriptorIndex> {
        match self.slots.alloc() {
            Some(index) => Ok(DescriptorIndex(index)),
            None => {
                gpu_error!(
                    heap = self.heap_type.name(),
                    capacity = self.slots.capacity(),
                    "Descriptor heap exhausted"
                );
                Err(GraphicsError::DescriptorHeapExhausted {
                    heap: self.heap_type.name(),
                    capacity: self.slots.capacity(),
                }
                .into())
            }
        }
    }

    /// 把槽位归还到空闲集合
    ///
    /// 重复释放或释放从未分配的句柄属于误用：调试构建下触发断言，
    /// 发布构建下记录警告并忽略。
    pub fn free_space(&mut self, index: DescriptorIndex) {
        let freed = self.slots.free(index.0);
        debug_assert!(
            freed,
            "{} descriptor {} freed while not allocated",
            self.heap_type.name(),
            index.0
        );
        if !freed {
            gpu_warn!(
                heap = self.heap_type.name(),
                index = index.0,
                "Ignoring free of a descriptor that is not allocated"
            );
        }
    }

    /// 槽位的 CPU 描述符地址
    pub fn cpu(&self, index: DescriptorIndex) -> CpuDescriptorHandle {
        CpuDescriptorHandle {
            ptr: self.cpu_start + index.0 as usize * self.increment as usize,
        }
    }

    /// 槽位的 GPU 描述符地址（仅着色器可见的堆）
    pub fn gpu(&self, index: DescriptorIndex) -> Option<GpuDescriptorHandle> {
        self.gpu_start.map(|start| GpuDescriptorHandle {
            ptr: start + index.0 as u64 * self.increment as u64,
        })
    }

    pub fn is_live(&self, index: DescriptorIndex) -> bool {
        self.slots.is_live(index.0)
    }

    pub fn heap_type(&self) -> DescriptorHeapType {
        self.heap_type
    }

    pub fn capacity(&self) -> u32 {
        self.slots.capacity()
    }

    pub fn used(&self) -> u32 {
        self.slots.used()
    }

    pub fn increment(&self) -> u32 {
        self.increment
    }

    pub fn stats(&self) -> DescriptorHeapStats {
        DescriptorHeapStats::new(self.heap_type, self.slots.capacity(), self.slots.used())
    }

    pub fn native(&self) -> &D::DescriptorHeap {
        &self.native
    }

    /// 销毁原生堆
    pub fn free(self, device: &D) {
        if self.slots.used() > 0 {
            gpu_warn!(
                heap = self.heap_type.name(),
                live = self.slots.used(),
                "Descriptor heap destroyed with live descriptors"
            );
        }
        device.destroy_descriptor_heap(self.native);
    }
}
