//! 无头设备的调用日志
//!
//! 每一次原生调用都按发生顺序记录为一条 `NativeCall`，
//! 测试通过它断言调用序列（例如上传流程的屏障、拷贝、提交、等待顺序）。

use crate::gfx::backend::{BufferDesc, IndexFormat, TextureDesc, TextureFootprint, ViewDimension};
use crate::renderer::command::CommandBufferType;
use crate::renderer::descriptor::DescriptorHeapType;
use crate::renderer::resource::ImageLayout;

/// 原生对象种类，用于创建 / 销毁计数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Queue,
    Fence,
    CommandAllocator,
    CommandList,
    Resource,
    DescriptorHeap,
    SwapChain,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 7] = [
        ObjectKind::Queue,
        ObjectKind::Fence,
        ObjectKind::CommandAllocator,
        ObjectKind::CommandList,
        ObjectKind::Resource,
        ObjectKind::DescriptorHeap,
        ObjectKind::SwapChain,
    ];
}

/// 视图种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    RenderTarget,
    DepthStencil,
    ShaderResource(ViewDimension),
    UnorderedAccess(ViewDimension),
}

/// 一次原生调用
#[derive(Debug, Clone, PartialEq)]
pub enum NativeCall {
    // 对象生命周期
    Create { kind: ObjectKind, id: u64 },
    Destroy { kind: ObjectKind, id: u64 },
    CreateQueue { id: u64, kind: CommandBufferType },
    CreateTexture { id: u64, desc: TextureDesc, initial: ImageLayout },
    CreateBuffer { id: u64, desc: BufferDesc },
    CreateDescriptorHeap { id: u64, kind: DescriptorHeapType, capacity: u32 },
    CreateView { kind: ViewKind, resource: u64, dest: usize },
    WriteBuffer { resource: u64, offset: u64, len: usize },

    // 命令列表
    ResetCommandAllocator { allocator: u64 },
    ResetCommandList { list: u64 },
    CloseCommandList { list: u64 },
    SetVertexBuffer { list: u64, resource: u64, stride: u32 },
    SetIndexBuffer { list: u64, resource: u64, format: IndexFormat },
    ClearRenderTarget { list: u64, rtv: usize, color: [f32; 4] },
    SetViewport { list: u64, width: f32, height: f32 },
    Draw { list: u64, vertex_count: u32 },
    DrawIndexed { list: u64, index_count: u32 },
    Dispatch { list: u64, x: u32, y: u32, z: u32 },
    ResourceBarrier { list: u64, resource: u64, before: ImageLayout, after: ImageLayout },
    CopyTexture { list: u64, source: u64, dest: u64 },
    CopyBufferToTexture { list: u64, source: u64, dest: u64, footprint: TextureFootprint },

    // 队列与同步
    ExecuteCommandList { queue: CommandBufferType, list: u64 },
    Signal { queue: CommandBufferType, fence: u64, value: u64 },
    WaitFence { fence: u64, value: u64 },

    // 交换链
    GetSwapChainBuffer { swap_chain: u64, index: u32, resource: u64 },
    Present { swap_chain: u64, vsync: bool },
    ResizeSwapChain { swap_chain: u64, width: u32, height: u32 },

    ReportLiveObjects,
}

/// 调用日志快照
#[derive(Debug, Clone, Default)]
pub struct Journal {
    calls: Vec<NativeCall>,
}

impl Journal {
    pub(crate) fn push(&mut self, call: NativeCall) {
        self.calls.push(call);
    }

    pub(crate) fn clear(&mut self) {
        self.calls.clear();
    }

    pub fn calls(&self) -> &[NativeCall] {
        &self.calls
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// 满足条件的调用数量
    pub fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&NativeCall) -> bool,
    {
        self.calls.iter().filter(|call| predicate(call)).count()
    }

    /// 第一条满足条件的调用的位置
    pub fn position<F>(&self, predicate: F) -> Option<usize>
    where
        F: Fn(&NativeCall) -> bool,
    {
        self.calls.iter().position(predicate)
    }

    /// 最后一条满足条件的调用的位置
    pub fn last_position<F>(&self, predicate: F) -> Option<usize>
    where
        F: Fn(&NativeCall) -> bool,
    {
        self.calls.iter().rposition(predicate)
    }

    /// 只保留命令列表录制与提交相关的调用
    pub fn commands(&self) -> Vec<&NativeCall> {
        self.calls
            .iter()
            .filter(|call| {
                !matches!(
                    call,
                    NativeCall::Create { .. }
                        | NativeCall::Destroy { .. }
                        | NativeCall::CreateView { .. }
                        | NativeCall::ReportLiveObjects
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journal_queries() {
        let mut journal = Journal::default();
        journal.push(NativeCall::Create { kind: ObjectKind::Fence, id: 1 });
        journal.push(NativeCall::Draw { list: 2, vertex_count: 3 });
        journal.push(NativeCall::Draw { list: 2, vertex_count: 6 });
        journal.push(NativeCall::Destroy { kind: ObjectKind::Fence, id: 1 });

        assert_eq!(journal.len(), 4);
        assert_eq!(journal.count(|c| matches!(c, NativeCall::Draw { .. })), 2);
        assert_eq!(journal.position(|c| matches!(c, NativeCall::Draw { .. })), Some(1));
        assert_eq!(journal.last_position(|c| matches!(c, NativeCall::Draw { .. })), Some(2));
        assert_eq!(journal.commands().len(), 2);

        journal.clear();
        assert!(journal.is_empty());
    }
}
