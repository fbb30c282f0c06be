//! 命令录制
//!
//! `GfxCommandBuffer` 把所有操作录制成有序的 `GfxCommand` 流，
//! 由渲染后端按序消费；测试可以直接断言命令流的内容。

use ash::vk;

use crate::basic::color::LabelColor;
use crate::commands::barrier::{GfxBufferBarrier, GfxImageBarrier};
use crate::handles::{GfxEventHandle, GfxImageHandle};
use crate::queue::GfxQueueType;

/// 单条录制的命令
#[derive(Clone, Debug, PartialEq)]
pub enum GfxCommand {
    /// 开始 debug label 区间
    BeginLabel { label: String, color: LabelColor },
    /// 结束 debug label 区间
    EndLabel,
    /// 插入一条不成对的标记
    Marker { label: String },

    /// 一批图像 barrier
    ImageBarriers(Vec<GfxImageBarrier>),
    /// 一批缓冲区 barrier
    BufferBarriers(Vec<GfxBufferBarrier>),
    /// 等待 events 并执行附带的转换
    WaitEvents {
        events: Vec<GfxEventHandle>,
        image_barriers: Vec<GfxImageBarrier>,
        buffer_barriers: Vec<GfxBufferBarrier>,
    },
    /// 在指定 stage 发出 event 信号
    SetEvent { event: GfxEventHandle, stage: vk::PipelineStageFlags2 },
    /// 在指定 stage 重置 event
    ResetEvent { event: GfxEventHandle, stage: vk::PipelineStageFlags2 },

    /// 图像 blit（可缩放）
    BlitImage {
        src: GfxImageHandle,
        dst: GfxImageHandle,
        src_extent: vk::Extent3D,
        dst_extent: vk::Extent3D,
        src_aspect: vk::ImageAspectFlags,
        dst_aspect: vk::ImageAspectFlags,
    },
    /// 图像逐像素拷贝
    CopyImage {
        src: GfxImageHandle,
        dst: GfxImageHandle,
        extent: vk::Extent3D,
        src_aspect: vk::ImageAspectFlags,
        dst_aspect: vk::ImageAspectFlags,
    },
    /// 生成 mip 链
    GenerateMipmaps { image: GfxImageHandle, mip_levels: u32 },

    /// 绑定 compute program 并 dispatch
    Dispatch { program: String, group_count: [u32; 3] },

    /// 开始 render pass
    BeginRenderPass {
        name: String,
        color_attachments: Vec<GfxImageHandle>,
        depth_stencil: Option<GfxImageHandle>,
    },
    /// 进入下一个 subpass
    NextSubpass,
    /// 结束 render pass
    EndRenderPass,
    /// 绑定 program 并全屏绘制
    DrawFullscreen { program: String },
    /// 绘制一个批次分组
    DrawBatch { group: String, sorted: bool },
    /// 更新全局常量
    UpdateGlobalConstants { buffer_index: u32 },

    /// 呈现
    Present { image: GfxImageHandle },
}

/// 命令缓冲区
///
/// 绑定到一个队列，按录制顺序保存命令。
#[derive(Clone, Debug)]
pub struct GfxCommandBuffer {
    queue: GfxQueueType,
    name: String,
    commands: Vec<GfxCommand>,
}

// new & init
impl GfxCommandBuffer {
    pub fn new(queue: GfxQueueType, name: impl Into<String>) -> Self {
        Self {
            queue,
            name: name.into(),
            commands: Vec::new(),
        }
    }
}

// getters
impl GfxCommandBuffer {
    #[inline]
    pub fn queue(&self) -> GfxQueueType {
        self.queue
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn commands(&self) -> &[GfxCommand] {
        &self.commands
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

// 录制接口
impl GfxCommandBuffer {
    pub fn begin_label(&mut self, label: impl Into<String>, color: LabelColor) {
        self.commands.push(GfxCommand::BeginLabel { label: label.into(), color });
    }

    pub fn end_label(&mut self) {
        self.commands.push(GfxCommand::EndLabel);
    }

    pub fn insert_marker(&mut self, label: impl Into<String>) {
        self.commands.push(GfxCommand::Marker { label: label.into() });
    }

    pub fn image_memory_barrier(&mut self, barriers: &[GfxImageBarrier]) {
        if !barriers.is_empty() {
            self.commands.push(GfxCommand::ImageBarriers(barriers.to_vec()));
        }
    }

    pub fn buffer_memory_barrier(&mut self, barriers: &[GfxBufferBarrier]) {
        if !barriers.is_empty() {
            self.commands.push(GfxCommand::BufferBarriers(barriers.to_vec()));
        }
    }

    pub fn wait_events(
        &mut self,
        events: &[GfxEventHandle],
        image_barriers: &[GfxImageBarrier],
        buffer_barriers: &[GfxBufferBarrier],
    ) {
        if !events.is_empty() {
            self.commands.push(GfxCommand::WaitEvents {
                events: events.to_vec(),
                image_barriers: image_barriers.to_vec(),
                buffer_barriers: buffer_barriers.to_vec(),
            });
        }
    }

    pub fn set_event(&mut self, event: GfxEventHandle, stage: vk::PipelineStageFlags2) {
        self.commands.push(GfxCommand::SetEvent { event, stage });
    }

    pub fn reset_event(&mut self, event: GfxEventHandle, stage: vk::PipelineStageFlags2) {
        self.commands.push(GfxCommand::ResetEvent { event, stage });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn blit_image(
        &mut self,
        src: GfxImageHandle,
        dst: GfxImageHandle,
        src_extent: vk::Extent3D,
        dst_extent: vk::Extent3D,
        src_aspect: vk::ImageAspectFlags,
        dst_aspect: vk::ImageAspectFlags,
    ) {
        self.commands.push(GfxCommand::BlitImage { src, dst, src_extent, dst_extent, src_aspect, dst_aspect });
    }

    pub fn copy_image(
        &mut self,
        src: GfxImageHandle,
        dst: GfxImageHandle,
        extent: vk::Extent3D,
        src_aspect: vk::ImageAspectFlags,
        dst_aspect: vk::ImageAspectFlags,
    ) {
        self.commands.push(GfxCommand::CopyImage { src, dst, extent, src_aspect, dst_aspect });
    }

    pub fn generate_mipmaps(&mut self, image: GfxImageHandle, mip_levels: u32) {
        self.commands.push(GfxCommand::GenerateMipmaps { image, mip_levels });
    }

    pub fn dispatch(&mut self, program: impl Into<String>, group_count: [u32; 3]) {
        self.commands.push(GfxCommand::Dispatch { program: program.into(), group_count });
    }

    pub fn begin_render_pass(
        &mut self,
        name: impl Into<String>,
        color_attachments: Vec<GfxImageHandle>,
        depth_stencil: Option<GfxImageHandle>,
    ) {
        self.commands.push(GfxCommand::BeginRenderPass { name: name.into(), color_attachments, depth_stencil });
    }

    pub fn next_subpass(&mut self) {
        self.commands.push(GfxCommand::NextSubpass);
    }

    pub fn end_render_pass(&mut self) {
        self.commands.push(GfxCommand::EndRenderPass);
    }

    pub fn draw_fullscreen(&mut self, program: impl Into<String>) {
        self.commands.push(GfxCommand::DrawFullscreen { program: program.into() });
    }

    pub fn draw_batch(&mut self, group: impl Into<String>, sorted: bool) {
        self.commands.push(GfxCommand::DrawBatch { group: group.into(), sorted });
    }

    pub fn update_global_constants(&mut self, buffer_index: u32) {
        self.commands.push(GfxCommand::UpdateGlobalConstants { buffer_index });
    }

    pub fn present(&mut self, image: GfxImageHandle) {
        self.commands.push(GfxCommand::Present { image });
    }

    /// 把另一个命令缓冲区的命令按序并入当前命令流
    ///
    /// 用于多线程录制：secondary 缓冲区在工作线程上录制，主线程回放。
    pub fn append(&mut self, secondary: GfxCommandBuffer) {
        self.commands.extend(secondary.commands);
    }
}
