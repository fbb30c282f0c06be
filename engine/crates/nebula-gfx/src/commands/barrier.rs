//! Barrier 描述
//!
//! 记录一次内存依赖的 src/dst stage、access 以及图像的 layout 转换。

use ash::vk;

use crate::handles::{GfxBufferHandle, GfxImageHandle};
use crate::resources::range::{GfxBufferRange, GfxImageSubresRange};

/// 图像 barrier
#[derive(Clone, Debug, PartialEq)]
pub struct GfxImageBarrier {
    /// 目标图像
    pub image: GfxImageHandle,
    /// src 端的 pipeline stage
    pub src_stage: vk::PipelineStageFlags2,
    /// src 端的 access mask
    pub src_access: vk::AccessFlags2,
    /// dst 端的 pipeline stage
    pub dst_stage: vk::PipelineStageFlags2,
    /// dst 端的 access mask
    pub dst_access: vk::AccessFlags2,
    /// 转换前 layout
    pub old_layout: vk::ImageLayout,
    /// 转换后 layout
    pub new_layout: vk::ImageLayout,
    /// 作用的子资源范围
    pub range: GfxImageSubresRange,
}

// builder
impl GfxImageBarrier {
    pub fn new(image: GfxImageHandle, range: GfxImageSubresRange) -> Self {
        Self {
            image,
            src_stage: vk::PipelineStageFlags2::TOP_OF_PIPE,
            src_access: vk::AccessFlags2::NONE,
            dst_stage: vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
            dst_access: vk::AccessFlags2::NONE,
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::UNDEFINED,
            range,
        }
    }

    /// 设置 layout 转换
    #[inline]
    pub fn layout_transfer(mut self, old: vk::ImageLayout, new: vk::ImageLayout) -> Self {
        self.old_layout = old;
        self.new_layout = new;
        self
    }

    /// 设置 src 端的 stage 与 access
    #[inline]
    pub fn src_mask(mut self, stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        self.src_stage = stage;
        self.src_access = access;
        self
    }

    /// 设置 dst 端的 stage 与 access
    #[inline]
    pub fn dst_mask(mut self, stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        self.dst_stage = stage;
        self.dst_access = access;
        self
    }
}

/// 缓冲区 barrier
#[derive(Clone, Debug, PartialEq)]
pub struct GfxBufferBarrier {
    /// 目标缓冲区
    pub buffer: GfxBufferHandle,
    /// src 端的 pipeline stage
    pub src_stage: vk::PipelineStageFlags2,
    /// src 端的 access mask
    pub src_access: vk::AccessFlags2,
    /// dst 端的 pipeline stage
    pub dst_stage: vk::PipelineStageFlags2,
    /// dst 端的 access mask
    pub dst_access: vk::AccessFlags2,
    /// 作用的字节范围
    pub range: GfxBufferRange,
}

// builder
impl GfxBufferBarrier {
    pub fn new(buffer: GfxBufferHandle, range: GfxBufferRange) -> Self {
        Self {
            buffer,
            src_stage: vk::PipelineStageFlags2::TOP_OF_PIPE,
            src_access: vk::AccessFlags2::NONE,
            dst_stage: vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
            dst_access: vk::AccessFlags2::NONE,
            range,
        }
    }

    /// 设置 src 端的 stage 与 access
    #[inline]
    pub fn src_mask(mut self, stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        self.src_stage = stage;
        self.src_access = access;
        self
    }

    /// 设置 dst 端的 stage 与 access
    #[inline]
    pub fn dst_mask(mut self, stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        self.dst_stage = stage;
        self.dst_access = access;
        self
    }
}
