//! 缓冲区资源描述

use ash::vk;

use crate::resources::range::GfxBufferRange;

/// 缓冲区创建信息
#[derive(Clone, Debug)]
pub struct GfxBufferCreateInfo {
    /// 字节大小
    pub size: vk::DeviceSize,
    /// 缓冲区用途
    pub usage: vk::BufferUsageFlags,
}

impl GfxBufferCreateInfo {
    #[inline]
    pub fn new(size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> Self {
        Self { size, usage }
    }
}

/// 缓冲区资源
#[derive(Clone, Debug)]
pub struct GfxBuffer {
    info: GfxBufferCreateInfo,
    name: String,
}

// new & init
impl GfxBuffer {
    pub fn new(info: GfxBufferCreateInfo, name: impl Into<String>) -> Self {
        Self { info, name: name.into() }
    }
}

// getters
impl GfxBuffer {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.info.size
    }

    #[inline]
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.info.usage
    }

    /// 覆盖整个缓冲区的范围
    #[inline]
    pub fn full_range(&self) -> GfxBufferRange {
        GfxBufferRange::new(0, self.info.size)
    }
}
