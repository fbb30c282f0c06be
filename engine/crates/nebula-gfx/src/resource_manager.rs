//! 资源管理器
//!
//! 负责管理所有的 Image、Buffer 和 Event。
//! 使用 SlotMap 存储资源，对外提供轻量级的 Handle。

use itertools::Itertools;
use slotmap::SlotMap;

use crate::handles::{GfxBufferHandle, GfxEventHandle, GfxImageHandle};
use crate::resources::buffer::{GfxBuffer, GfxBufferCreateInfo};
use crate::resources::image::{GfxImage, GfxImageCreateInfo};

/// Event 同步原语
///
/// 只保留调试名称；信号/等待语义由命令流表达。
#[derive(Clone, Debug)]
pub struct GfxEvent {
    name: String,
}

impl GfxEvent {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// 资源管理器
#[derive(Default)]
pub struct GfxResourceManager {
    /// 存储所有的 Image 资源
    image_pool: SlotMap<GfxImageHandle, GfxImage>,
    /// 存储所有的 Buffer 资源
    buffer_pool: SlotMap<GfxBufferHandle, GfxBuffer>,
    /// 存储所有的 Event 原语
    event_pool: SlotMap<GfxEventHandle, GfxEvent>,
}

// new & init
impl GfxResourceManager {
    /// 创建一个新的资源管理器
    pub fn new() -> Self {
        Self::default()
    }
}

// Image API
impl GfxResourceManager {
    pub fn create_image(&mut self, info: GfxImageCreateInfo, name: impl AsRef<str>) -> GfxImageHandle {
        self.image_pool.insert(GfxImage::new(info, name.as_ref()))
    }

    /// 获取 Image 资源引用
    #[inline]
    pub fn get_image(&self, handle: GfxImageHandle) -> Option<&GfxImage> {
        self.image_pool.get(handle)
    }

    pub fn destroy_image(&mut self, handle: GfxImageHandle) {
        self.image_pool.remove(handle);
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.image_pool.len()
    }
}

// Buffer API
impl GfxResourceManager {
    pub fn create_buffer(&mut self, info: GfxBufferCreateInfo, name: impl AsRef<str>) -> GfxBufferHandle {
        self.buffer_pool.insert(GfxBuffer::new(info, name.as_ref()))
    }

    /// 获取 Buffer 资源引用
    #[inline]
    pub fn get_buffer(&self, handle: GfxBufferHandle) -> Option<&GfxBuffer> {
        self.buffer_pool.get(handle)
    }

    pub fn destroy_buffer(&mut self, handle: GfxBufferHandle) {
        self.buffer_pool.remove(handle);
    }

    #[inline]
    pub fn buffer_count(&self) -> usize {
        self.buffer_pool.len()
    }
}

// Event API
impl GfxResourceManager {
    pub fn create_event(&mut self, name: impl Into<String>) -> GfxEventHandle {
        self.event_pool.insert(GfxEvent { name: name.into() })
    }

    #[inline]
    pub fn get_event(&self, handle: GfxEventHandle) -> Option<&GfxEvent> {
        self.event_pool.get(handle)
    }

    pub fn destroy_event(&mut self, handle: GfxEventHandle) {
        self.event_pool.remove(handle);
    }

    #[inline]
    pub fn event_count(&self) -> usize {
        self.event_pool.len()
    }
}

// 窗口 resize
impl GfxResourceManager {
    /// 重算所有窗口相对尺寸图像的宽高
    ///
    /// 返回被 resize 的图像句柄。
    pub fn resize_window_relative(&mut self, window_width: u32, window_height: u32) -> Vec<GfxImageHandle> {
        let _span = tracy_client::span!("GfxResourceManager::resize_window_relative");

        let targets = self
            .image_pool
            .iter()
            .filter(|(_, image)| image.is_window_relative())
            .map(|(handle, _)| handle)
            .collect_vec();

        for &handle in &targets {
            if let Some(image) = self.image_pool.get_mut(handle) {
                image.resize_for_window(window_width, window_height);
            }
        }
        log::debug!("resized {} window-relative images to {}x{}", targets.len(), window_width, window_height);
        targets
    }
}

// 整体销毁
impl GfxResourceManager {
    /// 销毁所有资源
    pub fn destroy_all(&mut self) {
        let _span = tracy_client::span!("GfxResourceManager::destroy_all");

        self.image_pool.clear();
        self.buffer_pool.clear();
        self.event_pool.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn test_create_and_query_image() {
        let mut mgr = GfxResourceManager::new();
        let info = GfxImageCreateInfo::new_2d(256, 128, vk::Format::R8G8B8A8_UNORM, vk::ImageUsageFlags::SAMPLED);
        let handle = mgr.create_image(info, "color");

        let image = mgr.get_image(handle).unwrap();
        assert_eq!(image.extent().width, 256);
        assert_eq!(image.aspect(), vk::ImageAspectFlags::COLOR);

        mgr.destroy_image(handle);
        assert!(mgr.get_image(handle).is_none());
    }

    #[test]
    fn test_resize_window_relative() {
        let mut mgr = GfxResourceManager::new();
        let relative = GfxImageCreateInfo::new_2d(0, 0, vk::Format::R8G8B8A8_UNORM, vk::ImageUsageFlags::SAMPLED)
            .with_relative_size(1.0, 0.5);
        let fixed = GfxImageCreateInfo::new_2d(64, 64, vk::Format::R8G8B8A8_UNORM, vk::ImageUsageFlags::SAMPLED);

        let rel_handle = mgr.create_image(relative, "rel");
        let fixed_handle = mgr.create_image(fixed, "fixed");

        let resized = mgr.resize_window_relative(1920, 1080);
        assert_eq!(resized, vec![rel_handle]);
        assert_eq!(mgr.get_image(rel_handle).unwrap().extent().width, 1920);
        assert_eq!(mgr.get_image(rel_handle).unwrap().extent().height, 540);
        assert_eq!(mgr.get_image(fixed_handle).unwrap().extent().width, 64);
    }
}
