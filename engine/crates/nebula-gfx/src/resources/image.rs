//! 图像资源描述

use ash::vk;

use crate::resources::range::GfxImageSubresRange;

/// 图像创建信息
///
/// 不持有实际显存，仅记录帧图做 hazard 分析和区域计算所需的元数据。
#[derive(Clone, Debug)]
pub struct GfxImageCreateInfo {
    /// 图像宽度
    pub width: u32,
    /// 图像高度
    pub height: u32,
    /// 图像深度（3D 纹理）
    pub depth: u32,
    /// Mip 级别数
    pub mip_levels: u32,
    /// 数组层数
    pub array_layers: u32,
    /// 图像格式
    pub format: vk::Format,
    /// 图像用途
    pub usage: vk::ImageUsageFlags,
    /// 采样数
    pub samples: vk::SampleCountFlags,
    /// 图像类型
    pub image_type: vk::ImageType,
    /// 创建时的默认 layout，帧尾会被重置回该 layout
    pub default_layout: vk::ImageLayout,
    /// 窗口相对尺寸（宽高缩放系数）；None 表示固定尺寸
    pub relative_size: Option<(f32, f32)>,
}

impl Default for GfxImageCreateInfo {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            depth: 1,
            mip_levels: 1,
            array_layers: 1,
            format: vk::Format::R8G8B8A8_UNORM,
            usage: vk::ImageUsageFlags::SAMPLED,
            samples: vk::SampleCountFlags::TYPE_1,
            image_type: vk::ImageType::TYPE_2D,
            default_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            relative_size: None,
        }
    }
}

// new & init & builder
impl GfxImageCreateInfo {
    /// 创建 2D 图像描述
    #[inline]
    pub fn new_2d(width: u32, height: u32, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self { width, height, format, usage, ..Default::default() }
    }

    /// 设置 mip 和 layer 数（链式调用）
    #[inline]
    pub fn with_mips_layers(mut self, mip_levels: u32, array_layers: u32) -> Self {
        self.mip_levels = mip_levels;
        self.array_layers = array_layers;
        self
    }

    /// 设置默认 layout（链式调用）
    #[inline]
    pub fn with_default_layout(mut self, layout: vk::ImageLayout) -> Self {
        self.default_layout = layout;
        self
    }

    /// 设置窗口相对尺寸（链式调用）
    ///
    /// 宽高改为 `窗口尺寸 * 缩放系数`，窗口 resize 时由资源管理器重算。
    #[inline]
    pub fn with_relative_size(mut self, scale_x: f32, scale_y: f32) -> Self {
        self.relative_size = Some((scale_x, scale_y));
        self
    }

    /// 从格式推断 aspect
    pub fn infer_aspect(format: vk::Format) -> vk::ImageAspectFlags {
        match format {
            vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
                vk::ImageAspectFlags::DEPTH
            }
            vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
            vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            }
            _ => vk::ImageAspectFlags::COLOR,
        }
    }
}

/// 图像资源
#[derive(Clone, Debug)]
pub struct GfxImage {
    info: GfxImageCreateInfo,
    name: String,
}

// new & init
impl GfxImage {
    pub fn new(info: GfxImageCreateInfo, name: impl Into<String>) -> Self {
        Self { info, name: name.into() }
    }
}

// getters
impl GfxImage {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn info(&self) -> &GfxImageCreateInfo {
        &self.info
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent3D {
        vk::Extent3D {
            width: self.info.width,
            height: self.info.height,
            depth: self.info.depth,
        }
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.info.format
    }

    #[inline]
    pub fn default_layout(&self) -> vk::ImageLayout {
        self.info.default_layout
    }

    /// 根据格式推断 aspect flags
    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        GfxImageCreateInfo::infer_aspect(self.info.format)
    }

    /// 覆盖整个图像的子资源范围
    #[inline]
    pub fn full_subres_range(&self) -> GfxImageSubresRange {
        GfxImageSubresRange::whole(self.aspect(), self.info.mip_levels, self.info.array_layers)
    }

    /// 是否为窗口相对尺寸
    #[inline]
    pub fn is_window_relative(&self) -> bool {
        self.info.relative_size.is_some()
    }
}

// resize
impl GfxImage {
    /// 按窗口尺寸重算宽高
    ///
    /// 仅对窗口相对尺寸的图像生效。
    pub fn resize_for_window(&mut self, window_width: u32, window_height: u32) {
        if let Some((sx, sy)) = self.info.relative_size {
            self.info.width = ((window_width as f32 * sx) as u32).max(1);
            self.info.height = ((window_height as f32 * sy) as u32).max(1);
        }
    }
}
