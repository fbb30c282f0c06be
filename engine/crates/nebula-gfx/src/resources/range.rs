//! 子资源范围
//!
//! 图像按 (aspect, mip 区间, layer 区间) 选取子资源，缓冲区按 (offset, size)。
//! 两者都提供求交与差集拆分，差集结果覆盖"部分重叠"时剩余的子区间。

use ash::vk;

/// 图像子资源范围
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxImageSubresRange {
    /// 图像 aspect（COLOR / DEPTH / STENCIL）
    pub aspect: vk::ImageAspectFlags,
    /// 起始 mip 级别
    pub base_mip: u32,
    /// mip 级别数
    pub mip_count: u32,
    /// 起始数组层
    pub base_layer: u32,
    /// 数组层数
    pub layer_count: u32,
}

// new & init
impl GfxImageSubresRange {
    /// 创建自定义范围
    #[inline]
    pub const fn new(aspect: vk::ImageAspectFlags, base_mip: u32, mip_count: u32, base_layer: u32, layer_count: u32) -> Self {
        Self { aspect, base_mip, mip_count, base_layer, layer_count }
    }

    /// 覆盖整个图像的范围
    #[inline]
    pub const fn whole(aspect: vk::ImageAspectFlags, mip_count: u32, layer_count: u32) -> Self {
        Self::new(aspect, 0, mip_count, 0, layer_count)
    }

    /// mip 区间的结束（开区间）
    #[inline]
    pub fn mip_end(&self) -> u32 {
        self.base_mip + self.mip_count
    }

    /// layer 区间的结束（开区间）
    #[inline]
    pub fn layer_end(&self) -> u32 {
        self.base_layer + self.layer_count
    }
}

// 求交 & 差集
impl GfxImageSubresRange {
    /// 检查两个范围是否有重叠
    ///
    /// aspect 不相交时一定不重叠。
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.intersect(other).is_some()
    }

    /// 求两个范围的交集
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let aspect = self.aspect & other.aspect;
        if aspect == vk::ImageAspectFlags::empty() {
            return None;
        }

        let mip_begin = self.base_mip.max(other.base_mip);
        let mip_end = self.mip_end().min(other.mip_end());
        let layer_begin = self.base_layer.max(other.base_layer);
        let layer_end = self.layer_end().min(other.layer_end());

        if mip_begin >= mip_end || layer_begin >= layer_end {
            return None;
        }

        Some(Self::new(aspect, mip_begin, mip_end - mip_begin, layer_begin, layer_end - layer_begin))
    }

    /// 从当前范围中去掉 `overlap`，返回剩余的子范围
    ///
    /// `overlap` 必须是 `intersect` 的结果（mip/layer 上都落在当前范围内）。
    /// (mip, layer) 平面上的矩形差集，最多拆出 4 块：
    /// overlap 之前/之后的 mip 段取完整 layer 区间，
    /// overlap 覆盖的 mip 段取上下剩余的 layer 区间。
    pub fn subtract(&self, overlap: &Self) -> Vec<Self> {
        let mut rest = Vec::new();

        // overlap 之前的 mip 段
        if self.base_mip < overlap.base_mip {
            rest.push(Self::new(
                self.aspect,
                self.base_mip,
                overlap.base_mip - self.base_mip,
                self.base_layer,
                self.layer_count,
            ));
        }
        // overlap 之后的 mip 段
        if overlap.mip_end() < self.mip_end() {
            rest.push(Self::new(
                self.aspect,
                overlap.mip_end(),
                self.mip_end() - overlap.mip_end(),
                self.base_layer,
                self.layer_count,
            ));
        }

        let mid_mip_begin = self.base_mip.max(overlap.base_mip);
        let mid_mip_end = self.mip_end().min(overlap.mip_end());
        if mid_mip_begin < mid_mip_end {
            // overlap mip 段中，layer 区间的下侧剩余
            if self.base_layer < overlap.base_layer {
                rest.push(Self::new(
                    self.aspect,
                    mid_mip_begin,
                    mid_mip_end - mid_mip_begin,
                    self.base_layer,
                    overlap.base_layer - self.base_layer,
                ));
            }
            // layer 区间的上侧剩余
            if overlap.layer_end() < self.layer_end() {
                rest.push(Self::new(
                    self.aspect,
                    mid_mip_begin,
                    mid_mip_end - mid_mip_begin,
                    overlap.layer_end(),
                    self.layer_end() - overlap.layer_end(),
                ));
            }
        }

        rest
    }
}

/// 缓冲区字节范围
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxBufferRange {
    /// 字节偏移
    pub offset: vk::DeviceSize,
    /// 字节大小（`vk::WHOLE_SIZE` 表示直到缓冲区末尾）
    pub size: vk::DeviceSize,
}

// new & init
impl GfxBufferRange {
    /// 创建自定义范围
    #[inline]
    pub const fn new(offset: vk::DeviceSize, size: vk::DeviceSize) -> Self {
        Self { offset, size }
    }

    /// 覆盖整个缓冲区的范围
    #[inline]
    pub const fn whole() -> Self {
        Self::new(0, vk::WHOLE_SIZE)
    }

    /// 范围结束（开区间）
    #[inline]
    pub fn end(&self) -> vk::DeviceSize {
        if self.size == vk::WHOLE_SIZE { vk::WHOLE_SIZE } else { self.offset.saturating_add(self.size) }
    }
}

// 求交 & 差集
impl GfxBufferRange {
    /// 检查两个范围是否有重叠
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.intersect(other).is_some()
    }

    /// 求两个范围的交集
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let begin = self.offset.max(other.offset);
        let end = self.end().min(other.end());
        if begin >= end {
            return None;
        }
        let size = if end == vk::WHOLE_SIZE { vk::WHOLE_SIZE } else { end - begin };
        Some(Self::new(begin, size))
    }

    /// 从当前范围中去掉 `overlap`，返回剩余的子范围（最多 2 块）
    pub fn subtract(&self, overlap: &Self) -> Vec<Self> {
        let mut rest = Vec::new();
        if self.offset < overlap.offset {
            rest.push(Self::new(self.offset, overlap.offset - self.offset));
        }
        if overlap.end() < self.end() {
            let size = if self.end() == vk::WHOLE_SIZE { vk::WHOLE_SIZE } else { self.end() - overlap.end() };
            rest.push(Self::new(overlap.end(), size));
        }
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_range_intersect() {
        let a = GfxImageSubresRange::new(vk::ImageAspectFlags::COLOR, 0, 4, 0, 2);
        let b = GfxImageSubresRange::new(vk::ImageAspectFlags::COLOR, 2, 4, 1, 2);

        let i = a.intersect(&b).unwrap();
        assert_eq!(i, GfxImageSubresRange::new(vk::ImageAspectFlags::COLOR, 2, 2, 1, 1));
    }

    #[test]
    fn test_image_range_aspect_mismatch() {
        let color = GfxImageSubresRange::new(vk::ImageAspectFlags::COLOR, 0, 4, 0, 1);
        let depth = GfxImageSubresRange::new(vk::ImageAspectFlags::DEPTH, 0, 4, 0, 1);

        assert!(!color.overlaps(&depth));
    }

    #[test]
    fn test_image_range_subtract_mip_split() {
        // [0,4) 去掉 [0,2)，剩 [2,4)
        let full = GfxImageSubresRange::new(vk::ImageAspectFlags::COLOR, 0, 4, 0, 1);
        let lower = GfxImageSubresRange::new(vk::ImageAspectFlags::COLOR, 0, 2, 0, 1);

        let rest = full.subtract(&lower);
        assert_eq!(rest, vec![GfxImageSubresRange::new(vk::ImageAspectFlags::COLOR, 2, 2, 0, 1)]);
    }

    #[test]
    fn test_image_range_subtract_center() {
        // mip/layer 都有剩余时拆成 4 块
        let full = GfxImageSubresRange::new(vk::ImageAspectFlags::COLOR, 0, 4, 0, 4);
        let center = GfxImageSubresRange::new(vk::ImageAspectFlags::COLOR, 1, 2, 1, 2);

        let rest = full.subtract(&center);
        assert_eq!(rest.len(), 4);
        // 剩余块与 center 不相交，且覆盖的 (mip, layer) 单元数正确
        let total: u32 = rest.iter().map(|r| r.mip_count * r.layer_count).sum();
        assert_eq!(total, 16 - 4);
        assert!(rest.iter().all(|r| !r.overlaps(&center)));
    }

    #[test]
    fn test_buffer_range_intersect() {
        let a = GfxBufferRange::new(0, 256);
        let b = GfxBufferRange::new(128, 256);

        assert_eq!(a.intersect(&b), Some(GfxBufferRange::new(128, 128)));
    }

    #[test]
    fn test_buffer_range_whole_size() {
        let whole = GfxBufferRange::whole();
        let tail = GfxBufferRange::new(1024, 256);

        assert!(whole.overlaps(&tail));
        let rest = whole.subtract(&tail);
        assert_eq!(rest[0], GfxBufferRange::new(0, 1024));
        assert_eq!(rest[1].offset, 1280);
    }

    #[test]
    fn test_buffer_range_subtract_disjoint_tail() {
        let a = GfxBufferRange::new(0, 512);
        let head = GfxBufferRange::new(0, 128);

        let rest = a.subtract(&head);
        assert_eq!(rest, vec![GfxBufferRange::new(128, 384)]);
    }
}
