//! debug label 使用的颜色常量

/// 命令流 debug label 的颜色
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LabelColor(pub [f32; 4]);

impl LabelColor {
    /// 渲染 Pass
    pub const COLOR_PASS: Self = Self([0.2, 0.6, 0.2, 1.0]);
    /// 计算任务
    pub const COLOR_COMPUTE: Self = Self([0.2, 0.4, 0.8, 1.0]);
    /// 传输任务
    pub const COLOR_TRANSFER: Self = Self([0.8, 0.6, 0.2, 1.0]);
    /// 同步点标记
    pub const COLOR_SYNC: Self = Self([0.7, 0.2, 0.2, 1.0]);
}
