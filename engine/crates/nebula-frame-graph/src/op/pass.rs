//! Pass 与 Subpass 节点
//!
//! Pass 是共享一套 render target 配置的渲染分组；
//! 其内部的 Subpass 通过 subpass dependency 同步，比全局 barrier 更轻。

use super::{FgOp, FgOpNode};
use nebula_gfx::GfxImageHandle;

/// 附件加载方式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FgLoadOp {
    /// 保留已有内容
    Load,
    /// 清屏
    Clear,
    /// 不关心
    DontCare,
}

/// Pass 的一个附件
#[derive(Clone, Debug)]
pub struct FgAttachment {
    /// 附件名称（与脚本纹理表中的名称一致）
    pub name: String,
    /// 附件纹理
    pub handle: GfxImageHandle,
    /// 加载方式
    pub load: FgLoadOp,
    /// 是否在 pass 结束时保留内容
    pub store: bool,
    /// 清屏颜色（load 为 Clear 时有效）
    pub clear_value: [f32; 4],
}

/// Subpass 节点
///
/// Subpass 自身也是操作节点（有名称和注册序号），
/// 附件通过下标引用所属 Pass 的附件表。
#[derive(Clone, Debug)]
pub struct FgSubpass {
    pub node: FgOpNode,
    /// 写入的附件（所属 Pass 附件表的下标）
    pub attachment_refs: Vec<u32>,
    /// 作为 input attachment 读取的附件下标
    pub input_refs: Vec<u32>,
    /// 依赖的更早 subpass 下标
    pub depends_on: Vec<u32>,
    /// 是否使用深度附件
    pub use_depth: bool,
    /// Subpass 内的叶子操作
    pub ops: Vec<FgOp>,
}

/// Pass 节点
#[derive(Clone, Debug, Default)]
pub struct FgPassOp {
    /// 颜色附件（有序）
    pub attachments: Vec<FgAttachment>,
    /// 深度模板附件
    pub depth_stencil: Option<FgAttachment>,
    /// Subpass 列表（有序）
    pub subpasses: Vec<FgSubpass>,
}
