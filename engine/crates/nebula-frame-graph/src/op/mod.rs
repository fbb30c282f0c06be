//! 帧脚本的操作节点
//!
//! 操作种类是封闭集合，用 enum 表达，编译和执行通过 match 分发。
//! 每个节点携带名称、注册序号、目标队列和声明的资源依赖；
//! 注册序号在加入脚本时按树的深度优先顺序分配，
//! 既是 hazard 分析的 tie-break，也是操作间"距离"的度量。

pub mod pass;

use ash::vk;
use nebula_gfx::{GfxBufferHandle, GfxBufferRange, GfxImageHandle, GfxImageSubresRange, GfxQueueType};

pub use pass::{FgAttachment, FgLoadOp, FgPassOp, FgSubpass};

/// 节点声明的一次纹理访问
#[derive(Clone, Debug)]
pub struct FgTextureAccess {
    /// 纹理句柄
    pub handle: GfxImageHandle,
    /// 显示名称，仅用于诊断
    pub name: String,
    /// Access mask
    pub access: vk::AccessFlags2,
    /// Pipeline stage
    pub stage: vk::PipelineStageFlags2,
    /// 目标 image layout
    pub layout: vk::ImageLayout,
    /// 访问的子资源范围
    pub range: GfxImageSubresRange,
}

/// 节点声明的一次缓冲区访问
#[derive(Clone, Debug)]
pub struct FgBufferAccess {
    /// 缓冲区句柄
    pub handle: GfxBufferHandle,
    /// 显示名称，仅用于诊断
    pub name: String,
    /// Access mask
    pub access: vk::AccessFlags2,
    /// Pipeline stage
    pub stage: vk::PipelineStageFlags2,
    /// 访问的字节范围
    pub range: GfxBufferRange,
}

/// 操作节点的公共数据
#[derive(Clone, Debug, Default)]
pub struct FgOpNode {
    /// 操作名称
    pub name: String,
    /// 注册序号（深度优先），由脚本在注册时分配
    pub index: u32,
    /// 执行队列
    pub queue: GfxQueueType,
    /// 声明的纹理依赖
    pub texture_accesses: Vec<FgTextureAccess>,
    /// 声明的缓冲区依赖
    pub buffer_accesses: Vec<FgBufferAccess>,
}

// new & builder
impl FgOpNode {
    pub fn new(name: impl Into<String>, queue: GfxQueueType) -> Self {
        Self {
            name: name.into(),
            queue,
            ..Default::default()
        }
    }

    /// 声明一次纹理访问（链式调用）
    pub fn with_texture_access(mut self, access: FgTextureAccess) -> Self {
        self.texture_accesses.push(access);
        self
    }

    /// 声明一次缓冲区访问（链式调用）
    pub fn with_buffer_access(mut self, access: FgBufferAccess) -> Self {
        self.buffer_accesses.push(access);
        self
    }
}

/// Blit 操作：整图缩放拷贝
#[derive(Clone, Debug)]
pub struct FgBlitOp {
    pub src: GfxImageHandle,
    pub dst: GfxImageHandle,
}

/// Copy 操作：整图逐像素拷贝
#[derive(Clone, Debug)]
pub struct FgCopyOp {
    pub src: GfxImageHandle,
    pub dst: GfxImageHandle,
}

/// Mipmap 操作：生成整条 mip 链
#[derive(Clone, Debug)]
pub struct FgMipmapOp {
    pub image: GfxImageHandle,
}

/// Compute 操作：绑定 program 并 dispatch
#[derive(Clone, Debug)]
pub struct FgComputeOp {
    /// shader program 名称
    pub program: String,
    /// dispatch 的 group 数
    pub group_count: [u32; 3],
}

/// Plugin 操作：调用注册表中的外部回调
#[derive(Clone, Debug)]
pub struct FgPluginOp {
    /// 回调在注册表中的名称
    pub callback: String,
}

/// Submission 的起止
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FgSubmissionPhase {
    Begin,
    End,
}

/// Submission 操作：命令提交的边界
#[derive(Clone, Debug)]
pub struct FgSubmissionOp {
    pub phase: FgSubmissionPhase,
    /// Begin 时可选：提交前等待的另一个队列
    pub wait_queue: Option<GfxQueueType>,
}

/// Swap 操作：呈现当前帧
#[derive(Clone, Debug)]
pub struct FgSwapOp {
    pub image: GfxImageHandle,
}

/// GlobalState 操作：更新全局常量
#[derive(Clone, Debug, Default)]
pub struct FgGlobalStateOp {}

/// Batch 操作：绘制一个批次分组（subpass 内的叶子操作）
#[derive(Clone, Debug)]
pub struct FgBatchOp {
    /// 批次分组名称
    pub group: String,
    /// 是否按排序顺序绘制
    pub sorted: bool,
}

/// FullscreenEffect 操作：全屏三角形绘制（subpass 内的叶子操作）
#[derive(Clone, Debug)]
pub struct FgFullscreenEffectOp {
    /// shader program 名称
    pub program: String,
}

/// 操作种类
#[derive(Clone, Debug)]
pub enum FgOpKind {
    Blit(FgBlitOp),
    Copy(FgCopyOp),
    Mipmap(FgMipmapOp),
    Compute(FgComputeOp),
    /// 同步点标记：实际同步由声明的依赖完成，节点本身只留下一个标记
    Barrier,
    Plugin(FgPluginOp),
    Pass(FgPassOp),
    Submission(FgSubmissionOp),
    Swap(FgSwapOp),
    GlobalState(FgGlobalStateOp),
    Batch(FgBatchOp),
    FullscreenEffect(FgFullscreenEffectOp),
}

/// 一个操作节点
#[derive(Clone, Debug)]
pub struct FgOp {
    pub node: FgOpNode,
    pub kind: FgOpKind,
}

impl FgOp {
    pub fn new(node: FgOpNode, kind: FgOpKind) -> Self {
        Self { node, kind }
    }

    /// 窗口 resize 通知
    ///
    /// 区域和 dispatch 参数都在执行时按当前尺寸计算，
    /// 目前没有节点缓存尺寸相关状态；钩子保留给需要的种类。
    pub fn on_window_resized(&mut self, _width: u32, _height: u32) {
        match &mut self.kind {
            FgOpKind::Pass(pass) => {
                for subpass in &mut pass.subpasses {
                    for child in &mut subpass.ops {
                        child.on_window_resized(_width, _height);
                    }
                }
            }
            _ => {}
        }
    }
}
