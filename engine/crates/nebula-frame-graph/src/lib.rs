//! Nebula 帧图系统
//!
//! 声明式描述一帧的 GPU 工作（pass、compute、blit、barrier、submission），
//! 从脚本解析，编译成可执行的命令序列，每帧重放；
//! 读写重叠资源的操作之间自动插入同步（barrier / event）。
//!
//! # 核心概念
//!
//! - **FgOp / FgOpKind**: 操作节点，封闭的种类集合，树形组织
//!   （Pass 包含 Subpass，Subpass 包含叶子操作）
//! - **依赖跟踪** ([`dependency`]): 每个资源一份有序访问记录表，
//!   新访问从后往前扫描找最近生产者，子资源范围部分重叠时拆分续查
//! - **FgScript**: 拥有命名资源表和操作树，编排 build / run / resize
//! - **FgCompiledFrame**: build 的产物；带 generation，rebuild 后整体失效
//! - **FgLoadContext**: plugin 回调注册表与 submission 登记，显式传递
//!
//! # 两阶段模型
//!
//! hazard 分析全部发生在 `build()`：每个声明的资源访问经过依赖跟踪，
//! 产生的 barrier/event 物化进编译产物。`run()` 零分析，
//! 只按编译顺序回放：pre-sync、录制命令、post-sync。
//! 正确性的代价按 build 支付一次，而不是每帧一次。
//!
//! # 使用示例
//!
//! ```ignore
//! let mut res_mgr = GfxResourceManager::new();
//! let mut ctx = FgLoadContext::new();
//! ctx.register_callback("imgui", Arc::new(|cmd, frame, buffer| { /* ... */ }));
//!
//! let mut script = load_frame_script("frame/forward.json", (1920, 1080), &mut res_mgr, &mut ctx)?;
//! script.build(&mut res_mgr, &ctx);
//!
//! // 每帧
//! let submissions = script.run(&res_mgr, frame_index, buffer_index);
//!
//! // 窗口 resize
//! script.on_window_resized(&mut res_mgr, &ctx, width, height);
//! ```

pub mod compiled;
mod compiler;
pub mod context;
pub mod dependency;
mod executor;
pub mod loader;
pub mod op;
pub mod script;
pub mod state;

// Re-exports
pub use compiled::{
    FgBarrierBatch, FgCompiledFrame, FgCompiledKind, FgCompiledOp, FgCompiledOpRef, FgCompiledSubpass,
    FgPluginCallback, FgPostSync, FgPreSync, FgSignalEvent, FgWaitEvent,
};
pub use context::FgLoadContext;
pub use dependency::{
    FgBufferDependency, FgBufferHazard, FgBufferSync, FgCompileSettings, FgImageDependency, FgImageHazard,
    FgImageSync, analyze_buffer_access, analyze_image_access,
};
pub use loader::{load_frame_script, load_frame_script_str};
pub use op::{
    FgAttachment, FgBatchOp, FgBlitOp, FgBufferAccess, FgComputeOp, FgCopyOp, FgFullscreenEffectOp, FgGlobalStateOp,
    FgLoadOp, FgMipmapOp, FgOp, FgOpKind, FgOpNode, FgPassOp, FgPluginOp, FgSubmissionOp, FgSubmissionPhase,
    FgSubpass, FgSwapOp, FgTextureAccess,
};
pub use script::FgScript;
pub use state::{FgBufferState, FgImageState};
