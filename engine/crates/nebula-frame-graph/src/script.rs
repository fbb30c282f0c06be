//! 帧脚本
//!
//! 脚本拥有命名资源表、有序的操作树和编译产物，
//! 负责 build / run / 窗口 resize 的编排。
//!
//! build 可以反复调用（例如窗口 resize 后）且完全幂等：
//! 旧的编译产物和同步原语整体丢弃，从头重算。

use std::collections::HashMap;

use indexmap::IndexMap;
use nebula_gfx::{GfxBufferHandle, GfxImageHandle, GfxResourceManager, GfxSubmission};

use crate::compiled::FgCompiledFrame;
use crate::compiler;
use crate::context::FgLoadContext;
use crate::dependency::FgCompileSettings;
use crate::executor;
use crate::op::{FgOp, FgOpKind};

/// 帧脚本
pub struct FgScript {
    /// 脚本名称（诊断信息都会带上）
    name: String,
    /// 编译策略
    settings: FgCompileSettings,

    /// 名称 -> 纹理句柄（名称在脚本内唯一）
    textures: IndexMap<String, GfxImageHandle>,
    /// 名称 -> 缓冲区句柄
    buffers: IndexMap<String, GfxBufferHandle>,
    /// 别名纹理对（双向）
    alias_pairs: HashMap<GfxImageHandle, GfxImageHandle>,

    /// 有序的操作树
    ops: Vec<FgOp>,
    /// 下一个注册序号
    next_index: u32,

    /// build 代数
    generation: u64,
    /// 最近一次 build 的产物
    compiled: Option<FgCompiledFrame>,
}

impl std::fmt::Debug for FgScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FgScript")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .field("textures", &self.textures)
            .field("buffers", &self.buffers)
            .field("alias_pairs", &self.alias_pairs)
            .field("ops", &self.ops)
            .field("next_index", &self.next_index)
            .field("generation", &self.generation)
            .field("compiled", &self.compiled.as_ref().map(|_| "<built>"))
            .finish()
    }
}

// new & init
impl FgScript {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: FgCompileSettings::default(),
            textures: IndexMap::new(),
            buffers: IndexMap::new(),
            alias_pairs: HashMap::new(),
            ops: Vec::new(),
            next_index: 0,
            generation: 0,
            compiled: None,
        }
    }

    /// 指定编译策略（链式调用）
    pub fn with_settings(mut self, settings: FgCompileSettings) -> Self {
        self.settings = settings;
        self
    }
}

// 资源表
impl FgScript {
    /// 登记一张命名纹理
    ///
    /// # Panics
    /// 名称重复时 panic（脚本的结构性错误）。
    pub fn add_texture(&mut self, name: impl Into<String>, handle: GfxImageHandle) {
        let name = name.into();
        assert!(
            !self.textures.contains_key(&name),
            "frame script \"{}\": duplicate texture name \"{}\"",
            self.name,
            name
        );
        self.textures.insert(name, handle);
    }

    /// 登记一张别名纹理：与 `aliased` 共享内存，hazard 分析对两边各查一次
    pub fn add_texture_alias(&mut self, name: impl Into<String>, handle: GfxImageHandle, aliased: &str) {
        let other = *self
            .textures
            .get(aliased)
            .unwrap_or_else(|| panic!("frame script \"{}\": unknown alias target \"{}\"", self.name, aliased));
        self.add_texture(name, handle);
        self.alias_pairs.insert(handle, other);
        self.alias_pairs.insert(other, handle);
    }

    /// 登记一个命名缓冲区
    pub fn add_buffer(&mut self, name: impl Into<String>, handle: GfxBufferHandle) {
        let name = name.into();
        assert!(
            !self.buffers.contains_key(&name),
            "frame script \"{}\": duplicate buffer name \"{}\"",
            self.name,
            name
        );
        self.buffers.insert(name, handle);
    }

    /// 按名称查纹理
    #[inline]
    pub fn texture(&self, name: &str) -> Option<GfxImageHandle> {
        self.textures.get(name).copied()
    }

    /// 按名称查缓冲区
    #[inline]
    pub fn buffer(&self, name: &str) -> Option<GfxBufferHandle> {
        self.buffers.get(name).copied()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

// 操作注册
impl FgScript {
    /// 注册一个操作
    ///
    /// 按树的深度优先顺序为节点（含 subpass 及其子操作）分配注册序号。
    pub fn push_op(&mut self, mut op: FgOp) {
        Self::assign_indices(&mut op, &mut self.next_index);
        self.ops.push(op);
    }

    fn assign_indices(op: &mut FgOp, counter: &mut u32) {
        op.node.index = *counter;
        *counter += 1;
        if let FgOpKind::Pass(pass) = &mut op.kind {
            for subpass in &mut pass.subpasses {
                subpass.node.index = *counter;
                *counter += 1;
                for child in &mut subpass.ops {
                    Self::assign_indices(child, counter);
                }
            }
        }
    }

    #[inline]
    pub fn ops(&self) -> &[FgOp] {
        &self.ops
    }
}

// build & run
impl FgScript {
    /// 编译脚本
    ///
    /// 可重入：先整体丢弃上一次的编译产物和同步原语，再从头重算。
    /// rebuild 之后任何旧的 [`crate::compiled::FgCompiledOpRef`] 都会失效。
    pub fn build(&mut self, res_mgr: &mut GfxResourceManager, ctx: &FgLoadContext) {
        let _span = tracy_client::span!("FgScript::build");

        // 丢弃阶段：归还上一次 build 创建的 events，编译产物整体失效
        if let Some(prev) = self.compiled.take() {
            for event in prev.events {
                res_mgr.destroy_event(event);
            }
        }
        self.generation += 1;

        let frame = compiler::compile_script(
            &self.name,
            &self.ops,
            &self.textures,
            &self.alias_pairs,
            &self.settings,
            self.generation,
            res_mgr,
            ctx,
        );
        self.compiled = Some(frame);
    }

    /// 最近一次 build 的产物
    #[inline]
    pub fn compiled(&self) -> Option<&FgCompiledFrame> {
        self.compiled.as_ref()
    }

    /// 执行一帧，返回各队列的提交
    pub fn run(&self, res_mgr: &GfxResourceManager, frame_index: u64, buffer_index: u32) -> Vec<GfxSubmission> {
        let frame = self.compiled.as_ref().expect("frame script is not built");
        executor::run_frame(frame, res_mgr, frame_index, buffer_index, false)
    }

    /// 执行一帧，subpass 命令并行录制
    ///
    /// 外部命令顺序与 [`Self::run`] 完全一致。
    pub fn run_parallel(
        &self,
        res_mgr: &GfxResourceManager,
        frame_index: u64,
        buffer_index: u32,
    ) -> Vec<GfxSubmission> {
        let frame = self.compiled.as_ref().expect("frame script is not built");
        executor::run_frame(frame, res_mgr, frame_index, buffer_index, true)
    }

    /// 窗口 resize 入口
    ///
    /// 重算窗口相对尺寸的纹理，通知所有操作节点，然后整体 rebuild。
    pub fn on_window_resized(
        &mut self,
        res_mgr: &mut GfxResourceManager,
        ctx: &FgLoadContext,
        width: u32,
        height: u32,
    ) {
        log::info!("frame script \"{}\": window resized to {}x{}", self.name, width, height);

        res_mgr.resize_window_relative(width, height);
        for op in &mut self.ops {
            op.on_window_resized(width, height);
        }
        self.build(res_mgr, ctx);
    }

    /// 终态清理：销毁编译产物和脚本拥有的全部命名资源
    pub fn discard(&mut self, res_mgr: &mut GfxResourceManager) {
        if let Some(prev) = self.compiled.take() {
            for event in prev.events {
                res_mgr.destroy_event(event);
            }
        }
        for (_, handle) in self.textures.drain(..) {
            res_mgr.destroy_image(handle);
        }
        for (_, handle) in self.buffers.drain(..) {
            res_mgr.destroy_buffer(handle);
        }
        self.alias_pairs.clear();
        self.ops.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::{
        FgAttachment, FgBatchOp, FgBlitOp, FgComputeOp, FgLoadOp, FgOpNode, FgPassOp, FgPluginOp, FgSubmissionOp,
        FgSubmissionPhase, FgSubpass, FgSwapOp, FgTextureAccess,
    };
    use crate::state::FgImageState;
    use ash::vk;
    use nebula_gfx::{GfxCommand, GfxImageCreateInfo, GfxImageSubresRange, GfxQueueType};

    fn make_texture(res_mgr: &mut GfxResourceManager, name: &str, width: u32, height: u32) -> GfxImageHandle {
        let info = GfxImageCreateInfo::new_2d(
            width,
            height,
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
        );
        res_mgr.create_image(info, name)
    }

    fn tex_access(handle: GfxImageHandle, name: &str, state: FgImageState, range: GfxImageSubresRange) -> FgTextureAccess {
        FgTextureAccess {
            handle,
            name: name.to_string(),
            access: state.access,
            stage: state.stage,
            layout: state.layout,
            range,
        }
    }

    fn whole(range_mips: u32) -> GfxImageSubresRange {
        GfxImageSubresRange::whole(vk::ImageAspectFlags::COLOR, range_mips, 1)
    }

    fn begin_submission(name: &str, queue: GfxQueueType) -> FgOp {
        FgOp::new(
            FgOpNode::new(name, queue),
            FgOpKind::Submission(FgSubmissionOp {
                phase: FgSubmissionPhase::Begin,
                wait_queue: None,
            }),
        )
    }

    fn end_submission(name: &str, queue: GfxQueueType) -> FgOp {
        FgOp::new(
            FgOpNode::new(name, queue),
            FgOpKind::Submission(FgSubmissionOp {
                phase: FgSubmissionPhase::End,
                wait_queue: None,
            }),
        )
    }

    fn clear_pass(texture: GfxImageHandle) -> FgOp {
        let node = FgOpNode::new("Clear", GfxQueueType::Graphics).with_texture_access(tex_access(
            texture,
            "color",
            FgImageState::COLOR_ATTACHMENT_WRITE,
            whole(1),
        ));
        FgOp::new(
            node,
            FgOpKind::Pass(FgPassOp {
                attachments: vec![FgAttachment {
                    name: "color".to_string(),
                    handle: texture,
                    load: FgLoadOp::Clear,
                    store: true,
                    clear_value: [0.0, 0.0, 0.0, 1.0],
                }],
                depth_stencil: None,
                subpasses: vec![],
            }),
        )
    }

    fn sample_compute(texture: GfxImageHandle) -> FgOp {
        let node = FgOpNode::new("Sample", GfxQueueType::Graphics).with_texture_access(tex_access(
            texture,
            "color",
            FgImageState::SHADER_READ_COMPUTE,
            whole(1),
        ));
        FgOp::new(
            node,
            FgOpKind::Compute(FgComputeOp {
                program: "sample".to_string(),
                group_count: [8, 8, 1],
            }),
        )
    }

    /// 颜色附件写入后被 compute 读取：恰好一个 barrier，
    /// 两端的 stage 和 layout 都来自双方声明的状态
    #[test]
    fn test_write_then_sample_creates_single_barrier() {
        let mut res_mgr = GfxResourceManager::new();
        let ctx = FgLoadContext::new();
        let texture = make_texture(&mut res_mgr, "color", 64, 64);

        let mut script = FgScript::new("example");
        script.add_texture("color", texture);
        script.push_op(begin_submission("main_begin", GfxQueueType::Graphics));
        script.push_op(clear_pass(texture));
        script.push_op(sample_compute(texture));
        script.push_op(end_submission("main_end", GfxQueueType::Graphics));
        script.build(&mut res_mgr, &ctx);

        let frame = script.compiled().unwrap();
        let flat = frame.iter_flat();
        let sample = flat.iter().find(|op| op.name == "Sample").unwrap();

        assert_eq!(sample.pre_sync.barriers.len(), 1);
        let batch = &sample.pre_sync.barriers[0];
        let clear_index = flat.iter().find(|op| op.name == "Clear").unwrap().index;
        assert_eq!(batch.producer, Some(clear_index));
        assert_eq!(batch.producer_stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(batch.image_barriers.len(), 1);

        let barrier = &batch.image_barriers[0];
        assert_eq!(barrier.old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(barrier.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(barrier.src_stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(barrier.dst_stage, vk::PipelineStageFlags2::COMPUTE_SHADER);

        // Sample 把纹理留在默认 layout，帧尾无需重置
        assert!(frame.reset_barriers.is_empty());
    }

    /// build 幂等：连续两次 build 产生等价的编译产物
    #[test]
    fn test_rebuild_is_idempotent() {
        let mut res_mgr = GfxResourceManager::new();
        let ctx = FgLoadContext::new();
        let texture = make_texture(&mut res_mgr, "color", 64, 64);

        let mut script = FgScript::new("rebuild");
        script.add_texture("color", texture);
        script.push_op(begin_submission("main_begin", GfxQueueType::Graphics));
        script.push_op(clear_pass(texture));
        script.push_op(sample_compute(texture));
        script.push_op(end_submission("main_end", GfxQueueType::Graphics));

        script.build(&mut res_mgr, &ctx);
        let frame = script.compiled().unwrap();
        let first_len = frame.flat_len();
        let first_names: Vec<String> = frame.iter_flat().iter().map(|op| op.name.clone()).collect();
        let first_barriers = frame.barrier_batch_count();
        let first_events = frame.wait_event_count();
        let first_generation = frame.generation;

        script.build(&mut res_mgr, &ctx);
        let frame = script.compiled().unwrap();
        let second_names: Vec<String> = frame.iter_flat().iter().map(|op| op.name.clone()).collect();

        assert_eq!(frame.flat_len(), first_len);
        assert_eq!(second_names, first_names);
        assert_eq!(frame.barrier_batch_count(), first_barriers);
        assert_eq!(frame.wait_event_count(), first_events);
        assert!(frame.generation > first_generation);
    }

    /// 最终 layout 偏离默认值的纹理恰好得到一个帧尾重置 barrier，
    /// run 时由 end-submission 在收尾前插入
    #[test]
    fn test_reset_barrier_for_non_default_layout() {
        let mut res_mgr = GfxResourceManager::new();
        let ctx = FgLoadContext::new();
        let texture = make_texture(&mut res_mgr, "color", 64, 64);

        let mut script = FgScript::new("reset");
        script.add_texture("color", texture);
        script.push_op(begin_submission("main_begin", GfxQueueType::Graphics));
        script.push_op(clear_pass(texture));
        script.push_op(end_submission("main_end", GfxQueueType::Graphics));
        script.build(&mut res_mgr, &ctx);

        let frame = script.compiled().unwrap();
        assert_eq!(frame.reset_barriers.len(), 1);
        let reset = &frame.reset_barriers[0];
        assert_eq!(reset.old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(reset.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

        let submissions = script.run(&res_mgr, 0, 0);
        assert_eq!(submissions.len(), 1);
        assert!(submissions[0].signal_frame_done);
        // 重置 barrier 是收尾前的最后一批命令
        let commands = submissions[0].cmd.commands();
        assert_eq!(commands.last().unwrap(), &GfxCommand::ImageBarriers(frame.reset_barriers.clone()));
    }

    /// 不触碰任何纹理的脚本：零重置 barrier
    #[test]
    fn test_no_layout_change_no_reset_barriers() {
        let mut res_mgr = GfxResourceManager::new();
        let ctx = FgLoadContext::new();
        let texture = make_texture(&mut res_mgr, "color", 64, 64);

        let mut script = FgScript::new("quiet");
        script.add_texture("color", texture);
        script.push_op(begin_submission("main_begin", GfxQueueType::Graphics));
        script.push_op(FgOp::new(
            FgOpNode::new("debug_hook", GfxQueueType::Graphics),
            FgOpKind::Plugin(FgPluginOp { callback: "debug_hook".to_string() }),
        ));
        script.push_op(end_submission("main_end", GfxQueueType::Graphics));
        script.build(&mut res_mgr, &ctx);

        assert!(script.compiled().unwrap().reset_barriers.is_empty());
    }

    /// 展平顺序是操作树的深度优先注册顺序，与每个节点触碰多少资源无关
    #[test]
    fn test_flattening_preserves_registration_order() {
        let mut res_mgr = GfxResourceManager::new();
        let ctx = FgLoadContext::new();
        let texture = make_texture(&mut res_mgr, "color", 64, 64);

        let pass = FgOp::new(
            FgOpNode::new("lighting", GfxQueueType::Graphics).with_texture_access(tex_access(
                texture,
                "color",
                FgImageState::COLOR_ATTACHMENT_WRITE,
                whole(1),
            )),
            FgOpKind::Pass(FgPassOp {
                attachments: vec![FgAttachment {
                    name: "color".to_string(),
                    handle: texture,
                    load: FgLoadOp::Clear,
                    store: true,
                    clear_value: [0.0; 4],
                }],
                depth_stencil: None,
                subpasses: vec![
                    FgSubpass {
                        node: FgOpNode::new("geometry", GfxQueueType::Graphics),
                        attachment_refs: vec![0],
                        input_refs: vec![],
                        depends_on: vec![],
                        use_depth: false,
                        ops: vec![FgOp::new(
                            FgOpNode::new("opaque", GfxQueueType::Graphics),
                            FgOpKind::Batch(FgBatchOp { group: "Opaque".to_string(), sorted: false }),
                        )],
                    },
                    FgSubpass {
                        node: FgOpNode::new("translucent", GfxQueueType::Graphics),
                        attachment_refs: vec![0],
                        input_refs: vec![],
                        depends_on: vec![0],
                        use_depth: false,
                        ops: vec![FgOp::new(
                            FgOpNode::new("alpha", GfxQueueType::Graphics),
                            FgOpKind::Batch(FgBatchOp { group: "Alpha".to_string(), sorted: true }),
                        )],
                    },
                ],
            }),
        );

        let mut script = FgScript::new("order");
        script.add_texture("color", texture);
        script.push_op(begin_submission("main_begin", GfxQueueType::Graphics));
        script.push_op(pass);
        script.push_op(sample_compute(texture));
        script.push_op(end_submission("main_end", GfxQueueType::Graphics));
        script.build(&mut res_mgr, &ctx);

        let frame = script.compiled().unwrap();
        let names: Vec<&str> = frame.iter_flat().iter().map(|op| op.name.as_str()).collect();
        assert_eq!(names, vec!["main_begin", "lighting", "opaque", "alpha", "Sample", "main_end"]);

        // 注册序号沿展平顺序严格递增（subpass 节点也占序号）
        let indices: Vec<u32> = frame.iter_flat().iter().map(|op| op.index).collect();
        assert!(indices.windows(2).all(|w| w[0] < w[1]));
    }

    /// rebuild 之后旧的编译引用失效
    #[test]
    fn test_stale_compiled_ref_rejected() {
        let mut res_mgr = GfxResourceManager::new();
        let ctx = FgLoadContext::new();
        let texture = make_texture(&mut res_mgr, "color", 64, 64);

        let mut script = FgScript::new("stale");
        script.add_texture("color", texture);
        script.push_op(begin_submission("main_begin", GfxQueueType::Graphics));
        script.push_op(end_submission("main_end", GfxQueueType::Graphics));
        script.build(&mut res_mgr, &ctx);

        let stale_ref = script.compiled().unwrap().op_ref(0);
        assert!(script.compiled().unwrap().resolve(stale_ref).is_some());

        script.build(&mut res_mgr, &ctx);
        assert!(script.compiled().unwrap().resolve(stale_ref).is_none());
        let fresh_ref = script.compiled().unwrap().op_ref(0);
        assert!(script.compiled().unwrap().resolve(fresh_ref).is_some());
    }

    #[test]
    #[should_panic(expected = "missing end_submission")]
    fn test_missing_end_submission_panics() {
        let mut res_mgr = GfxResourceManager::new();
        let ctx = FgLoadContext::new();

        let mut script = FgScript::new("broken");
        script.push_op(begin_submission("main_begin", GfxQueueType::Graphics));
        script.build(&mut res_mgr, &ctx);
    }

    #[test]
    #[should_panic(expected = "duplicate texture name")]
    fn test_duplicate_texture_name_panics() {
        let mut res_mgr = GfxResourceManager::new();
        let texture = make_texture(&mut res_mgr, "color", 64, 64);

        let mut script = FgScript::new("dup");
        script.add_texture("color", texture);
        script.add_texture("color", texture);
    }

    /// blit 的区域按执行时的纹理尺寸计算
    #[test]
    fn test_blit_records_current_extents() {
        let mut res_mgr = GfxResourceManager::new();
        let ctx = FgLoadContext::new();
        let src = make_texture(&mut res_mgr, "scene", 128, 128);
        let dst = make_texture(&mut res_mgr, "target", 64, 64);

        let mut script = FgScript::new("blit");
        script.add_texture("scene", src);
        script.add_texture("target", dst);
        script.push_op(begin_submission("main_begin", GfxQueueType::Graphics));
        let node = FgOpNode::new("downsample", GfxQueueType::Graphics)
            .with_texture_access(tex_access(src, "scene", FgImageState::TRANSFER_SRC, whole(1)))
            .with_texture_access(tex_access(dst, "target", FgImageState::TRANSFER_DST, whole(1)));
        script.push_op(FgOp::new(node, FgOpKind::Blit(FgBlitOp { src, dst })));
        script.push_op(end_submission("main_end", GfxQueueType::Graphics));
        script.build(&mut res_mgr, &ctx);

        let submissions = script.run(&res_mgr, 0, 0);
        let commands = submissions[0].cmd.commands();
        let blit = commands
            .iter()
            .find_map(|c| match c {
                GfxCommand::BlitImage { src_extent, dst_extent, .. } => Some((src_extent.width, dst_extent.width)),
                _ => None,
            })
            .unwrap();
        assert_eq!(blit, (128, 64));
    }

    /// 窗口 resize：相对尺寸纹理重算，脚本整体 rebuild，区域自动跟随
    #[test]
    fn test_window_resize_rebuilds_and_updates_extents() {
        let mut res_mgr = GfxResourceManager::new();
        let ctx = FgLoadContext::new();

        let info = GfxImageCreateInfo::new_2d(
            800,
            600,
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_SRC,
        )
        .with_relative_size(1.0, 1.0);
        let src = res_mgr.create_image(info, "scene");
        let dst = make_texture(&mut res_mgr, "target", 64, 64);

        let mut script = FgScript::new("resize");
        script.add_texture("scene", src);
        script.add_texture("target", dst);
        script.push_op(begin_submission("main_begin", GfxQueueType::Graphics));
        let node = FgOpNode::new("downsample", GfxQueueType::Graphics)
            .with_texture_access(tex_access(src, "scene", FgImageState::TRANSFER_SRC, whole(1)))
            .with_texture_access(tex_access(dst, "target", FgImageState::TRANSFER_DST, whole(1)));
        script.push_op(FgOp::new(node, FgOpKind::Blit(FgBlitOp { src, dst })));
        script.push_op(end_submission("main_end", GfxQueueType::Graphics));
        script.build(&mut res_mgr, &ctx);

        let generation_before = script.compiled().unwrap().generation;
        script.on_window_resized(&mut res_mgr, &ctx, 1024, 768);
        assert!(script.compiled().unwrap().generation > generation_before);

        let submissions = script.run(&res_mgr, 1, 0);
        let src_width = submissions[0]
            .cmd
            .commands()
            .iter()
            .find_map(|c| match c {
                GfxCommand::BlitImage { src_extent, .. } => Some(src_extent.width),
                _ => None,
            })
            .unwrap();
        assert_eq!(src_width, 1024);
    }

    /// 并行录制的命令流与串行路径完全一致
    #[test]
    fn test_parallel_run_matches_sequential() {
        let mut res_mgr = GfxResourceManager::new();
        let ctx = FgLoadContext::new();
        let texture = make_texture(&mut res_mgr, "color", 64, 64);

        let pass = FgOp::new(
            FgOpNode::new("lighting", GfxQueueType::Graphics).with_texture_access(tex_access(
                texture,
                "color",
                FgImageState::COLOR_ATTACHMENT_WRITE,
                whole(1),
            )),
            FgOpKind::Pass(FgPassOp {
                attachments: vec![FgAttachment {
                    name: "color".to_string(),
                    handle: texture,
                    load: FgLoadOp::Clear,
                    store: true,
                    clear_value: [0.0; 4],
                }],
                depth_stencil: None,
                subpasses: vec![
                    FgSubpass {
                        node: FgOpNode::new("geometry", GfxQueueType::Graphics),
                        attachment_refs: vec![0],
                        input_refs: vec![],
                        depends_on: vec![],
                        use_depth: false,
                        ops: vec![FgOp::new(
                            FgOpNode::new("opaque", GfxQueueType::Graphics),
                            FgOpKind::Batch(FgBatchOp { group: "Opaque".to_string(), sorted: false }),
                        )],
                    },
                    FgSubpass {
                        node: FgOpNode::new("translucent", GfxQueueType::Graphics),
                        attachment_refs: vec![0],
                        input_refs: vec![],
                        depends_on: vec![0],
                        use_depth: false,
                        ops: vec![FgOp::new(
                            FgOpNode::new("alpha", GfxQueueType::Graphics),
                            FgOpKind::Batch(FgBatchOp { group: "Alpha".to_string(), sorted: true }),
                        )],
                    },
                ],
            }),
        );

        let mut script = FgScript::new("parallel");
        script.add_texture("color", texture);
        script.push_op(begin_submission("main_begin", GfxQueueType::Graphics));
        script.push_op(pass);
        script.push_op(end_submission("main_end", GfxQueueType::Graphics));
        script.build(&mut res_mgr, &ctx);

        let sequential = script.run(&res_mgr, 0, 0);
        let parallel = script.run_parallel(&res_mgr, 0, 0);

        assert_eq!(sequential.len(), parallel.len());
        for (a, b) in sequential.iter().zip(&parallel) {
            assert_eq!(a.cmd.commands(), b.cmd.commands());
        }
    }

    /// 计算队列的 submission 用 queue-wait 解决跨队列依赖
    #[test]
    fn test_compute_submission_waits_on_graphics() {
        let mut res_mgr = GfxResourceManager::new();
        let ctx = FgLoadContext::new();
        let texture = make_texture(&mut res_mgr, "color", 64, 64);

        let mut script = FgScript::new("async_compute");
        script.add_texture("color", texture);
        script.push_op(begin_submission("gfx_begin", GfxQueueType::Graphics));
        script.push_op(clear_pass(texture));
        script.push_op(end_submission("gfx_end", GfxQueueType::Graphics));
        script.push_op(FgOp::new(
            FgOpNode::new("compute_begin", GfxQueueType::Compute),
            FgOpKind::Submission(FgSubmissionOp {
                phase: FgSubmissionPhase::Begin,
                wait_queue: Some(GfxQueueType::Graphics),
            }),
        ));
        let mut sample = sample_compute(texture);
        sample.node.queue = GfxQueueType::Compute;
        script.push_op(sample);
        script.push_op(end_submission("compute_end", GfxQueueType::Compute));
        // 帧仍然要以图形队列的 end-submission 收尾
        script.push_op(begin_submission("present_begin", GfxQueueType::Graphics));
        script.push_op(FgOp::new(
            FgOpNode::new("present", GfxQueueType::Graphics),
            FgOpKind::Swap(FgSwapOp { image: texture }),
        ));
        script.push_op(end_submission("present_end", GfxQueueType::Graphics));
        script.build(&mut res_mgr, &ctx);

        // 跨队列 hazard 不产生任何就地 barrier
        let frame = script.compiled().unwrap();
        let sample = frame.iter_flat().into_iter().find(|op| op.name == "Sample").unwrap();
        assert!(sample.pre_sync.barriers.is_empty());

        let submissions = script.run(&res_mgr, 0, 0);
        assert_eq!(submissions.len(), 3);
        assert_eq!(submissions[1].queue, GfxQueueType::Compute);
        assert_eq!(submissions[1].wait_queue, Some(GfxQueueType::Graphics));
        // 帧结束信号只在最后一个图形 end-submission 上
        assert!(!submissions[0].signal_frame_done);
        assert!(submissions[2].signal_frame_done);
    }

    /// 别名纹理：写其中一张，读另一张也要同步
    #[test]
    fn test_alias_texture_hazard() {
        let mut res_mgr = GfxResourceManager::new();
        let ctx = FgLoadContext::new();
        let texture = make_texture(&mut res_mgr, "color", 64, 64);
        let alias = make_texture(&mut res_mgr, "color_alias", 64, 64);

        let mut script = FgScript::new("alias");
        script.add_texture("color", texture);
        script.add_texture_alias("color_alias", alias, "color");
        script.push_op(begin_submission("main_begin", GfxQueueType::Graphics));
        script.push_op(clear_pass(texture));
        script.push_op(sample_compute(alias));
        script.push_op(end_submission("main_end", GfxQueueType::Graphics));
        script.build(&mut res_mgr, &ctx);

        let frame = script.compiled().unwrap();
        let sample = frame.iter_flat().into_iter().find(|op| op.name == "Sample").unwrap();
        // 通过别名的记录表找到了 Clear 的写入
        assert!(!sample.pre_sync.barriers.is_empty());
    }

    /// event 提升开启时，注册顺序相距超过阈值的 hazard 变成 event 等待/信号
    #[test]
    fn test_event_promotion_produces_wait_and_signal() {
        let mut res_mgr = GfxResourceManager::new();
        let ctx = FgLoadContext::new();
        let texture = make_texture(&mut res_mgr, "color", 64, 64);

        let mut script = FgScript::new("events").with_settings(FgCompileSettings {
            enable_event: true,
            event_gap_threshold: 2,
        });
        script.add_texture("color", texture);
        script.push_op(begin_submission("main_begin", GfxQueueType::Graphics));
        script.push_op(clear_pass(texture));
        // 填充注册顺序，拉开生产者与消费者的间距
        for i in 0..4 {
            script.push_op(FgOp::new(
                FgOpNode::new(format!("filler_{i}"), GfxQueueType::Graphics),
                FgOpKind::Barrier,
            ));
        }
        script.push_op(sample_compute(texture));
        script.push_op(end_submission("main_end", GfxQueueType::Graphics));
        script.build(&mut res_mgr, &ctx);

        let frame = script.compiled().unwrap();
        assert_eq!(frame.wait_event_count(), 1);
        assert_eq!(frame.events.len(), 1);

        let flat = frame.iter_flat();
        let clear = flat.iter().find(|op| op.name == "Clear").unwrap();
        let sample = flat.iter().find(|op| op.name == "Sample").unwrap();
        assert_eq!(clear.post_sync.signals.len(), 1);
        assert_eq!(sample.pre_sync.wait_events.len(), 1);
        assert_eq!(clear.post_sync.signals[0].event, sample.pre_sync.wait_events[0].event);

        // 执行顺序：生产者发信号，消费者等待并重置
        let submissions = script.run(&res_mgr, 0, 0);
        let commands = submissions[0].cmd.commands();
        let set_pos = commands.iter().position(|c| matches!(c, GfxCommand::SetEvent { .. })).unwrap();
        let wait_pos = commands.iter().position(|c| matches!(c, GfxCommand::WaitEvents { .. })).unwrap();
        let reset_pos = commands.iter().position(|c| matches!(c, GfxCommand::ResetEvent { .. })).unwrap();
        assert!(set_pos < wait_pos);
        assert!(wait_pos < reset_pos);

        // rebuild 归还旧 events，不泄漏
        script.build(&mut res_mgr, &ctx);
        assert_eq!(res_mgr.event_count(), 1);
    }

    /// 终态清理销毁脚本拥有的全部资源
    #[test]
    fn test_discard_destroys_owned_resources() {
        let mut res_mgr = GfxResourceManager::new();
        let ctx = FgLoadContext::new();
        let texture = make_texture(&mut res_mgr, "color", 64, 64);

        let mut script = FgScript::new("teardown");
        script.add_texture("color", texture);
        script.push_op(begin_submission("main_begin", GfxQueueType::Graphics));
        script.push_op(end_submission("main_end", GfxQueueType::Graphics));
        script.build(&mut res_mgr, &ctx);

        script.discard(&mut res_mgr);
        assert_eq!(res_mgr.image_count(), 0);
        assert_eq!(res_mgr.event_count(), 0);
    }
}
