//! Build 编译管线
//!
//! 一次 build 按注册顺序走完整棵操作树：
//! 为每个节点生成编译对应物，并对节点声明的每个资源访问调用依赖跟踪，
//! 把得到的同步需求物化为 barrier 组和 event 等待/信号。
//!
//! Hazard 分析只发生在 build；执行阶段零分析，只回放这里的产物。

use std::collections::HashMap;

use ash::vk;
use indexmap::IndexMap;
use nebula_gfx::{
    GfxBufferBarrier, GfxBufferHandle, GfxImageBarrier, GfxImageHandle, GfxResourceManager, GfxQueueType,
};
use slotmap::SecondaryMap;

use crate::compiled::{
    FgBarrierBatch, FgCompiledFrame, FgCompiledKind, FgCompiledOp, FgCompiledSubpass, FgPreSync, FgPostSync,
    FgSignalEvent, FgWaitEvent,
};
use crate::context::FgLoadContext;
use crate::dependency::{
    self, FgBufferDependency, FgBufferSync, FgCompileSettings, FgImageDependency, FgImageSync,
};
use crate::op::{FgOp, FgOpKind, FgOpNode, FgSubmissionPhase};
use crate::state::{FgBufferState, FgImageState};

/// build 过程中的全部可变状态
///
/// 生命周期只覆盖一次 build，结束后只有编译产物离开这里。
struct BuildState<'a> {
    script_name: &'a str,
    settings: &'a FgCompileSettings,
    ctx: &'a FgLoadContext,
    res_mgr: &'a mut GfxResourceManager,
    /// 别名纹理对：访问其中一张时，另一张的记录表也要检查
    alias_pairs: &'a HashMap<GfxImageHandle, GfxImageHandle>,

    /// 每张图像的访问记录表
    image_records: SecondaryMap<GfxImageHandle, Vec<FgImageDependency>>,
    /// 每个缓冲区的访问记录表（首次引用时建立）
    buffer_records: SecondaryMap<GfxBufferHandle, Vec<FgBufferDependency>>,

    /// 待挂到生产者 post-sync 上的 event 信号（按注册序号定位）
    deferred_signals: Vec<(u32, FgSignalEvent)>,
    /// 本次 build 创建的 events
    events: Vec<nebula_gfx::GfxEventHandle>,
    /// 产生过写访问的操作数，用于预估信号表容量
    write_op_count: u32,
}

/// 编译整个脚本
///
/// # Panics
/// 图形队列上没有 end-submission 时 panic（脚本的结构性前置条件）。
pub(crate) fn compile_script(
    script_name: &str,
    ops: &[FgOp],
    textures: &IndexMap<String, GfxImageHandle>,
    alias_pairs: &HashMap<GfxImageHandle, GfxImageHandle>,
    settings: &FgCompileSettings,
    generation: u64,
    res_mgr: &mut GfxResourceManager,
    ctx: &FgLoadContext,
) -> FgCompiledFrame {
    let _span = tracy_client::span!("frame_graph::compile_script");

    let mut state = BuildState {
        script_name,
        settings,
        ctx,
        res_mgr,
        alias_pairs,
        image_records: SecondaryMap::new(),
        buffer_records: SecondaryMap::new(),
        deferred_signals: Vec::new(),
        events: Vec::new(),
        write_op_count: 0,
    };

    // 每张命名纹理一条隐含初始记录：脚本开始时它处于默认 layout、
    // 全部图形与计算 stage 可读、整个子资源范围、不属于任何操作
    for (name, &handle) in textures {
        let image = state
            .res_mgr
            .get_image(handle)
            .unwrap_or_else(|| panic!("frame script \"{script_name}\": texture \"{name}\" handle is dead"));
        state.image_records.insert(
            handle,
            vec![FgImageDependency {
                op_index: None,
                queue: GfxQueueType::Graphics,
                state: FgImageState::initial(image.default_layout()),
                range: image.full_subres_range(),
            }],
        );
    }

    // 按注册顺序编译；Pass 在返回前递归处理自己的 subpass 子操作
    let mut compiled: Vec<FgCompiledOp> = ops.iter().map(|op| compile_op(&mut state, op)).collect();

    // 脚本必须以图形队列上的 end-submission 收尾
    let frame_end_slot = compiled
        .iter()
        .rposition(|op| {
            matches!(
                op.kind,
                FgCompiledKind::Submission { phase: FgSubmissionPhase::End, .. }
            ) && op.queue == GfxQueueType::Graphics
        })
        .unwrap_or_else(|| {
            panic!("frame script \"{script_name}\": missing end_submission on the graphics queue")
        });
    if let FgCompiledKind::Submission { end_of_frame, .. } = &mut compiled[frame_end_slot].kind {
        *end_of_frame = true;
    }

    // 帧尾重置：最终 layout 与默认不符的纹理各生成一个转换 barrier，
    // 下一次 build 的初始记录因此总能假定默认 layout
    let mut reset_barriers = Vec::new();
    for (name, &handle) in textures {
        let Some(records) = state.image_records.get(handle) else { continue };
        let Some(last) = records.last() else { continue };

        let image = state
            .res_mgr
            .get_image(handle)
            .unwrap_or_else(|| panic!("frame script \"{script_name}\": texture \"{name}\" handle is dead"));
        let default_layout = image.default_layout();
        if last.state.layout == default_layout {
            continue;
        }

        let to_state = FgImageState::initial(default_layout);
        reset_barriers.push(
            GfxImageBarrier::new(handle, image.full_subres_range())
                .layout_transfer(last.state.layout, default_layout)
                .src_mask(last.state.stage, last.state.src_access())
                .dst_mask(to_state.stage, to_state.access),
        );
    }

    // 把 event 信号挂到生产者的 post-sync 上
    if !state.deferred_signals.is_empty() {
        let mut index_to_slot = HashMap::new();
        for (slot, op) in compiled.iter().enumerate() {
            index_to_slot.insert(op.index, slot);
            if let FgCompiledKind::Pass { subpasses, .. } = &op.kind {
                for subpass in subpasses {
                    index_to_slot.insert(subpass.index, slot);
                    for child in &subpass.ops {
                        // 子操作的信号发在所属 pass 结束之后
                        index_to_slot.insert(child.index, slot);
                    }
                }
            }
        }
        for (producer, signal) in std::mem::take(&mut state.deferred_signals) {
            let slot = index_to_slot
                .get(&producer)
                .copied()
                .unwrap_or_else(|| panic!("frame script \"{script_name}\": dangling producer index {producer}"));
            compiled[slot].post_sync.signals.push(signal);
        }
    }

    log::debug!(
        "frame script \"{}\" built: {} ops, {} write ops, {} events",
        script_name,
        compiled.len(),
        state.write_op_count,
        state.events.len()
    );

    FgCompiledFrame {
        generation,
        ops: compiled,
        reset_barriers,
        events: state.events,
    }
}

/// 编译单个操作节点
fn compile_op(state: &mut BuildState<'_>, op: &FgOp) -> FgCompiledOp {
    let (mut pre_sync, has_write) = setup_synchronization(state, &op.node);
    if has_write {
        state.write_op_count += 1;
    }

    let kind = match &op.kind {
        FgOpKind::Blit(blit) => FgCompiledKind::Blit { src: blit.src, dst: blit.dst },
        FgOpKind::Copy(copy) => FgCompiledKind::Copy { src: copy.src, dst: copy.dst },
        FgOpKind::Mipmap(mipmap) => FgCompiledKind::Mipmap { image: mipmap.image },
        FgOpKind::Compute(compute) => FgCompiledKind::Compute {
            program: compute.program.clone(),
            group_count: compute.group_count,
        },
        FgOpKind::Barrier => FgCompiledKind::Barrier,
        FgOpKind::Plugin(plugin) => {
            let callback = state.ctx.lookup_callback(&plugin.callback);
            if callback.is_none() {
                log::warn!(
                    "frame plugin \"{}\" is not registered, op \"{}\" will no-op",
                    plugin.callback,
                    op.node.name
                );
            }
            FgCompiledKind::Plugin { callback }
        }
        FgOpKind::Pass(pass) => {
            let color_attachments = pass.attachments.iter().map(|a| a.handle).collect();
            let depth_stencil = pass.depth_stencil.as_ref().map(|a| a.handle);

            let subpasses = pass
                .subpasses
                .iter()
                .map(|subpass| {
                    let ops = subpass
                        .ops
                        .iter()
                        .map(|child| {
                            let mut compiled_child = compile_op(state, child);
                            // render pass 内部不允许 barrier：子操作的同步
                            // 提升到 pass 自身的 pre-sync，在 pass 开始前执行
                            let child_sync = std::mem::take(&mut compiled_child.pre_sync);
                            pre_sync.wait_events.extend(child_sync.wait_events);
                            pre_sync.barriers.extend(child_sync.barriers);
                            compiled_child
                        })
                        .collect();
                    FgCompiledSubpass {
                        name: subpass.node.name.clone(),
                        index: subpass.node.index,
                        attachment_refs: subpass.attachment_refs.clone(),
                        use_depth: subpass.use_depth,
                        ops,
                    }
                })
                .collect();

            FgCompiledKind::Pass {
                color_attachments,
                depth_stencil,
                subpasses,
            }
        }
        FgOpKind::Submission(submission) => FgCompiledKind::Submission {
            phase: submission.phase,
            wait_queue: submission.wait_queue,
            end_of_frame: false,
        },
        FgOpKind::Swap(swap) => FgCompiledKind::Swap { image: swap.image },
        FgOpKind::GlobalState(_) => FgCompiledKind::GlobalState,
        FgOpKind::Batch(batch) => FgCompiledKind::Batch {
            group: batch.group.clone(),
            sorted: batch.sorted,
        },
        FgOpKind::FullscreenEffect(effect) => FgCompiledKind::FullscreenEffect {
            program: effect.program.clone(),
        },
    };

    FgCompiledOp {
        name: op.node.name.clone(),
        index: op.node.index,
        queue: op.node.queue,
        pre_sync,
        post_sync: FgPostSync::default(),
        kind,
    }
}

/// 处理一个节点声明的全部资源依赖
///
/// 每个访问调用一次依赖跟踪（别名纹理再多一次），
/// 需要 barrier 的按 (生产者, 生产者 stage) 合并进同一组；
/// 需要 event 的按同样的键共用一个 event，并把信号延迟挂到生产者上。
///
/// 返回 (pre-sync 表, 节点是否产生写访问)。
fn setup_synchronization(state: &mut BuildState<'_>, node: &FgOpNode) -> (FgPreSync, bool) {
    let mut batches: IndexMap<(Option<u32>, vk::PipelineStageFlags2), FgBarrierBatch> = IndexMap::new();
    let mut waits: IndexMap<(u32, vk::PipelineStageFlags2), FgWaitEvent> = IndexMap::new();
    let mut has_write = false;

    for access in &node.texture_accesses {
        let to_state = FgImageState::new(access.stage, access.access, access.layout);
        if to_state.is_write() {
            has_write = true;
        }

        // 别名纹理共享内存，hazard 对双方的记录表各查一次
        let tracked = std::iter::once(access.handle).chain(state.alias_pairs.get(&access.handle).copied());
        for record_key in tracked {
            let records = state
                .image_records
                .entry(record_key)
                .expect("image handle is dead")
                .or_insert_with(Vec::new);
            let syncs = dependency::analyze_image_access(
                &access.name,
                to_state,
                access.range,
                node.index,
                node.queue,
                records,
                state.settings,
            );

            for sync in syncs {
                match sync {
                    FgImageSync::Barrier(hazard) => {
                        let barrier = GfxImageBarrier::new(access.handle, hazard.range)
                            .layout_transfer(hazard.from.layout, hazard.to.layout)
                            .src_mask(hazard.from.stage, hazard.from.src_access())
                            .dst_mask(hazard.to.stage, hazard.to.access);
                        let batch = batches
                            .entry((hazard.producer, hazard.from.stage))
                            .or_insert_with(|| FgBarrierBatch {
                                producer: hazard.producer,
                                producer_stage: hazard.from.stage,
                                ..Default::default()
                            });
                        // 别名纹理会从两份记录表各发现一次同一个 hazard
                        if !batch.image_barriers.contains(&barrier) {
                            batch.image_barriers.push(barrier);
                        }
                    }
                    FgImageSync::Event(hazard) => {
                        // event 只在有真实生产者时出现，初始记录不会被提升
                        let producer = hazard.producer.expect("event promotion without a producer");
                        let wait = waits.entry((producer, hazard.from.stage)).or_insert_with(|| {
                            let event = state.res_mgr.create_event(format!(
                                "{}:{}:ev{}",
                                state.script_name, node.name, state.events.len()
                            ));
                            state.events.push(event);
                            state.deferred_signals.push((
                                producer,
                                FgSignalEvent { event, stage: hazard.from.stage },
                            ));
                            FgWaitEvent {
                                event,
                                src_stage: hazard.from.stage,
                                dst_stage: vk::PipelineStageFlags2::NONE,
                                image_barriers: Vec::new(),
                                buffer_barriers: Vec::new(),
                            }
                        });
                        wait.dst_stage |= hazard.to.stage;
                        wait.image_barriers.push(
                            GfxImageBarrier::new(access.handle, hazard.range)
                                .layout_transfer(hazard.from.layout, hazard.to.layout)
                                .src_mask(hazard.from.stage, hazard.from.src_access())
                                .dst_mask(hazard.to.stage, hazard.to.access),
                        );
                    }
                    // 跨队列 hazard 已在分析时告警，由 submission 层解决
                    FgImageSync::CrossQueue(_) => {}
                }
            }
        }
    }

    for access in &node.buffer_accesses {
        let to_state = FgBufferState::new(access.stage, access.access);
        if to_state.is_write() {
            has_write = true;
        }

        let records = state
            .buffer_records
            .entry(access.handle)
            .expect("buffer handle is dead")
            .or_insert_with(Vec::new);
        let syncs = dependency::analyze_buffer_access(
            &access.name,
            to_state,
            access.range,
            node.index,
            node.queue,
            records,
            state.settings,
        );

        for sync in syncs {
            match sync {
                FgBufferSync::Barrier(hazard) => {
                    let barrier = GfxBufferBarrier::new(access.handle, hazard.range)
                        .src_mask(hazard.from.stage, hazard.from.src_access())
                        .dst_mask(hazard.to.stage, hazard.to.access);
                    let batch = batches
                        .entry((hazard.producer, hazard.from.stage))
                        .or_insert_with(|| FgBarrierBatch {
                            producer: hazard.producer,
                            producer_stage: hazard.from.stage,
                            ..Default::default()
                        });
                    batch.buffer_barriers.push(barrier);
                }
                FgBufferSync::Event(hazard) => {
                    let producer = hazard.producer.expect("event promotion without a producer");
                    let wait = waits.entry((producer, hazard.from.stage)).or_insert_with(|| {
                        let event = state.res_mgr.create_event(format!(
                            "{}:{}:ev{}",
                            state.script_name, node.name, state.events.len()
                        ));
                        state.events.push(event);
                        state.deferred_signals.push((
                            producer,
                            FgSignalEvent { event, stage: hazard.from.stage },
                        ));
                        FgWaitEvent {
                            event,
                            src_stage: hazard.from.stage,
                            dst_stage: vk::PipelineStageFlags2::NONE,
                            image_barriers: Vec::new(),
                            buffer_barriers: Vec::new(),
                        }
                    });
                    wait.dst_stage |= hazard.to.stage;
                    wait.buffer_barriers.push(
                        GfxBufferBarrier::new(access.handle, hazard.range)
                            .src_mask(hazard.from.stage, hazard.from.src_access())
                            .dst_mask(hazard.to.stage, hazard.to.access),
                    );
                }
                FgBufferSync::CrossQueue(_) => {}
            }
        }
    }

    let pre_sync = FgPreSync {
        wait_events: waits.into_values().collect(),
        barriers: batches.into_values().collect(),
    };
    (pre_sync, has_write)
}
