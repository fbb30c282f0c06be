//! 逐帧执行
//!
//! 按编译顺序回放每个操作：先执行 pre-sync（等待 event、插入 barrier），
//! 再录制操作本身的命令，最后执行 post-sync（发出 event 信号）。
//! 执行阶段不做任何 hazard 分析。
//!
//! Submission 操作负责各队列命令缓冲区的开启与收尾；
//! 帧的最后一个 end-submission 在收尾前插入帧尾重置 barriers。

use nebula_gfx::basic::color::LabelColor;
use nebula_gfx::{GfxCommandBuffer, GfxQueueType, GfxResourceManager, GfxSubmission};
use rayon::prelude::*;

use crate::compiled::{FgCompiledFrame, FgCompiledKind, FgCompiledOp};

/// 一次执行的可变状态
struct RunState<'a> {
    res_mgr: &'a GfxResourceManager,
    frame_index: u64,
    buffer_index: u32,
    /// 是否并行录制 subpass 命令
    parallel: bool,

    /// 各队列当前开启的命令缓冲区
    current: [Option<GfxCommandBuffer>; GfxQueueType::COUNT],
    /// 各队列当前 submission 的 queue-wait
    wait_queues: [Option<GfxQueueType>; GfxQueueType::COUNT],
    /// 已收尾的提交
    submissions: Vec<GfxSubmission>,
}

/// 执行一帧
pub(crate) fn run_frame(
    frame: &FgCompiledFrame,
    res_mgr: &GfxResourceManager,
    frame_index: u64,
    buffer_index: u32,
    parallel: bool,
) -> Vec<GfxSubmission> {
    let _span = tracy_client::span!("frame_graph::run_frame");

    let mut state = RunState {
        res_mgr,
        frame_index,
        buffer_index,
        parallel,
        current: [None, None, None],
        wait_queues: [None, None, None],
        submissions: Vec::new(),
    };

    for op in &frame.ops {
        execute_op(&mut state, frame, op);
    }

    debug_assert!(
        state.current.iter().all(Option::is_none),
        "a submission was left open at end of frame"
    );
    state.submissions
}

/// 执行单个顶层操作
fn execute_op(state: &mut RunState<'_>, frame: &FgCompiledFrame, op: &FgCompiledOp) {
    // Submission 自己管理命令缓冲区的生命周期
    if let FgCompiledKind::Submission { phase, wait_queue, end_of_frame } = &op.kind {
        match phase {
            crate::op::FgSubmissionPhase::Begin => {
                let slot = op.queue.index();
                assert!(
                    state.current[slot].is_none(),
                    "submission \"{}\": queue {:?} already has an open submission",
                    op.name,
                    op.queue
                );
                state.current[slot] = Some(GfxCommandBuffer::new(op.queue, op.name.clone()));
                state.wait_queues[slot] = *wait_queue;
            }
            crate::op::FgSubmissionPhase::End => {
                let slot = op.queue.index();
                let mut cmd = state.current[slot]
                    .take()
                    .unwrap_or_else(|| panic!("submission \"{}\": queue {:?} has no open submission", op.name, op.queue));
                if *end_of_frame {
                    // 帧尾重置：把所有偏离默认 layout 的纹理转回去
                    cmd.image_memory_barrier(&frame.reset_barriers);
                }
                let wait_queue = state.wait_queues[slot].take();
                state.submissions.push(GfxSubmission::new(cmd, wait_queue, *end_of_frame));
            }
        }
        return;
    }

    let slot = op.queue.index();
    let (res_mgr, frame_index, buffer_index, parallel) =
        (state.res_mgr, state.frame_index, state.buffer_index, state.parallel);
    let cmd = state.current[slot]
        .as_mut()
        .unwrap_or_else(|| panic!("op \"{}\" runs outside of any submission on {:?}", op.name, op.queue));

    queue_pre_sync(cmd, op);

    if let FgCompiledKind::Pass { color_attachments, depth_stencil, subpasses } = &op.kind {
        cmd.begin_label(&op.name, LabelColor::COLOR_PASS);
        cmd.begin_render_pass(&op.name, color_attachments.clone(), *depth_stencil);

        if parallel && subpasses.len() > 1 {
            // 每个 subpass 的命令在工作线程上录进 secondary 缓冲区，
            // 主线程按 subpass 顺序回放，外部命令顺序与串行路径一致
            let secondaries: Vec<GfxCommandBuffer> = subpasses
                .par_iter()
                .map(|subpass| {
                    let mut secondary = GfxCommandBuffer::new(op.queue, format!("{}:{}", op.name, subpass.name));
                    for child in &subpass.ops {
                        record_leaf(&mut secondary, child, res_mgr, frame_index, buffer_index);
                    }
                    secondary
                })
                .collect();
            for (i, secondary) in secondaries.into_iter().enumerate() {
                if i > 0 {
                    cmd.next_subpass();
                }
                cmd.append(secondary);
            }
        } else {
            for (i, subpass) in subpasses.iter().enumerate() {
                if i > 0 {
                    cmd.next_subpass();
                }
                for child in &subpass.ops {
                    record_leaf(cmd, child, res_mgr, frame_index, buffer_index);
                }
            }
        }

        cmd.end_render_pass();
        cmd.end_label();
    } else {
        record_kind(cmd, op, res_mgr, frame_index, buffer_index);
    }

    queue_post_sync(cmd, op);
}

/// 录制 subpass 内的叶子操作（pre-sync 在 build 时已提升到所属 pass）
fn record_leaf(
    cmd: &mut GfxCommandBuffer,
    op: &FgCompiledOp,
    res_mgr: &GfxResourceManager,
    frame_index: u64,
    buffer_index: u32,
) {
    queue_pre_sync(cmd, op);
    record_kind(cmd, op, res_mgr, frame_index, buffer_index);
    queue_post_sync(cmd, op);
}

/// 执行前同步：等待并重置 events，插入 barrier 组
fn queue_pre_sync(cmd: &mut GfxCommandBuffer, op: &FgCompiledOp) {
    for wait in &op.pre_sync.wait_events {
        cmd.wait_events(&[wait.event], &wait.image_barriers, &wait.buffer_barriers);
        cmd.reset_event(wait.event, wait.src_stage);
    }
    for batch in &op.pre_sync.barriers {
        cmd.image_memory_barrier(&batch.image_barriers);
        cmd.buffer_memory_barrier(&batch.buffer_barriers);
    }
}

/// 执行后同步：发出 event 信号
fn queue_post_sync(cmd: &mut GfxCommandBuffer, op: &FgCompiledOp) {
    for signal in &op.post_sync.signals {
        cmd.set_event(signal.event, signal.stage);
    }
}

/// 录制操作本身的命令
///
/// blit/copy 的区域按当前纹理尺寸计算，resize 后无需重录参数。
fn record_kind(
    cmd: &mut GfxCommandBuffer,
    op: &FgCompiledOp,
    res_mgr: &GfxResourceManager,
    frame_index: u64,
    buffer_index: u32,
) {
    match &op.kind {
        FgCompiledKind::Blit { src, dst } => {
            let src_image = res_mgr.get_image(*src).expect("blit source image is dead");
            let dst_image = res_mgr.get_image(*dst).expect("blit target image is dead");
            cmd.blit_image(
                *src,
                *dst,
                src_image.extent(),
                dst_image.extent(),
                src_image.aspect(),
                dst_image.aspect(),
            );
        }
        FgCompiledKind::Copy { src, dst } => {
            let src_image = res_mgr.get_image(*src).expect("copy source image is dead");
            let dst_image = res_mgr.get_image(*dst).expect("copy target image is dead");
            cmd.copy_image(*src, *dst, src_image.extent(), src_image.aspect(), dst_image.aspect());
        }
        FgCompiledKind::Mipmap { image } => {
            let mip_levels = res_mgr.get_image(*image).expect("mipmap image is dead").info().mip_levels;
            cmd.generate_mipmaps(*image, mip_levels);
        }
        FgCompiledKind::Compute { program, group_count } => {
            cmd.dispatch(program.clone(), *group_count);
        }
        FgCompiledKind::Barrier => {
            // 同步已由声明的依赖完成，这里只留下脚本位置的标记
            cmd.insert_marker(&op.name);
        }
        FgCompiledKind::Plugin { callback } => {
            if let Some(callback) = callback {
                callback(cmd, frame_index, buffer_index);
            }
        }
        FgCompiledKind::Swap { image } => {
            cmd.present(*image);
        }
        FgCompiledKind::GlobalState => {
            cmd.update_global_constants(buffer_index);
        }
        FgCompiledKind::Batch { group, sorted } => {
            cmd.draw_batch(group.clone(), *sorted);
        }
        FgCompiledKind::FullscreenEffect { program } => {
            cmd.draw_fullscreen(program.clone());
        }
        FgCompiledKind::Pass { .. } | FgCompiledKind::Submission { .. } => {
            unreachable!("composite ops are handled by execute_op")
        }
    }
}
