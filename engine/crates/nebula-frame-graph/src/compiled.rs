//! 编译结果
//!
//! 每个操作节点在 build 时生成一个编译对应物，只保留执行所需的数据：
//! 解析好的句柄、预计算的参数，以及两份同步表
//! （执行前等待的 events / 插入的 barriers，执行后发出的 event 信号）。
//!
//! 所有编译对应物都属于一个 [`FgCompiledFrame`]，帧的 generation 在每次
//! build 时递增；外部持有的 [`FgCompiledOpRef`] 带着 generation，
//! rebuild 之后解析为 None，用来动态捕获 use-after-rebuild。

use std::sync::Arc;

use ash::vk;
use itertools::Itertools;
use nebula_gfx::{GfxBufferBarrier, GfxCommandBuffer, GfxEventHandle, GfxImageBarrier, GfxImageHandle, GfxQueueType};

use crate::op::FgSubmissionPhase;

/// Plugin 回调：录制命令，参数为 (命令缓冲区, 帧序号, 缓冲序号)
pub type FgPluginCallback = Arc<dyn Fn(&mut GfxCommandBuffer, u64, u32) + Send + Sync>;

/// 执行前等待的一个 event
#[derive(Clone)]
pub struct FgWaitEvent {
    /// 等待的 event
    pub event: GfxEventHandle,
    /// 生产者发出信号的 stage
    pub src_stage: vk::PipelineStageFlags2,
    /// 消费者等待的 stage
    pub dst_stage: vk::PipelineStageFlags2,
    /// 等待时执行的图像转换
    pub image_barriers: Vec<GfxImageBarrier>,
    /// 等待时执行的缓冲区转换
    pub buffer_barriers: Vec<GfxBufferBarrier>,
}

/// 执行后发出的一个 event 信号
#[derive(Clone, Copy)]
pub struct FgSignalEvent {
    pub event: GfxEventHandle,
    /// 发信号的 stage（生产者的 stage）
    pub stage: vk::PipelineStageFlags2,
}

/// 一组合并的 barrier
///
/// 同一 (消费者, 生产者, 生产者 stage) 的多个资源转换合并为一组，
/// 避免相邻的重复 barrier 对象。
#[derive(Clone, Default)]
pub struct FgBarrierBatch {
    /// 生产者的注册序号；None 表示针对脚本开始时的隐含状态
    pub producer: Option<u32>,
    /// 生产者 stage
    pub producer_stage: vk::PipelineStageFlags2,
    /// 图像转换
    pub image_barriers: Vec<GfxImageBarrier>,
    /// 缓冲区转换
    pub buffer_barriers: Vec<GfxBufferBarrier>,
}

/// 执行前的同步表
#[derive(Clone, Default)]
pub struct FgPreSync {
    /// 等待并重置的 events
    pub wait_events: Vec<FgWaitEvent>,
    /// 插入的 barrier 组
    pub barriers: Vec<FgBarrierBatch>,
}

impl FgPreSync {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.wait_events.is_empty() && self.barriers.is_empty()
    }
}

/// 执行后的同步表
#[derive(Clone, Default)]
pub struct FgPostSync {
    /// 发出的 event 信号
    pub signals: Vec<FgSignalEvent>,
}

/// 编译后的 Subpass
pub struct FgCompiledSubpass {
    /// Subpass 名称
    pub name: String,
    /// 注册序号
    pub index: u32,
    /// 写入的附件下标
    pub attachment_refs: Vec<u32>,
    /// 是否使用深度附件
    pub use_depth: bool,
    /// Subpass 内的叶子操作
    pub ops: Vec<FgCompiledOp>,
}

/// 编译后的操作种类
pub enum FgCompiledKind {
    Blit {
        src: GfxImageHandle,
        dst: GfxImageHandle,
    },
    Copy {
        src: GfxImageHandle,
        dst: GfxImageHandle,
    },
    Mipmap {
        image: GfxImageHandle,
    },
    Compute {
        program: String,
        group_count: [u32; 3],
    },
    Barrier,
    Plugin {
        /// build 时从注册表解析；未注册时为 None，执行时跳过
        callback: Option<FgPluginCallback>,
    },
    Pass {
        color_attachments: Vec<GfxImageHandle>,
        depth_stencil: Option<GfxImageHandle>,
        subpasses: Vec<FgCompiledSubpass>,
    },
    Submission {
        phase: FgSubmissionPhase,
        wait_queue: Option<GfxQueueType>,
        /// 帧的最后一个 end-submission：负责插入帧尾重置 barriers 并发出帧结束信号
        end_of_frame: bool,
    },
    Swap {
        image: GfxImageHandle,
    },
    GlobalState,
    Batch {
        group: String,
        sorted: bool,
    },
    FullscreenEffect {
        program: String,
    },
}

/// 编译后的操作
pub struct FgCompiledOp {
    /// 操作名称
    pub name: String,
    /// 注册序号
    pub index: u32,
    /// 执行队列
    pub queue: GfxQueueType,
    /// 执行前同步
    pub pre_sync: FgPreSync,
    /// 执行后同步
    pub post_sync: FgPostSync,
    /// 种类数据
    pub kind: FgCompiledKind,
}

/// 指向某个编译操作的外部引用
///
/// 携带生成它的 build generation；帧被 rebuild 后解析失败。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FgCompiledOpRef {
    pub generation: u64,
    /// 展平（深度优先）后的位置
    pub flat_index: u32,
}

/// 一次 build 的全部产物
///
/// rebuild 时整体丢弃重建，任何编译对应物都不会跨 build 存活。
pub struct FgCompiledFrame {
    /// build 代数，每次 build 递增
    pub generation: u64,
    /// 顶层编译操作（Pass 内嵌其 subpass 的子操作）
    pub ops: Vec<FgCompiledOp>,
    /// 帧尾重置 barriers：把最终 layout 与默认不符的纹理转回默认
    pub reset_barriers: Vec<GfxImageBarrier>,
    /// 本次 build 创建并持有的 events，rebuild/销毁时归还
    pub events: Vec<GfxEventHandle>,
}

// 展平访问
impl FgCompiledFrame {
    /// 深度优先展平：Pass 之后紧跟其各 subpass 的子操作
    pub fn iter_flat(&self) -> Vec<&FgCompiledOp> {
        let mut flat = Vec::new();
        for op in &self.ops {
            flat.push(op);
            if let FgCompiledKind::Pass { subpasses, .. } = &op.kind {
                for subpass in subpasses {
                    for child in &subpass.ops {
                        flat.push(child);
                    }
                }
            }
        }
        flat
    }

    /// 展平后的操作数
    #[inline]
    pub fn flat_len(&self) -> usize {
        self.iter_flat().len()
    }

    /// 创建指向第 `flat_index` 个操作的外部引用
    pub fn op_ref(&self, flat_index: u32) -> FgCompiledOpRef {
        FgCompiledOpRef {
            generation: self.generation,
            flat_index,
        }
    }

    /// 解析外部引用；generation 不匹配（引用跨越了 rebuild）时返回 None
    pub fn resolve(&self, op_ref: FgCompiledOpRef) -> Option<&FgCompiledOp> {
        if op_ref.generation != self.generation {
            return None;
        }
        self.iter_flat().get(op_ref.flat_index as usize).copied()
    }

    /// 统计所有操作的 barrier 组数
    pub fn barrier_batch_count(&self) -> usize {
        self.iter_flat().iter().map(|op| op.pre_sync.barriers.len()).sum()
    }

    /// 统计所有操作等待的 event 数
    pub fn wait_event_count(&self) -> usize {
        self.iter_flat().iter().map(|op| op.pre_sync.wait_events.len()).sum()
    }
}

// 调试输出
impl FgCompiledFrame {
    /// 打印执行计划
    ///
    /// 输出每个操作的顺序、同步需求和帧尾重置 barriers。
    pub fn log_execution_plan(&self) {
        log::info!("==== frame execution plan (generation {}) ====", self.generation);
        log::info!("order: {}", self.iter_flat().iter().map(|op| op.name.as_str()).join(" -> "));

        for (order, op) in self.iter_flat().iter().enumerate() {
            log::info!("[{}] #{} \"{}\" on {:?}", order, op.index, op.name, op.queue);

            for batch in &op.pre_sync.barriers {
                log::info!(
                    "    barrier vs producer {:?} @ {}: {} image, {} buffer",
                    batch.producer,
                    Self::format_pipeline_stage(batch.producer_stage),
                    batch.image_barriers.len(),
                    batch.buffer_barriers.len()
                );
                for barrier in &batch.image_barriers {
                    log::info!(
                        "        image {:?} -> {:?}, access {} -> {}",
                        barrier.old_layout,
                        barrier.new_layout,
                        Self::format_access_flags(barrier.src_access),
                        Self::format_access_flags(barrier.dst_access)
                    );
                }
            }
            for wait in &op.pre_sync.wait_events {
                log::info!(
                    "    wait event {:?}: {} -> {}",
                    wait.event,
                    Self::format_pipeline_stage(wait.src_stage),
                    Self::format_pipeline_stage(wait.dst_stage)
                );
            }
            for signal in &op.post_sync.signals {
                log::info!("    signal event {:?} @ {}", signal.event, Self::format_pipeline_stage(signal.stage));
            }
        }

        log::info!("reset barriers at end of frame: {}", self.reset_barriers.len());
    }

    /// 格式化 PipelineStageFlags2 为可读字符串
    pub fn format_pipeline_stage(stage: vk::PipelineStageFlags2) -> String {
        let mut stages = Vec::new();

        if stage.contains(vk::PipelineStageFlags2::TOP_OF_PIPE) {
            stages.push("TOP_OF_PIPE");
        }
        if stage.contains(vk::PipelineStageFlags2::BOTTOM_OF_PIPE) {
            stages.push("BOTTOM_OF_PIPE");
        }
        if stage.contains(vk::PipelineStageFlags2::VERTEX_SHADER) {
            stages.push("VERTEX_SHADER");
        }
        if stage.contains(vk::PipelineStageFlags2::FRAGMENT_SHADER) {
            stages.push("FRAGMENT_SHADER");
        }
        if stage.contains(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT) {
            stages.push("COLOR_ATTACHMENT_OUTPUT");
        }
        if stage.contains(vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS) {
            stages.push("EARLY_FRAGMENT_TESTS");
        }
        if stage.contains(vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS) {
            stages.push("LATE_FRAGMENT_TESTS");
        }
        if stage.contains(vk::PipelineStageFlags2::COMPUTE_SHADER) {
            stages.push("COMPUTE_SHADER");
        }
        if stage.contains(vk::PipelineStageFlags2::TRANSFER) {
            stages.push("TRANSFER");
        }
        if stage.contains(vk::PipelineStageFlags2::ALL_GRAPHICS) {
            stages.push("ALL_GRAPHICS");
        }
        if stage.contains(vk::PipelineStageFlags2::ALL_COMMANDS) {
            stages.push("ALL_COMMANDS");
        }

        if stages.is_empty() { format!("{:?}", stage) } else { stages.join(" | ") }
    }

    /// 格式化 AccessFlags2 为可读字符串
    pub fn format_access_flags(access: vk::AccessFlags2) -> String {
        if access == vk::AccessFlags2::NONE {
            return "NONE".to_string();
        }

        let mut flags = Vec::new();

        if access.contains(vk::AccessFlags2::SHADER_SAMPLED_READ) {
            flags.push("SHADER_SAMPLED_READ");
        }
        if access.contains(vk::AccessFlags2::SHADER_STORAGE_READ) {
            flags.push("STORAGE_READ");
        }
        if access.contains(vk::AccessFlags2::SHADER_STORAGE_WRITE) {
            flags.push("STORAGE_WRITE");
        }
        if access.contains(vk::AccessFlags2::COLOR_ATTACHMENT_READ) {
            flags.push("COLOR_ATTACH_READ");
        }
        if access.contains(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE) {
            flags.push("COLOR_ATTACH_WRITE");
        }
        if access.contains(vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE) {
            flags.push("DEPTH_ATTACH_WRITE");
        }
        if access.contains(vk::AccessFlags2::TRANSFER_READ) {
            flags.push("TRANSFER_READ");
        }
        if access.contains(vk::AccessFlags2::TRANSFER_WRITE) {
            flags.push("TRANSFER_WRITE");
        }
        if access.contains(vk::AccessFlags2::UNIFORM_READ) {
            flags.push("UNIFORM_READ");
        }
        if access.contains(vk::AccessFlags2::MEMORY_READ) {
            flags.push("MEMORY_READ");
        }
        if access.contains(vk::AccessFlags2::MEMORY_WRITE) {
            flags.push("MEMORY_WRITE");
        }

        if flags.is_empty() { format!("{:?}", access) } else { flags.join(" | ") }
    }
}
