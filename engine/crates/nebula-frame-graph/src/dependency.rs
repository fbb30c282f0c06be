//! 资源依赖跟踪
//!
//! 每个物理资源维护一份按程序顺序追加的访问记录表。
//! 新的访问沿记录表**从后往前**扫描，找到最近的生产者后决定是否需要同步，
//! 部分重叠的子资源范围会被拆分后继续向更早的记录匹配。
//!
//! 这里只做决策，不产生任何 GPU 对象；输入是 (请求范围, 有序记录表)，
//! 输出是同步需求列表，记录表被就地追加。

use nebula_gfx::{GfxBufferRange, GfxImageSubresRange, GfxQueueType};

use crate::state::{FgBufferState, FgImageState};

/// 编译期策略开关
#[derive(Clone, Copy, Debug)]
pub struct FgCompileSettings {
    /// 生产者与消费者在注册顺序上相距较远时，是否把 barrier 提升为 event
    ///
    /// 关闭时所有同队列 hazard 都使用就地 barrier。
    pub enable_event: bool,
    /// event 提升的注册顺序间距阈值
    pub event_gap_threshold: u32,
}

impl Default for FgCompileSettings {
    fn default() -> Self {
        Self {
            enable_event: false,
            event_gap_threshold: 8,
        }
    }
}

/// 图像的一条访问记录
#[derive(Clone, Copy, Debug)]
pub struct FgImageDependency {
    /// 产生该访问的操作注册序号；None 表示脚本开始时的隐含初始记录
    pub op_index: Option<u32>,
    /// 访问所在队列
    pub queue: GfxQueueType,
    /// 访问状态（stage / access / layout）
    pub state: FgImageState,
    /// 访问的子资源范围
    pub range: GfxImageSubresRange,
}

/// 缓冲区的一条访问记录
#[derive(Clone, Copy, Debug)]
pub struct FgBufferDependency {
    /// 产生该访问的操作注册序号；None 表示隐含初始记录
    pub op_index: Option<u32>,
    /// 访问所在队列
    pub queue: GfxQueueType,
    /// 访问状态（stage / access）
    pub state: FgBufferState,
    /// 访问的字节范围
    pub range: GfxBufferRange,
}

/// 一次图像 hazard 的完整描述
#[derive(Clone, Copy, Debug)]
pub struct FgImageHazard {
    /// 生产者的注册序号；None 表示针对隐含初始记录
    pub producer: Option<u32>,
    /// 生产者所在队列
    pub producer_queue: GfxQueueType,
    /// 生产者留下的状态
    pub from: FgImageState,
    /// 消费者需要的状态
    pub to: FgImageState,
    /// 冲突的子资源范围（双方范围的交集）
    pub range: GfxImageSubresRange,
}

/// 一次缓冲区 hazard 的完整描述
#[derive(Clone, Copy, Debug)]
pub struct FgBufferHazard {
    pub producer: Option<u32>,
    pub producer_queue: GfxQueueType,
    pub from: FgBufferState,
    pub to: FgBufferState,
    pub range: GfxBufferRange,
}

/// 图像访问的同步需求
#[derive(Clone, Copy, Debug)]
pub enum FgImageSync {
    /// 就地 barrier
    Barrier(FgImageHazard),
    /// event 等待（仅在策略开启且间距超过阈值时）
    Event(FgImageHazard),
    /// 跨队列 hazard：不在 barrier 层解决，交给 submission 层的 queue-wait
    CrossQueue(FgImageHazard),
}

/// 缓冲区访问的同步需求
#[derive(Clone, Copy, Debug)]
pub enum FgBufferSync {
    Barrier(FgBufferHazard),
    Event(FgBufferHazard),
    CrossQueue(FgBufferHazard),
}

/// 根据策略决定 barrier 还是 event
fn promote_to_event(settings: &FgCompileSettings, producer: Option<u32>, consumer: u32) -> bool {
    match producer {
        Some(p) if settings.enable_event => consumer.saturating_sub(p) > settings.event_gap_threshold,
        _ => false,
    }
}

/// 分析一次图像访问
///
/// 把请求范围与 `records` 中已有的访问做 hazard 检查，返回需要的同步，
/// 并把本次访问按匹配到的子范围追加进记录表。
///
/// # 参数
/// - `name`: 资源的调试名称，仅用于日志
/// - `state`: 本次访问的状态
/// - `range`: 本次访问的子资源范围
/// - `op_index`: 消费者的注册序号
/// - `queue`: 消费者所在队列
/// - `records`: 该图像的有序访问记录表（就地追加）
pub fn analyze_image_access(
    name: &str,
    state: FgImageState,
    range: GfxImageSubresRange,
    op_index: u32,
    queue: GfxQueueType,
    records: &mut Vec<FgImageDependency>,
    settings: &FgCompileSettings,
) -> Vec<FgImageSync> {
    let mut syncs = Vec::new();
    let mut new_records = Vec::new();

    // 待检查的剩余子范围
    let mut worklist = vec![range];

    // 从最近的记录开始，最先命中的就是最近的生产者
    for record in records.iter().rev() {
        if worklist.is_empty() {
            break;
        }

        let mut next_work = Vec::new();
        for piece in worklist.drain(..) {
            let Some(overlap) = record.range.intersect(&piece) else {
                next_work.push(piece);
                continue;
            };

            // 未覆盖的部分继续向更早的记录匹配
            next_work.extend(piece.subtract(&overlap));

            // 后续消费者以本次访问为最近生产者
            new_records.push(FgImageDependency {
                op_index: Some(op_index),
                queue,
                state,
                range: overlap,
            });

            // 读后读且状态完全一致时无需同步
            let read_after_read = record.state.is_read_only()
                && state.is_read_only()
                && record.state.layout == state.layout
                && record.state.stage == state.stage
                && record.queue == queue;
            if read_after_read {
                continue;
            }

            let hazard = FgImageHazard {
                producer: record.op_index,
                producer_queue: record.queue,
                from: record.state,
                to: state,
                range: overlap,
            };

            if record.queue != queue {
                log::warn!(
                    "cross-queue hazard on image \"{}\" ({:?} -> {:?}), resolve it with a submission queue-wait",
                    name,
                    record.queue,
                    queue
                );
                syncs.push(FgImageSync::CrossQueue(hazard));
            } else if promote_to_event(settings, record.op_index, op_index) {
                syncs.push(FgImageSync::Event(hazard));
            } else {
                syncs.push(FgImageSync::Barrier(hazard));
            }
        }
        worklist = next_work;
    }

    // 完全没有命中任何记录的子范围：首次使用，只登记不同步
    for piece in worklist {
        new_records.push(FgImageDependency {
            op_index: Some(op_index),
            queue,
            state,
            range: piece,
        });
    }

    records.extend(new_records);
    syncs
}

/// 分析一次缓冲区访问
///
/// 与 [`analyze_image_access`] 相同的算法，范围换成 (offset, size)，
/// 没有 layout 参与判定。
pub fn analyze_buffer_access(
    name: &str,
    state: FgBufferState,
    range: GfxBufferRange,
    op_index: u32,
    queue: GfxQueueType,
    records: &mut Vec<FgBufferDependency>,
    settings: &FgCompileSettings,
) -> Vec<FgBufferSync> {
    let mut syncs = Vec::new();
    let mut new_records = Vec::new();

    let mut worklist = vec![range];

    for record in records.iter().rev() {
        if worklist.is_empty() {
            break;
        }

        let mut next_work = Vec::new();
        for piece in worklist.drain(..) {
            let Some(overlap) = record.range.intersect(&piece) else {
                next_work.push(piece);
                continue;
            };

            next_work.extend(piece.subtract(&overlap));

            new_records.push(FgBufferDependency {
                op_index: Some(op_index),
                queue,
                state,
                range: overlap,
            });

            let read_after_read = !record.state.is_write()
                && !state.is_write()
                && record.state.stage == state.stage
                && record.queue == queue;
            if read_after_read {
                continue;
            }

            let hazard = FgBufferHazard {
                producer: record.op_index,
                producer_queue: record.queue,
                from: record.state,
                to: state,
                range: overlap,
            };

            if record.queue != queue {
                log::warn!(
                    "cross-queue hazard on buffer \"{}\" ({:?} -> {:?}), resolve it with a submission queue-wait",
                    name,
                    record.queue,
                    queue
                );
                syncs.push(FgBufferSync::CrossQueue(hazard));
            } else if promote_to_event(settings, record.op_index, op_index) {
                syncs.push(FgBufferSync::Event(hazard));
            } else {
                syncs.push(FgBufferSync::Barrier(hazard));
            }
        }
        worklist = next_work;
    }

    for piece in worklist {
        new_records.push(FgBufferDependency {
            op_index: Some(op_index),
            queue,
            state,
            range: piece,
        });
    }

    records.extend(new_records);
    syncs
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    fn color_range(base_mip: u32, mip_count: u32) -> GfxImageSubresRange {
        GfxImageSubresRange::new(vk::ImageAspectFlags::COLOR, base_mip, mip_count, 0, 1)
    }

    fn whole_color() -> GfxImageSubresRange {
        GfxImageSubresRange::whole(vk::ImageAspectFlags::COLOR, 4, 1)
    }

    #[test]
    fn test_read_after_read_is_noop() {
        let settings = FgCompileSettings::default();
        let mut records = Vec::new();

        let s0 = analyze_image_access(
            "t",
            FgImageState::SHADER_READ_COMPUTE,
            whole_color(),
            0,
            GfxQueueType::Graphics,
            &mut records,
            &settings,
        );
        assert!(s0.is_empty());

        let s1 = analyze_image_access(
            "t",
            FgImageState::SHADER_READ_COMPUTE,
            whole_color(),
            1,
            GfxQueueType::Graphics,
            &mut records,
            &settings,
        );
        assert!(s1.is_empty());
    }

    #[test]
    fn test_write_then_read_emits_one_barrier() {
        let settings = FgCompileSettings::default();
        let mut records = Vec::new();

        analyze_image_access(
            "t",
            FgImageState::COLOR_ATTACHMENT_WRITE,
            whole_color(),
            0,
            GfxQueueType::Graphics,
            &mut records,
            &settings,
        );
        let syncs = analyze_image_access(
            "t",
            FgImageState::SHADER_READ_COMPUTE,
            whole_color(),
            1,
            GfxQueueType::Graphics,
            &mut records,
            &settings,
        );

        assert_eq!(syncs.len(), 1);
        let FgImageSync::Barrier(hazard) = &syncs[0] else {
            panic!("expected a barrier");
        };
        assert_eq!(hazard.producer, Some(0));
        assert_eq!(hazard.from.stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(hazard.from.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(hazard.to.stage, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert_eq!(hazard.to.layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_split_read_matches_two_producers() {
        // A 写 mips [0,2)，B 写 mips [2,4)，C 读 [0,4) 必须各命中一次
        let settings = FgCompileSettings::default();
        let mut records = Vec::new();

        analyze_image_access(
            "t",
            FgImageState::STORAGE_WRITE_COMPUTE,
            color_range(0, 2),
            0,
            GfxQueueType::Graphics,
            &mut records,
            &settings,
        );
        analyze_image_access(
            "t",
            FgImageState::STORAGE_WRITE_COMPUTE,
            color_range(2, 2),
            1,
            GfxQueueType::Graphics,
            &mut records,
            &settings,
        );
        let syncs = analyze_image_access(
            "t",
            FgImageState::SHADER_READ_COMPUTE,
            color_range(0, 4),
            2,
            GfxQueueType::Graphics,
            &mut records,
            &settings,
        );

        assert_eq!(syncs.len(), 2);
        let producers: Vec<_> = syncs
            .iter()
            .map(|s| match s {
                FgImageSync::Barrier(h) => h.producer,
                _ => panic!("expected barriers"),
            })
            .collect();
        // 从后往前扫描，最近的生产者先命中
        assert_eq!(producers, vec![Some(1), Some(0)]);
    }

    #[test]
    fn test_partial_overlap_leaves_records_for_both_halves() {
        let settings = FgCompileSettings::default();
        let mut records = Vec::new();

        // 写整个范围，再只读下半 mips
        analyze_image_access(
            "t",
            FgImageState::STORAGE_WRITE_COMPUTE,
            color_range(0, 4),
            0,
            GfxQueueType::Graphics,
            &mut records,
            &settings,
        );
        let syncs = analyze_image_access(
            "t",
            FgImageState::SHADER_READ_COMPUTE,
            color_range(0, 2),
            1,
            GfxQueueType::Graphics,
            &mut records,
            &settings,
        );

        assert_eq!(syncs.len(), 1);
        // 记录表：初始写 + 本次读的命中子范围
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].range, color_range(0, 2));
        assert_eq!(records[1].op_index, Some(1));
    }

    #[test]
    fn test_first_touch_inserts_record_without_sync() {
        let settings = FgCompileSettings::default();
        let mut records = Vec::new();

        let syncs = analyze_image_access(
            "t",
            FgImageState::STORAGE_WRITE_COMPUTE,
            color_range(1, 2),
            0,
            GfxQueueType::Graphics,
            &mut records,
            &settings,
        );

        assert!(syncs.is_empty());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].range, color_range(1, 2));
    }

    #[test]
    fn test_cross_queue_hazard_is_flagged_not_resolved() {
        let settings = FgCompileSettings::default();
        let mut records = Vec::new();

        analyze_image_access(
            "t",
            FgImageState::COLOR_ATTACHMENT_WRITE,
            whole_color(),
            0,
            GfxQueueType::Graphics,
            &mut records,
            &settings,
        );
        let syncs = analyze_image_access(
            "t",
            FgImageState::SHADER_READ_COMPUTE,
            whole_color(),
            1,
            GfxQueueType::Compute,
            &mut records,
            &settings,
        );

        assert_eq!(syncs.len(), 1);
        assert!(matches!(syncs[0], FgImageSync::CrossQueue(_)));
    }

    #[test]
    fn test_event_promotion_disabled_by_default() {
        let settings = FgCompileSettings::default();
        let mut records = Vec::new();

        analyze_image_access(
            "t",
            FgImageState::COLOR_ATTACHMENT_WRITE,
            whole_color(),
            0,
            GfxQueueType::Graphics,
            &mut records,
            &settings,
        );
        // 间距远超阈值，但策略关闭时仍然是 barrier
        let syncs = analyze_image_access(
            "t",
            FgImageState::SHADER_READ_COMPUTE,
            whole_color(),
            100,
            GfxQueueType::Graphics,
            &mut records,
            &settings,
        );

        assert!(matches!(syncs[0], FgImageSync::Barrier(_)));
    }

    #[test]
    fn test_event_promotion_when_enabled() {
        let settings = FgCompileSettings {
            enable_event: true,
            event_gap_threshold: 8,
        };
        let mut records = Vec::new();

        analyze_image_access(
            "t",
            FgImageState::COLOR_ATTACHMENT_WRITE,
            whole_color(),
            0,
            GfxQueueType::Graphics,
            &mut records,
            &settings,
        );
        let near = analyze_image_access(
            "t",
            FgImageState::SHADER_READ_COMPUTE,
            whole_color(),
            3,
            GfxQueueType::Graphics,
            &mut records,
            &settings,
        );
        assert!(matches!(near[0], FgImageSync::Barrier(_)));

        let mut records = Vec::new();
        analyze_image_access(
            "t",
            FgImageState::COLOR_ATTACHMENT_WRITE,
            whole_color(),
            0,
            GfxQueueType::Graphics,
            &mut records,
            &settings,
        );
        let far = analyze_image_access(
            "t",
            FgImageState::SHADER_READ_COMPUTE,
            whole_color(),
            100,
            GfxQueueType::Graphics,
            &mut records,
            &settings,
        );
        assert!(matches!(far[0], FgImageSync::Event(_)));
    }

    #[test]
    fn test_buffer_write_after_write() {
        let settings = FgCompileSettings::default();
        let mut records = Vec::new();

        analyze_buffer_access(
            "b",
            FgBufferState::STORAGE_WRITE_COMPUTE,
            GfxBufferRange::new(0, 256),
            0,
            GfxQueueType::Graphics,
            &mut records,
            &settings,
        );
        let syncs = analyze_buffer_access(
            "b",
            FgBufferState::STORAGE_WRITE_COMPUTE,
            GfxBufferRange::new(0, 256),
            1,
            GfxQueueType::Graphics,
            &mut records,
            &settings,
        );

        assert_eq!(syncs.len(), 1);
        assert!(matches!(syncs[0], FgBufferSync::Barrier(_)));
    }

    #[test]
    fn test_buffer_disjoint_ranges_no_sync() {
        let settings = FgCompileSettings::default();
        let mut records = Vec::new();

        analyze_buffer_access(
            "b",
            FgBufferState::STORAGE_WRITE_COMPUTE,
            GfxBufferRange::new(0, 128),
            0,
            GfxQueueType::Graphics,
            &mut records,
            &settings,
        );
        let syncs = analyze_buffer_access(
            "b",
            FgBufferState::STORAGE_READ_COMPUTE,
            GfxBufferRange::new(256, 128),
            1,
            GfxQueueType::Graphics,
            &mut records,
            &settings,
        );

        assert!(syncs.is_empty());
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_buffer_split_read_matches_two_producers() {
        let settings = FgCompileSettings::default();
        let mut records = Vec::new();

        analyze_buffer_access(
            "b",
            FgBufferState::TRANSFER_DST,
            GfxBufferRange::new(0, 512),
            0,
            GfxQueueType::Graphics,
            &mut records,
            &settings,
        );
        analyze_buffer_access(
            "b",
            FgBufferState::TRANSFER_DST,
            GfxBufferRange::new(512, 512),
            1,
            GfxQueueType::Graphics,
            &mut records,
            &settings,
        );
        let syncs = analyze_buffer_access(
            "b",
            FgBufferState::STORAGE_READ_COMPUTE,
            GfxBufferRange::new(0, 1024),
            2,
            GfxQueueType::Graphics,
            &mut records,
            &settings,
        );

        assert_eq!(syncs.len(), 2);
    }
}
