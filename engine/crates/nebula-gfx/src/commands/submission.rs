//! 提交单元
//!
//! 一次 submission 对应一段录制完成的命令流被整体送往某个队列。

use crate::commands::command_buffer::GfxCommandBuffer;
use crate::queue::GfxQueueType;

/// 一次队列提交
#[derive(Clone, Debug)]
pub struct GfxSubmission {
    /// 目标队列
    pub queue: GfxQueueType,
    /// 提交前等待的另一个队列（跨队列同步在此处解决）
    pub wait_queue: Option<GfxQueueType>,
    /// 录制完成的命令缓冲区
    pub cmd: GfxCommandBuffer,
    /// 是否在完成时发出帧结束信号
    pub signal_frame_done: bool,
}

impl GfxSubmission {
    pub fn new(cmd: GfxCommandBuffer, wait_queue: Option<GfxQueueType>, signal_frame_done: bool) -> Self {
        Self {
            queue: cmd.queue(),
            wait_queue,
            cmd,
            signal_frame_done,
        }
    }
}
