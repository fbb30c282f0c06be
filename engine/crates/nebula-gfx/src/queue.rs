//! 队列类型定义

/// GPU 队列类型
///
/// 帧图中的每个操作都在某个队列上执行；跨队列的同步
/// 由 submission 层的 queue-wait 处理，不在 barrier 层解决。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum GfxQueueType {
    /// 图形队列（默认）
    #[default]
    Graphics,
    /// 计算队列
    Compute,
    /// 传输队列
    Transfer,
}

impl GfxQueueType {
    /// 所有队列类型
    pub const ALL: [Self; 3] = [Self::Graphics, Self::Compute, Self::Transfer];

    /// 队列类型总数
    pub const COUNT: usize = Self::ALL.len();

    /// 队列在固定数组中的下标
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Self::Graphics => 0,
            Self::Compute => 1,
            Self::Transfer => 2,
        }
    }
}
