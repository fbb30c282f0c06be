//! GFX 层的资源句柄定义
//!
//! 基于 SlotMap 的代际句柄，句柄失效后访问返回 None 而不是悬垂。

slotmap::new_key_type! {
    /// 图像资源句柄
    pub struct GfxImageHandle;

    /// 缓冲区资源句柄
    pub struct GfxBufferHandle;

    /// Event 同步原语句柄
    pub struct GfxEventHandle;
}
