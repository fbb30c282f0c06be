//! Nebula 的 GFX 层
//!
//! 为帧图系统提供资源句柄与命令录制抽象：
//!
//! - **GfxImage / GfxBuffer**: 图像和缓冲区的描述信息，通过 SlotMap 句柄访问
//! - **GfxImageSubresRange / GfxBufferRange**: 子资源范围，支持求交与差集拆分
//! - **GfxImageBarrier / GfxBufferBarrier**: barrier 描述
//! - **GfxCommandBuffer**: 命令录制，产出有序的命令流
//! - **GfxResourceManager**: 资源池，句柄的创建与销毁
//!
//! 本层不持有任何设备对象，命令流由上层（渲染后端或测试）消费。

pub mod basic;
pub mod commands;
pub mod handles;
pub mod queue;
pub mod resource_manager;
pub mod resources;

pub use commands::barrier::{GfxBufferBarrier, GfxImageBarrier};
pub use commands::command_buffer::{GfxCommand, GfxCommandBuffer};
pub use commands::submission::GfxSubmission;
pub use handles::{GfxBufferHandle, GfxEventHandle, GfxImageHandle};
pub use queue::GfxQueueType;
pub use resource_manager::GfxResourceManager;
pub use resources::buffer::{GfxBuffer, GfxBufferCreateInfo};
pub use resources::image::{GfxImage, GfxImageCreateInfo};
pub use resources::range::{GfxBufferRange, GfxImageSubresRange};
