//! 脚本加载上下文
//!
//! 持有 plugin 回调注册表和各队列最近一次 submission 的登记。
//! 上下文由调用方显式创建并传给 loader 和 build，
//! 同一进程内加载多份脚本互不影响。

use std::collections::HashMap;

use nebula_gfx::GfxQueueType;

use crate::compiled::FgPluginCallback;

/// 脚本加载上下文
#[derive(Default)]
pub struct FgLoadContext {
    /// 名称 -> plugin 回调
    callbacks: HashMap<String, FgPluginCallback>,
    /// 各队列最近登记的 submission 名称
    last_submission: [Option<String>; GfxQueueType::COUNT],
}

// new & init
impl FgLoadContext {
    pub fn new() -> Self {
        Self::default()
    }
}

// 回调注册表
impl FgLoadContext {
    /// 注册一个 plugin 回调
    ///
    /// 同名重复注册时后者覆盖前者。
    pub fn register_callback(&mut self, name: impl Into<String>, callback: FgPluginCallback) {
        self.callbacks.insert(name.into(), callback);
    }

    /// 查找回调；未注册时返回 None，由调用方决定降级行为
    pub fn lookup_callback(&self, name: &str) -> Option<FgPluginCallback> {
        self.callbacks.get(name).cloned()
    }
}

// submission 登记
impl FgLoadContext {
    /// 登记某队列最近一次 submission
    pub fn note_submission(&mut self, queue: GfxQueueType, name: impl Into<String>) {
        self.last_submission[queue.index()] = Some(name.into());
    }

    /// 查询某队列最近登记的 submission 名称
    pub fn last_submission(&self, queue: GfxQueueType) -> Option<&str> {
        self.last_submission[queue.index()].as_deref()
    }
}
