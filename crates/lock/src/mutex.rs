//! 互斥锁抽象
//!
//! 调用方只依赖这里的两个 trait，后端在进程装配时选定。

use async_trait::async_trait;

use crate::context::Context;
use crate::error::Result;
use crate::options::MutexOption;

/// 单次临界区的互斥锁句柄
///
/// 一个句柄只对应一次加锁尝试，用完即弃；已持有时再次 `lock` 会立即返回
/// `LockHeld`，重复 `unlock` 返回 `LockNotHeld`。
#[async_trait]
pub trait Mutex: Send + Sync {
    /// 规范 key（`app:namespace:key`）
    fn key(&self) -> &str;

    /// 获取锁，最长阻塞到等待上限或重试次数耗尽
    async fn lock(&mut self, ctx: &Context) -> Result<()>;

    /// 释放锁
    async fn unlock(&mut self, ctx: &Context) -> Result<()>;
}

/// 互斥锁工厂
///
/// 进程内构造一次并注入各业务模块。
pub trait MutexManager: Send + Sync {
    /// 按管理器默认配置加上 `options` 创建新的锁句柄
    fn new_mutex(&self, key: &str, options: Vec<MutexOption>) -> Result<Box<dyn Mutex>>;
}
