//! 分布式互斥锁
//!
//! 为各业务模块提供按 key 互斥的临界区：合并请求串行化、全局任务调度、
//! 数据迁移步骤等。调用方只依赖 `MutexManager` / `Mutex` 两个 trait，
//! 后端在进程装配时由配置选定。
//!
//! ## 后端
//!
//! - **内存**：单进程锁表，带过期回收和令牌校验，适用于开发和单节点部署
//! - **Redis**：Redlock 多节点仲裁，适用于多实例部署
//!
//! ## 模块结构
//!
//! - `error`: 统一错误类别
//! - `key`: 规范 key 的拼接与拆分，以及业务方使用的 key 约定
//! - `config` / `options`: 管理器默认配置和单次加锁的覆盖选项
//! - `context`: 取消信号与截止时间
//! - `memory`: 内存后端
//! - `redis`: Redis 后端（节点操作、Redlock 仲裁、错误翻译）
//! - `manager`: 按配置装配管理器，以及作用域加锁
//!
//! ## 使用示例
//!
//! ```ignore
//! let manager = provide_mutex_manager(config, store).ok_or(StartupError::NoLockManager)?;
//!
//! with_lock(manager.as_ref(), &ctx, &keys::pull_request(repo_id, number), vec![], || async {
//!     merge(repo_id, number).await
//! })
//! .await?;
//! ```

pub mod backoff;
pub mod config;
pub mod context;
pub mod error;
pub mod key;
pub mod manager;
pub mod memory;
pub mod mutex;
pub mod options;
pub mod redis;
mod telemetry;
pub mod token;

pub use config::{Config, ConfigError, DelayFunc, GenValueFunc, Provider};
pub use context::{CancelHandle, Context};
pub use error::{BoxError, ContextError, Error, ErrorKind, Result};
pub use key::{format_key, keys, split_key};
pub use manager::{provide_mutex_manager, with_lock};
pub use memory::{InMemoryMutex, InMemoryMutexManager};
pub use mutex::{Mutex, MutexManager};
pub use options::*;
pub use redis::{RedisMutex, RedisMutexManager, RedisPool, RedisStore};
pub use telemetry::describe_metrics;
