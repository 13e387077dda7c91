//! 锁管理器装配与作用域加锁

use std::future::Future;
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::config::{Config, Provider};
use crate::context::Context;
use crate::error::Error;
use crate::memory::InMemoryMutexManager;
use crate::mutex::MutexManager;
use crate::options::MutexOption;
use crate::redis::{RedisMutexManager, RedisStore};

/// 按 `config.provider` 构造锁管理器
///
/// Redis 后端缺少节点时返回 `None`，调用方应当在启动阶段直接退出。
pub fn provide_mutex_manager(
    config: Config,
    store: Option<RedisStore>,
) -> Option<Arc<dyn MutexManager>> {
    match config.provider {
        Provider::InMemory => {
            info!(app = %config.app, namespace = %config.namespace, "Using in-memory lock manager");
            Some(Arc::new(InMemoryMutexManager::new(config)))
        }
        Provider::Redis => match store {
            Some(store) if !store.pools().is_empty() => {
                info!(
                    app = %config.app,
                    namespace = %config.namespace,
                    nodes = store.pools().len(),
                    quorum = store.quorum(),
                    "Using redis lock manager"
                );
                Some(Arc::new(RedisMutexManager::new(config, store)))
            }
            _ => {
                error!("Redis lock provider configured without any redis node");
                None
            }
        },
    }
}

/// 在锁保护下执行 `f`
///
/// 每次调用创建新的句柄；无论 `f` 成功与否都会解锁，解锁失败只记录日志，
/// 不会覆盖 `f` 的结果。
#[instrument(skip_all, fields(key = %key))]
pub async fn with_lock<T, E, F, Fut>(
    manager: &dyn MutexManager,
    ctx: &Context,
    key: &str,
    options: Vec<MutexOption>,
    f: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<Error>,
{
    let mut mutex = manager.new_mutex(key, options)?;
    mutex.lock(ctx).await?;

    let result = f().await;

    if let Err(err) = mutex.unlock(ctx).await {
        warn!(key = %mutex.key(), error = %err, "Failed to release lock");
    }
    result
}
