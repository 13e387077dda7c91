//! Redis 互斥锁
//!
//! 在 Redlock 仲裁之上实现 `Mutex` 接口，并把仲裁错误翻译成统一的
//! `ErrorKind`。同一组节点由进程内所有锁句柄共享。

pub mod pool;
pub mod redlock;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

pub use self::pool::{LockPool, NodeError, RedisPool, RedisStore};
pub use self::redlock::{RedlockError, RedlockMutex, RedlockOptions};

#[cfg(test)]
pub(crate) use self::pool::MockLockPool;

use crate::config::{Config, Provider};
use crate::context::Context;
use crate::error::{Error, ErrorKind, Result};
use crate::key::format_key;
use crate::mutex::{Mutex, MutexManager};
use crate::options::MutexOption;
use crate::telemetry;

/// 仲裁错误对应的统一错误类别
pub fn error_kind(err: &RedlockError) -> ErrorKind {
    match err {
        RedlockError::Failed => ErrorKind::CannotLock,
        RedlockError::ExtendFailed | RedlockError::Node { .. } => ErrorKind::ProviderError,
        RedlockError::Taken { .. } | RedlockError::NodeTaken { .. } => ErrorKind::LockHeld,
        RedlockError::AlreadyExpired => ErrorKind::LockNotHeld,
        RedlockError::Context(_) => ErrorKind::Context,
        RedlockError::GenValue(_) => ErrorKind::GenerateTokenFailed,
        RedlockError::Multiple(_) => {
            if err.has_node_failure() {
                ErrorKind::ProviderError
            } else if err.has_taken() {
                ErrorKind::LockHeld
            } else {
                ErrorKind::CannotLock
            }
        }
    }
}

/// 翻译仲裁错误，保留原始错误作为原因
pub(crate) fn translate_error(key: &str, err: RedlockError) -> Error {
    match err {
        // 上下文错误直接挂在外层，`Error::context_error` 才能取到
        RedlockError::Context(ctx_err) => Error::context(key, ctx_err),
        other => Error::with_source(error_kind(&other), key, other),
    }
}

/// Redis 锁管理器
#[derive(Clone)]
pub struct RedisMutexManager {
    config: Config,
    store: RedisStore,
}

impl RedisMutexManager {
    pub fn new(config: Config, store: RedisStore) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &RedisStore {
        &self.store
    }

    /// 创建具体类型的句柄，可使用续期等 Redis 特有操作
    #[instrument(skip(self, options), fields(provider = "redis"))]
    pub fn new_redis_mutex(&self, key: &str, options: Vec<MutexOption>) -> Result<RedisMutex> {
        let config = self.config.apply(options);
        let full_key = format_key(&config.app, &config.namespace, key);

        let options = RedlockOptions {
            expiry: config.expiry,
            tries: config.tries,
            delay_func: config.effective_delay_func(),
            drift_factor: config.drift_factor,
            timeout_factor: config.timeout_factor,
            gen_value_func: config.gen_value_func.clone(),
            value: config.value.clone(),
        };

        Ok(RedisMutex {
            key: full_key.clone(),
            inner: RedlockMutex::new(full_key, options, self.store.pools().to_vec()),
        })
    }
}

impl MutexManager for RedisMutexManager {
    fn new_mutex(&self, key: &str, options: Vec<MutexOption>) -> Result<Box<dyn Mutex>> {
        Ok(Box::new(self.new_redis_mutex(key, options)?))
    }
}

/// Redis 锁句柄
pub struct RedisMutex {
    key: String,
    inner: RedlockMutex,
}

impl RedisMutex {
    pub fn is_held(&self) -> bool {
        self.inner.is_held()
    }

    /// 持有期间使用的令牌
    pub fn token(&self) -> Option<&str> {
        self.inner.value()
    }

    pub fn valid_until(&self) -> Option<Instant> {
        self.inner.valid_until()
    }

    /// 把持有的锁续期一个完整的有效期
    pub async fn extend(&mut self) -> Result<()> {
        if !self.inner.is_held() {
            return Err(Error::lock_not_held(&self.key));
        }
        self.inner.extend().await.map_err(|err| {
            warn!(key = %self.key, error = %err, "Failed to extend redis lock");
            translate_error(&self.key, err)
        })
    }
}

#[async_trait]
impl Mutex for RedisMutex {
    fn key(&self) -> &str {
        &self.key
    }

    async fn lock(&mut self, ctx: &Context) -> Result<()> {
        let start = Instant::now();
        let result = if self.inner.is_held() {
            Err(Error::lock_held(&self.key))
        } else {
            match self.inner.lock(ctx).await {
                Ok(()) => {
                    debug!(key = %self.key, "Redis lock acquired");
                    Ok(())
                }
                Err(err) => Err(translate_error(&self.key, err)),
            }
        };
        telemetry::record_acquire(Provider::Redis, &result, start.elapsed());
        result
    }

    /// 解锁不受上下文取消影响，避免锁一直保留到过期
    async fn unlock(&mut self, _ctx: &Context) -> Result<()> {
        let result = if self.inner.is_held() {
            match self.inner.unlock().await {
                Ok(()) => {
                    debug!(key = %self.key, "Redis lock released");
                    Ok(())
                }
                Err(err) => Err(translate_error(&self.key, err)),
            }
        } else {
            Err(Error::lock_not_held(&self.key))
        };
        telemetry::record_release(Provider::Redis, &result);
        result
    }
}
