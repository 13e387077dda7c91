//! 内存互斥锁
//!
//! 单进程实现：所有 key 的加锁/解锁都经过同一把 `parking_lot::Mutex`
//! 保护的表。适用于开发和单节点部署，多实例部署请使用 Redis 后端。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex as PlMutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::config::{Config, DelayFunc, Provider};
use crate::context::Context;
use crate::error::{Error, ErrorKind, Result};
use crate::key::format_key;
use crate::mutex::{Mutex, MutexManager};
use crate::options::MutexOption;
use crate::telemetry;
use crate::token::resolve_token;

/// 锁表条目
#[derive(Debug, Clone)]
struct Entry {
    token: String,
    /// 为 None 时永不过期
    valid_until: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.valid_until, Some(until) if until <= now)
    }
}

/// 锁表，同一个后端实例创建的所有句柄共享
#[derive(Debug, Default)]
struct LockTable {
    entries: PlMutex<HashMap<String, Entry>>,
}

impl LockTable {
    /// 不存在或已过期时写入新条目
    fn acquire(&self, key: &str, token: &str, expiry: Duration) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if let Some(existing) = entries.get(key) {
            if !existing.is_expired(now) {
                return false;
            }
            debug!(key = %key, "Reclaiming expired in-memory lock");
        }

        // 零有效期或超出可表示范围时永不过期
        let valid_until = if expiry.is_zero() {
            None
        } else {
            now.checked_add(expiry)
        };
        entries.insert(
            key.to_string(),
            Entry {
                token: token.to_string(),
                valid_until,
            },
        );
        true
    }

    /// 仅当令牌匹配时删除条目，不检查过期时间
    fn release(&self, key: &str, token: &str) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.token == token => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// 内存锁管理器
///
/// 锁表属于管理器实例：生产环境每个进程一个，测试中每个用例一个。
#[derive(Debug, Clone)]
pub struct InMemoryMutexManager {
    config: Config,
    table: Arc<LockTable>,
}

impl InMemoryMutexManager {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            table: Arc::new(LockTable::default()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 当前锁表中的条目数（含已过期但尚未被回收的条目）
    pub fn entry_count(&self) -> usize {
        self.table.len()
    }

    /// 创建具体类型的句柄
    #[instrument(skip(self, options), fields(provider = "inmemory"))]
    pub fn new_inmemory_mutex(
        &self,
        key: &str,
        options: Vec<MutexOption>,
    ) -> Result<InMemoryMutex> {
        let config = self.config.apply(options);
        let full_key = format_key(&config.app, &config.namespace, key);
        let token = resolve_token(&config, &full_key)?;

        Ok(InMemoryMutex {
            key: full_key,
            token,
            held: false,
            expiry: config.expiry,
            tries: config.tries,
            wait_time: config.wait_time(),
            delay_func: config.effective_delay_func(),
            table: self.table.clone(),
        })
    }
}

impl MutexManager for InMemoryMutexManager {
    fn new_mutex(&self, key: &str, options: Vec<MutexOption>) -> Result<Box<dyn Mutex>> {
        Ok(Box::new(self.new_inmemory_mutex(key, options)?))
    }
}

/// 内存锁句柄
pub struct InMemoryMutex {
    key: String,
    token: String,
    held: bool,
    expiry: Duration,
    tries: u32,
    wait_time: Duration,
    delay_func: DelayFunc,
    table: Arc<LockTable>,
}

impl std::fmt::Debug for InMemoryMutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryMutex")
            .field("key", &self.key)
            .field("held", &self.held)
            .field("expiry", &self.expiry)
            .field("tries", &self.tries)
            .field("wait_time", &self.wait_time)
            .finish_non_exhaustive()
    }
}

impl InMemoryMutex {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    fn try_acquire(&mut self) -> bool {
        if self.table.acquire(&self.key, &self.token, self.expiry) {
            self.held = true;
        }
        self.held
    }

    async fn acquire(&mut self, ctx: &Context) -> Result<()> {
        if self.held {
            return Err(Error::lock_held(&self.key));
        }

        if self.try_acquire() {
            debug!(key = %self.key, "In-memory lock acquired");
            return Ok(());
        }

        // 一个计时器约束整个等待过程，等待上限为零时立即到期；
        // 截止时间超出可表示范围时只受重试次数约束
        let deadline = Instant::now().checked_add(self.wait_time);
        let timeout = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(timeout);

        for attempt in 1..self.tries {
            let delay = (self.delay_func)(attempt);

            tokio::select! {
                biased;

                err = ctx.done() => {
                    warn!(
                        key = %self.key,
                        attempt,
                        error = %err,
                        "Lock wait interrupted by context"
                    );
                    return Err(Error::context(&self.key, err));
                }
                _ = &mut timeout => {
                    warn!(
                        key = %self.key,
                        attempt,
                        wait_ms = self.wait_time.as_millis() as u64,
                        "Timed out waiting for in-memory lock"
                    );
                    return Err(Error::new(ErrorKind::CannotLock, &self.key));
                }
                _ = tokio::time::sleep(delay) => {
                    if self.try_acquire() {
                        debug!(key = %self.key, attempt, "In-memory lock acquired after retry");
                        return Ok(());
                    }
                }
            }
        }

        warn!(key = %self.key, tries = self.tries, "Max retries exceeded for in-memory lock");
        Err(Error::new(ErrorKind::MaxRetriesExceeded, &self.key))
    }
}

#[async_trait]
impl Mutex for InMemoryMutex {
    fn key(&self) -> &str {
        &self.key
    }

    async fn lock(&mut self, ctx: &Context) -> Result<()> {
        let start = Instant::now();
        let result = self.acquire(ctx).await;
        telemetry::record_acquire(Provider::InMemory, &result, start.elapsed());
        result
    }

    async fn unlock(&mut self, _ctx: &Context) -> Result<()> {
        // 令牌不匹配说明锁已过期并被他人回收，不能误删新持有者的条目
        let result = if self.held && self.table.release(&self.key, &self.token) {
            self.held = false;
            debug!(key = %self.key, "In-memory lock released");
            Ok(())
        } else {
            Err(Error::lock_not_held(&self.key))
        };
        telemetry::record_release(Provider::InMemory, &result);
        result
    }
}
