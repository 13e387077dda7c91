//! Redlock 多节点仲裁
//!
//! 每次尝试并发地在所有节点上写入同一个令牌，写入成功的节点数达到多数
//! 且扣除耗时与时钟漂移后仍有剩余有效期，才认为获取成功；否则在所有节点上
//! 回滚后按重试间隔再试。

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::pool::{LockPool, NodeError};
use crate::config::{DelayFunc, GenValueFunc, scale};
use crate::context::Context;
use crate::error::{BoxError, ContextError};
use crate::token::generate_token;

/// 固定的时钟漂移补偿
const DRIFT_PADDING: Duration = Duration::from_millis(2);

/// 约 30 年
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// 仲裁过程中的错误
#[derive(Debug, Error)]
pub enum RedlockError {
    #[error("redlock: failed to acquire lock")]
    Failed,

    #[error("redlock: failed to extend lock")]
    ExtendFailed,

    #[error("redlock: lock already expired")]
    AlreadyExpired,

    #[error("redlock: lock already taken, locked nodes: {nodes:?}")]
    Taken { nodes: Vec<usize> },

    #[error("node #{node}: lock already taken")]
    NodeTaken { node: usize },

    #[error("node #{node}: {source}")]
    Node {
        node: usize,
        #[source]
        source: NodeError,
    },

    #[error("{}", join_errors(.0))]
    Multiple(Vec<RedlockError>),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("failed to generate lock value: {0}")]
    GenValue(#[source] BoxError),
}

fn join_errors(errors: &[RedlockError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl RedlockError {
    /// 是否包含节点故障（而不仅仅是争用）
    pub fn has_node_failure(&self) -> bool {
        match self {
            Self::Node { .. } => true,
            Self::Multiple(errors) => errors.iter().any(Self::has_node_failure),
            _ => false,
        }
    }

    /// 是否包含锁已被他人持有
    pub fn has_taken(&self) -> bool {
        match self {
            Self::Taken { .. } | Self::NodeTaken { .. } => true,
            Self::Multiple(errors) => errors.iter().any(Self::has_taken),
            _ => false,
        }
    }
}

/// 单个锁实例的参数
#[derive(Clone)]
pub struct RedlockOptions {
    pub expiry: Duration,
    pub tries: u32,
    pub delay_func: DelayFunc,
    pub drift_factor: f64,
    /// 大于零时单节点操作超时为 expiry * timeout_factor
    pub timeout_factor: f64,
    pub gen_value_func: Option<GenValueFunc>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum PoolOp {
    Acquire,
    Release,
    Extend,
}

/// 单次临界区的 Redlock 状态
pub struct RedlockMutex {
    name: String,
    options: RedlockOptions,
    quorum: usize,
    pools: Vec<Arc<dyn LockPool>>,

    /// 持有期间使用的令牌
    value: Option<String>,
    until: Option<Instant>,
}

impl RedlockMutex {
    pub fn new(
        name: impl Into<String>,
        options: RedlockOptions,
        pools: Vec<Arc<dyn LockPool>>,
    ) -> Self {
        let quorum = pools.len() / 2 + 1;
        Self {
            name: name.into(),
            options,
            quorum,
            pools,
            value: None,
            until: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// 本地估算的有效期截止时间
    pub fn valid_until(&self) -> Option<Instant> {
        self.until
    }

    pub fn is_held(&self) -> bool {
        self.value.is_some()
    }

    fn gen_value(&self) -> Result<String, RedlockError> {
        if let Some(value) = &self.options.value {
            return Ok(value.clone());
        }
        if let Some(gen_value) = &self.options.gen_value_func {
            return gen_value().map_err(RedlockError::GenValue);
        }
        generate_token().map_err(|err| RedlockError::GenValue(Box::new(err)))
    }

    fn node_timeout(&self) -> Option<Duration> {
        (self.options.timeout_factor > 0.0)
            .then(|| scale(self.options.expiry, self.options.timeout_factor))
    }

    /// 扣除耗时与漂移后的截止时间，已无剩余有效期时返回 None
    fn validity(&self, start: Instant, now: Instant) -> Option<Instant> {
        let drift =
            scale(self.options.expiry, self.options.drift_factor).saturating_add(DRIFT_PADDING);
        let remaining = self
            .options
            .expiry
            .checked_sub((now - start).saturating_add(drift))?;
        if remaining.is_zero() {
            return None;
        }
        // 超出可表示范围时截断到一个足够远的时间点
        Some(
            now.checked_add(remaining)
                .or_else(|| now.checked_add(FAR_FUTURE))
                .unwrap_or(now),
        )
    }

    /// 获取锁
    pub async fn lock(&mut self, ctx: &Context) -> Result<(), RedlockError> {
        let value = self.gen_value()?;

        for attempt in 0..self.options.tries {
            if attempt != 0 {
                let delay = (self.options.delay_func)(attempt);
                tokio::select! {
                    biased;

                    err = ctx.done() => return Err(err.into()),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let start = Instant::now();
            let (acquired, err) = self.act_on_pools(PoolOp::Acquire, &value).await;
            let now = Instant::now();

            if acquired >= self.quorum
                && let Some(until) = self.validity(start, now)
            {
                debug!(key = %self.name, attempt, acquired, "Redlock acquired");
                self.value = Some(value);
                self.until = Some(until);
                return Ok(());
            }

            // 未达成多数或有效期已耗尽，回滚已写入的节点
            let (_, rollback_err) = self.act_on_pools(PoolOp::Release, &value).await;
            if let Some(rollback_err) = rollback_err
                && rollback_err.has_node_failure()
            {
                warn!(
                    key = %self.name,
                    attempt,
                    error = %rollback_err,
                    "Redlock rollback incomplete, key may stay locked on some nodes until expiry"
                );
            }

            if attempt + 1 == self.options.tries
                && let Some(err) = err
            {
                warn!(
                    key = %self.name,
                    tries = self.options.tries,
                    error = %err,
                    "Redlock acquisition failed"
                );
                return Err(err);
            }
        }

        Err(RedlockError::Failed)
    }

    /// 释放锁，返回后句柄不再持有令牌（节点故障时保留以便重试）
    pub async fn unlock(&mut self) -> Result<(), RedlockError> {
        let Some(value) = self.value.clone() else {
            return Err(RedlockError::AlreadyExpired);
        };

        let (released, err) = self.act_on_pools(PoolOp::Release, &value).await;
        if released >= self.quorum {
            self.value = None;
            self.until = None;
            return Ok(());
        }

        match err {
            Some(err) if err.has_node_failure() => Err(err),
            _ => {
                // 多数节点上的令牌已不存在：锁已过期，可能已被他人获取
                self.value = None;
                self.until = None;
                Err(RedlockError::AlreadyExpired)
            }
        }
    }

    /// 重新设置有效期
    pub async fn extend(&mut self) -> Result<(), RedlockError> {
        let value = self.value.clone().ok_or(RedlockError::AlreadyExpired)?;

        let start = Instant::now();
        let (extended, err) = self.act_on_pools(PoolOp::Extend, &value).await;
        if extended < self.quorum {
            return Err(match err {
                Some(err) if err.has_node_failure() => err,
                _ => RedlockError::ExtendFailed,
            });
        }

        let now = Instant::now();
        let until = self.validity(start, now).ok_or(RedlockError::ExtendFailed)?;
        self.until = Some(until);
        Ok(())
    }

    /// 在所有节点上并发执行同一操作，返回成功节点数和汇总错误
    async fn act_on_pools(&self, op: PoolOp, value: &str) -> (usize, Option<RedlockError>) {
        let timeout = self.node_timeout();
        let name = self.name.as_str();
        let expiry = self.options.expiry;

        let calls = self.pools.iter().enumerate().map(|(node, pool)| async move {
            let call = async {
                match op {
                    PoolOp::Acquire => pool.acquire(name, value, expiry).await,
                    PoolOp::Release => pool.release(name, value).await,
                    PoolOp::Extend => pool.extend(name, value, expiry).await,
                }
            };
            let result = match timeout {
                Some(limit) => tokio::time::timeout(limit, call)
                    .await
                    .unwrap_or(Err(NodeError::Timeout(limit))),
                None => call.await,
            };
            (node, result)
        });

        let mut succeeded = 0;
        let mut taken = Vec::new();
        let mut errors = Vec::new();
        for (node, result) in join_all(calls).await {
            match result {
                Ok(true) => succeeded += 1,
                Ok(false) => {
                    taken.push(node);
                    errors.push(RedlockError::NodeTaken { node });
                }
                Err(source) => {
                    debug!(
                        key = %name,
                        node,
                        ?op,
                        error = %source,
                        "Redlock node operation failed"
                    );
                    errors.push(RedlockError::Node { node, source });
                }
            }
        }

        let err = if taken.len() >= self.quorum {
            Some(RedlockError::Taken { nodes: taken })
        } else if errors.is_empty() {
            None
        } else {
            Some(RedlockError::Multiple(errors))
        };
        (succeeded, err)
    }
}
