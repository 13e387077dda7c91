//! Redis 节点操作
//!
//! 每个 `LockPool` 对应一个独立的 Redis 节点，只提供 Redlock 需要的三个原子操作。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use forge_shared::config::RedisConfig;
use redis::aio::MultiplexedConnection;
use redis::{Client, Script};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// 比较令牌后删除，避免误删其他客户端的锁
const RELEASE_SCRIPT: &str = r#"
    if redis.call("get", KEYS[1]) == ARGV[1] then
        return redis.call("del", KEYS[1])
    else
        return 0
    end
"#;

/// 比较令牌后续期
const EXTEND_SCRIPT: &str = r#"
    if redis.call("get", KEYS[1]) == ARGV[1] then
        return redis.call("pexpire", KEYS[1], ARGV[2])
    else
        return 0
    end
"#;

/// 单节点操作错误
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("node operation timed out after {0:?}")]
    Timeout(Duration),
}

/// 单个 Redis 节点上的锁原语
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LockPool: Send + Sync {
    /// `SET key value NX PX ttl`，返回是否写入成功
    async fn acquire(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, NodeError>;

    /// 令牌匹配时删除，返回是否删除
    async fn release(&self, key: &str, value: &str) -> Result<bool, NodeError>;

    /// 令牌匹配时重设过期时间，返回是否续期
    async fn extend(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, NodeError>;
}

/// 基于 redis 客户端的节点实现
pub struct RedisPool {
    /// 去掉认证信息的地址，用于日志
    name: String,
    client: Client,
    /// 多路复用连接可以被并发任务共享，首次使用时建立
    conn: OnceCell<MultiplexedConnection>,
    release_script: Script,
    extend_script: Script,
}

impl RedisPool {
    /// 创建节点客户端（不会立即建立连接）
    pub fn open(url: &str) -> Result<Self, redis::RedisError> {
        let client = Client::open(url)?;
        let name = redact(url);
        info!(node = %name, "Redis lock node client created");
        Ok(Self {
            name,
            client,
            conn: OnceCell::new(),
            release_script: Script::new(RELEASE_SCRIPT),
            extend_script: Script::new(EXTEND_SCRIPT),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 获取连接
    async fn get_conn(&self) -> Result<MultiplexedConnection, NodeError> {
        let conn = self
            .conn
            .get_or_try_init(|| self.client.get_multiplexed_async_connection())
            .await?;
        Ok(conn.clone())
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<(), NodeError> {
        let mut conn = self.get_conn().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl LockPool for RedisPool {
    async fn acquire(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, NodeError> {
        let mut conn = self.get_conn().await?;

        // NX: 只在 key 不存在时设置；PX: 过期时间（毫秒）
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;

        debug!(node = %self.name, key = %key, acquired = result.is_some(), "SET NX PX");
        Ok(result.is_some())
    }

    async fn release(&self, key: &str, value: &str) -> Result<bool, NodeError> {
        let mut conn = self.get_conn().await?;
        let deleted: i64 = self
            .release_script
            .key(key)
            .arg(value)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted > 0)
    }

    async fn extend(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, NodeError> {
        let mut conn = self.get_conn().await?;
        let extended: i64 = self
            .extend_script
            .key(key)
            .arg(value)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(extended > 0)
    }
}

/// 参与仲裁的全部节点
#[derive(Clone)]
pub struct RedisStore {
    pools: Vec<Arc<dyn LockPool>>,
}

impl RedisStore {
    /// 按配置为每个节点创建客户端
    pub fn open(config: &RedisConfig) -> Result<Self, redis::RedisError> {
        let pools = config
            .node_urls()
            .iter()
            .map(|url| RedisPool::open(url).map(|pool| Arc::new(pool) as Arc<dyn LockPool>))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { pools })
    }

    pub fn from_pools(pools: Vec<Arc<dyn LockPool>>) -> Self {
        Self { pools }
    }

    pub fn pools(&self) -> &[Arc<dyn LockPool>] {
        &self.pools
    }

    /// 达成多数所需的节点数
    pub fn quorum(&self) -> usize {
        self.pools.len() / 2 + 1
    }
}

/// 去掉 URL 中的认证信息
/// PX 参数，超出范围时饱和而不是截断，由 Redis 拒绝
fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}{}", &url[..scheme_end + 3], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}
