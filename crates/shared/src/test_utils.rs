//! 测试工具模块
//!
//! 提供集成测试所需的配置辅助函数和唯一 key 生成器。

use uuid::Uuid;

use crate::config::{LockSettings, RedisConfig};

// ==================== 测试配置辅助 ====================

/// 创建测试用 Redis 配置
///
/// 优先使用环境变量，否则使用本地 1 号库，避免污染默认库
pub fn test_redis_config() -> RedisConfig {
    RedisConfig {
        url: std::env::var("TEST_REDIS_URL")
            .unwrap_or_else(|_| "redis://localhost:6379/1".to_string()),
        quorum_nodes: Vec::new(),
    }
}

/// 创建测试用锁配置
///
/// 缩短有效期和重试间隔，让争用类测试在百毫秒级完成
pub fn test_lock_settings() -> LockSettings {
    LockSettings {
        app_namespace: "forge-test".to_string(),
        default_namespace: "default".to_string(),
        provider: "inmemory".to_string(),
        expiry_ms: 1_000,
        tries: 50,
        retry_delay_ms: 10,
        drift_factor: 0.01,
        timeout_factor: 0.0,
    }
}

/// 生成唯一的测试锁 key
///
/// 并行测试共享同一个 Redis 时依靠 uuid 后缀互不干扰
pub fn unique_key(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}
