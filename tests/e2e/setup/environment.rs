//! 测试环境管理
//!
//! 与宿主进程相同的装配顺序：加载配置 → 初始化日志 → 转换锁配置 → 构造管理器。

use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};

use anyhow::{Context as _, Result, anyhow};
use forge_lock::{
    Config, MutexManager, Provider, RedisStore, describe_metrics, provide_mutex_manager,
};
use forge_shared::config::AppConfig;
use forge_shared::observability::{TracingGuard, init_tracing};
use tracing::info;

/// 全局订阅器只能安装一次，所有用例共用
static TRACING: OnceLock<Option<TracingGuard>> = OnceLock::new();

static NEXT_ID: AtomicI64 = AtomicI64::new(1);

/// 测试环境配置
#[derive(Debug, Clone)]
pub struct TestEnvConfig {
    /// 配置文件目录
    pub config_dir: PathBuf,
    pub environment: String,
    /// 覆盖配置文件中的锁后端
    pub provider: Option<Provider>,
    pub redis_url: Option<String>,
}

impl Default for TestEnvConfig {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config"),
            environment: "test".to_string(),
            provider: std::env::var("E2E_LOCK_PROVIDER")
                .ok()
                .and_then(|value| value.parse().ok()),
            redis_url: std::env::var("TEST_REDIS_URL").ok(),
        }
    }
}

/// 测试环境
pub struct TestEnvironment {
    pub app: AppConfig,
    pub lock_config: Config,
    manager: Arc<dyn MutexManager>,
}

impl TestEnvironment {
    /// 按默认配置创建测试环境
    pub fn setup() -> Result<Self> {
        Self::with_config(TestEnvConfig::default())
    }

    pub fn with_config(env: TestEnvConfig) -> Result<Self> {
        let mut app = AppConfig::load_from("forge-e2e", &env.environment, &env.config_dir)
            .context("failed to load e2e configuration")?;
        if let Some(provider) = env.provider {
            app.lock.provider = provider.to_string();
        }
        if let Some(url) = env.redis_url {
            app.redis.url = url;
        }

        TRACING.get_or_init(|| init_tracing(&app.service_name, &app.observability).ok());
        describe_metrics();

        let lock_config = Config::from_settings(&app.lock)?;
        let store = match lock_config.provider {
            Provider::Redis => Some(RedisStore::open(&app.redis)?),
            Provider::InMemory => None,
        };
        let manager = provide_mutex_manager(lock_config.clone(), store)
            .ok_or_else(|| anyhow!("no lock manager for provider {}", lock_config.provider))?;

        info!(
            provider = %lock_config.provider,
            app = %lock_config.app,
            "E2E test environment ready"
        );

        Ok(Self {
            app,
            lock_config,
            manager,
        })
    }

    pub fn manager(&self) -> &dyn MutexManager {
        self.manager.as_ref()
    }

    pub fn provider(&self) -> Provider {
        self.lock_config.provider
    }

    /// 进程内唯一的资源 ID，共享 Redis 时避免用例之间互相干扰
    pub fn unique_id() -> i64 {
        i64::from(std::process::id()) * 1_000_000 + NEXT_ID.fetch_add(1, Ordering::SeqCst)
    }
}
