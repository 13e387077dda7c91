//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// 分布式锁配置
///
/// 这里只保存配置加载器能表达的原始值，由 `forge-lock` 转换成锁管理器使用的
/// `Config`（时长字段统一以毫秒表示）。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    /// 所有锁 key 的应用前缀
    pub app_namespace: String,
    /// 未显式指定命名空间时使用的默认命名空间
    pub default_namespace: String,
    /// 锁后端：inmemory 或 redis
    pub provider: String,
    /// 锁的有效期（毫秒）
    pub expiry_ms: u64,
    /// 获取锁的最大尝试次数
    pub tries: u32,
    /// 两次尝试之间的固定间隔（毫秒）
    pub retry_delay_ms: u64,
    /// 时钟漂移系数（Redlock）
    pub drift_factor: f64,
    /// 等待超时系数，等待上限 = expiry * timeout_factor
    pub timeout_factor: f64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            app_namespace: "forge".to_string(),
            default_namespace: "default".to_string(),
            provider: "inmemory".to_string(),
            expiry_ms: 8_000,
            tries: 8,
            retry_delay_ms: 250,
            drift_factor: 0.01,
            timeout_factor: 0.25,
        }
    }
}

/// Redis 配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// 主节点地址
    pub url: String,
    /// 额外的独立节点，与 `url` 一起组成 Redlock 仲裁集合
    pub quorum_nodes: Vec<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            quorum_nodes: Vec::new(),
        }
    }
}

impl RedisConfig {
    /// 参与仲裁的全部节点地址，主节点在前
    pub fn node_urls(&self) -> Vec<String> {
        std::iter::once(self.url.clone())
            .chain(self.quorum_nodes.iter().cloned())
            .collect()
    }
}

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// 日志输出格式：json（结构化）或 pretty（人类可读）
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    /// 实例标识，多实例部署时用于区分锁持有者
    pub instance_id: String,
    pub environment: String,
    pub lock: LockSettings,
    pub redis: RedisConfig,
    pub observability: ObservabilityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: "forge".to_string(),
            instance_id: "forge-0".to_string(),
            environment: "development".to_string(),
            lock: LockSettings::default(),
            redis: RedisConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（FORGE_ 前缀，双下划线分隔层级，如 FORGE_LOCK__PROVIDER -> lock.provider）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("FORGE_ENV").unwrap_or_else(|_| "development".to_string());

        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        Self::load_from(service_name, &env, Path::new(&config_dir))
    }

    /// 从指定目录加载配置，便于测试注入临时目录
    pub fn load_from(
        service_name: &str,
        env: &str,
        config_dir: &Path,
    ) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", env))).required(false))
            .add_source(
                File::from(config_dir.join(format!("{}.toml", service_name))).required(false),
            )
            // 环境变量覆盖（FORGE_LOCK__EXPIRY_MS -> lock.expiry_ms）
            .add_source(
                Environment::with_prefix("FORGE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
