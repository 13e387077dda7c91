//! 锁配置
//!
//! `Config` 在进程启动时构造一次，作为管理器的默认值；每次 `new_mutex`
//! 都复制一份，再按顺序应用调用方传入的选项。

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use forge_shared::config::LockSettings;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backoff;
use crate::error::BoxError;
use crate::options::MutexOption;

/// 重试间隔函数，参数为第几次重试（从 1 开始）
pub type DelayFunc = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// 所有权令牌生成函数
pub type GenValueFunc = Arc<dyn Fn() -> Result<String, BoxError> + Send + Sync>;

/// 启动期配置错误，不属于运行期的锁错误，不应重试
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("unknown lock provider: {0}")]
    UnknownProvider(String),

    #[error("invalid {name}: {value}")]
    InvalidFactor { name: &'static str, value: f64 },
}

/// 锁后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// 单进程内存实现
    #[default]
    InMemory,
    /// 基于 Redis 的多节点仲裁实现
    Redis,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InMemory => "inmemory",
            Self::Redis => "redis",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inmemory" => Ok(Self::InMemory),
            "redis" => Ok(Self::Redis),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

/// 锁配置
#[derive(Clone)]
pub struct Config {
    /// 应用前缀
    pub app: String,
    pub namespace: String,
    pub provider: Provider,

    /// 锁的有效期，为零时内存实现的锁不会过期
    pub expiry: Duration,
    /// 最大尝试次数（含首次）
    pub tries: u32,
    /// 固定重试间隔，未设置 delay_func 时使用
    pub retry_delay: Duration,
    pub delay_func: Option<DelayFunc>,
    /// Redlock 时钟漂移系数
    pub drift_factor: f64,
    /// 大于零时等待上限为 expiry * timeout_factor，Redis 单节点操作超时同理
    pub timeout_factor: f64,

    pub gen_value_func: Option<GenValueFunc>,
    /// 显式指定的所有权令牌，优先级最高
    pub value: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app: "forge".to_string(),
            namespace: "default".to_string(),
            provider: Provider::InMemory,
            expiry: Duration::from_secs(8),
            tries: 8,
            retry_delay: Duration::from_millis(250),
            delay_func: None,
            drift_factor: 0.01,
            timeout_factor: 0.25,
            gen_value_func: None,
            value: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("app", &self.app)
            .field("namespace", &self.namespace)
            .field("provider", &self.provider)
            .field("expiry", &self.expiry)
            .field("tries", &self.tries)
            .field("retry_delay", &self.retry_delay)
            .field("delay_func", &self.delay_func.as_ref().map(|_| "custom"))
            .field("drift_factor", &self.drift_factor)
            .field("timeout_factor", &self.timeout_factor)
            .field("gen_value_func", &self.gen_value_func.as_ref().map(|_| "custom"))
            .field("value", &self.value)
            .finish()
    }
}

impl Config {
    /// 由配置加载器的原始值构造
    pub fn from_settings(settings: &LockSettings) -> Result<Self, ConfigError> {
        let provider = settings.provider.parse::<Provider>()?;
        check_factor("drift_factor", settings.drift_factor)?;
        check_factor("timeout_factor", settings.timeout_factor)?;

        Ok(Self {
            app: settings.app_namespace.clone(),
            namespace: settings.default_namespace.clone(),
            provider,
            expiry: Duration::from_millis(settings.expiry_ms),
            tries: settings.tries,
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
            delay_func: None,
            drift_factor: settings.drift_factor,
            timeout_factor: settings.timeout_factor,
            gen_value_func: None,
            value: None,
        })
    }

    /// 复制当前配置并从左到右应用选项，后面的选项覆盖前面的
    pub fn apply(&self, options: Vec<MutexOption>) -> Self {
        let mut config = self.clone();
        for option in options {
            option(&mut config);
        }
        config
    }

    /// 实际生效的重试间隔函数
    pub fn effective_delay_func(&self) -> DelayFunc {
        match &self.delay_func {
            Some(func) => func.clone(),
            None => backoff::constant(self.retry_delay),
        }
    }

    /// 整个等待过程的时间上限
    pub fn wait_time(&self) -> Duration {
        if self.timeout_factor > 0.0 {
            scale(self.expiry, self.timeout_factor)
        } else {
            self.expiry
        }
    }
}

fn check_factor(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidFactor { name, value })
    }
}

/// 按系数缩放时长：系数非正或为 NaN 时得到零，溢出时取 `Duration::MAX`
pub(crate) fn scale(duration: Duration, factor: f64) -> Duration {
    if duration.is_zero() || factor.is_nan() || factor <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(duration.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}
