//! 单次加锁的配置选项
//!
//! 每个选项只修改 `Config` 的一个字段，由 `Config::apply` 从左到右依次执行。

use std::time::Duration;

use crate::config::{Config, DelayFunc, GenValueFunc};

/// 配置选项
pub type MutexOption = Box<dyn FnOnce(&mut Config) + Send>;

/// 覆盖命名空间
pub fn with_namespace(namespace: impl Into<String>) -> MutexOption {
    let namespace = namespace.into();
    Box::new(move |config| config.namespace = namespace)
}

/// 覆盖锁的有效期
pub fn with_expiry(expiry: Duration) -> MutexOption {
    Box::new(move |config| config.expiry = expiry)
}

/// 覆盖最大尝试次数
pub fn with_tries(tries: u32) -> MutexOption {
    Box::new(move |config| config.tries = tries)
}

/// 使用固定重试间隔，同时丢弃之前设置的间隔函数
pub fn with_retry_delay(delay: Duration) -> MutexOption {
    Box::new(move |config| {
        config.retry_delay = delay;
        config.delay_func = None;
    })
}

/// 使用自定义重试间隔函数
pub fn with_retry_delay_func(delay_func: DelayFunc) -> MutexOption {
    Box::new(move |config| config.delay_func = Some(delay_func))
}

/// 覆盖时钟漂移系数
pub fn with_drift_factor(factor: f64) -> MutexOption {
    Box::new(move |config| config.drift_factor = factor)
}

/// 覆盖等待超时系数
pub fn with_timeout_factor(factor: f64) -> MutexOption {
    Box::new(move |config| config.timeout_factor = factor)
}

/// 使用自定义令牌生成函数
pub fn with_gen_value_func(gen_value_func: GenValueFunc) -> MutexOption {
    Box::new(move |config| config.gen_value_func = Some(gen_value_func))
}

/// 使用固定的所有权令牌
pub fn with_value(value: impl Into<String>) -> MutexOption {
    let value = value.into();
    Box::new(move |config| config.value = Some(value))
}
