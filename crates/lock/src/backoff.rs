//! 重试间隔策略
//!
//! 生成 `DelayFunc`：根据第几次重试（从 1 开始）返回下一次尝试前的等待时间。

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::config::DelayFunc;

/// 固定间隔
pub fn constant(delay: Duration) -> DelayFunc {
    Arc::new(move |_| delay)
}

/// 在 `[min, max)` 内均匀随机的间隔
///
/// 多个实例同时争抢同一把锁时，随机间隔可以错开它们的重试时刻。
pub fn jittered(min: Duration, max: Duration) -> DelayFunc {
    let min_ms = min.as_millis() as u64;
    let max_ms = max.as_millis() as u64;
    Arc::new(move |_| {
        if max_ms <= min_ms {
            return Duration::from_millis(min_ms);
        }
        Duration::from_millis(rand::rng().random_range(min_ms..max_ms))
    })
}

/// 指数退避策略
///
/// 第 1 次重试等待 initial_delay，之后每次乘以 multiplier，直到 max_delay。
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// 首次重试前的等待时间
    pub initial_delay: Duration,
    /// 退避时间上限
    pub max_delay: Duration,
    /// 每次重试的退避倍数
    pub multiplier: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl ExponentialBackoff {
    /// 计算第 N 次重试的等待时间（attempt 从 1 开始）
    ///
    /// 公式: initial_delay * multiplier^(attempt-1)，结果不超过 max_delay。
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = base_ms * self.multiplier.powi(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    pub fn into_delay_func(self) -> DelayFunc {
        Arc::new(move |attempt| self.delay_for_attempt(attempt))
    }
}
