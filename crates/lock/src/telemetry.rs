//! 锁指标
//!
//! 通过 metrics 门面上报，导出器由宿主进程安装；未安装时这些调用为空操作。

use std::time::Duration;

use crate::config::Provider;
use crate::error::{Error, ErrorKind};

pub(crate) const ACQUIRE_TOTAL: &str = "lock_acquire_total";
pub(crate) const RELEASE_TOTAL: &str = "lock_release_total";
pub(crate) const ACQUIRE_WAIT_SECONDS: &str = "lock_acquire_wait_seconds";

/// 结果标签
pub(crate) fn outcome(result: &Result<(), Error>) -> &'static str {
    match result {
        Ok(()) => "ok",
        Err(err) => match err.kind() {
            ErrorKind::LockHeld => "lock_held",
            ErrorKind::LockNotHeld => "lock_not_held",
            ErrorKind::ProviderError => "provider_error",
            ErrorKind::CannotLock => "timeout",
            ErrorKind::Context => "context",
            ErrorKind::MaxRetriesExceeded => "max_retries",
            ErrorKind::GenerateTokenFailed => "token_failed",
        },
    }
}

pub(crate) fn record_acquire(provider: Provider, result: &Result<(), Error>, waited: Duration) {
    metrics::counter!(
        ACQUIRE_TOTAL,
        "provider" => provider.as_str(),
        "result" => outcome(result)
    )
    .increment(1);
    metrics::histogram!(ACQUIRE_WAIT_SECONDS, "provider" => provider.as_str())
        .record(waited.as_secs_f64());
}

pub(crate) fn record_release(provider: Provider, result: &Result<(), Error>) {
    metrics::counter!(
        RELEASE_TOTAL,
        "provider" => provider.as_str(),
        "result" => outcome(result)
    )
    .increment(1);
}

/// 注册指标描述，出现在导出端点的 HELP 注释中
pub fn describe_metrics() {
    metrics::describe_counter!(ACQUIRE_TOTAL, "Total number of lock acquisition attempts");
    metrics::describe_counter!(RELEASE_TOTAL, "Total number of lock releases");
    metrics::describe_histogram!(
        ACQUIRE_WAIT_SECONDS,
        metrics::Unit::Seconds,
        "Time spent waiting to acquire a lock"
    );
}
