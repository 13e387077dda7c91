//! 日志与追踪订阅器
//!
//! 基于 tracing-subscriber 组合 EnvFilter 与 fmt 层，支持 JSON 与 pretty 两种输出。

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::ObservabilityConfig;

/// Tracing 资源守卫
///
/// 目前只记录关闭日志，保留为与宿主进程生命周期绑定的句柄。
pub struct TracingGuard {
    service_name: String,
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        info!(service = %self.service_name, "Shutting down tracing");
    }
}

/// 初始化 tracing（日志 + span 事件）
///
/// `RUST_LOG` 优先于配置中的 `log_level`；全局订阅器已安装时返回错误。
pub fn init_tracing(service_name: &str, config: &ObservabilityConfig) -> Result<TracingGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = if config.json_logs() {
        fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    info!(
        service = %service_name,
        log_level = %config.log_level,
        log_format = %config.log_format,
        "Tracing initialized"
    );

    Ok(TracingGuard {
        service_name: service_name.to_string(),
    })
}
