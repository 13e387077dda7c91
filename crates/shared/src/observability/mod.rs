//! 统一可观测性模块
//!
//! 负责日志/追踪订阅器的初始化。锁管理器通过 `tracing` 宏输出结构化日志，
//! 通过 `metrics` 门面上报计数，导出器由宿主进程自行安装。

pub mod tracing;

pub use self::tracing::{TracingGuard, init_tracing};
