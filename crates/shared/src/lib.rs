//! 共享库
//!
//! 包含各服务共用的基础设施代码：分层配置加载、日志/追踪初始化和测试工具。

pub mod config;
pub mod observability;
pub mod test_utils;
