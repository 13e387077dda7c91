//! 分布式锁端到端测试
//!
//! 按宿主进程的方式装配锁管理器（配置文件 → 锁配置 → 管理器），
//! 再以各业务模块的使用方式验证：
//! - 配置装配与后端选择
//! - 合并请求串行化
//! - 任务调度全局锁
//! - 多实例同时启动时的数据迁移步骤
//!
//! 默认使用内存后端；设置 `E2E_LOCK_PROVIDER=redis` 后改用 `TEST_REDIS_URL`
//! 指向的 Redis。

pub mod setup;
pub mod suites;

pub use setup::TestEnvironment;
