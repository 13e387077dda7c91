//! 锁 key 格式
//!
//! 规范 key 形如 `app:namespace:key`。

/// 构造规范 key
pub fn format_key(app: &str, namespace: &str, key: &str) -> String {
    format!("{}:{}:{}", app, namespace, key)
}

/// 从规范 key 拆出 (namespace, key)
///
/// 多于两段时取第二段为命名空间、第三段为 key，第三段之后的内容被丢弃；
/// 不超过两段时命名空间为空，整个输入作为 key 返回。
/// 因此只有 key 本身不含 `:` 时才能与 `format_key` 往返一致。
pub fn split_key(full: &str) -> (String, String) {
    let parts: Vec<&str> = full.split(':').collect();
    if parts.len() > 2 {
        (parts[1].to_string(), parts[2].to_string())
    } else {
        (String::new(), full.to_string())
    }
}

/// 各业务模块使用的锁 key
///
/// 只生成 `format_key` 中的最后一段，应用前缀和命名空间由管理器配置决定。
pub mod keys {
    /// 任务调度器的全局锁
    pub const GLOBAL_JOBS: &str = "jobs";

    /// 合并请求的合并/更新流程，`<repoID>:<prNumber>`
    pub fn pull_request(repo_id: i64, number: i64) -> String {
        format!("{}:{}", repo_id, number)
    }

    /// Webhook 回填
    pub fn webhook_backfill(webhook_id: i64) -> String {
        format!("webhook-backfill-{}", webhook_id)
    }

    /// 制品仓库索引任务
    pub fn registry_index(registry_id: i64) -> String {
        format!("registry-index-{}", registry_id)
    }

    /// 按任务类型认领任务
    pub fn job_claim(job_type: &str) -> String {
        format!("job-claim-{}", job_type)
    }

    /// 数据迁移步骤
    pub fn migration_step(step: &str) -> String {
        format!("migration-{}", step)
    }
}
