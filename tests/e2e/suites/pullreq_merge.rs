//! 合并请求串行化
//!
//! 同一个合并请求的合并/更新流程持有 `<repoID>:<prNumber>` 锁，
//! 不同合并请求之间互不阻塞。

use std::time::{Duration, Instant};

use forge_lock::{Context, Error, keys, with_lock, with_namespace};
use tokio::sync::Mutex;

use crate::setup::TestEnvironment;

const MERGE_DURATION: Duration = Duration::from_millis(50);

/// 模拟一次合并：记录开始和结束事件
async fn merge(
    env: &TestEnvironment,
    log: &Mutex<Vec<String>>,
    repo_id: i64,
    number: i64,
    who: &str,
) -> Result<(), Error> {
    let ctx = Context::background();
    with_lock(
        env.manager(),
        &ctx,
        &keys::pull_request(repo_id, number),
        vec![with_namespace("pullreq")],
        || async {
            log.lock().await.push(format!("{who}:start"));
            tokio::time::sleep(MERGE_DURATION).await;
            log.lock().await.push(format!("{who}:end"));
            Ok(())
        },
    )
    .await
}

#[tokio::test]
async fn test_same_pull_request_is_serialized() {
    let env = TestEnvironment::setup().unwrap();
    let log = Mutex::new(Vec::new());
    let repo_id = TestEnvironment::unique_id();

    let (first, second) = tokio::join!(
        merge(&env, &log, repo_id, 7, "merge"),
        merge(&env, &log, repo_id, 7, "update"),
    );
    first.unwrap();
    second.unwrap();

    let log = log.into_inner();
    assert_eq!(log.len(), 4);
    // 每个流程的 start/end 必须相邻，不能交错
    for pair in log.chunks(2) {
        let (start, end) = (&pair[0], &pair[1]);
        assert!(start.ends_with(":start"), "unexpected order: {log:?}");
        assert_eq!(
            start.trim_end_matches(":start"),
            end.trim_end_matches(":end"),
            "interleaved merges: {log:?}"
        );
    }
}

#[tokio::test]
async fn test_different_pull_requests_run_concurrently() {
    let env = TestEnvironment::setup().unwrap();
    let log = Mutex::new(Vec::new());
    let repo_id = TestEnvironment::unique_id();

    let start = Instant::now();
    let (first, second) = tokio::join!(
        merge(&env, &log, repo_id, 1, "pr-1"),
        merge(&env, &log, repo_id, 2, "pr-2"),
    );
    first.unwrap();
    second.unwrap();

    // 两个流程都在对方结束前开始
    let log = log.into_inner();
    assert!(log[0].ends_with(":start") && log[1].ends_with(":start"), "{log:?}");
    assert!(start.elapsed() < MERGE_DURATION * 2);
}

#[tokio::test]
async fn test_merge_key_layout() {
    let env = TestEnvironment::setup().unwrap();
    let mutex = env
        .manager()
        .new_mutex(&keys::pull_request(12, 345), vec![with_namespace("pullreq")])
        .unwrap();

    assert_eq!(mutex.key(), "forge-e2e:pullreq:12:345");
    // 旧的拆分规则只保留到第三段
    assert_eq!(
        forge_lock::split_key(mutex.key()),
        ("pullreq".to_string(), "12".to_string())
    );
}
