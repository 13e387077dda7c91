//! 数据迁移与回填
//!
//! 多个实例同时启动时，同一个迁移步骤只会被执行一次；回填任务在调用方
//! 截止时间内拿不到锁时放弃。

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use forge_lock::{Context, ContextError, Error, ErrorKind, keys, with_lock, with_namespace};

use crate::setup::TestEnvironment;

/// 已完成标记 + 实际执行次数
#[derive(Default)]
struct MigrationState {
    done: AtomicBool,
    runs: AtomicUsize,
}

async fn run_step(
    env: &TestEnvironment,
    namespace: &str,
    state: &MigrationState,
) -> Result<(), Error> {
    let ctx = Context::background();
    with_lock(
        env.manager(),
        &ctx,
        &keys::migration_step("backfill-pullreq-stats"),
        vec![with_namespace(namespace)],
        || async {
            if state.done.load(Ordering::SeqCst) {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            state.runs.fetch_add(1, Ordering::SeqCst);
            state.done.store(true, Ordering::SeqCst);
            Ok(())
        },
    )
    .await
}

#[tokio::test]
async fn test_migration_step_runs_once() {
    let env = TestEnvironment::setup().unwrap();
    let namespace = format!("migrate-{}", TestEnvironment::unique_id());
    let state = MigrationState::default();

    let results = tokio::join!(
        run_step(&env, &namespace, &state),
        run_step(&env, &namespace, &state),
        run_step(&env, &namespace, &state),
        run_step(&env, &namespace, &state),
    );
    results.0.unwrap();
    results.1.unwrap();
    results.2.unwrap();
    results.3.unwrap();

    assert!(state.done.load(Ordering::SeqCst));
    assert_eq!(state.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_backfill_gives_up_at_deadline() {
    let env = TestEnvironment::setup().unwrap();
    let namespace = format!("webhook-{}", TestEnvironment::unique_id());
    let key = keys::webhook_backfill(TestEnvironment::unique_id());

    let background = Context::background();
    let mut holder = env
        .manager()
        .new_mutex(&key, vec![with_namespace(namespace.as_str())])
        .unwrap();
    holder.lock(&background).await.unwrap();

    let ctx = Context::with_timeout(Duration::from_millis(50));
    let err = with_lock(
        env.manager(),
        &ctx,
        &key,
        vec![with_namespace(namespace.as_str())],
        || async { Ok::<_, Error>(()) },
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Context);
    assert_eq!(err.context_error(), Some(ContextError::DeadlineExceeded));

    holder.unlock(&background).await.unwrap();
}
