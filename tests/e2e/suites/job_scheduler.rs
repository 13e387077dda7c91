//! 任务调度全局锁
//!
//! 多个实例在同一个调度周期内争用全局 `jobs` 锁，只有一个实例执行调度，
//! 其余实例立即放弃本周期。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use forge_lock::{Context, ErrorKind, keys, with_namespace, with_tries};

use crate::setup::TestEnvironment;

/// 一个调度周期：拿不到全局锁时直接跳过
async fn schedule_tick(env: &TestEnvironment, namespace: &str, scheduled: &AtomicUsize) -> bool {
    let ctx = Context::background();
    let mut mutex = env
        .manager()
        .new_mutex(
            keys::GLOBAL_JOBS,
            vec![with_namespace(namespace), with_tries(1)],
        )
        .unwrap();

    match mutex.lock(&ctx).await {
        Ok(()) => {
            scheduled.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            if let Err(err) = mutex.unlock(&ctx).await {
                tracing::error!(error = %err, "failed to unlock mutex");
            }
            true
        }
        Err(err) => {
            // 内存后端重试耗尽，Redis 后端报告锁已被占用
            assert!(
                matches!(
                    err.kind(),
                    ErrorKind::MaxRetriesExceeded | ErrorKind::LockHeld
                ),
                "unexpected error: {err}"
            );
            false
        }
    }
}

#[tokio::test]
async fn test_only_one_instance_schedules_per_tick() {
    let env = TestEnvironment::setup().unwrap();
    let namespace = format!("scheduler-{}", TestEnvironment::unique_id());
    let scheduled = AtomicUsize::new(0);

    let results = tokio::join!(
        schedule_tick(&env, &namespace, &scheduled),
        schedule_tick(&env, &namespace, &scheduled),
        schedule_tick(&env, &namespace, &scheduled),
    );

    let winners = [results.0, results.1, results.2]
        .into_iter()
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
    assert_eq!(scheduled.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_consecutive_ticks_all_schedule() {
    let env = TestEnvironment::setup().unwrap();
    let namespace = format!("scheduler-{}", TestEnvironment::unique_id());
    let scheduled = AtomicUsize::new(0);

    for _ in 0..3 {
        assert!(schedule_tick(&env, &namespace, &scheduled).await);
    }
    assert_eq!(scheduled.load(Ordering::SeqCst), 3);
}
