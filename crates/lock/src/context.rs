//! 调用上下文
//!
//! 为加锁等待提供取消信号和截止时间。取消信号复用 `watch::channel(false)`
//! 的关闭通知方式：发送 `true` 即取消，所有派生上下文同时可见。

use std::future::pending;
use std::time::Duration;

use futures::future::select_all;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::ContextError;

/// 调用上下文
///
/// 克隆成本很低，可以在任务之间随意传递。
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// 祖先链上所有的取消信号
    signals: Vec<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// 取消句柄
///
/// 句柄被 drop 时不会触发取消。
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// 取消关联的上下文及其所有派生上下文
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Context {
    /// 永不取消、没有截止时间的根上下文
    pub fn background() -> Self {
        Self::default()
    }

    /// 创建可取消的根上下文
    pub fn with_cancel() -> (Self, CancelHandle) {
        Self::background().child_with_cancel()
    }

    /// 创建在 `timeout` 后过期的根上下文
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().child_with_timeout(timeout)
    }

    /// 创建在 `deadline` 时刻过期的根上下文
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::background().child_with_deadline(deadline)
    }

    /// 派生可独立取消的子上下文，父上下文取消时子上下文同样取消
    pub fn child_with_cancel(&self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let mut child = self.clone();
        child.signals.push(rx);
        (child, CancelHandle { tx })
    }

    /// 派生带超时的子上下文
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        self.child_with_deadline(Instant::now() + timeout)
    }

    /// 派生带截止时间的子上下文，取父子中更早的截止时间
    pub fn child_with_deadline(&self, deadline: Instant) -> Self {
        let mut child = self.clone();
        child.deadline = Some(match self.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        });
        child
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// 当前是否已终止
    pub fn err(&self) -> Option<ContextError> {
        if self.signals.iter().any(|rx| *rx.borrow()) {
            return Some(ContextError::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// 等待上下文终止并返回原因
    ///
    /// 取消优先于截止时间；永不终止的上下文上该 future 永远不会完成。
    pub async fn done(&self) -> ContextError {
        if let Some(err) = self.err() {
            return err;
        }

        let canceled = async {
            if self.signals.is_empty() {
                return pending::<()>().await;
            }
            let waits = self
                .signals
                .iter()
                .map(|rx| Box::pin(wait_canceled(rx.clone())));
            select_all(waits).await;
        };

        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            biased;

            _ = canceled => ContextError::Canceled,
            _ = expired => ContextError::DeadlineExceeded,
        }
    }
}

async fn wait_canceled(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // 发送端已 drop 且从未取消
            return pending().await;
        }
    }
}
