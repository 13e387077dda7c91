//! 锁错误类型
//!
//! 所有后端共享同一组错误类别，调用方只需要匹配 `ErrorKind`，
//! 不需要关心底层是内存实现还是 Redis。

use std::fmt;

use thiserror::Error;

/// 被包装的底层错误
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, Error>;

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 句柄已持有锁（重复加锁）
    LockHeld,
    /// 句柄未持有锁，或锁已被他人回收（重复解锁）
    LockNotHeld,
    /// 存储后端故障
    ProviderError,
    /// 等待超时仍未获取到锁
    CannotLock,
    /// 调用方上下文被取消或超过截止时间
    Context,
    /// 重试次数耗尽
    MaxRetriesExceeded,
    /// 生成所有权令牌失败
    GenerateTokenFailed,
}

impl ErrorKind {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::LockHeld => "LOCK_HELD",
            Self::LockNotHeld => "LOCK_NOT_HELD",
            Self::ProviderError => "LOCK_PROVIDER_ERROR",
            Self::CannotLock => "CANNOT_LOCK",
            Self::Context => "LOCK_CONTEXT",
            Self::MaxRetriesExceeded => "LOCK_MAX_RETRIES_EXCEEDED",
            Self::GenerateTokenFailed => "LOCK_GENERATE_TOKEN_FAILED",
        }
    }

    /// 是否为可重试错误
    ///
    /// 争用和基础设施故障可以由调用方重试；LockHeld/LockNotHeld 属于误用，
    /// 重试没有意义。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CannotLock | Self::MaxRetriesExceeded | Self::ProviderError
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::LockHeld => "lock is held",
            Self::LockNotHeld => "lock is not held",
            Self::ProviderError => "lock provider error",
            Self::CannotLock => "timeout while trying to acquire lock",
            Self::Context => "context error while trying to acquire lock",
            Self::MaxRetriesExceeded => "max retries exceeded to acquire lock",
            Self::GenerateTokenFailed => "failed to generate lock token",
        };
        f.write_str(text)
    }
}

/// 上下文终止原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// 锁错误
#[derive(Debug, Error)]
#[error("{kind} on key {key}{}", cause_suffix(.source))]
pub struct Error {
    kind: ErrorKind,
    key: String,
    #[source]
    source: Option<BoxError>,
}

fn cause_suffix(source: &Option<BoxError>) -> String {
    source
        .as_ref()
        .map(|err| format!(": {err}"))
        .unwrap_or_default()
}

impl Error {
    pub fn new(kind: ErrorKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
            source: None,
        }
    }

    /// 创建带底层原因的错误
    pub fn with_source(
        kind: ErrorKind,
        key: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self {
            kind,
            key: key.into(),
            source: Some(source.into()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// 获取错误码
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// 被包装的上下文错误（仅 Context 类别）
    pub fn context_error(&self) -> Option<ContextError> {
        self.source
            .as_ref()
            .and_then(|err| err.downcast_ref::<ContextError>())
            .copied()
    }

    pub(crate) fn lock_held(key: &str) -> Self {
        Self::new(ErrorKind::LockHeld, key)
    }

    pub(crate) fn lock_not_held(key: &str) -> Self {
        Self::new(ErrorKind::LockNotHeld, key)
    }

    pub(crate) fn context(key: &str, err: ContextError) -> Self {
        Self::with_source(ErrorKind::Context, key, err)
    }
}
