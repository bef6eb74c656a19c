//! 作用域锁守卫
//!
//! 正常路径上显式 `release().await`；若守卫在持有期间被丢弃（取消、同批致命错误），
//! `Drop` 会在当前 tokio 运行时上补发一次释放，最终兜底仍是持有期满自动失效。
//!
use super::{LockOptions, LockProvider, LockToken};
use crate::error::{OutboxError, OutboxResult};
use std::sync::Arc;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// 已获取的锁
pub struct LockGuard {
    provider: Arc<dyn LockProvider>,
    key: String,
    token: Option<LockToken>,
}

impl LockGuard {
    pub(crate) fn new(provider: Arc<dyn LockProvider>, key: String, token: LockToken) -> Self {
        Self {
            provider,
            key,
            token: Some(token),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> Option<&LockToken> {
        self.token.as_ref()
    }

    /// 释放锁。释放失败只记录告警：锁会在持有期满后自动失效
    pub async fn release(mut self) {
        if let Some(token) = self.token.take() {
            if let Err(err) = self.provider.release(&self.key, &token).await {
                tracing::warn!(lock_key = %self.key, error = %err, "failed to release lock");
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };

        let provider = self.provider.clone();
        let key = std::mem::take(&mut self.key);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = provider.release(&key, &token).await {
                        tracing::warn!(lock_key = %key, error = %err, "failed to release dropped lock");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(lock_key = %key, "lock dropped outside a runtime; left to expire");
            }
        }
    }
}

/// 在 `options.wait` 内反复尝试获取锁。
///
/// - 获取成功：返回 `Some(LockGuard)`；
/// - 等待超时或收到取消信号：返回 `None`（争用是预期结果，不是错误）；
/// - 锁提供者本身出错：返回 `Err`，由调用方视为致命错误。
pub async fn acquire(
    provider: &Arc<dyn LockProvider>,
    key: &str,
    options: &LockOptions,
    cancel: &CancellationToken,
) -> OutboxResult<Option<LockGuard>> {
    let Some(deadline) = Instant::now().checked_add(options.wait) else {
        return Err(OutboxError::lock(format!(
            "lock wait out of range: {:?}",
            options.wait
        )));
    };

    loop {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        if let Some(token) = provider.try_acquire(key, options.hold).await? {
            return Ok(Some(LockGuard::new(provider.clone(), key.to_string(), token)));
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }

        let pause = options.retry_interval.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => return Ok(None),
            _ = time::sleep(pause) => {}
        }
    }
}
