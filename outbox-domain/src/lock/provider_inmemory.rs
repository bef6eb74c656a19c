//! 内存版分布式锁（InMemoryLockProvider）
//!
//! 单进程内共享同一实例即可模拟多个消费者实例之间的互斥；持有期满的锁可被他人直接接管。
//! 过期判断使用 `tokio::time::Instant`，测试中可配合暂停时钟推进。
//!
use super::{LockProvider, LockToken};
use crate::error::{OutboxError, OutboxResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Default)]
pub struct InMemoryLockProvider {
    held: Arc<Mutex<HashMap<String, (LockToken, Instant)>>>,
}

impl InMemoryLockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前是否有未过期的持有者
    pub fn is_locked(&self, key: &str) -> bool {
        let now = Instant::now();
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .is_some_and(|(_, expires_at)| *expires_at > now)
    }
}

#[async_trait]
impl LockProvider for InMemoryLockProvider {
    async fn try_acquire(&self, key: &str, hold: Duration) -> OutboxResult<Option<LockToken>> {
        if hold.is_zero() {
            return Err(OutboxError::lock("hold duration must be positive"));
        }
        let now = Instant::now();
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some((_, expires_at)) = held.get(key) {
            if *expires_at > now {
                return Ok(None);
            }
        }

        let Some(expires_at) = now.checked_add(hold) else {
            return Err(OutboxError::lock(format!("hold duration out of range: {hold:?}")));
        };
        let token = LockToken::new();
        held.insert(key.to_string(), (token, expires_at));
        Ok(Some(token))
    }

    async fn release(&self, key: &str, token: &LockToken) -> OutboxResult<()> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if held.get(key).is_some_and(|(owner, _)| owner == token) {
            held.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::{LockOptions, acquire};
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn second_acquire_is_denied_until_release() {
        let provider = InMemoryLockProvider::new();
        let hold = Duration::from_secs(60);

        let first = provider.try_acquire("k", hold).await.unwrap();
        assert!(first.is_some());
        assert!(provider.try_acquire("k", hold).await.unwrap().is_none());
        assert!(provider.is_locked("k"));

        provider.release("k", &first.unwrap()).await.unwrap();
        assert!(!provider.is_locked("k"));
        assert!(provider.try_acquire("k", hold).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn release_is_idempotent_and_ignores_foreign_tokens() {
        let provider = InMemoryLockProvider::new();
        let token = provider
            .try_acquire("k", Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();

        provider.release("k", &LockToken::new()).await.unwrap();
        assert!(provider.is_locked("k"));

        provider.release("k", &token).await.unwrap();
        provider.release("k", &token).await.unwrap();
        assert!(!provider.is_locked("k"));
    }

    #[tokio::test]
    async fn zero_hold_is_rejected() {
        let provider = InMemoryLockProvider::new();
        let err = provider.try_acquire("k", Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, OutboxError::Lock { .. }));
        assert!(!provider.is_locked("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_lock_can_be_taken_over() {
        let provider = InMemoryLockProvider::new();
        let stale = provider
            .try_acquire("k", Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        let fresh = provider
            .try_acquire("k", Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        assert_ne!(stale, fresh);

        // 过期持有者的释放不影响新持有者
        provider.release("k", &stale).await.unwrap();
        assert!(provider.is_locked("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_times_out_when_contended() {
        let provider = InMemoryLockProvider::new();
        let _held = provider
            .try_acquire("k", Duration::from_secs(60))
            .await
            .unwrap();

        let provider: Arc<dyn LockProvider> = Arc::new(provider);
        let options = LockOptions {
            hold: Duration::from_secs(60),
            wait: Duration::from_secs(1),
            retry_interval: Duration::from_millis(100),
        };
        let guard = acquire(&provider, "k", &options, &CancellationToken::new())
            .await
            .unwrap();
        assert!(guard.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_for_release() {
        let inner = InMemoryLockProvider::new();
        let held = inner
            .try_acquire("k", Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();

        let releaser = inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            releaser.release("k", &held).await.unwrap();
        });

        let provider: Arc<dyn LockProvider> = Arc::new(inner.clone());
        let guard = acquire(
            &provider,
            "k",
            &LockOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap()
        .expect("lock acquired after release");
        assert_eq!(guard.key(), "k");

        guard.release().await;
        assert!(!inner.is_locked("k"));
    }

    #[tokio::test]
    async fn acquire_returns_none_when_cancelled() {
        let inner = InMemoryLockProvider::new();
        let _held = inner.try_acquire("k", Duration::from_secs(60)).await.unwrap();

        let provider: Arc<dyn LockProvider> = Arc::new(inner);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let guard = acquire(&provider, "k", &LockOptions::default(), &cancel)
            .await
            .unwrap();
        assert!(guard.is_none());
    }

    #[tokio::test]
    async fn dropped_guard_releases_in_background() {
        let inner = InMemoryLockProvider::new();
        let provider: Arc<dyn LockProvider> = Arc::new(inner.clone());

        let guard = acquire(
            &provider,
            "k",
            &LockOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(inner.is_locked("k"));

        drop(guard);
        let _ = tokio::time::timeout(Duration::from_secs(1), async {
            while inner.is_locked("k") {
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(!inner.is_locked("k"));
    }
}
