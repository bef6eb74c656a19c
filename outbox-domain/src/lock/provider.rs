use crate::entity::HasDomainEvents;
use crate::error::OutboxResult;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// 一次成功获取所对应的持有凭证，释放时用于校验持有者
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockToken(Uuid);

impl LockToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for LockToken {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for LockToken {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 分布式锁提供者
#[async_trait]
pub trait LockProvider: Send + Sync {
    /// 单次尝试获取名为 `key` 的排他锁，持有 `hold` 后自动失效；被占用时返回 `None`
    async fn try_acquire(&self, key: &str, hold: Duration) -> OutboxResult<Option<LockToken>>;

    /// 释放锁；锁已过期、已释放或已被他人持有时视为成功（幂等）
    async fn release(&self, key: &str, token: &LockToken) -> OutboxResult<()>;
}

#[async_trait]
impl<P> LockProvider for Arc<P>
where
    P: LockProvider + ?Sized,
{
    async fn try_acquire(&self, key: &str, hold: Duration) -> OutboxResult<Option<LockToken>> {
        (**self).try_acquire(key, hold).await
    }

    async fn release(&self, key: &str, token: &LockToken) -> OutboxResult<()> {
        (**self).release(key, token).await
    }
}

/// 获取锁的时间参数
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockOptions {
    /// 持有期限，持有者崩溃时锁在此之后失效
    pub hold: Duration,
    /// 获取时的最长等待时间
    pub wait: Duration,
    /// 等待期间两次尝试的间隔
    pub retry_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            hold: Duration::from_secs(60),
            wait: Duration::from_secs(60),
            retry_interval: Duration::from_millis(100),
        }
    }
}

/// 实体级锁键：`domain_events_{实体类型名}_{实体标识}`，在所有共享存储的消费者间全局唯一
pub fn entity_lock_key<T: HasDomainEvents>(id: &T::Id) -> String {
    format!("domain_events_{}_{}", T::COLLECTION, id)
}
