//! PostgreSQL 分布式锁（PgLockProvider）
//!
//! 以租约表实现带过期时间的排他锁，所有共享同一数据库的消费者实例都遵守它：
//!
//! ```sql
//! CREATE TABLE outbox_locks (
//!     lock_key   TEXT PRIMARY KEY,
//!     holder     UUID NOT NULL,
//!     expires_at TIMESTAMPTZ NOT NULL
//! );
//! ```
//!
//! 获取时插入新行，或在旧租约已过期时接管；释放时仅删除自己持有的行。
//!
use super::{LockProvider, LockToken};
use crate::error::{OutboxError, OutboxResult};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

/// PostgreSQL 租约锁实现
#[derive(Clone)]
pub struct PgLockProvider {
    pool: PgPool,
}

impl PgLockProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 创建租约表（幂等）
    pub async fn ensure_schema(&self) -> OutboxResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS outbox_locks (
                lock_key   TEXT PRIMARY KEY,
                holder     UUID NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 清理已过期的租约。
    ///
    /// 过期租约在获取时会被直接接管，这里只用于控制表的体积。
    pub async fn purge_expired(&self) -> OutboxResult<u64> {
        let result = sqlx::query("DELETE FROM outbox_locks WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl LockProvider for PgLockProvider {
    async fn try_acquire(&self, key: &str, hold: Duration) -> OutboxResult<Option<LockToken>> {
        if hold.is_zero() {
            return Err(OutboxError::lock("hold duration must be positive"));
        }
        let holder = Uuid::new_v4();

        // 过期时间与接管判断都使用数据库时钟，客户端时钟偏差不影响租约
        let row = sqlx::query(
            r#"
            INSERT INTO outbox_locks (lock_key, holder, expires_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3))
            ON CONFLICT (lock_key) DO UPDATE
            SET holder = EXCLUDED.holder,
                expires_at = EXCLUDED.expires_at
            WHERE outbox_locks.expires_at <= NOW()
            RETURNING holder
            "#,
        )
        .bind(key)
        .bind(holder)
        .bind(hold.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row.try_get::<Uuid, _>("holder").map(LockToken::from))
            .transpose()
            .map_err(Into::into)
    }

    async fn release(&self, key: &str, token: &LockToken) -> OutboxResult<()> {
        sqlx::query("DELETE FROM outbox_locks WHERE lock_key = $1 AND holder = $2")
            .bind(key)
            .bind(token.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

// 需要可用的 PostgreSQL：设置 DATABASE_URL 后运行 `--features infra-sqlx`，未设置时跳过
#[cfg(test)]
mod tests {
    use super::*;

    async fn provider() -> Option<PgLockProvider> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let pool = PgPool::connect(&url).await.expect("connect to DATABASE_URL");
        let provider = PgLockProvider::new(pool);
        provider.ensure_schema().await.unwrap();
        Some(provider)
    }

    fn scratch_key() -> String {
        format!("domain_events_test_{}", ulid::Ulid::new())
    }

    #[tokio::test]
    async fn held_lease_is_exclusive_until_release() {
        let Some(provider) = provider().await else {
            eprintln!("Skipping: DATABASE_URL not available");
            return;
        };
        let key = scratch_key();
        let hold = Duration::from_secs(60);

        let first = provider.try_acquire(&key, hold).await.unwrap().unwrap();
        assert!(provider.try_acquire(&key, hold).await.unwrap().is_none());

        provider.release(&key, &LockToken::new()).await.unwrap();
        assert!(provider.try_acquire(&key, hold).await.unwrap().is_none());

        provider.release(&key, &first).await.unwrap();
        let second = provider.try_acquire(&key, hold).await.unwrap().unwrap();
        provider.release(&key, &second).await.unwrap();
    }

    #[tokio::test]
    async fn expired_lease_is_taken_over() {
        let Some(provider) = provider().await else {
            eprintln!("Skipping: DATABASE_URL not available");
            return;
        };
        let key = scratch_key();

        let stale = provider
            .try_acquire(&key, Duration::from_millis(300))
            .await
            .unwrap()
            .unwrap();
        assert!(
            provider
                .try_acquire(&key, Duration::from_secs(60))
                .await
                .unwrap()
                .is_none()
        );

        tokio::time::sleep(Duration::from_millis(600)).await;
        let fresh = provider
            .try_acquire(&key, Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();
        assert_ne!(stale, fresh);

        // 过期持有者的释放不影响新持有者
        provider.release(&key, &stale).await.unwrap();
        assert!(
            provider
                .try_acquire(&key, Duration::from_secs(60))
                .await
                .unwrap()
                .is_none()
        );
        provider.release(&key, &fresh).await.unwrap();
    }

    #[tokio::test]
    async fn zero_hold_is_rejected_without_touching_the_table() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let err = PgLockProvider::new(pool)
            .try_acquire("k", Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, OutboxError::Lock { .. }));
    }
}
