//! 分布式锁（lock）
//!
//! 消费者仅把分布式锁当作互斥手段：同一实体同一时刻只允许一个消费者实例处理。
//! - `LockProvider`：单次获取与幂等释放的最小协议，持有期满自动失效；
//! - `acquire`：在等待超时内轮询获取，响应取消信号，返回作用域守卫 `LockGuard`；
//! - `InMemoryLockProvider` / `PgLockProvider`：内存与 PostgreSQL 实现。
//!
mod guard;
mod provider;
mod provider_inmemory;
#[cfg(feature = "infra-sqlx")]
mod provider_postgres;

pub use guard::{LockGuard, acquire};
pub use provider::{LockOptions, LockProvider, LockToken, entity_lock_key};
pub use provider_inmemory::InMemoryLockProvider;
#[cfg(feature = "infra-sqlx")]
pub use provider_postgres::PgLockProvider;
