//! Outbox 统一错误定义
//!
//! 聚焦序列化、实体存储、分布式锁、更新校验与配置等最小必要集合；
//! 这些错误对扫描周期而言都是致命的，会直接向上传播给调度方。
//! 处理器失败不在此列：处理器返回 `anyhow::Result`，由消费者按事件记录。
//!
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum OutboxError {
    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("invalid entity id: {value}")]
    InvalidId { value: String },

    // --- 实体存储 ---
    #[error("entity store error: {reason}")]
    Store { reason: String },
    #[error("database error: {reason}")]
    Database { reason: String },
    #[error("invalid update: {reason}")]
    InvalidUpdate { reason: String },

    // --- 分布式锁 ---
    #[error("lock provider error: {reason}")]
    Lock { reason: String },

    // --- 配置 ---
    #[error("invalid config: {reason}")]
    Config { reason: String },
}

impl OutboxError {
    pub fn store(reason: impl Into<String>) -> Self {
        Self::Store {
            reason: reason.into(),
        }
    }

    pub fn lock(reason: impl Into<String>) -> Self {
        Self::Lock {
            reason: reason.into(),
        }
    }

    pub fn invalid_update(reason: impl Into<String>) -> Self {
        Self::InvalidUpdate {
            reason: reason.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }
}

/// 统一 Result 类型别名
pub type OutboxResult<T> = Result<T, OutboxError>;

// 允许在基础设施层直接使用 `?` 将 sqlx 错误转换为 OutboxError
#[cfg(feature = "infra-sqlx")]
impl From<sqlx::Error> for OutboxError {
    fn from(err: sqlx::Error) -> Self {
        OutboxError::Database {
            reason: err.to_string(),
        }
    }
}
