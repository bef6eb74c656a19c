//! 实体存储（persist）
//!
//! 定义消费者所需的实体存储协议与参考实现：
//! - `EntityStore`：批量游标扫描、按标识重读、单文档原子更新；
//! - `InMemoryEntityStore`：基于 JSON 文档的内存实现，用于测试与本地开发；
//! - `PgEntityStore`：基于 PostgreSQL JSONB 的实现（需开启 `infra-sqlx` 特性）。
//!
mod document;
mod entity_store;
mod store_inmemory;
#[cfg(feature = "infra-sqlx")]
mod store_postgres;

pub use entity_store::{EntityStore, PendingCursor};
pub use store_inmemory::InMemoryEntityStore;
#[cfg(feature = "infra-sqlx")]
pub use store_postgres::PgEntityStore;
