//! 领域事件（Domain Event）
//!
//! 定义事件载荷需要实现的最小接口（`DomainEvent`）。事件在实体文档中的形态为
//! `{ event_id, created_at, type, ...payload }`，由 `#[domain_event]` 宏统一生成。

mod domain_event_trait;

pub use domain_event_trait::{DomainEvent, EventTime};
