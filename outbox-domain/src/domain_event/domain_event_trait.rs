use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;

/// 事件时间戳类型（`#[domain_event]` 生成的 `created_at` 字段使用）
pub type EventTime = DateTime<Utc>;

/// 领域事件载荷需要满足的通用能力边界
///
/// 事件一经追加到实体的事件队列便不可变；消费者按 `event_type` 路由到处理器。
pub trait DomainEvent:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// 事件唯一标识（仅用于追踪与关联，不参与去重）
    fn event_id(&self) -> &str;

    /// 事件类型（形如 `OrderEvent.Created` 或自定义类型名），用于匹配处理器
    fn event_type(&self) -> &str;

    /// 事件产生时间
    fn created_at(&self) -> EventTime;
}
