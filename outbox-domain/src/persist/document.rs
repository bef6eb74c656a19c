//! 文档与投影之间的转换工具（存储实现共用）
//!
use crate::entity::{EntityProjection, EventProjection, HasDomainEvents};
use crate::error::{OutboxError, OutboxResult};
use serde_json::Value;

pub(crate) fn parse_id<T: HasDomainEvents>(raw: &str) -> OutboxResult<T::Id> {
    raw.parse::<T::Id>().map_err(|_| OutboxError::InvalidId {
        value: raw.to_string(),
    })
}

/// 由标识、计数与（可选的）队首事件 JSON 构造投影
pub(crate) fn projection<T: HasDomainEvents>(
    raw_id: &str,
    event_count: i64,
    head: Option<&Value>,
) -> OutboxResult<EntityProjection<T>> {
    let events = match head {
        Some(value) if !value.is_null() => vec![serde_json::from_value(value.clone())?],
        _ => Vec::new(),
    };

    Ok(EventProjection {
        id: parse_id::<T>(raw_id)?,
        event_count,
        events,
    })
}

pub(crate) fn event_count_of<T: HasDomainEvents>(doc: &Value) -> i64 {
    doc.get(T::COUNT_FIELD).and_then(Value::as_i64).unwrap_or(0)
}

pub(crate) fn queue_head_of<T: HasDomainEvents>(doc: &Value) -> Option<&Value> {
    doc.get(T::QUEUE_FIELD)
        .and_then(Value::as_array)
        .and_then(|queue| queue.first())
}
