//! 单元测试共用的实体与事件
//!
use chrono::Utc;
use outbox_macros::{domain_event, entity_with_events};

#[domain_event]
pub(crate) enum OrderEvent {
    #[event(event_type = "order.placed")]
    Placed { total: u64 },
    #[event(event_type = "order.shipped")]
    Shipped { carrier: String },
}

#[entity_with_events(event = OrderEvent, collection = "orders")]
pub(crate) struct Order {
    pub(crate) customer: String,
}

impl Order {
    pub(crate) fn new(id: &str, customer: &str) -> Self {
        Self {
            id: id.to_string(),
            event_count: 0,
            event_queue: Vec::new(),
            customer: customer.to_string(),
        }
    }

    /// 直接构造带积压事件的实体（绕过发布器，用于模拟存量数据）
    pub(crate) fn with_events(id: &str, event_count: i64, events: Vec<OrderEvent>) -> Self {
        Self {
            event_count,
            event_queue: events,
            ..Self::new(id, "alice")
        }
    }
}

pub(crate) fn placed(total: u64) -> OrderEvent {
    OrderEvent::Placed {
        event_id: ulid::Ulid::new().to_string(),
        created_at: Utc::now(),
        total,
    }
}

pub(crate) fn shipped(carrier: &str) -> OrderEvent {
    OrderEvent::Shipped {
        event_id: ulid::Ulid::new().to_string(),
        created_at: Utc::now(),
        carrier: carrier.to_string(),
    }
}
