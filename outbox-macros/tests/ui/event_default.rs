use outbox_domain::domain_event::DomainEvent;
use outbox_macros::domain_event;

// 已手写 derive 与标准字段时，宏只做合并，不重复添加
#[domain_event]
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
enum AccountEvent {
    Opened {
        event_id: String,
        created_at: chrono::DateTime<chrono::Utc>,
        owner: String,
    },
    Closed {},
}

fn main() {
    let ev = AccountEvent::Closed {
        event_id: "ev-2".into(),
        created_at: chrono::Utc::now(),
    };
    assert_eq!(ev.event_type(), "AccountEvent.Closed");
    let _ = ev.created_at();
}
