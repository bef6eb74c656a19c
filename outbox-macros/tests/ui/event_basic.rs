use outbox_domain::domain_event::DomainEvent;
use outbox_macros::domain_event;

#[domain_event]
enum BankEvent {
    #[event(event_type = "bank.opened")]
    Opened { name: String },
    #[event(event_type = "bank.renamed")]
    Renamed { to: String },
}

fn main() {
    let ev = BankEvent::Opened {
        event_id: "ev-1".into(),
        created_at: chrono::Utc::now(),
        name: "acme".into(),
    };
    assert_eq!(ev.event_id(), "ev-1");
    assert_eq!(ev.event_type(), "bank.opened");

    let json = serde_json::to_value(&ev).unwrap();
    assert_eq!(json["type"], "bank.opened");
    assert_eq!(json["name"], "acme");

    let back: BankEvent = serde_json::from_value(json).unwrap();
    assert_eq!(back, ev);
}
