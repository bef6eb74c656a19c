use outbox_domain::entity::HasDomainEvents;
use outbox_macros::{domain_event, entity_with_events};

#[domain_event]
enum CartEvent {
    #[event(event_type = "cart.item_added")]
    ItemAdded { sku: String },
}

#[entity_with_events(event = CartEvent, collection = "carts")]
struct Cart {
    owner: String,
}

#[entity_with_events(event = CartEvent, id = u64)]
struct Wishlist {
    id: u64,
    items: Vec<String>,
}

fn main() {
    assert_eq!(<Cart as HasDomainEvents>::COLLECTION, "carts");
    assert_eq!(<Wishlist as HasDomainEvents>::COLLECTION, "Wishlist");

    // 旧文档没有计数与队列字段时按默认值读取
    let cart: Cart = serde_json::from_value(serde_json::json!({
        "id": "c-1",
        "owner": "alice",
    }))
    .unwrap();
    assert_eq!(cart.id(), "c-1");
    assert_eq!(cart.event_count(), 0);
    assert!(cart.event_queue().is_empty());
    assert_eq!(cart.owner, "alice");

    let list = Wishlist {
        id: 7,
        event_count: 0,
        event_queue: Vec::new(),
        items: vec!["book".into()],
    };
    assert_eq!(*list.id(), 7);
    let _ = list.clone();
    let _ = format!("{:?}", list.items);
}
