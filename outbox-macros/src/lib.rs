//! outbox-domain 的过程宏
//!
//! - `#[entity_with_events]`：为实体补齐 `id/event_count/event_queue` 字段并实现 `HasDomainEvents`；
//! - `#[domain_event]`：为事件枚举补齐 `event_id/created_at` 字段、设置序列化标签并实现 `DomainEvent`。
//!
use proc_macro::TokenStream;

mod domain_event;
mod entity_with_events;
mod utils;

/// 携带领域事件队列的实体宏
/// - 参数：`#[entity_with_events(event = EventType, id = IdType, collection = "name")]`
/// - 字段顺序：`id`, `event_count`, `event_queue` 在最前，其余字段保持原有相对顺序
#[proc_macro_attribute]
pub fn entity_with_events(attr: TokenStream, item: TokenStream) -> TokenStream {
    entity_with_events::expand(attr, item)
}

/// 领域事件枚举宏
/// - 变体须为具名字段形式
/// - 变体可通过 `#[event(event_type = "...")]` 指定事件类型，默认 `EnumName.Variant`
#[proc_macro_attribute]
pub fn domain_event(attr: TokenStream, item: TokenStream) -> TokenStream {
    domain_event::expand(attr, item)
}
