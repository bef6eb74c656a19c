//! 处理器注册表（HandlerRegistry）
//!
//! 启动时一次性构建：事件类型 → 处理器下标列表，另存订阅全部事件的处理器。
//! `matching` 按全局注册顺序返回匹配的处理器，供消费者依次串行调用。
//!
use super::handler::{EventHandler, HandledEventType};
use crate::domain_event::DomainEvent;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct HandlerRegistry<E: DomainEvent> {
    handlers: Vec<Arc<dyn EventHandler<E>>>,
    by_type: HashMap<String, Vec<usize>>,
    all: Vec<usize>,
}

impl<E: DomainEvent> HandlerRegistry<E> {
    pub fn new(handlers: Vec<Arc<dyn EventHandler<E>>>) -> Self {
        let mut by_type: HashMap<String, Vec<usize>> = HashMap::new();
        let mut all: Vec<usize> = Vec::new();

        for (idx, h) in handlers.iter().enumerate() {
            match h.handled_event_type() {
                HandledEventType::All => all.push(idx),
                HandledEventType::One(t) => by_type.entry(t).or_default().push(idx),
                HandledEventType::Many(ts) => {
                    for t in ts {
                        let slot = by_type.entry(t).or_default();
                        if slot.last() != Some(&idx) {
                            slot.push(idx);
                        }
                    }
                }
            }
        }

        Self {
            handlers,
            by_type,
            all,
        }
    }

    /// 匹配 `event_type` 的处理器，按注册顺序排列
    pub fn matching(&self, event_type: &str) -> Vec<Arc<dyn EventHandler<E>>> {
        let mut idxs: Vec<usize> = self.by_type.get(event_type).cloned().unwrap_or_default();
        idxs.extend(self.all.iter().copied());
        idxs.sort_unstable();
        idxs.dedup();

        idxs.into_iter()
            .map(|idx| self.handlers[idx].clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::OrderEvent;
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct Named {
        name: &'static str,
        types: HandledEventType,
    }

    #[async_trait]
    impl EventHandler<OrderEvent> for Named {
        fn handler_name(&self) -> &str {
            self.name
        }
        fn handled_event_type(&self) -> HandledEventType {
            self.types.clone()
        }
        async fn handle(&self, _event: &OrderEvent, _cancel: &CancellationToken) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn named(name: &'static str, types: HandledEventType) -> Arc<dyn EventHandler<OrderEvent>> {
        Arc::new(Named { name, types })
    }

    fn names(handlers: &[Arc<dyn EventHandler<OrderEvent>>]) -> Vec<&str> {
        handlers.iter().map(|h| h.handler_name()).collect()
    }

    #[test]
    fn matching_keeps_registration_order_across_typed_and_catch_all() {
        let registry = HandlerRegistry::new(vec![
            named("audit", HandledEventType::All),
            named("billing", HandledEventType::One("order.placed".into())),
            named("shipping", HandledEventType::One("order.shipped".into())),
            named(
                "notify",
                HandledEventType::Many(vec!["order.placed".into(), "order.shipped".into()]),
            ),
            named("metrics", HandledEventType::All),
        ]);

        let placed = registry.matching("order.placed");
        assert_eq!(names(&placed), vec!["audit", "billing", "notify", "metrics"]);

        let shipped = registry.matching("order.shipped");
        assert_eq!(names(&shipped), vec!["audit", "shipping", "notify", "metrics"]);

        let unknown = registry.matching("order.cancelled");
        assert_eq!(names(&unknown), vec!["audit", "metrics"]);
    }

    #[test]
    fn duplicate_tags_do_not_run_a_handler_twice() {
        let registry = HandlerRegistry::new(vec![named(
            "dup",
            HandledEventType::Many(vec!["order.placed".into(), "order.placed".into()]),
        )]);

        assert_eq!(registry.matching("order.placed").len(), 1);
    }

    #[test]
    fn empty_registry_matches_nothing() {
        let registry: HandlerRegistry<OrderEvent> = HandlerRegistry::new(Vec::new());
        assert!(registry.is_empty());
        assert!(registry.matching("order.placed").is_empty());
    }

    #[test]
    fn handled_event_type_matches() {
        assert!(HandledEventType::All.matches("x"));
        assert!(HandledEventType::One("x".into()).matches("x"));
        assert!(!HandledEventType::One("x".into()).matches("y"));
        assert!(HandledEventType::Many(vec!["x".into(), "y".into()]).matches("y"));
    }
}
