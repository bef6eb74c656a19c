//! 实体更新规格（EntityUpdate）
//!
//! 描述一次针对单个实体文档的原子更新：调用方设置业务字段，发布器追加事件并递增计数，
//! 消费者确认时递减计数并弹出队首。规格本身不做 I/O，由 `EntityStore::update_one` 执行。
//!
use crate::entity::HasDomainEvents;
use crate::error::{OutboxError, OutboxResult};
use serde_json::{Map, Value};
use std::fmt;

/// 单文档原子更新规格
pub struct EntityUpdate<T: HasDomainEvents> {
    set: Map<String, Value>,
    inc_event_count: i64,
    push_events: Vec<T::Event>,
    pop_first_event: bool,
}

impl<T: HasDomainEvents> EntityUpdate<T> {
    pub fn new() -> Self {
        Self {
            set: Map::new(),
            inc_event_count: 0,
            push_events: Vec::new(),
            pop_first_event: false,
        }
    }

    /// 设置业务字段（等价于文档存储的 `$set`）
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    /// 确认队首事件：计数减一并弹出队列第一个元素（仅消费者使用）
    pub(crate) fn acknowledge_head() -> Self {
        Self {
            inc_event_count: -1,
            pop_first_event: true,
            ..Self::new()
        }
    }

    pub(crate) fn increment_event_count(mut self, by: i64) -> Self {
        self.inc_event_count += by;
        self
    }

    pub(crate) fn push_events(mut self, events: impl IntoIterator<Item = T::Event>) -> Self {
        self.push_events.extend(events);
        self
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.set
    }

    pub fn event_count_delta(&self) -> i64 {
        self.inc_event_count
    }

    pub fn pushed_events(&self) -> &[T::Event] {
        &self.push_events
    }

    pub fn pops_first_event(&self) -> bool {
        self.pop_first_event
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
            && self.inc_event_count == 0
            && self.push_events.is_empty()
            && !self.pop_first_event
    }

    /// 校验更新规格：标识、计数与队列字段只能由发布器与消费者修改
    pub fn validate(&self) -> OutboxResult<()> {
        for owned in [T::ID_FIELD, T::COUNT_FIELD, T::QUEUE_FIELD] {
            if self.set.contains_key(owned) {
                return Err(OutboxError::invalid_update(format!(
                    "field `{owned}` of {} cannot be set directly",
                    T::COLLECTION
                )));
            }
        }

        if self.pop_first_event && !self.push_events.is_empty() {
            return Err(OutboxError::invalid_update(
                "cannot push and pop the event queue in one update",
            ));
        }

        Ok(())
    }
}

impl<T: HasDomainEvents> Default for EntityUpdate<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: HasDomainEvents> fmt::Debug for EntityUpdate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityUpdate")
            .field("collection", &T::COLLECTION)
            .field("set", &self.set)
            .field("inc_event_count", &self.inc_event_count)
            .field("push_events", &self.push_events)
            .field("pop_first_event", &self.pop_first_event)
            .finish()
    }
}
