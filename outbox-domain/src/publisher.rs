//! 领域事件发布器（DomainEventPublisher）
//!
//! 在调用方正在构建的更新规格上追加事件：计数递增、事件按提交顺序追加到队尾。
//! 纯转换，无 I/O；由调用方随自己的业务写入一起提交。
//!
use crate::entity::HasDomainEvents;
use crate::update::EntityUpdate;
use std::marker::PhantomData;

/// 面向实体 `T` 的事件发布器
pub struct DomainEventPublisher<T: HasDomainEvents> {
    _marker: PhantomData<T>,
}

impl<T: HasDomainEvents> DomainEventPublisher<T> {
    /// 追加单个事件：计数 +1，事件追加到队尾
    pub fn publish_event(update: EntityUpdate<T>, event: T::Event) -> EntityUpdate<T> {
        update.increment_event_count(1).push_events([event])
    }

    /// 追加一批事件：计数增加批量大小，批内顺序保持不变
    pub fn publish_events(
        update: EntityUpdate<T>,
        events: impl IntoIterator<Item = T::Event>,
    ) -> EntityUpdate<T> {
        let events: Vec<T::Event> = events.into_iter().collect();
        let count = events.len() as i64;
        update.increment_event_count(count).push_events(events)
    }
}
