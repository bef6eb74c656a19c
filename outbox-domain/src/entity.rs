//! 带领域事件的实体（Entity-with-events）能力抽象
//!
//! 任何持久化聚合只要携带以下三部分即可接入 outbox：
//! - `id`：集合内唯一的标识；
//! - `event_count`：待处理事件计数，扫描时作为“是否有待办”的权威过滤条件；
//! - `event_queue`：FIFO 事件队列，下标 0 为最早、下一个待处理的事件。
//!
//! 计数与队列只允许由发布器（追加）和消费者（弹出）原子地修改。
//!
use crate::domain_event::DomainEvent;
use std::{fmt, str::FromStr};

/// 实体标识类型需要满足的能力：可克隆、可显示，且可由字符串解析回来
pub trait EntityId: Clone + fmt::Debug + fmt::Display + FromStr + Send + Sync + 'static {}

impl<T> EntityId for T where T: Clone + fmt::Debug + fmt::Display + FromStr + Send + Sync + 'static {}

/// 携带领域事件队列的实体
pub trait HasDomainEvents: Send + Sync + 'static {
    /// 实体标识类型
    type Id: EntityId;
    /// 事件类型（通常是一个由 `#[domain_event]` 标注的枚举）
    type Event: DomainEvent;

    /// 实体类型名，用于锁键与集合（表）名
    const COLLECTION: &'static str;

    /// 文档中标识字段的名称
    const ID_FIELD: &'static str = "id";
    /// 文档中事件计数字段的名称
    const COUNT_FIELD: &'static str = "event_count";
    /// 文档中事件队列字段的名称
    const QUEUE_FIELD: &'static str = "event_queue";

    fn id(&self) -> &Self::Id;

    fn event_count(&self) -> i64;

    fn event_queue(&self) -> &[Self::Event];
}

/// 扫描与重读时使用的投影：仅包含标识、计数与队首切片（至多一个事件）
#[derive(Debug, Clone, PartialEq)]
pub struct EventProjection<Id, E> {
    pub id: Id,
    pub event_count: i64,
    pub events: Vec<E>,
}

impl<Id, E> EventProjection<Id, E> {
    /// 队首事件（若投影中存在）
    pub fn head(&self) -> Option<&E> {
        self.events.first()
    }

    pub fn into_head(self) -> Option<E> {
        self.events.into_iter().next()
    }
}

/// 针对实体 `T` 的投影别名
pub type EntityProjection<T> =
    EventProjection<<T as HasDomainEvents>::Id, <T as HasDomainEvents>::Event>;
