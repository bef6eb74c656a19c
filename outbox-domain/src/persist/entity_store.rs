//! 实体存储（EntityStore）协议
//!
//! 消费者依赖的存储能力，刻意保持最小：
//! - 带投影与队首切片的过滤查询，结果以固定批大小的游标分批返回；
//! - 按标识重读（重新应用 `event_count > 0` 过滤）；
//! - 单文档原子更新（递增 + 追加，或递减 + 弹出队首）。
//!
use crate::entity::{EntityProjection, HasDomainEvents};
use crate::error::OutboxResult;
use crate::update::EntityUpdate;
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use std::sync::Arc;

/// 待处理实体的批量游标：每一项是一批（至多 `batch_size` 个）投影
pub type PendingCursor<T> = BoxStream<'static, OutboxResult<Vec<EntityProjection<T>>>>;

#[async_trait]
pub trait EntityStore<T>: Send + Sync
where
    T: HasDomainEvents,
{
    /// 打开游标，按批扫描 `event_count > 0` 的实体，仅投影标识、计数与队首事件
    async fn find_pending(&self, batch_size: usize) -> OutboxResult<PendingCursor<T>>;

    /// 按标识重读投影；实体不存在或 `event_count <= 0` 时返回 `None`
    async fn find_pending_by_id(&self, id: &T::Id) -> OutboxResult<Option<EntityProjection<T>>>;

    /// 以标识为过滤条件执行原子更新（不 upsert），返回是否命中实体
    async fn update_one(&self, id: &T::Id, update: EntityUpdate<T>) -> OutboxResult<bool>;
}

#[async_trait]
impl<T, S> EntityStore<T> for Arc<S>
where
    T: HasDomainEvents,
    S: EntityStore<T> + ?Sized,
{
    async fn find_pending(&self, batch_size: usize) -> OutboxResult<PendingCursor<T>> {
        (**self).find_pending(batch_size).await
    }

    async fn find_pending_by_id(&self, id: &T::Id) -> OutboxResult<Option<EntityProjection<T>>> {
        (**self).find_pending_by_id(id).await
    }

    async fn update_one(&self, id: &T::Id, update: EntityUpdate<T>) -> OutboxResult<bool> {
        (**self).update_one(id, update).await
    }
}
