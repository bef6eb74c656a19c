//! 内存版实体存储（InMemoryEntityStore）
//!
//! 以 `serde_json::Value` 文档保存实体，按标识有序存放，满足 `EntityStore` 协议：
//! - `find_pending`：按标识做 keyset 分页，每次拉取一批，不一次性物化全部结果；
//! - `update_one`：在写锁内对单个文档原子地应用更新规格；
//! - 典型用途：测试环境、示例与本地开发。
//!
use super::document::{event_count_of, projection, queue_head_of};
use super::{EntityStore, PendingCursor};
use crate::entity::{EntityProjection, HasDomainEvents};
use crate::error::{OutboxError, OutboxResult};
use crate::update::EntityUpdate;
use async_trait::async_trait;
use futures_util::stream;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::ops::Bound;
use std::sync::{Arc, PoisonError, RwLock};

type Documents = Arc<RwLock<BTreeMap<String, Value>>>;

/// 简单的内存实体存储实现
pub struct InMemoryEntityStore<T: HasDomainEvents> {
    docs: Documents,
    _marker: PhantomData<fn() -> T>,
}

impl<T: HasDomainEvents> Clone for InMemoryEntityStore<T> {
    fn clone(&self) -> Self {
        Self {
            docs: self.docs.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: HasDomainEvents> Default for InMemoryEntityStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: HasDomainEvents> InMemoryEntityStore<T> {
    pub fn new() -> Self {
        Self {
            docs: Arc::new(RwLock::new(BTreeMap::new())),
            _marker: PhantomData,
        }
    }

    /// 写入（或整体替换）一个实体文档
    pub fn insert(&self, entity: &T) -> OutboxResult<()>
    where
        T: Serialize,
    {
        let mut doc = serde_json::to_value(entity)?;
        let Some(fields) = doc.as_object_mut() else {
            return Err(OutboxError::store(format!(
                "{} must serialize to a document",
                T::COLLECTION
            )));
        };
        fields
            .entry(T::COUNT_FIELD)
            .or_insert_with(|| Value::from(0));
        fields
            .entry(T::QUEUE_FIELD)
            .or_insert_with(|| Value::Array(Vec::new()));

        self.docs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entity.id().to_string(), doc);
        Ok(())
    }

    /// 读取完整实体
    pub fn find_by_id(&self, id: &T::Id) -> OutboxResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let doc = self
            .docs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id.to_string())
            .cloned();

        doc.map(serde_json::from_value)
            .transpose()
            .map_err(OutboxError::from)
    }

    pub fn len(&self) -> usize {
        self.docs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // 取出标识大于 `after` 的下一批待处理文档投影
    fn next_batch(
        docs: &Documents,
        after: Option<&str>,
        batch_size: usize,
    ) -> OutboxResult<Vec<EntityProjection<T>>> {
        let guard = docs.read().unwrap_or_else(PoisonError::into_inner);
        let lower = match after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };

        guard
            .range::<str, _>((lower, Bound::Unbounded))
            .filter(|(_, doc)| event_count_of::<T>(doc) > 0)
            .take(batch_size)
            .map(|(key, doc)| projection::<T>(key, event_count_of::<T>(doc), queue_head_of::<T>(doc)))
            .collect()
    }
}

enum CursorState {
    Start,
    After(String),
    Done,
}

#[async_trait]
impl<T: HasDomainEvents> EntityStore<T> for InMemoryEntityStore<T> {
    async fn find_pending(&self, batch_size: usize) -> OutboxResult<PendingCursor<T>> {
        if batch_size == 0 {
            return Err(OutboxError::store("batch size must be positive"));
        }

        let docs = self.docs.clone();
        let cursor = stream::try_unfold(CursorState::Start, move |state| {
            let docs = docs.clone();
            async move {
                let after = match state {
                    CursorState::Done => return Ok(None),
                    CursorState::Start => None,
                    CursorState::After(key) => Some(key),
                };

                let batch = Self::next_batch(&docs, after.as_deref(), batch_size)?;
                if batch.is_empty() {
                    return Ok(None);
                }

                let next = if batch.len() < batch_size {
                    CursorState::Done
                } else {
                    batch
                        .last()
                        .map(|p| CursorState::After(p.id.to_string()))
                        .unwrap_or(CursorState::Done)
                };
                Ok::<_, OutboxError>(Some((batch, next)))
            }
        });

        Ok(Box::pin(cursor))
    }

    async fn find_pending_by_id(&self, id: &T::Id) -> OutboxResult<Option<EntityProjection<T>>> {
        let key = id.to_string();
        let guard = self.docs.read().unwrap_or_else(PoisonError::into_inner);

        match guard.get(&key) {
            Some(doc) if event_count_of::<T>(doc) > 0 => Ok(Some(projection::<T>(
                &key,
                event_count_of::<T>(doc),
                queue_head_of::<T>(doc),
            )?)),
            _ => Ok(None),
        }
    }

    async fn update_one(&self, id: &T::Id, update: EntityUpdate<T>) -> OutboxResult<bool> {
        update.validate()?;

        let pushed = update
            .pushed_events()
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;

        let mut guard = self.docs.write().unwrap_or_else(PoisonError::into_inner);
        let Some(doc) = guard.get_mut(&id.to_string()) else {
            return Ok(false);
        };

        let count = event_count_of::<T>(doc) + update.event_count_delta();
        if count < 0 {
            return Err(OutboxError::invalid_update(format!(
                "{} of {} {} would become negative",
                T::COUNT_FIELD,
                T::COLLECTION,
                id
            )));
        }

        let Some(fields) = doc.as_object_mut() else {
            return Err(OutboxError::store(format!(
                "{} {} is not a document",
                T::COLLECTION,
                id
            )));
        };
        if fields.get(T::QUEUE_FIELD).is_some_and(|q| !q.is_array()) {
            return Err(OutboxError::store(format!(
                "{} of {} {} is not an array",
                T::QUEUE_FIELD,
                T::COLLECTION,
                id
            )));
        }

        // 以下修改在写锁内一次完成，对其它读者而言是原子的
        for (field, value) in update.fields() {
            fields.insert(field.clone(), value.clone());
        }
        fields.insert(T::COUNT_FIELD.to_string(), Value::from(count));

        if let Value::Array(queue) = fields
            .entry(T::QUEUE_FIELD)
            .or_insert_with(|| Value::Array(Vec::new()))
        {
            if update.pops_first_event() && !queue.is_empty() {
                queue.remove(0);
            }
            queue.extend(pushed);
        }

        Ok(true)
    }
}
