//! PostgreSQL 实体存储（PgEntityStore）
//!
//! 每个集合一张表，事件计数与事件队列独立成列，其余业务字段保存在 `data` 中：
//!
//! ```sql
//! CREATE TABLE orders (
//!     id          TEXT PRIMARY KEY,
//!     event_count BIGINT NOT NULL DEFAULT 0 CHECK (event_count >= 0),
//!     event_queue JSONB  NOT NULL DEFAULT '[]'::jsonb,
//!     data        JSONB  NOT NULL DEFAULT '{}'::jsonb
//! );
//! CREATE INDEX orders_pending_idx ON orders (id) WHERE event_count > 0;
//! ```
//!
//! 追加：`event_count = event_count + n, event_queue = event_queue || $events`；
//! 确认：`event_count = event_count - 1, event_queue = event_queue - 0`。
//!
use super::document::projection;
use super::{EntityStore, PendingCursor};
use crate::entity::{EntityProjection, HasDomainEvents};
use crate::error::{OutboxError, OutboxResult};
use crate::update::EntityUpdate;
use async_trait::async_trait;
use futures_util::stream;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::marker::PhantomData;

/// PostgreSQL 实体存储实现
pub struct PgEntityStore<T: HasDomainEvents> {
    pool: PgPool,
    table: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: HasDomainEvents> Clone for PgEntityStore<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            table: self.table.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: HasDomainEvents> PgEntityStore<T> {
    /// 使用 `T::COLLECTION` 作为表名
    pub fn new(pool: PgPool) -> OutboxResult<Self> {
        Self::with_table(pool, T::COLLECTION)
    }

    /// 使用自定义表名（仅允许字母、数字与下划线）
    pub fn with_table(pool: PgPool, table: impl Into<String>) -> OutboxResult<Self> {
        let table = table.into();
        let valid = !table.is_empty()
            && !table.starts_with(|c: char| c.is_ascii_digit())
            && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(OutboxError::config(format!("invalid table name: {table}")));
        }

        Ok(Self {
            pool,
            table,
            _marker: PhantomData,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 创建集合表与待处理部分索引（幂等）
    pub async fn ensure_schema(&self) -> OutboxResult<()> {
        let table = &self.table;
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id          TEXT PRIMARY KEY,
                event_count BIGINT NOT NULL DEFAULT 0 CHECK (event_count >= 0),
                event_queue JSONB  NOT NULL DEFAULT '[]'::jsonb,
                data        JSONB  NOT NULL DEFAULT '{{}}'::jsonb
            )
            "#
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {table}_pending_idx ON {table} (id) WHERE event_count > 0"
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 写入（或整体替换）一个实体
    pub async fn insert(&self, entity: &T) -> OutboxResult<()>
    where
        T: Serialize,
    {
        let Value::Object(mut data) = serde_json::to_value(entity)? else {
            return Err(OutboxError::store(format!(
                "{} must serialize to a document",
                T::COLLECTION
            )));
        };
        data.remove(T::COUNT_FIELD);
        data.remove(T::QUEUE_FIELD);

        let queue = entity
            .event_queue()
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;

        sqlx::query(&format!(
            r#"
            INSERT INTO {} (id, event_count, event_queue, data)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET event_count = EXCLUDED.event_count,
                event_queue = EXCLUDED.event_queue,
                data = EXCLUDED.data
            "#,
            self.table
        ))
        .bind(entity.id().to_string())
        .bind(entity.event_count())
        .bind(Value::Array(queue))
        .bind(Value::Object(data))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 读取完整实体（由 `data`、计数与队列重新组装文档）
    pub async fn find_by_id(&self, id: &T::Id) -> OutboxResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let row = sqlx::query(&format!(
            "SELECT event_count, event_queue, data FROM {} WHERE id = $1",
            self.table
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut doc: Map<String, Value> = match row.try_get::<Value, _>("data")? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        doc.insert(
            T::COUNT_FIELD.to_string(),
            Value::from(row.try_get::<i64, _>("event_count")?),
        );
        doc.insert(
            T::QUEUE_FIELD.to_string(),
            row.try_get::<Value, _>("event_queue")?,
        );

        Ok(Some(serde_json::from_value(Value::Object(doc))?))
    }

    fn to_projection(row: &PgRow) -> OutboxResult<EntityProjection<T>> {
        let id: String = row.try_get("id")?;
        let event_count: i64 = row.try_get("event_count")?;
        let head: Option<Value> = row.try_get("head")?;
        projection::<T>(&id, event_count, head.as_ref())
    }
}

#[async_trait]
impl<T: HasDomainEvents> EntityStore<T> for PgEntityStore<T> {
    async fn find_pending(&self, batch_size: usize) -> OutboxResult<PendingCursor<T>> {
        if batch_size == 0 {
            return Err(OutboxError::store("batch size must be positive"));
        }

        let pool = self.pool.clone();
        let sql = format!(
            r#"
            SELECT id, event_count, event_queue -> 0 AS head
            FROM {}
            WHERE event_count > 0
              AND ($1::text IS NULL OR id > $1)
            ORDER BY id
            LIMIT $2
            "#,
            self.table
        );
        let limit = batch_size as i64;

        // keyset 分页：每批一次往返，游标状态为上一批最后一个标识
        let cursor = stream::try_unfold(Some(None::<String>), move |state| {
            let pool = pool.clone();
            let sql = sql.clone();
            async move {
                let Some(after) = state else {
                    return Ok(None);
                };

                let rows = sqlx::query(&sql)
                    .bind(after)
                    .bind(limit)
                    .fetch_all(&pool)
                    .await?;
                if rows.is_empty() {
                    return Ok(None);
                }

                let next = if rows.len() < batch_size {
                    None
                } else {
                    rows.last()
                        .map(|row| row.try_get::<String, _>("id"))
                        .transpose()?
                        .map(Some)
                };
                let batch = rows
                    .iter()
                    .map(Self::to_projection)
                    .collect::<OutboxResult<Vec<_>>>()?;

                Ok::<_, OutboxError>(Some((batch, next)))
            }
        });

        Ok(Box::pin(cursor))
    }

    async fn find_pending_by_id(&self, id: &T::Id) -> OutboxResult<Option<EntityProjection<T>>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT id, event_count, event_queue -> 0 AS head
            FROM {}
            WHERE id = $1 AND event_count > 0
            "#,
            self.table
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::to_projection).transpose()
    }

    async fn update_one(&self, id: &T::Id, update: EntityUpdate<T>) -> OutboxResult<bool> {
        update.validate()?;

        let pushed = update
            .pushed_events()
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;

        let result = sqlx::query(&format!(
            r#"
            UPDATE {}
            SET data = data || $2,
                event_count = event_count + $3,
                event_queue = (CASE WHEN $4 THEN event_queue - 0 ELSE event_queue END) || $5
            WHERE id = $1
            "#,
            self.table
        ))
        .bind(id.to_string())
        .bind(Value::Object(update.fields().clone()))
        .bind(update.event_count_delta())
        .bind(update.pops_first_event())
        .bind(Value::Array(pushed))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

// 需要可用的 PostgreSQL：设置 DATABASE_URL 后运行 `--features infra-sqlx`，未设置时跳过
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_event::DomainEvent;
    use crate::publisher::DomainEventPublisher;
    use crate::testing::{Order, placed, shipped};
    use futures_util::TryStreamExt;

    async fn scratch_store() -> Option<PgEntityStore<Order>> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let pool = PgPool::connect(&url).await.expect("connect to DATABASE_URL");
        let table = format!("orders_{}", ulid::Ulid::new().to_string().to_lowercase());
        let store = PgEntityStore::<Order>::with_table(pool, table).unwrap();
        store.ensure_schema().await.unwrap();
        Some(store)
    }

    async fn drop_table(store: PgEntityStore<Order>) {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", store.table))
            .execute(store.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn table_name_is_restricted_to_identifiers() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        assert!(PgEntityStore::<Order>::with_table(pool.clone(), "orders_2024").is_ok());
        assert!(PgEntityStore::<Order>::with_table(pool.clone(), "orders; DROP").is_err());
        assert!(PgEntityStore::<Order>::with_table(pool.clone(), "1orders").is_err());
        assert!(PgEntityStore::<Order>::with_table(pool, "").is_err());
    }

    #[tokio::test]
    async fn publish_then_acknowledge_updates_columns() {
        let Some(store) = scratch_store().await else {
            eprintln!("Skipping: DATABASE_URL not available");
            return;
        };
        store.insert(&Order::new("o-1", "alice")).await.unwrap();
        let id = "o-1".to_string();
        let (e1, e2) = (placed(5), shipped("ups"));

        let update = DomainEventPublisher::publish_events(
            EntityUpdate::new().set("customer", "bob"),
            [e1.clone(), e2.clone()],
        );
        assert!(store.update_one(&id, update).await.unwrap());

        let head = store.find_pending_by_id(&id).await.unwrap().unwrap();
        assert_eq!(head.event_count, 2);
        assert_eq!(head.head().map(|e| e.event_id()), Some(e1.event_id()));

        assert!(store.update_one(&id, EntityUpdate::acknowledge_head()).await.unwrap());
        let loaded = store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(loaded.customer, "bob");
        assert_eq!(loaded.event_count(), 1);
        assert_eq!(loaded.event_queue(), &[e2]);

        // 追加在尾部，队首不变
        let e3 = placed(7);
        let update = DomainEventPublisher::publish_event(EntityUpdate::new(), e3.clone());
        assert!(store.update_one(&id, update).await.unwrap());
        let loaded = store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(loaded.event_count(), 2);
        assert_eq!(loaded.event_queue()[1], e3);

        let ghost = DomainEventPublisher::publish_event(EntityUpdate::new(), placed(1));
        assert!(!store.update_one(&"ghost".to_string(), ghost).await.unwrap());

        drop_table(store).await;
    }

    #[tokio::test]
    async fn pending_cursor_pages_by_id() {
        let Some(store) = scratch_store().await else {
            eprintln!("Skipping: DATABASE_URL not available");
            return;
        };
        for i in 0..7 {
            store
                .insert(&Order::with_events(&format!("o-{i}"), 1, vec![placed(i)]))
                .await
                .unwrap();
        }
        store
            .insert(&Order::with_events("o-zero", 0, vec![placed(99)]))
            .await
            .unwrap();

        let batches: Vec<_> = store.find_pending(3).await.unwrap().try_collect().await.unwrap();
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);

        let ids: Vec<String> = batches.into_iter().flatten().map(|p| p.id).collect();
        let expected: Vec<String> = (0..7).map(|i| format!("o-{i}")).collect();
        assert_eq!(ids, expected);
        assert!(store.find_pending_by_id(&"o-zero".to_string()).await.unwrap().is_none());

        drop_table(store).await;
    }
}
