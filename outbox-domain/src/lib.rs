//! 领域事件 Outbox 库（outbox-domain）
//!
//! 以“事件随实体一起持久化、后台轮询投递”的方式实现领域事件的至少一次分发：
//! - 实体能力（`entity`）：实体携带 `event_count` 计数与 FIFO `event_queue`；
//! - 领域事件（`domain_event`）与更新规格（`update`）、发布器（`publisher`）；
//! - 实体存储（`persist`）：游标扫描、按标识重读、单文档原子更新；
//! - 分布式锁（`lock`）：保证同一实体同一时刻只被一个消费者处理；
//! - 事件消费（`eventing`）：处理器链与轮询消费者。
//!
//! 典型用法：
//! 1. 用 `#[entity_with_events]` / `#[domain_event]` 定义实体与事件；
//! 2. 写入业务数据时通过 `DomainEventPublisher` 把事件追加到同一次更新中；
//! 3. 选择 `persist` 与 `lock` 的实现，注册处理器并构建 `DomainEventConsumer`；
//! 4. 调用 `start()` 在后台周期消费，或在自有调度中调用 `run_cycle()`。
//!
//! 投递语义为至少一次，处理器需要幂等；同一实体内严格按追加顺序处理，跨实体无顺序保证。
//!
pub mod domain_event;
pub mod entity;
pub mod error;
pub mod eventing;
pub mod lock;
pub mod persist;
pub mod publisher;
pub mod update;

#[cfg(test)]
pub(crate) mod testing;

// 允许在本 crate 内部通过 ::outbox_domain 进行自引用，
// 以便过程宏在本 crate 的单元测试中也能解析到 ::outbox_domain 路径。
extern crate self as outbox_domain;
