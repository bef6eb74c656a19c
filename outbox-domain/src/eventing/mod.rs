//! 事件消费（eventing）
//!
//! - `EventHandler` / `HandlerRegistry`：按事件类型路由的处理器链；
//! - `DomainEventConsumer`：扫描 → 加锁 → 重读 → 分发 → 确认的轮询消费者；
//! - `ConsumerConfig`：批大小、并发度、锁与轮询参数。
//!
mod config;
mod consumer;
mod handler;
mod registry;

pub use config::ConsumerConfig;
pub use consumer::{ConsumerHandle, CycleReport, DispatchOutcome, DomainEventConsumer};
pub use handler::{EventHandler, HandledEventType};
pub use registry::HandlerRegistry;
