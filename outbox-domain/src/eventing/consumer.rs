//! 领域事件消费者（DomainEventConsumer）
//!
//! 单次扫描周期（`run_cycle`）的流程：
//! - 以游标分批扫描 `event_count > 0` 的实体，批内按 `concurrency` 并发处理；
//! - 对每个候选实体获取分布式锁，锁内重读最新状态；
//! - 取队首事件，按注册顺序依次调用匹配的处理器；
//! - 全部成功后原子地 `event_count - 1` 并弹出队首；任一失败则保持原状，等待下个周期重放。
//!
//! `run` / `start` 在此基础上提供周期调度与可关闭的运行句柄。
//!
use super::config::ConsumerConfig;
use super::handler::EventHandler;
use super::registry::HandlerRegistry;
use crate::domain_event::DomainEvent;
use crate::entity::{EntityProjection, HasDomainEvents};
use crate::error::{OutboxError, OutboxResult};
use crate::lock::{self, LockProvider, entity_lock_key};
use crate::persist::EntityStore;
use crate::update::EntityUpdate;
use bon::Builder;
use futures_util::{StreamExt, TryStreamExt, stream};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info_span, warn};

use self::domain_event_consumer_builder::{IsUnset, SetRegistry, State as BuilderState};

/// 单个候选实体在一个周期内的处理结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 处理器全部成功且已确认（出队）
    Dispatched,
    /// 锁被占用或等待超时
    LockDenied,
    /// 加锁后重读发现已无待处理事件
    Stale,
    /// 处理器失败或确认失败，事件保留在队首
    Failed,
    /// 未注册任何处理器，事件保留在队首
    Misconfigured,
    /// 取消信号先于确认到达
    Cancelled,
}

/// 扫描周期汇总
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub batches: usize,
    pub dispatched: usize,
    pub lock_denied: usize,
    pub stale: usize,
    pub failed: usize,
    pub misconfigured: usize,
    pub cancelled: usize,
    interrupted: bool,
}

impl CycleReport {
    fn record(&mut self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::Dispatched => self.dispatched += 1,
            DispatchOutcome::LockDenied => self.lock_denied += 1,
            DispatchOutcome::Stale => self.stale += 1,
            DispatchOutcome::Failed => self.failed += 1,
            DispatchOutcome::Misconfigured => self.misconfigured += 1,
            DispatchOutcome::Cancelled => {
                self.cancelled += 1;
                self.interrupted = true;
            }
        }
    }

    /// 本周期处理过的候选实体总数
    pub fn candidates(&self) -> usize {
        self.dispatched
            + self.lock_denied
            + self.stale
            + self.failed
            + self.misconfigured
            + self.cancelled
    }

    /// 周期是否因取消而提前结束
    pub fn is_cancelled(&self) -> bool {
        self.interrupted
    }
}

/// DomainEventConsumer：
/// - 轮询实体存储中积压的领域事件
/// - 借助分布式锁保证同一实体同一时刻只被一个实例处理
/// - 逐实体按 FIFO 投递给处理器，成功后出队
#[derive(Builder)]
pub struct DomainEventConsumer<T: HasDomainEvents> {
    entity_store: Arc<dyn EntityStore<T>>,
    lock_provider: Arc<dyn LockProvider>,
    #[builder(setters(vis = "pub(crate)"))]
    registry: HandlerRegistry<T::Event>,
    #[builder(default)]
    config: ConsumerConfig,
}

// 自定义 Builder 方法：接收 handlers，内部转换为 HandlerRegistry。
// 受 typestate 限制，仅当 `registry` 尚未设置时可调用。
impl<T: HasDomainEvents, S: BuilderState> DomainEventConsumerBuilder<T, S> {
    pub fn event_handlers(
        self,
        handlers: Vec<Arc<dyn EventHandler<T::Event>>>,
    ) -> DomainEventConsumerBuilder<T, SetRegistry<S>>
    where
        <S as BuilderState>::Registry: IsUnset,
    {
        self.registry(HandlerRegistry::new(handlers))
    }
}

impl<T: HasDomainEvents> DomainEventConsumer<T> {
    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// 执行一次完整扫描。处理器失败只影响对应实体；存储或锁服务的错误会中止本周期
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> OutboxResult<CycleReport> {
        self.config.validate()?;

        let mut report = CycleReport::default();
        if cancel.is_cancelled() {
            report.interrupted = true;
            return Ok(report);
        }

        let mut cursor = self.entity_store.find_pending(self.config.batch_size).await?;

        loop {
            let batch = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    report.interrupted = true;
                    break;
                }
                next = cursor.next() => match next {
                    Some(batch) => batch?,
                    None => break,
                },
            };

            report.batches += 1;
            debug!(
                collection = T::COLLECTION,
                candidates = batch.len(),
                "processing pending batch"
            );

            // 当前批全部完成后才拉取下一批
            report = stream::iter(batch)
                .map(|candidate| self.process(candidate, cancel))
                .buffer_unordered(self.config.concurrency)
                .try_fold(report, |mut report, outcome| async move {
                    report.record(outcome);
                    Ok::<_, OutboxError>(report)
                })
                .await?;

            if cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }
        }

        Ok(report)
    }

    /// 按 `poll_interval` 周期执行扫描，直到取消。单个周期的致命错误只记录，下个周期重试
    pub async fn run(&self, cancel: &CancellationToken) -> OutboxResult<()> {
        self.config.validate()?;

        let mut ticker = time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => match self.run_cycle(cancel).await {
                    Ok(report) if report.candidates() > 0 => {
                        debug!(collection = T::COLLECTION, ?report, "scan cycle finished");
                    }
                    Ok(_) => {}
                    Err(err) => {
                        error!(collection = T::COLLECTION, error = %err, "scan cycle failed");
                    }
                },
            }
        }

        Ok(())
    }

    /// 在后台任务中运行消费者，返回可用于关闭/等待的句柄
    pub fn start(self: Arc<Self>) -> ConsumerHandle {
        let token = CancellationToken::new();
        let task = tokio::spawn({
            let token = token.clone();
            async move {
                if let Err(err) = self.run(&token).await {
                    error!(collection = T::COLLECTION, error = %err, "consumer stopped");
                }
            }
        });

        ConsumerHandle {
            token,
            tasks: vec![task],
        }
    }

    async fn process(
        &self,
        candidate: EntityProjection<T>,
        cancel: &CancellationToken,
    ) -> OutboxResult<DispatchOutcome> {
        let key = entity_lock_key::<T>(&candidate.id);
        let guard = lock::acquire(
            &self.lock_provider,
            &key,
            &self.config.lock_options(),
            cancel,
        )
        .await?;

        let Some(guard) = guard else {
            if cancel.is_cancelled() {
                return Ok(DispatchOutcome::Cancelled);
            }
            debug!(lock_key = %key, "entity locked elsewhere, skipped");
            return Ok(DispatchOutcome::LockDenied);
        };

        let outcome = self.dispatch_locked(&candidate.id, cancel).await;

        guard.release().await;
        outcome
    }

    async fn dispatch_locked(
        &self,
        id: &T::Id,
        cancel: &CancellationToken,
    ) -> OutboxResult<DispatchOutcome> {
        // 扫描结果可能已过期，以锁内重读为准
        let Some(event) = self
            .entity_store
            .find_pending_by_id(id)
            .await?
            .and_then(|current| current.into_head())
        else {
            debug!(
                collection = T::COLLECTION,
                entity_id = %id,
                "no pending event after lock, skipped"
            );
            return Ok(DispatchOutcome::Stale);
        };

        if self.registry.is_empty() {
            error!(
                collection = T::COLLECTION,
                entity_id = %id,
                event_type = event.event_type(),
                "no domain event handlers registered, event left in queue"
            );
            return Ok(DispatchOutcome::Misconfigured);
        }

        let span = info_span!(
            "domain_event",
            collection = T::COLLECTION,
            entity_id = %id,
            event_type = event.event_type(),
            event_id = event.event_id(),
        );

        Ok(self.dispatch_event(id, &event, cancel).instrument(span).await)
    }

    async fn dispatch_event(
        &self,
        id: &T::Id,
        event: &T::Event,
        cancel: &CancellationToken,
    ) -> DispatchOutcome {
        let handled = tokio::select! {
            biased;
            _ = cancel.cancelled() => return DispatchOutcome::Cancelled,
            handled = self.run_handlers(event, cancel) => handled,
        };
        if !handled {
            return DispatchOutcome::Failed;
        }

        if cancel.is_cancelled() {
            return DispatchOutcome::Cancelled;
        }

        // 确认一旦发出就等待其完成，已提交的出队不能被报告为取消
        match self
            .entity_store
            .update_one(id, EntityUpdate::acknowledge_head())
            .await
        {
            Ok(true) => {
                debug!("domain event acknowledged");
                DispatchOutcome::Dispatched
            }
            Ok(false) => {
                warn!("entity vanished before acknowledgment");
                DispatchOutcome::Failed
            }
            Err(err) => {
                error!(error = %err, "failed to acknowledge domain event");
                DispatchOutcome::Failed
            }
        }
    }

    /// 按注册顺序执行匹配的处理器，首个失败即中止
    async fn run_handlers(&self, event: &T::Event, cancel: &CancellationToken) -> bool {
        for handler in self.registry.matching(event.event_type()) {
            if let Err(err) = handler.handle(event, cancel).await {
                error!(
                    handler = handler.handler_name(),
                    error = %format_args!("{err:#}"),
                    "domain event handler failed"
                );
                return false;
            }
        }
        true
    }
}

/// 消费者运行句柄：用于优雅关闭与等待任务结束
pub struct ConsumerHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ConsumerHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn join(mut self) {
        let tasks = std::mem::take(&mut self.tasks);

        for t in tasks {
            let _ = t.await;
        }
    }
}

impl Drop for ConsumerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts_every_outcome() {
        let mut report = CycleReport::default();
        for outcome in [
            DispatchOutcome::Dispatched,
            DispatchOutcome::Dispatched,
            DispatchOutcome::LockDenied,
            DispatchOutcome::Stale,
            DispatchOutcome::Failed,
            DispatchOutcome::Misconfigured,
        ] {
            report.record(outcome);
        }

        assert_eq!(report.dispatched, 2);
        assert_eq!(report.candidates(), 6);
        assert!(!report.is_cancelled());

        report.record(DispatchOutcome::Cancelled);
        assert_eq!(report.cancelled, 1);
        assert!(report.is_cancelled());
    }
}
