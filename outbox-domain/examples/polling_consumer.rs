/// 轮询消费者（内存版）示例
/// 展示 发布事件 -> 后台扫描 -> 处理器 -> 出队 的闭环，以及处理器失败后在下个周期的重放
///
/// 运行：`RUST_LOG=outbox_domain=debug,polling_consumer=info cargo run --example polling_consumer`
use anyhow::Result as AnyResult;
use chrono::Utc;
use outbox_domain::domain_event::DomainEvent;
use outbox_domain::entity::HasDomainEvents;
use outbox_domain::eventing::{ConsumerConfig, DomainEventConsumer, EventHandler, HandledEventType};
use outbox_domain::lock::{InMemoryLockProvider, LockProvider};
use outbox_domain::persist::{EntityStore, InMemoryEntityStore};
use outbox_domain::publisher::DomainEventPublisher;
use outbox_domain::update::EntityUpdate;
use outbox_macros::{domain_event, entity_with_events};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

// ============================================================================
// 实体与事件
// ============================================================================

#[domain_event]
enum AccountEvent {
    #[event(event_type = "account.opened")]
    Opened { owner: String },
    #[event(event_type = "account.deposited")]
    Deposited { amount: i64 },
}

#[entity_with_events(event = AccountEvent, collection = "accounts")]
struct Account {
    owner: String,
    balance: i64,
}

fn event_id() -> String {
    ulid::Ulid::new().to_string()
}

// ============================================================================
// 处理器
// ============================================================================

struct WelcomeMailer;

#[async_trait::async_trait]
impl EventHandler<AccountEvent> for WelcomeMailer {
    fn handler_name(&self) -> &str {
        "welcome_mailer"
    }

    fn handled_event_type(&self) -> HandledEventType {
        HandledEventType::One("account.opened".into())
    }

    async fn handle(&self, event: &AccountEvent, _cancel: &CancellationToken) -> AnyResult<()> {
        if let AccountEvent::Opened { owner, .. } = event {
            tracing::info!(%owner, "sending welcome mail");
        }
        Ok(())
    }
}

/// 第一次处理存款事件时失败，模拟下游短暂不可用
struct FlakyLedger {
    attempts: AtomicUsize,
}

#[async_trait::async_trait]
impl EventHandler<AccountEvent> for FlakyLedger {
    fn handler_name(&self) -> &str {
        "ledger"
    }

    fn handled_event_type(&self) -> HandledEventType {
        HandledEventType::One("account.deposited".into())
    }

    async fn handle(&self, event: &AccountEvent, _cancel: &CancellationToken) -> AnyResult<()> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            anyhow::bail!("ledger temporarily unavailable");
        }
        tracing::info!(event_id = event.event_id(), "ledger entry written");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,outbox_domain=debug")),
        )
        .init();

    // 配置可由 OUTBOX_* 环境变量覆盖；示例里把轮询间隔缩短以便观察
    let config = ConsumerConfig {
        poll_interval: Duration::from_millis(200),
        ..ConsumerConfig::from_env()?
    };

    let store = InMemoryEntityStore::<Account>::new();
    let account = Account {
        id: "acc-1".to_string(),
        event_count: 0,
        event_queue: Vec::new(),
        owner: "alice".to_string(),
        balance: 0,
    };
    store.insert(&account)?;

    // 业务写入与事件追加在同一次原子更新中提交
    let update = DomainEventPublisher::publish_events(
        EntityUpdate::new().set("balance", 100),
        [
            AccountEvent::Opened {
                event_id: event_id(),
                created_at: Utc::now(),
                owner: account.owner.clone(),
            },
            AccountEvent::Deposited {
                event_id: event_id(),
                created_at: Utc::now(),
                amount: 100,
            },
        ],
    );
    store.update_one(account.id(), update).await?;

    let entity_store: Arc<dyn EntityStore<Account>> = Arc::new(store.clone());
    let lock_provider: Arc<dyn LockProvider> = Arc::new(InMemoryLockProvider::new());
    let handlers: Vec<Arc<dyn EventHandler<AccountEvent>>> = vec![
        Arc::new(WelcomeMailer),
        Arc::new(FlakyLedger {
            attempts: AtomicUsize::new(0),
        }),
    ];
    let consumer = Arc::new(
        DomainEventConsumer::<Account>::builder()
            .entity_store(entity_store)
            .lock_provider(lock_provider)
            .event_handlers(handlers)
            .config(config)
            .build(),
    );

    let handle = consumer.start();

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match store.find_by_id(&"acc-1".to_string()) {
                Ok(Some(acc)) if acc.event_count() == 0 => break,
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await?;

    if let Some(acc) = store.find_by_id(&"acc-1".to_string())? {
        tracing::info!(
            owner = %acc.owner,
            balance = acc.balance,
            pending = acc.event_count(),
            "all domain events dispatched"
        );
    }

    handle.shutdown();
    handle.join().await;
    Ok(())
}
