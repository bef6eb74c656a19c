//! 消费者配置（ConsumerConfig）
//!
//! 扫描批大小、并发度、锁持有/等待时长与轮询间隔；支持从环境变量加载。
//!
use crate::error::{OutboxError, OutboxResult};
use crate::lock::LockOptions;
use std::time::Duration;

pub const ENV_BATCH_SIZE: &str = "OUTBOX_BATCH_SIZE";
pub const ENV_CONCURRENCY: &str = "OUTBOX_CONCURRENCY";
pub const ENV_LOCK_HOLD_MS: &str = "OUTBOX_LOCK_HOLD_MS";
pub const ENV_LOCK_WAIT_MS: &str = "OUTBOX_LOCK_WAIT_MS";
pub const ENV_LOCK_RETRY_MS: &str = "OUTBOX_LOCK_RETRY_MS";
pub const ENV_POLL_INTERVAL_MS: &str = "OUTBOX_POLL_INTERVAL_MS";

/// 消费者配置
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConsumerConfig {
    /// 每批拉取的候选实体数
    pub batch_size: usize,
    /// 单批内并发处理的实体数
    pub concurrency: usize,
    /// 实体锁的最长持有时间（持有者崩溃后到期释放）
    pub lock_hold: Duration,
    /// 获取实体锁的最长等待时间
    pub lock_wait: Duration,
    /// 等待期间重试获取锁的间隔
    pub lock_retry_interval: Duration,
    /// `run` 两次扫描之间的间隔
    pub poll_interval: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            concurrency: 10,
            lock_hold: Duration::from_secs(60),
            lock_wait: Duration::from_secs(60),
            lock_retry_interval: Duration::from_millis(100),
            poll_interval: Duration::from_secs(5),
        }
    }
}

impl ConsumerConfig {
    /// 从进程环境变量加载，未设置的项使用默认值
    pub fn from_env() -> OutboxResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 从任意键值来源加载（`from_env` 的可测试形式）
    pub fn from_lookup<F>(lookup: F) -> OutboxResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            batch_size: parse_or(&lookup, ENV_BATCH_SIZE, defaults.batch_size)?,
            concurrency: parse_or(&lookup, ENV_CONCURRENCY, defaults.concurrency)?,
            lock_hold: millis_or(&lookup, ENV_LOCK_HOLD_MS, defaults.lock_hold)?,
            lock_wait: millis_or(&lookup, ENV_LOCK_WAIT_MS, defaults.lock_wait)?,
            lock_retry_interval: millis_or(
                &lookup,
                ENV_LOCK_RETRY_MS,
                defaults.lock_retry_interval,
            )?,
            poll_interval: millis_or(&lookup, ENV_POLL_INTERVAL_MS, defaults.poll_interval)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> OutboxResult<()> {
        if self.batch_size == 0 {
            return Err(OutboxError::config("batch_size must be greater than 0"));
        }
        if self.concurrency == 0 {
            return Err(OutboxError::config("concurrency must be greater than 0"));
        }
        if self.lock_hold.is_zero() {
            return Err(OutboxError::config("lock_hold must be greater than 0"));
        }
        if self.poll_interval.is_zero() {
            return Err(OutboxError::config("poll_interval must be greater than 0"));
        }
        if self.lock_retry_interval.is_zero() {
            return Err(OutboxError::config(
                "lock_retry_interval must be greater than 0",
            ));
        }
        Ok(())
    }

    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            hold: self.lock_hold,
            wait: self.lock_wait,
            retry_interval: self.lock_retry_interval,
        }
    }
}

fn parse_or<F>(lookup: &F, name: &str, default: usize) -> OutboxResult<usize>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| OutboxError::config(format!("{name}={raw:?}: {e}"))),
    }
}

fn millis_or<F>(lookup: &F, name: &str, default: Duration) -> OutboxResult<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| OutboxError::config(format!("{name}={raw:?}: {e}"))),
    }
}
