//! 订阅/发布观察者
//!
//! 每个订阅注入一个观察者，记录本进程内已处理、已发布的事件。
//! 仅用于观测与测试，不作为投递去重依据。

use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Notify;

use super::schema::EventSchema;

/// 投递生命周期观察者
pub trait DeliveryObserver: Send + Sync {
    /// 一次投递处理结束（无论成败）
    fn on_processed(&self, exchange: &str);

    /// 处理器返回错误
    fn on_failed(&self, _exchange: &str, _error: &str) {}

    /// 事件发布成功
    fn on_published(&self, exchange: &str);
}

/// 基于 DashMap 的计数观察者
#[derive(Debug, Default)]
pub struct ProcessedLog {
    processed: DashMap<String, u64>,
    failed: DashMap<String, u64>,
    published: DashMap<String, u64>,
    notify: Notify,
}

impl ProcessedLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn was_processed<E: EventSchema>(&self) -> bool {
        self.processed_count(&E::exchange_name()) > 0
    }

    pub fn was_published<E: EventSchema>(&self) -> bool {
        self.published
            .get(&E::exchange_name())
            .is_some_and(|c| *c > 0)
    }

    pub fn processed_count(&self, exchange: &str) -> u64 {
        self.processed.get(exchange).map(|c| *c).unwrap_or(0)
    }

    pub fn failed_count(&self, exchange: &str) -> u64 {
        self.failed.get(exchange).map(|c| *c).unwrap_or(0)
    }

    /// 等待指定事件至少被处理一次，超时返回 false
    pub async fn wait_processed<E: EventSchema>(&self, timeout: Duration) -> bool {
        let exchange = E::exchange_name();
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.notify.notified();
                if self.processed_count(&exchange) > 0 {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

impl DeliveryObserver for ProcessedLog {
    fn on_processed(&self, exchange: &str) {
        *self.processed.entry(exchange.to_string()).or_insert(0) += 1;
        self.notify.notify_waiters();
    }

    fn on_failed(&self, exchange: &str, _error: &str) {
        *self.failed.entry(exchange.to_string()).or_insert(0) += 1;
    }

    fn on_published(&self, exchange: &str) {
        *self.published.entry(exchange.to_string()).or_insert(0) += 1;
    }
}
