//! 队列处理器

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reward_shared::amqp::{DeliveryContext, DeliveryHandler, HandlerError};
use reward_shared::config::AmqpConfig;
use serde::de::DeserializeOwned;
use tracing::{error, info, warn};

use super::buffer::EventPublisher;
use crate::error::{Result, ServiceError};
use crate::events::{AllocateReward, ReAllocateReward, RevokeReward};
use crate::service::RewardUseCase;

fn decode<E: DeserializeOwned>(payload: &[u8]) -> Result<E> {
    Ok(serde_json::from_slice(payload)?)
}

/// 订单确认后的奖励分配
pub struct AllocateRewardHandler {
    rewards: Arc<dyn RewardUseCase>,
    buffer: Arc<dyn EventPublisher>,
}

impl AllocateRewardHandler {
    pub fn new(rewards: Arc<dyn RewardUseCase>, buffer: Arc<dyn EventPublisher>) -> Self {
        Self { rewards, buffer }
    }

    /// 容量不足时放入缓冲队列
    async fn defer(
        &self,
        delivery: &DeliveryContext,
        event: &AllocateReward,
        cause: &ServiceError,
    ) -> Result<()> {
        let deferred = ReAllocateReward::deferred(event, cause.error_code());
        let message_id = self
            .buffer
            .publish_reallocation(&delivery.publish_context(), &deferred)
            .await?;

        warn!(
            order_id = event.order_id,
            reason = cause.error_code(),
            message_id = %message_id,
            "奖励容量不足，订单已放入缓冲队列"
        );
        Ok(())
    }
}

#[async_trait]
impl DeliveryHandler for AllocateRewardHandler {
    async fn handle(
        &self,
        delivery: &DeliveryContext,
        payload: &[u8],
    ) -> std::result::Result<(), HandlerError> {
        let queue = delivery.queue.as_str();
        let event: AllocateReward = decode(payload)?;

        match self.rewards.allocate_reward(&event).await {
            Ok(receipt) => {
                info!(
                    queue,
                    order_id = receipt.order_id,
                    reward_group_id = receipt.reward_group_id,
                    "订单奖励分配完成"
                );
                Ok(())
            }
            Err(err) if err.is_capacity_shortage() => {
                self.defer(delivery, &event, &err).await?;
                Ok(())
            }
            Err(err) => {
                error!(queue, order_id = event.order_id, error = %err, "订单奖励分配失败");
                Err(err.into())
            }
        }
    }
}

/// 缓冲队列重试参数
#[derive(Debug, Clone)]
pub struct BufferSettings {
    /// 单个订单的最大分配尝试次数，耗尽后按失败处理
    pub max_attempts: u32,
    /// 重新入队前的等待时间
    pub retry_delay: Duration,
}

impl From<&AmqpConfig> for BufferSettings {
    fn from(config: &AmqpConfig) -> Self {
        Self {
            max_attempts: config.buffer_max_attempts,
            retry_delay: config.buffer_retry_delay(),
        }
    }
}

/// 缓冲队列中的重新分配
///
/// 容量仍然不足时带着递增的尝试次数重新放入缓冲队列，
/// 次数耗尽后返回错误，由确认策略决定是否进入死信队列。
pub struct ReAllocateRewardHandler {
    rewards: Arc<dyn RewardUseCase>,
    buffer: Arc<dyn EventPublisher>,
    settings: BufferSettings,
}

impl ReAllocateRewardHandler {
    pub fn new(
        rewards: Arc<dyn RewardUseCase>,
        buffer: Arc<dyn EventPublisher>,
        settings: BufferSettings,
    ) -> Self {
        Self {
            rewards,
            buffer,
            settings,
        }
    }

    fn can_retry(&self, event: &ReAllocateReward) -> bool {
        event.attempt + 1 < self.settings.max_attempts
    }

    async fn requeue(
        &self,
        delivery: &DeliveryContext,
        event: &ReAllocateReward,
        cause: &ServiceError,
    ) -> Result<()> {
        tokio::time::sleep(self.settings.retry_delay).await;

        let retry = event.retry(cause.error_code());
        let message_id = self
            .buffer
            .publish_reallocation(&delivery.publish_context(), &retry)
            .await?;

        warn!(
            order_id = event.order_id,
            attempt = retry.attempt,
            max_attempts = self.settings.max_attempts,
            message_id = %message_id,
            "奖励容量仍然不足，订单重新放入缓冲队列"
        );
        Ok(())
    }
}

#[async_trait]
impl DeliveryHandler for ReAllocateRewardHandler {
    async fn handle(
        &self,
        delivery: &DeliveryContext,
        payload: &[u8],
    ) -> std::result::Result<(), HandlerError> {
        let queue = delivery.queue.as_str();
        let event: ReAllocateReward = decode(payload)?;

        match self.rewards.reallocate_reward(&event).await {
            Ok(receipt) => {
                info!(
                    queue,
                    order_id = receipt.order_id,
                    reward_group_id = receipt.reward_group_id,
                    reused_group = receipt.reused_group,
                    attempt = event.attempt,
                    "订单奖励重新分配完成"
                );
                Ok(())
            }
            Err(err) if err.is_capacity_shortage() && self.can_retry(&event) => {
                self.requeue(delivery, &event, &err).await?;
                Ok(())
            }
            Err(err) => {
                error!(
                    queue,
                    order_id = event.order_id,
                    reason = ?event.reason,
                    attempt = event.attempt,
                    error = %err,
                    "订单奖励重新分配失败"
                );
                Err(err.into())
            }
        }
    }
}

/// 订单取消后的奖励撤销
pub struct RevokeRewardHandler {
    rewards: Arc<dyn RewardUseCase>,
}

impl RevokeRewardHandler {
    pub fn new(rewards: Arc<dyn RewardUseCase>) -> Self {
        Self { rewards }
    }
}

#[async_trait]
impl DeliveryHandler for RevokeRewardHandler {
    async fn handle(
        &self,
        delivery: &DeliveryContext,
        payload: &[u8],
    ) -> std::result::Result<(), HandlerError> {
        let queue = delivery.queue.as_str();
        let event: RevokeReward = decode(payload)?;

        if let Err(err) = self.rewards.cancel_reward(&event).await {
            error!(queue, order_id = event.order_id, error = %err, "订单奖励撤销失败");
            return Err(err.into());
        }

        info!(
            queue,
            order_id = event.order_id,
            order_status = %event.order_status,
            "订单奖励已撤销"
        );
        Ok(())
    }
}
