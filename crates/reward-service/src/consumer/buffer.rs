//! 缓冲队列发布
//!
//! 容量不足的分配请求以 `ReAllocateReward` 的形式进入缓冲队列，
//! 由缓冲队列的消费者稍后重新分配。

use async_trait::async_trait;
use reward_shared::amqp::{PublishContext, Publisher};

use crate::error::Result;
use crate::events::{REALLOCATE_FROM_BUFFER, ReAllocateReward};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// 发布到缓冲队列，返回消息 ID
    async fn publish_reallocation(
        &self,
        ctx: &PublishContext,
        event: &ReAllocateReward,
    ) -> Result<String>;
}

#[async_trait]
impl EventPublisher for Publisher {
    async fn publish_reallocation(
        &self,
        ctx: &PublishContext,
        event: &ReAllocateReward,
    ) -> Result<String> {
        Ok(self.publish(ctx, event, REALLOCATE_FROM_BUFFER).await?)
    }
}
