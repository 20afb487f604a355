//! 奖励相关的消息事件
//!
//! 字段名与上游系统发送的 JSON 保持一致，交换机名由类型名派生：
//! `AllocateReward` → `allocate_reward`。

use reward_shared::amqp::{Binding, EventSchema};
use serde::{Deserialize, Serialize};

/// 订单确认后触发的奖励分配
pub const ALLOCATE_ON_ORDER_CONFIRMED: Binding = Binding::new("order_confirmed");

/// 缓冲队列中等待奖励容量的订单
pub const REALLOCATE_FROM_BUFFER: Binding = Binding::new("buffer");

/// 订单取消后撤销奖励
pub const REVOKE_ON_ORDER_CANCELLED: Binding = Binding::plain();

/// 分配奖励
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocateReward {
    pub user_id: String,
    pub order_id: i64,
    pub campaign_id: i64,
    /// 奖励类型，即奖励组模板 ID
    pub reward_type_id: i64,
    #[serde(default)]
    pub order_status: String,
    #[serde(default)]
    pub order_value: f64,
}

impl EventSchema for AllocateReward {
    const TYPE_NAME: &'static str = "AllocateReward";
}

/// 重新分配奖励
///
/// 来自缓冲队列，可能指向一个被取消后保留下来的奖励组
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReAllocateReward {
    pub user_id: String,
    pub order_id: i64,
    pub campaign_id: i64,
    pub reward_type_id: i64,
    #[serde(default)]
    pub reward_group_id: Option<i64>,
    /// 进入缓冲队列的原因
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// 已经失败的重新分配次数
    #[serde(default)]
    pub attempt: u32,
}

impl EventSchema for ReAllocateReward {
    const TYPE_NAME: &'static str = "ReAllocateReward";
}

impl ReAllocateReward {
    /// 因容量不足而放入缓冲队列的分配请求
    pub fn deferred(event: &AllocateReward, reason: impl Into<String>) -> Self {
        Self {
            user_id: event.user_id.clone(),
            order_id: event.order_id,
            campaign_id: event.campaign_id,
            reward_type_id: event.reward_type_id,
            reward_group_id: None,
            reason: Some(reason.into()),
            attempt: 0,
        }
    }

    /// 再次失败后重新放入缓冲队列的请求
    pub fn retry(&self, reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }

    /// 按完整分配流程处理时使用的等价分配事件
    pub fn as_allocation(&self) -> AllocateReward {
        AllocateReward {
            user_id: self.user_id.clone(),
            order_id: self.order_id,
            campaign_id: self.campaign_id,
            reward_type_id: self.reward_type_id,
            order_status: String::new(),
            order_value: 0.0,
        }
    }
}

/// 撤销奖励
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevokeReward {
    pub user_id: String,
    pub order_id: i64,
    #[serde(default)]
    pub order_status: String,
    pub campaign_id: i64,
    pub reward_type_id: i64,
}

impl EventSchema for RevokeReward {
    const TYPE_NAME: &'static str = "RevokeReward";
}
