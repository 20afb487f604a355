//! 奖励服务错误类型
//!
//! 分为前置条件错误、容量/业务规则错误与系统错误三类

use reward_shared::error::RewardError;
use thiserror::Error;

use crate::models::{OrderStatus, RewardStatus};
use crate::proxies::ShippingError;

/// 奖励服务错误类型
#[derive(Debug, Error)]
pub enum ServiceError {
    // === 前置条件错误 ===
    #[error("订单不在缓存中: order_id={0}")]
    OrderNotFound(i64),

    #[error("订单奖励已处理: order_id={order_id}, reward_status={status}")]
    AlreadyProcessed { order_id: i64, status: RewardStatus },

    #[error("订单已撤销: order_id={order_id}, status={status}")]
    AlreadyRolledBack { order_id: i64, status: OrderStatus },

    #[error("订单奖励正在分配中: order_id={0}")]
    AllocationInProgress(i64),

    #[error("订单未关联奖励组: order_id={0}")]
    NoRewardGroupFound(i64),

    #[error("奖励类型未配置商品: reward_type_id={0}")]
    NoRewardProducts(i64),

    #[error("用户不存在: user_id={0}")]
    UserNotFound(String),

    #[error("奖励组仍被其他订单持有: reward_group_id={0}")]
    RewardGroupInUse(i64),

    // === 容量/业务规则错误 ===
    #[error("库存不足: reward_type_id={reward_type_id}")]
    InventoryUnavailable { reward_type_id: i64 },

    #[error("库存锁定失败: reward_type_id={reward_type_id}")]
    InventoryBlockFailed { reward_type_id: i64 },

    #[error("运费超出上限: cost={cost}, ceiling={ceiling}")]
    ShippingCostExceeded { cost: f64, ceiling: f64 },

    #[error("发货失败: {0}")]
    Shipping(#[from] ShippingError),

    // === 系统错误 ===
    #[error(transparent)]
    Shared(#[from] RewardError),

    #[error("事件解析失败: {0}")]
    InvalidEvent(#[from] serde_json::Error),

    #[error("参数校验失败: {0}")]
    Validation(String),
}

/// 奖励服务 Result 类型别名
pub type Result<T> = std::result::Result<T, ServiceError>;

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        Self::Shared(RewardError::Database(err))
    }
}

impl ServiceError {
    /// 是否为库存容量不足，此类订单可放入缓冲队列稍后重新分配
    pub fn is_capacity_shortage(&self) -> bool {
        matches!(
            self,
            Self::InventoryUnavailable { .. } | Self::InventoryBlockFailed { .. }
        )
    }

    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::OrderNotFound(_) => "ORDER_NOT_FOUND",
            Self::AlreadyProcessed { .. } => "ALREADY_PROCESSED",
            Self::AlreadyRolledBack { .. } => "ALREADY_ROLLED_BACK",
            Self::AllocationInProgress(_) => "ALLOCATION_IN_PROGRESS",
            Self::NoRewardGroupFound(_) => "NO_REWARD_GROUP_FOUND",
            Self::NoRewardProducts(_) => "NO_REWARD_PRODUCTS",
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::RewardGroupInUse(_) => "REWARD_GROUP_IN_USE",
            Self::InventoryUnavailable { .. } => "INVENTORY_UNAVAILABLE",
            Self::InventoryBlockFailed { .. } => "INVENTORY_BLOCK_FAILED",
            Self::ShippingCostExceeded { .. } => "SHIPPING_COST_EXCEEDED",
            Self::Shipping(_) => "SHIPPING_FAILED",
            Self::Shared(e) => e.code(),
            Self::InvalidEvent(_) => "INVALID_EVENT",
            Self::Validation(_) => "VALIDATION_ERROR",
        }
    }
}
