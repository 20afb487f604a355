//! 订单快照
//!
//! 订单由订单子系统维护，奖励服务只读取缓存中的快照。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{OrderStatus, RewardStatus};

/// 订单行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: i64,
    pub name: String,
    pub quantity: i32,
    /// 单价
    pub price: f64,
}

/// 订单快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub customer_id: i64,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    pub total_price: f64,
    pub status: OrderStatus,
    /// 退货窗口截止时间
    pub return_window_time: DateTime<Utc>,
    #[serde(default)]
    pub reward_status: RewardStatus,
}

impl Order {
    /// 订单是否已经结束
    ///
    /// 已签收且退货窗口已过，或者已取消、退货、退款。
    pub fn is_complete(&self, now: DateTime<Utc>) -> bool {
        if self.status == OrderStatus::Delivered && now > self.return_window_time {
            return true;
        }
        self.status.is_rolled_back()
    }

    pub fn is_rolled_back(&self) -> bool {
        self.status.is_rolled_back()
    }
}
