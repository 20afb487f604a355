//! 奖励服务枚举类型定义
//!
//! 订单相关枚举的 JSON 形式与订单子系统写入缓存的快照保持一致

use serde::{Deserialize, Serialize};

/// 订单状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Canceled,
    Returned,
    Refunded,
}

impl OrderStatus {
    /// 订单是否已被撤销（取消、退货或退款）
    pub fn is_rolled_back(self) -> bool {
        matches!(self, Self::Canceled | Self::Returned | Self::Refunded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Canceled => "canceled",
            Self::Returned => "returned",
            Self::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 订单奖励状态
///
/// none → allocated → shipped → delivered，任一非终态都可进入 cancelled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardStatus {
    #[default]
    None,
    Allocated,
    Shipped,
    Delivered,
    Cancelled,
}

impl RewardStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Allocated => "allocated",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RewardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 营销活动状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Active,
    Paused,
    Ended,
}

/// 发货失败分类
///
/// 只有系统故障属于瞬时错误，其余为请求数据问题，重试无意义
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShipmentErrorKind {
    #[serde(rename = "Invalid Address")]
    InvalidAddress,
    #[serde(rename = "Out of Service Area")]
    OutOfServiceArea,
    #[serde(rename = "System Failure")]
    SystemFailure,
}

impl ShipmentErrorKind {
    pub fn is_transient(self) -> bool {
        self == Self::SystemFailure
    }
}

impl std::fmt::Display for ShipmentErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InvalidAddress => "Invalid Address",
            Self::OutOfServiceArea => "Out of Service Area",
            Self::SystemFailure => "System Failure",
        };
        f.write_str(s)
    }
}

/// 物流单状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShipmentStatus {
    Pending,
    Shipped,
    #[serde(rename = "In Transit")]
    InTransit,
    Delivered,
    Failed,
    Canceled,
    Returned,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolled_back_statuses() {
        assert!(OrderStatus::Canceled.is_rolled_back());
        assert!(OrderStatus::Returned.is_rolled_back());
        assert!(OrderStatus::Refunded.is_rolled_back());
        assert!(!OrderStatus::Delivered.is_rolled_back());
        assert!(!OrderStatus::Confirmed.is_rolled_back());
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&RewardStatus::None).unwrap(), "\"none\"");
        assert_eq!(
            serde_json::from_str::<OrderStatus>("\"canceled\"").unwrap(),
            OrderStatus::Canceled
        );
        assert_eq!(
            serde_json::from_str::<ShipmentErrorKind>("\"Out of Service Area\"").unwrap(),
            ShipmentErrorKind::OutOfServiceArea
        );
        assert_eq!(
            serde_json::to_string(&ShipmentStatus::InTransit).unwrap(),
            "\"In Transit\""
        );
    }

    #[test]
    fn test_only_system_failure_is_transient() {
        assert!(ShipmentErrorKind::SystemFailure.is_transient());
        assert!(!ShipmentErrorKind::InvalidAddress.is_transient());
        assert!(!ShipmentErrorKind::OutOfServiceArea.is_transient());
    }
}
