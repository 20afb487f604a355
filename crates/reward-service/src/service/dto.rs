//! 服务层数据传输对象

use serde::{Deserialize, Serialize};

/// 资格检查请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityRequest {
    pub order_id: i64,
    pub order_value: f64,
    #[serde(default)]
    pub quantity: i32,
}

/// 不满足资格的原因，按检查顺序排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IneligibilityReason {
    NoEligibleCampaign,
    CampaignNotActive,
    RewardLimitReached,
    OrderValueBelowMinimum,
    RewardGroupNotFound,
    OrderNotCached,
    OrderAlreadyComplete,
}

impl IneligibilityReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoEligibleCampaign => "no_eligible_campaign",
            Self::CampaignNotActive => "campaign_not_active",
            Self::RewardLimitReached => "reward_limit_reached",
            Self::OrderValueBelowMinimum => "order_value_below_minimum",
            Self::RewardGroupNotFound => "reward_group_not_found",
            Self::OrderNotCached => "order_not_cached",
            Self::OrderAlreadyComplete => "order_already_complete",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::NoEligibleCampaign => "当前没有可参与的活动",
            Self::CampaignNotActive => "活动未处于进行中状态",
            Self::RewardLimitReached => "活动奖励已发放完毕",
            Self::OrderValueBelowMinimum => "订单金额未达到活动门槛",
            Self::RewardGroupNotFound => "活动奖励组不存在",
            Self::OrderNotCached => "订单信息暂不可用",
            Self::OrderAlreadyComplete => "订单已结束",
        }
    }
}

/// 资格检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityDecision {
    pub eligible: bool,
    pub reason: Option<IneligibilityReason>,
}

impl EligibilityDecision {
    pub fn eligible() -> Self {
        Self {
            eligible: true,
            reason: None,
        }
    }

    pub fn ineligible(reason: IneligibilityReason) -> Self {
        Self {
            eligible: false,
            reason: Some(reason),
        }
    }
}

/// 一次成功分配的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationReceipt {
    pub order_id: i64,
    pub reward_group_id: i64,
    pub reward_item_ids: Vec<i64>,
    pub shipment_id: Option<String>,
    /// 是否复用了被取消订单保留下来的奖励组
    pub reused_group: bool,
}
