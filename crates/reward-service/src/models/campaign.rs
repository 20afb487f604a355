//! 营销活动快照
//!
//! 由活动服务提供，只用于资格判断，奖励服务不修改。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::CampaignStatus;
use crate::error::{Result, ServiceError};

/// 领取奖励需要满足的条件
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EligibilityCriteria {
    pub minimum_purchase_amount: f64,
}

/// 营销活动
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub reward_group_id: i64,
    pub name: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: CampaignStatus,
    pub budget: f64,
    pub allocated_rewards: i32,
    pub total_eligible_rewards: i32,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub eligibility_criteria: EligibilityCriteria,
}

impl Campaign {
    /// 已分配数量是否已达上限
    pub fn is_exhausted(&self) -> bool {
        self.allocated_rewards >= self.total_eligible_rewards
    }

    /// 订单金额是否达到最低消费
    pub fn accepts_order_value(&self, order_value: f64) -> bool {
        order_value >= self.eligibility_criteria.minimum_purchase_amount
    }

    /// 校验活动数据
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        if self.start_date > self.end_date {
            return Err(ServiceError::Validation(format!(
                "活动开始时间 {} 晚于结束时间 {}",
                self.start_date, self.end_date
            )));
        }
        if self.budget <= 0.0 {
            return Err(ServiceError::Validation("活动预算必须大于 0".to_string()));
        }
        if self.status == CampaignStatus::Active && (now < self.start_date || now > self.end_date)
        {
            return Err(ServiceError::Validation(
                "活动处于 active 状态但当前时间不在活动周期内".to_string(),
            ));
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::active_campaign;
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_capacity_and_threshold() {
        let mut campaign = active_campaign(100.0);
        assert!(!campaign.is_exhausted());
        assert!(campaign.accepts_order_value(100.0));
        assert!(!campaign.accepts_order_value(99.0));

        campaign.allocated_rewards = 100;
        assert!(campaign.is_exhausted());
    }

    #[test]
    fn test_validate() {
        let now = Utc::now();
        let campaign = active_campaign(50.0);
        assert!(campaign.validate(now).is_ok());

        let mut inverted = campaign.clone();
        inverted.end_date = inverted.start_date - Duration::days(1);
        assert!(inverted.validate(now).is_err());

        let mut broke = campaign.clone();
        broke.budget = 0.0;
        assert!(broke.validate(now).is_err());

        let mut stale = campaign;
        stale.end_date = now - Duration::hours(1);
        stale.start_date = now - Duration::days(2);
        assert!(stale.validate(now).is_err());
    }
}
