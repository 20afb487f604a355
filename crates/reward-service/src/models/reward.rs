//! 奖励组与订单奖励项实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};

/// 奖励组
///
/// 每次成功分配都会生成一个新的奖励组；取消时保留，供后续重新分配使用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RewardGroup {
    pub id: i64,
    pub name: String,
    #[sqlx(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub campaign_id: i64,
}

impl RewardGroup {
    /// 创建并校验奖励组
    pub fn new(
        id: i64,
        name: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
        campaign_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let group = Self {
            id,
            name: name.into(),
            expires_at,
            campaign_id,
        };
        group.validate(now)?;
        Ok(group)
    }

    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        if self.id <= 0 {
            return Err(ServiceError::Validation("奖励组 ID 必须为正数".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(ServiceError::Validation("奖励组名称不能为空".to_string()));
        }
        if self.expires_at.is_some_and(|t| t < now) {
            return Err(ServiceError::Validation("奖励组创建时不能已过期".to_string()));
        }
        Ok(())
    }
}

/// 订单与奖励项的关联
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderRewardItem {
    pub order_id: i64,
    pub reward_item_id: i64,
    #[sqlx(default)]
    pub shipment_id: Option<i64>,
    pub allocated_date: DateTime<Utc>,
    #[sqlx(default)]
    pub is_redeemed: Option<bool>,
    #[sqlx(default)]
    pub redeemed_date: Option<DateTime<Utc>>,
}

impl OrderRewardItem {
    /// 新分配的奖励项，尚未发货、未兑换
    pub fn allocated(order_id: i64, reward_item_id: i64, allocated_date: DateTime<Utc>) -> Self {
        Self {
            order_id,
            reward_item_id,
            shipment_id: None,
            allocated_date,
            is_redeemed: None,
            redeemed_date: None,
        }
    }

    /// 校验业务不变量
    ///
    /// - 订单 ID 与奖励项 ID 必须有效
    /// - 分配时间不能晚于当前时间
    /// - 兑换标记与兑换时间必须同时存在或同时缺失
    /// - 物流单 ID 如存在必须为正数
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        if self.order_id <= 0 {
            return Err(ServiceError::Validation("订单 ID 必须设置".to_string()));
        }
        if self.reward_item_id <= 0 {
            return Err(ServiceError::Validation("奖励项 ID 必须设置".to_string()));
        }
        if self.allocated_date > now {
            return Err(ServiceError::Validation("分配时间不能晚于当前时间".to_string()));
        }

        match (self.is_redeemed, self.redeemed_date) {
            (Some(true), None) => {
                return Err(ServiceError::Validation(
                    "已兑换的奖励项必须设置兑换时间".to_string(),
                ));
            }
            (Some(false) | None, Some(_)) => {
                return Err(ServiceError::Validation(
                    "未兑换的奖励项不应设置兑换时间".to_string(),
                ));
            }
            _ => {}
        }

        if self.shipment_id.is_some_and(|id| id <= 0) {
            return Err(ServiceError::Validation("物流单 ID 必须为正数".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_reward_group_validation() {
        let now = Utc::now();
        assert!(RewardGroup::new(1, "welcome kit", None, 3, now).is_ok());
        assert!(RewardGroup::new(0, "welcome kit", None, 3, now).is_err());
        assert!(RewardGroup::new(1, "  ", None, 3, now).is_err());
        assert!(RewardGroup::new(1, "kit", Some(now - Duration::days(1)), 3, now).is_err());
    }

    #[test]
    fn test_redemption_flag_and_date_must_agree() {
        let now = Utc::now();
        let mut item = OrderRewardItem::allocated(42, 9, now - Duration::minutes(1));
        assert!(item.validate(now).is_ok());

        item.is_redeemed = Some(true);
        assert!(item.validate(now).is_err());

        item.redeemed_date = Some(now);
        assert!(item.validate(now).is_ok());

        item.is_redeemed = Some(false);
        assert!(item.validate(now).is_err());
    }

    #[test]
    fn test_shipment_id_must_be_positive() {
        let now = Utc::now();
        let mut item = OrderRewardItem::allocated(42, 9, now);
        item.shipment_id = Some(0);
        assert!(item.validate(now).is_err());
        item.shipment_id = Some(5);
        assert!(item.validate(now).is_ok());
    }

    #[test]
    fn test_future_allocation_rejected() {
        let now = Utc::now();
        let item = OrderRewardItem::allocated(42, 9, now + Duration::hours(1));
        assert!(matches!(item.validate(now), Err(ServiceError::Validation(_))));
    }
}
