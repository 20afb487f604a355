//! 外部协作服务的能力接口
//!
//! 编排器只依赖这些 trait，具体实现（HTTP 客户端、模拟实现、测试替身）在启动时注入

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Campaign, InventoryCheck, RewardStatus, ShipmentResponse, ShipmentStatus, UserDetail,
};

/// 库存服务
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InventoryService: Send + Sync {
    /// 批量校验商品库存是否充足
    async fn verify_bulk_availability(&self, product_ids: &[i64]) -> Result<InventoryCheck>;

    /// 为商品锁定库存，返回实际分配到的奖励项 ID
    async fn block_for_products(&self, product_ids: &[i64]) -> Result<InventoryCheck>;

    /// 释放已锁定的奖励项
    async fn release_items(&self, reward_item_ids: &[i64]) -> Result<()>;
}

/// 物流承运方
///
/// 传输层失败返回 Err；承运方拒绝时返回 Ok 并在响应中携带错误分类
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Shipper: Send + Sync {
    async fn ship_item(&self, reward_item_id: i64, user: &UserDetail) -> Result<ShipmentResponse>;
    async fn ship_items(
        &self,
        reward_item_ids: &[i64],
        user: &UserDetail,
    ) -> Result<ShipmentResponse>;
    async fn get_shipment_status(&self, shipment_id: &str) -> Result<ShipmentStatus>;
    async fn cancel_shipment(&self, shipment_id: &str) -> Result<()>;
}

/// 用户目录
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user_details(&self, user_id: &str) -> Result<Option<UserDetail>>;
}

/// 邮件发送
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_email(&self, name: &str, address: &str, body: &str) -> Result<()>;
}

/// 营销活动目录
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CampaignCatalog: Send + Sync {
    /// 当前最适合的活动，没有进行中的活动时返回 None
    async fn fetch_most_eligible_campaign(&self) -> Result<Option<Campaign>>;
}

/// 订单子系统的奖励状态回写
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderStatusNotifier: Send + Sync {
    async fn update_order_reward_status(
        &self,
        order_id: i64,
        reward_group_id: i64,
        status: RewardStatus,
    ) -> Result<()>;
}
