//! 仓储 Trait 定义
//!
//! 服务层依赖抽象而非具体实现，支持 mock 测试

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{OrderRewardItem, RewardGroup};

/// 奖励仓储接口
///
/// 删除操作影响 0 行时返回 NotFound；批量写入在单个事务内完成，任一批次失败整体回滚
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RewardRepositoryTrait: Send + Sync {
    // 查询
    async fn get_reward_group_by_id(&self, id: i64) -> Result<Option<RewardGroup>>;
    async fn get_reward_item_ids_from_reward_group(&self, reward_group_id: i64) -> Result<Vec<i64>>;
    async fn get_product_ids_for_reward_group(&self, reward_group_id: i64) -> Result<Vec<i64>>;
    async fn get_reward_group_ids_by_order(&self, order_id: i64) -> Result<Vec<i64>>;
    /// 当前持有该奖励组的订单，为空表示奖励组空闲
    async fn get_order_ids_by_reward_group(&self, reward_group_id: i64) -> Result<Vec<i64>>;

    // 写入

    /// 单事务写入奖励组、订单关联以及分批的奖励项关联
    async fn create_reward_group_allocation(
        &self,
        group: &RewardGroup,
        order_id: i64,
        reward_item_ids: &[i64],
        batch_size: usize,
    ) -> Result<()>;

    /// 将订单关联到已存在的奖励组，奖励组已被其他订单持有时返回 RewardGroupInUse
    async fn associate_order_with_reward_group(
        &self,
        order_id: i64,
        reward_group_id: i64,
    ) -> Result<()>;

    /// 分批写入订单奖励项，已存在的行按主键更新
    async fn update_order_reward_items_batch(
        &self,
        items: &[OrderRewardItem],
        batch_size: usize,
    ) -> Result<()>;

    // 删除
    async fn delete_order_reward_group(&self, order_id: i64, reward_group_id: i64) -> Result<()>;
    async fn delete_order_reward_items_by_order(&self, order_id: i64) -> Result<()>;
    async fn delete_reward_items_by_reward_group_id(&self, reward_group_id: i64) -> Result<()>;
    async fn delete_reward_group(&self, reward_group_id: i64) -> Result<()>;
}
