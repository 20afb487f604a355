//! 奖励分配的补偿步骤
//!
//! 分配过程中每完成一个有外部副作用的步骤就记录下来，
//! 后续步骤失败时按相反顺序执行补偿。补偿失败只记录日志，不覆盖原始错误。

use tracing::{error, info};

use super::orchestrator::RewardDependencies;

/// 已完成、可补偿的分配步骤
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationStep {
    /// 库存已锁定
    InventoryBlocked { reward_item_ids: Vec<i64> },
    /// 新奖励组及其奖励项、订单关联已落库
    RewardGroupPersisted { order_id: i64, reward_group_id: i64 },
    /// 订单已关联到复用的奖励组
    OrderAssociated { order_id: i64, reward_group_id: i64 },
    /// 物流单已创建
    ShipmentCreated { shipment_id: String },
    /// 订单奖励项已写入
    OrderItemsPersisted { order_id: i64 },
}

#[derive(Debug, Default)]
pub struct AllocationSaga {
    completed: Vec<AllocationStep>,
}

impl AllocationSaga {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step: AllocationStep) {
        self.completed.push(step);
    }

    pub fn completed(&self) -> &[AllocationStep] {
        &self.completed
    }

    /// 逆序补偿所有已完成步骤
    pub async fn compensate(self, deps: &RewardDependencies) {
        for step in self.completed.into_iter().rev() {
            let result = match &step {
                AllocationStep::OrderItemsPersisted { order_id } => {
                    deps.repository
                        .delete_order_reward_items_by_order(*order_id)
                        .await
                }
                AllocationStep::ShipmentCreated { shipment_id } => {
                    deps.shipping.cancel_shipment(shipment_id).await
                }
                AllocationStep::OrderAssociated {
                    order_id,
                    reward_group_id,
                } => {
                    deps.repository
                        .delete_order_reward_group(*order_id, *reward_group_id)
                        .await
                }
                AllocationStep::RewardGroupPersisted {
                    order_id,
                    reward_group_id,
                } => discard_reward_group(deps, *order_id, *reward_group_id).await,
                AllocationStep::InventoryBlocked { reward_item_ids } => {
                    deps.inventory.release_items(reward_item_ids).await
                }
            };

            match result {
                Ok(()) => info!(?step, "补偿步骤完成"),
                Err(e) => error!(?step, error = %e, "补偿步骤失败，需要人工介入"),
            }
        }
    }
}

async fn discard_reward_group(
    deps: &RewardDependencies,
    order_id: i64,
    reward_group_id: i64,
) -> crate::error::Result<()> {
    deps.repository
        .delete_order_reward_group(order_id, reward_group_id)
        .await?;
    deps.repository
        .delete_reward_items_by_reward_group_id(reward_group_id)
        .await?;
    deps.repository.delete_reward_group(reward_group_id).await
}
