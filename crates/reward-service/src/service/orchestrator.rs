//! 奖励编排器
//!
//! 响应分配、撤销、重新分配事件以及资格查询。订单状态由订单子系统维护，
//! 编排器读取缓存快照做前置检查，调用库存、物流等协作服务，并通过仓储落库。
//!
//! ## 分配流程
//!
//! 1. 读取订单快照并检查奖励状态 -> 2. 订单级占位 -> 3. 校验并锁定库存
//! -> 4. 写入奖励组 -> 5. 创建物流单 -> 6. 写入订单奖励项 -> 7. 回写订单奖励状态
//! -> 8. 发送通知邮件（失败不影响结果）
//!
//! 第 3 步之后任一步失败，已完成的步骤按相反顺序补偿。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reward_shared::config::RedisConfig;
use reward_shared::observability::metrics;
use tracing::{debug, error, info, instrument, warn};

use super::dto::{AllocationReceipt, EligibilityDecision, EligibilityRequest, IneligibilityReason};
use super::saga::{AllocationSaga, AllocationStep};
use super::snapshot::{AllocationClaim, OrderSnapshotStore};
use crate::error::{Result, ServiceError};
use crate::events::{AllocateReward, ReAllocateReward, RevokeReward};
use crate::models::{CampaignStatus, OrderRewardItem, RewardGroup, RewardStatus, UserDetail};
use crate::proxies::{
    CampaignCatalog, InventoryService, Mailer, OrderStatusNotifier, ShippingProxy, UserDirectory,
    allocation_email_body,
};
use crate::repository::RewardRepositoryTrait;

/// 运费上限，超过视为不可发货
pub const DEFAULT_SHIPPING_COST_CEILING: f64 = 100_000.0;

/// 批量写入的每批行数
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// 编排器参数
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub shipping_cost_ceiling: f64,
    pub batch_size: usize,
    /// 分配占位的有效期
    pub claim_ttl: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            shipping_cost_ceiling: DEFAULT_SHIPPING_COST_CEILING,
            batch_size: DEFAULT_BATCH_SIZE,
            claim_ttl: Duration::from_secs(300),
        }
    }
}

impl OrchestratorSettings {
    pub fn from_redis_config(config: &RedisConfig) -> Self {
        Self {
            claim_ttl: Duration::from_secs(config.allocation_claim_ttl_seconds),
            ..Default::default()
        }
    }
}

/// 编排器依赖
///
/// 启动时显式构造，测试中替换为内存实现或 mock
#[derive(Clone)]
pub struct RewardDependencies {
    pub repository: Arc<dyn RewardRepositoryTrait>,
    pub orders: Arc<dyn OrderSnapshotStore>,
    pub inventory: Arc<dyn InventoryService>,
    pub shipping: Arc<ShippingProxy>,
    pub users: Arc<dyn UserDirectory>,
    pub mailer: Arc<dyn Mailer>,
    pub campaigns: Arc<dyn CampaignCatalog>,
    pub order_status: Arc<dyn OrderStatusNotifier>,
    pub settings: OrchestratorSettings,
}

/// 奖励用例
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RewardUseCase: Send + Sync {
    async fn allocate_reward(&self, event: &AllocateReward) -> Result<AllocationReceipt>;
    async fn cancel_reward(&self, event: &RevokeReward) -> Result<()>;
    async fn reallocate_reward(&self, event: &ReAllocateReward) -> Result<AllocationReceipt>;
    async fn check_reward_eligibility(
        &self,
        request: &EligibilityRequest,
    ) -> Result<EligibilityDecision>;
}

/// 奖励编排器
pub struct RewardOrchestrator {
    deps: RewardDependencies,
}

impl RewardOrchestrator {
    pub fn new(deps: RewardDependencies) -> Self {
        Self { deps }
    }

    /// 前置检查通过后对订单占位
    async fn claim_order(&self, order_id: i64) -> Result<AllocationClaim> {
        let order = self
            .deps
            .orders
            .get_order(order_id)
            .await?
            .ok_or(ServiceError::OrderNotFound(order_id))?;

        if order.reward_status != RewardStatus::None {
            return Err(ServiceError::AlreadyProcessed {
                order_id,
                status: order.reward_status,
            });
        }
        if order.is_rolled_back() {
            return Err(ServiceError::AlreadyRolledBack {
                order_id,
                status: order.status,
            });
        }

        self.deps
            .orders
            .try_claim_allocation(order_id, self.deps.settings.claim_ttl)
            .await?
            .ok_or(ServiceError::AllocationInProgress(order_id))
    }

    /// 收尾：成功时把占位标记为已完成并保留到过期，失败时补偿已完成步骤并释放占位
    async fn settle(
        &self,
        claim: AllocationClaim,
        saga: AllocationSaga,
        result: Result<AllocationReceipt>,
    ) -> Result<AllocationReceipt> {
        let order_id = claim.order_id;
        let err = match result {
            Ok(receipt) => {
                if let Err(e) = self.deps.orders.complete_allocation(&claim).await {
                    warn!(order_id, error = %e, "标记分配占位失败，等待自动过期");
                }
                return Ok(receipt);
            }
            Err(err) => err,
        };

        warn!(
            order_id,
            error = %err,
            completed_steps = saga.completed().len(),
            "奖励分配失败，开始补偿"
        );
        saga.compensate(&self.deps).await;

        if let Err(e) = self.deps.orders.release_allocation(&claim).await {
            warn!(order_id, error = %e, "释放订单分配占位失败，等待自动过期");
        }
        Err(err)
    }

    /// 锁定新库存并生成新的奖励组
    async fn allocate_new_group(
        &self,
        event: &AllocateReward,
        saga: &mut AllocationSaga,
    ) -> Result<AllocationReceipt> {
        let reward_type_id = event.reward_type_id;
        let product_ids = self
            .deps
            .repository
            .get_product_ids_for_reward_group(reward_type_id)
            .await?;
        if product_ids.is_empty() {
            return Err(ServiceError::NoRewardProducts(reward_type_id));
        }

        let availability = self
            .deps
            .inventory
            .verify_bulk_availability(&product_ids)
            .await?;
        if !availability.success {
            return Err(ServiceError::InventoryUnavailable { reward_type_id });
        }

        let blocked = self.deps.inventory.block_for_products(&product_ids).await?;
        if !blocked.item_ids.is_empty() {
            saga.record(AllocationStep::InventoryBlocked {
                reward_item_ids: blocked.item_ids.clone(),
            });
        }
        if !blocked.is_fully_blocked(product_ids.len()) {
            return Err(ServiceError::InventoryBlockFailed { reward_type_id });
        }
        let item_ids = blocked.item_ids;

        let group = RewardGroup::new(
            mint_reward_group_id(),
            format!("order-{}-reward-{}", event.order_id, reward_type_id),
            None,
            event.campaign_id,
            Utc::now(),
        )?;
        self.deps
            .repository
            .create_reward_group_allocation(
                &group,
                event.order_id,
                &item_ids,
                self.deps.settings.batch_size,
            )
            .await?;
        saga.record(AllocationStep::RewardGroupPersisted {
            order_id: event.order_id,
            reward_group_id: group.id,
        });

        debug!(
            order_id = event.order_id,
            reward_group_id = group.id,
            items = item_ids.len(),
            "奖励组已写入"
        );

        self.ship_and_record(event, group.id, item_ids, false, saga)
            .await
    }

    /// 复用被取消订单保留下来的奖励组，不再锁定库存
    async fn allocate_retained_group(
        &self,
        event: &AllocateReward,
        reward_group_id: i64,
        item_ids: Vec<i64>,
        saga: &mut AllocationSaga,
    ) -> Result<AllocationReceipt> {
        self.deps
            .repository
            .associate_order_with_reward_group(event.order_id, reward_group_id)
            .await?;
        saga.record(AllocationStep::OrderAssociated {
            order_id: event.order_id,
            reward_group_id,
        });

        self.ship_and_record(event, reward_group_id, item_ids, true, saga)
            .await
    }

    /// 发货、写入订单奖励项并回写订单状态
    async fn ship_and_record(
        &self,
        event: &AllocateReward,
        reward_group_id: i64,
        item_ids: Vec<i64>,
        reused_group: bool,
        saga: &mut AllocationSaga,
    ) -> Result<AllocationReceipt> {
        let order_id = event.order_id;
        let user = self
            .deps
            .users
            .get_user_details(&event.user_id)
            .await?
            .ok_or_else(|| ServiceError::UserNotFound(event.user_id.clone()))?;

        let shipment = self.deps.shipping.ship_items(&item_ids, &user).await?;
        if let Some(shipment_id) = &shipment.confirmation_id {
            saga.record(AllocationStep::ShipmentCreated {
                shipment_id: shipment_id.clone(),
            });
        }

        let ceiling = self.deps.settings.shipping_cost_ceiling;
        if shipment.cost > ceiling {
            error!(order_id, cost = shipment.cost, ceiling, "运费超出上限");
            return Err(ServiceError::ShippingCostExceeded {
                cost: shipment.cost,
                ceiling,
            });
        }

        let now = Utc::now();
        let shipment_ref = shipment
            .confirmation_id
            .as_deref()
            .and_then(|id| id.parse::<i64>().ok())
            .filter(|id| *id > 0);
        let rows: Vec<OrderRewardItem> = item_ids
            .iter()
            .map(|item_id| OrderRewardItem {
                shipment_id: shipment_ref,
                ..OrderRewardItem::allocated(order_id, *item_id, now)
            })
            .collect();
        self.deps
            .repository
            .update_order_reward_items_batch(&rows, self.deps.settings.batch_size)
            .await?;
        saga.record(AllocationStep::OrderItemsPersisted { order_id });

        self.deps
            .order_status
            .update_order_reward_status(order_id, reward_group_id, RewardStatus::Allocated)
            .await?;

        self.send_confirmation(&user, order_id).await;

        info!(
            order_id,
            reward_group_id,
            items = item_ids.len(),
            reused_group,
            "奖励分配成功"
        );

        Ok(AllocationReceipt {
            order_id,
            reward_group_id,
            reward_item_ids: item_ids,
            shipment_id: shipment.confirmation_id,
            reused_group,
        })
    }

    /// 发送通知邮件，失败只记录日志
    async fn send_confirmation(&self, user: &UserDetail, order_id: i64) {
        let body = allocation_email_body(&user.user_name, order_id);
        if let Err(e) = self
            .deps
            .mailer
            .send_email(&user.user_name, &user.email, &body)
            .await
        {
            warn!(order_id, error = %e, "奖励通知邮件发送失败");
        }
    }

    async fn allocate(&self, event: &AllocateReward) -> Result<AllocationReceipt> {
        let claim = self.claim_order(event.order_id).await?;

        let mut saga = AllocationSaga::new();
        let result = self.allocate_new_group(event, &mut saga).await;
        self.settle(claim, saga, result).await
    }

    async fn reallocate(&self, event: &ReAllocateReward) -> Result<AllocationReceipt> {
        let claim = self.claim_order(event.order_id).await?;

        let allocation = event.as_allocation();
        let mut saga = AllocationSaga::new();
        let result = match self.retained_items(event).await {
            Ok(Some((group_id, item_ids))) => {
                match self
                    .allocate_retained_group(&allocation, group_id, item_ids, &mut saga)
                    .await
                {
                    // 检查之后被其他订单抢先关联
                    Err(ServiceError::RewardGroupInUse(_)) => {
                        self.allocate_new_group(&allocation, &mut saga).await
                    }
                    other => other,
                }
            }
            Ok(None) => self.allocate_new_group(&allocation, &mut saga).await,
            Err(e) => Err(e),
        };
        self.settle(claim, saga, result).await
    }

    /// 事件指向的奖励组是否空闲且仍保留着奖励项
    async fn retained_items(&self, event: &ReAllocateReward) -> Result<Option<(i64, Vec<i64>)>> {
        let Some(group_id) = event.reward_group_id else {
            return Ok(None);
        };
        let repo = &self.deps.repository;

        let holders = repo.get_order_ids_by_reward_group(group_id).await?;
        if !holders.is_empty() {
            warn!(
                order_id = event.order_id,
                reward_group_id = group_id,
                holders = ?holders,
                "奖励组仍被其他订单持有，按完整流程分配"
            );
            return Ok(None);
        }

        let item_ids = repo.get_reward_item_ids_from_reward_group(group_id).await?;
        if item_ids.is_empty() {
            info!(
                order_id = event.order_id,
                reward_group_id = group_id,
                "保留的奖励组已无奖励项，按完整流程分配"
            );
            return Ok(None);
        }
        Ok(Some((group_id, item_ids)))
    }

    async fn cancel(&self, event: &RevokeReward) -> Result<()> {
        let order_id = event.order_id;
        let repo = &self.deps.repository;

        let group_ids = repo.get_reward_group_ids_by_order(order_id).await?;
        let Some(&first_group_id) = group_ids.first() else {
            warn!(order_id, "订单未关联奖励组，无法撤销");
            return Err(ServiceError::NoRewardGroupFound(order_id));
        };

        self.deps
            .order_status
            .update_order_reward_status(order_id, first_group_id, RewardStatus::Cancelled)
            .await?;

        for group_id in &group_ids {
            repo.delete_order_reward_group(order_id, *group_id).await?;
        }
        repo.delete_order_reward_items_by_order(order_id).await?;

        if let Err(e) = self.deps.orders.release_completed_allocation(order_id).await {
            warn!(order_id, error = %e, "释放订单分配占位失败");
        }

        info!(
            order_id,
            reward_group_id = first_group_id,
            "奖励已撤销，奖励组保留待重新分配"
        );
        Ok(())
    }

    async fn evaluate_eligibility(
        &self,
        request: &EligibilityRequest,
    ) -> Result<EligibilityDecision> {
        use IneligibilityReason::*;

        let Some(campaign) = self.deps.campaigns.fetch_most_eligible_campaign().await? else {
            return Ok(EligibilityDecision::ineligible(NoEligibleCampaign));
        };
        if campaign.status != CampaignStatus::Active {
            return Ok(EligibilityDecision::ineligible(CampaignNotActive));
        }
        if let Err(e) = campaign.validate(Utc::now()) {
            warn!(campaign_id = %campaign.id, error = %e, "活动快照不在有效期内");
            return Ok(EligibilityDecision::ineligible(CampaignNotActive));
        }
        if campaign.is_exhausted() {
            return Ok(EligibilityDecision::ineligible(RewardLimitReached));
        }
        if !campaign.accepts_order_value(request.order_value) {
            return Ok(EligibilityDecision::ineligible(OrderValueBelowMinimum));
        }

        let group = self
            .deps
            .repository
            .get_reward_group_by_id(campaign.reward_group_id)
            .await?;
        if group.is_none() {
            return Ok(EligibilityDecision::ineligible(RewardGroupNotFound));
        }

        let decision = match self.deps.orders.get_order(request.order_id).await? {
            None => EligibilityDecision::ineligible(OrderNotCached),
            Some(order) if order.is_complete(Utc::now()) => {
                EligibilityDecision::ineligible(OrderAlreadyComplete)
            }
            Some(_) => EligibilityDecision::eligible(),
        };
        Ok(decision)
    }
}

#[async_trait]
impl RewardUseCase for RewardOrchestrator {
    #[instrument(skip(self, event), fields(order_id = event.order_id, reward_type_id = event.reward_type_id))]
    async fn allocate_reward(&self, event: &AllocateReward) -> Result<AllocationReceipt> {
        let result = self.allocate(event).await;
        metrics::record_allocation(&outcome_label(&result));
        result
    }

    #[instrument(skip(self, event), fields(order_id = event.order_id))]
    async fn cancel_reward(&self, event: &RevokeReward) -> Result<()> {
        let result = self.cancel(event).await;
        metrics::record_cancellation(&outcome_label(&result));
        result
    }

    #[instrument(skip(self, event), fields(order_id = event.order_id, reward_group_id = ?event.reward_group_id))]
    async fn reallocate_reward(&self, event: &ReAllocateReward) -> Result<AllocationReceipt> {
        let result = self.reallocate(event).await;
        metrics::record_allocation(&outcome_label(&result));
        result
    }

    #[instrument(skip(self, request), fields(order_id = request.order_id))]
    async fn check_reward_eligibility(
        &self,
        request: &EligibilityRequest,
    ) -> Result<EligibilityDecision> {
        let decision = self.evaluate_eligibility(request).await?;
        metrics::record_eligibility_check(decision.eligible);
        debug!(eligible = decision.eligible, reason = ?decision.reason, "资格检查完成");
        Ok(decision)
    }
}

/// 新奖励组 ID
fn mint_reward_group_id() -> i64 {
    rand::random_range(1..i64::MAX)
}

fn outcome_label<T>(result: &Result<T>) -> String {
    match result {
        Ok(_) => "success".to_string(),
        Err(e) => e.error_code().to_lowercase(),
    }
}
