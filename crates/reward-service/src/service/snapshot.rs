//! 订单快照存储
//!
//! 订单快照由订单子系统写入缓存，奖励服务只读；
//! 分配占位键保证同一订单同一时刻只有一个分配流程越过前置检查。
//!
//! 占位值为持有者的随机凭证，分配成功后替换为 [`COMPLETED_CLAIM`]。
//! 释放时先比较值再删除，过期后被他人重新占用的键不会被误删。

use std::time::Duration;

use async_trait::async_trait;
use reward_shared::cache::{Cache, CacheKey};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::models::Order;

/// 分配成功后占位键的值
pub const COMPLETED_CLAIM: &str = "allocated";

/// 分配占位凭证
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationClaim {
    pub order_id: i64,
    pub token: String,
}

impl AllocationClaim {
    fn issue(order_id: i64) -> Self {
        Self {
            order_id,
            token: Uuid::new_v4().to_string(),
        }
    }
}

#[async_trait]
pub trait OrderSnapshotStore: Send + Sync {
    async fn get_order(&self, order_id: i64) -> Result<Option<Order>>;

    /// 原子占位，返回 None 表示已有分配流程持有该订单
    async fn try_claim_allocation(
        &self,
        order_id: i64,
        ttl: Duration,
    ) -> Result<Option<AllocationClaim>>;

    /// 分配成功后把占位标记为已完成，保留到过期
    async fn complete_allocation(&self, claim: &AllocationClaim) -> Result<bool>;

    /// 分配失败时释放占位，仅在占位仍属于该凭证时生效
    async fn release_allocation(&self, claim: &AllocationClaim) -> Result<bool>;

    /// 撤销奖励时释放已完成的占位，进行中的分配不受影响
    async fn release_completed_allocation(&self, order_id: i64) -> Result<bool>;
}

/// 基于 Redis 的订单快照存储
pub struct CachedOrderStore {
    cache: Cache,
}

impl CachedOrderStore {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl OrderSnapshotStore for CachedOrderStore {
    async fn get_order(&self, order_id: i64) -> Result<Option<Order>> {
        Ok(self.cache.get(&CacheKey::order(order_id)).await?)
    }

    async fn try_claim_allocation(
        &self,
        order_id: i64,
        ttl: Duration,
    ) -> Result<Option<AllocationClaim>> {
        let claim = AllocationClaim::issue(order_id);
        let claimed = self
            .cache
            .set_nx(&CacheKey::allocation_claim(order_id), &claim.token, ttl)
            .await?;
        debug!(order_id, claimed, "订单分配占位");
        Ok(claimed.then_some(claim))
    }

    async fn complete_allocation(&self, claim: &AllocationClaim) -> Result<bool> {
        let swapped = self
            .cache
            .compare_and_swap(
                &CacheKey::allocation_claim(claim.order_id),
                &claim.token,
                COMPLETED_CLAIM,
            )
            .await?;
        if !swapped {
            warn!(order_id = claim.order_id, "分配占位已过期或已被其他流程持有");
        }
        Ok(swapped)
    }

    async fn release_allocation(&self, claim: &AllocationClaim) -> Result<bool> {
        let released = self
            .cache
            .compare_and_delete(&CacheKey::allocation_claim(claim.order_id), &claim.token)
            .await?;
        if !released {
            warn!(order_id = claim.order_id, "分配占位已过期或已被其他流程持有");
        }
        Ok(released)
    }

    async fn release_completed_allocation(&self, order_id: i64) -> Result<bool> {
        Ok(self
            .cache
            .compare_and_delete(&CacheKey::allocation_claim(order_id), COMPLETED_CLAIM)
            .await?)
    }
}

#[cfg(test)]
pub use in_memory::InMemoryOrderStore;
