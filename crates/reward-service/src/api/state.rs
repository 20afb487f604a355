//! 路由共享状态

use std::sync::Arc;

use async_trait::async_trait;
use reward_shared::cache::Cache;
use reward_shared::database::Database;

use crate::service::RewardUseCase;

/// 依赖健康检查
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DependencyHealth: Send + Sync {
    async fn database_ok(&self) -> bool;
    async fn redis_ok(&self) -> bool;
}

/// 基于真实连接池与 Redis 客户端的健康检查
pub struct InfraHealth {
    db: Database,
    cache: Cache,
}

impl InfraHealth {
    pub fn new(db: Database, cache: Cache) -> Self {
        Self { db, cache }
    }
}

#[async_trait]
impl DependencyHealth for InfraHealth {
    async fn database_ok(&self) -> bool {
        self.db.health_check().await.is_ok()
    }

    async fn redis_ok(&self) -> bool {
        self.cache.health_check().await.is_ok()
    }
}

/// Axum 应用共享状态
#[derive(Clone)]
pub struct AppState {
    pub rewards: Arc<dyn RewardUseCase>,
    pub health: Arc<dyn DependencyHealth>,
}

impl AppState {
    pub fn new(rewards: Arc<dyn RewardUseCase>, health: Arc<dyn DependencyHealth>) -> Self {
        Self { rewards, health }
    }
}
