//! 服务层

pub mod dto;
mod orchestrator;
mod saga;
mod snapshot;

#[cfg(test)]
pub use orchestrator::MockRewardUseCase;
pub use orchestrator::{
    DEFAULT_BATCH_SIZE, DEFAULT_SHIPPING_COST_CEILING, OrchestratorSettings, RewardDependencies,
    RewardOrchestrator, RewardUseCase,
};
pub use saga::{AllocationSaga, AllocationStep};
#[cfg(test)]
pub use snapshot::InMemoryOrderStore;
pub use snapshot::{AllocationClaim, CachedOrderStore, OrderSnapshotStore};
