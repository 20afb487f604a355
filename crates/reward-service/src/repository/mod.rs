//! 奖励仓储层
//!
//! - 仓储只负责数据持久化，不包含业务逻辑
//! - 批量写入在单个事务内完成，失败整体回滚
//! - 定义 trait 接口以支持 mock 测试

#[cfg(test)]
mod in_memory;
mod pg_repo;
mod traits;

#[cfg(test)]
pub use in_memory::InMemoryRewardRepository;
pub use pg_repo::PgRewardRepository;
pub use traits::*;
