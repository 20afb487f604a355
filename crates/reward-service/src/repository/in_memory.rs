//! 内存版奖励仓储，供服务层测试使用
//!
//! 每次写操作先在状态副本上执行，全部成功才替换正式状态，
//! 以此模拟事务提交与回滚。支持在指定批次注入失败。

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;
use reward_shared::error::RewardError;

use super::traits::RewardRepositoryTrait;
use crate::error::{Result, ServiceError};
use crate::models::{OrderRewardItem, RewardGroup};

#[derive(Debug, Clone, Default)]
struct State {
    groups: HashMap<i64, RewardGroup>,
    group_products: HashMap<i64, Vec<i64>>,
    group_items: BTreeSet<(i64, i64)>,
    order_groups: Vec<(i64, i64)>,
    order_items: BTreeMap<(i64, i64), OrderRewardItem>,
}

impl State {
    fn insert_group_item(&mut self, reward_group_id: i64, reward_item_id: i64) -> Result<()> {
        if !self.group_items.insert((reward_group_id, reward_item_id)) {
            return Err(duplicate("reward_group_reward_items"));
        }
        Ok(())
    }

    fn insert_order_group(&mut self, order_id: i64, reward_group_id: i64) -> Result<()> {
        if self.order_groups.contains(&(order_id, reward_group_id)) {
            return Err(duplicate("order_reward_group"));
        }
        self.order_groups.push((order_id, reward_group_id));
        Ok(())
    }
}

fn duplicate(table: &str) -> ServiceError {
    RewardError::Database(sqlx::Error::Protocol(format!("{table}: 主键冲突"))).into()
}

/// 内存版奖励仓储
#[derive(Default)]
pub struct InMemoryRewardRepository {
    state: Mutex<State>,
    /// 下一次批量写入在该批次（从 0 开始）失败
    fail_on_batch: Mutex<Option<usize>>,
}

impl InMemoryRewardRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置奖励组模板的商品列表
    pub fn with_products(self, reward_group_id: i64, product_ids: Vec<i64>) -> Self {
        self.state
            .lock()
            .group_products
            .insert(reward_group_id, product_ids);
        self
    }

    /// 预置一个已存在的奖励组及其奖励项
    pub fn with_group(self, group: RewardGroup, reward_item_ids: &[i64]) -> Self {
        {
            let mut state = self.state.lock();
            for item_id in reward_item_ids {
                state.group_items.insert((group.id, *item_id));
            }
            state.groups.insert(group.id, group);
        }
        self
    }

    /// 预置订单与奖励组的关联以及订单奖励项
    pub fn with_order_allocation(self, order_id: i64, reward_group_id: i64, items: &[i64]) -> Self {
        {
            let mut state = self.state.lock();
            state.order_groups.push((order_id, reward_group_id));
            for item_id in items {
                state.order_items.insert(
                    (order_id, *item_id),
                    OrderRewardItem::allocated(order_id, *item_id, chrono::Utc::now()),
                );
            }
        }
        self
    }

    pub fn fail_on_batch(&self, batch: usize) {
        *self.fail_on_batch.lock() = Some(batch);
    }

    pub fn order_reward_items(&self, order_id: i64) -> Vec<OrderRewardItem> {
        self.state
            .lock()
            .order_items
            .values()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect()
    }

    pub fn reward_group_count(&self) -> usize {
        self.state.lock().groups.len()
    }

    pub fn group_item_count(&self) -> usize {
        self.state.lock().group_items.len()
    }

    fn check_injected_failure(&self, batch: usize) -> Result<()> {
        let mut slot = self.fail_on_batch.lock();
        if *slot == Some(batch) {
            *slot = None;
            return Err(RewardError::Database(sqlx::Error::Protocol(format!(
                "第 {batch} 批写入失败"
            )))
            .into());
        }
        Ok(())
    }

    /// 在副本上执行写操作，成功才提交
    fn transaction<T>(&self, op: impl FnOnce(&mut State) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock();
        let mut staged = state.clone();
        let value = op(&mut staged)?;
        *state = staged;
        Ok(value)
    }
}

#[async_trait]
impl RewardRepositoryTrait for InMemoryRewardRepository {
    async fn get_reward_group_by_id(&self, id: i64) -> Result<Option<RewardGroup>> {
        Ok(self.state.lock().groups.get(&id).cloned())
    }

    async fn get_reward_item_ids_from_reward_group(&self, reward_group_id: i64) -> Result<Vec<i64>> {
        Ok(self
            .state
            .lock()
            .group_items
            .iter()
            .filter(|(group, _)| *group == reward_group_id)
            .map(|(_, item)| *item)
            .collect())
    }

    async fn get_product_ids_for_reward_group(&self, reward_group_id: i64) -> Result<Vec<i64>> {
        Ok(self
            .state
            .lock()
            .group_products
            .get(&reward_group_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_reward_group_ids_by_order(&self, order_id: i64) -> Result<Vec<i64>> {
        Ok(self
            .state
            .lock()
            .order_groups
            .iter()
            .filter(|(order, _)| *order == order_id)
            .map(|(_, group)| *group)
            .collect())
    }

    async fn get_order_ids_by_reward_group(&self, reward_group_id: i64) -> Result<Vec<i64>> {
        Ok(self
            .state
            .lock()
            .order_groups
            .iter()
            .filter(|(_, group)| *group == reward_group_id)
            .map(|(order, _)| *order)
            .collect())
    }

    async fn create_reward_group_allocation(
        &self,
        group: &RewardGroup,
        order_id: i64,
        reward_item_ids: &[i64],
        batch_size: usize,
    ) -> Result<()> {
        if reward_item_ids.is_empty() {
            return Err(ServiceError::Validation("没有可写入的奖励项".to_string()));
        }

        self.transaction(|state| {
            if state.groups.insert(group.id, group.clone()).is_some() {
                return Err(duplicate("reward_groups"));
            }
            state.insert_order_group(order_id, group.id)?;
            for (batch, chunk) in reward_item_ids.chunks(batch_size.max(1)).enumerate() {
                self.check_injected_failure(batch)?;
                for item_id in chunk {
                    state.insert_group_item(group.id, *item_id)?;
                }
            }
            Ok(())
        })
    }

    async fn associate_order_with_reward_group(
        &self,
        order_id: i64,
        reward_group_id: i64,
    ) -> Result<()> {
        self.transaction(|state| {
            if state
                .order_groups
                .iter()
                .any(|(_, group)| *group == reward_group_id)
            {
                return Err(ServiceError::RewardGroupInUse(reward_group_id));
            }
            state.insert_order_group(order_id, reward_group_id)
        })
    }

    async fn update_order_reward_items_batch(
        &self,
        items: &[OrderRewardItem],
        batch_size: usize,
    ) -> Result<()> {
        if items.is_empty() {
            return Err(ServiceError::Validation("没有需要写入的订单奖励项".to_string()));
        }
        let now = chrono::Utc::now();
        for item in items {
            item.validate(now)?;
        }

        self.transaction(|state| {
            for (batch, chunk) in items.chunks(batch_size.max(1)).enumerate() {
                self.check_injected_failure(batch)?;
                for item in chunk {
                    state
                        .order_items
                        .insert((item.order_id, item.reward_item_id), item.clone());
                }
            }
            Ok(())
        })
    }

    async fn delete_order_reward_group(&self, order_id: i64, reward_group_id: i64) -> Result<()> {
        self.transaction(|state| {
            let before = state.order_groups.len();
            state
                .order_groups
                .retain(|row| *row != (order_id, reward_group_id));
            if state.order_groups.len() == before {
                return Err(RewardError::not_found("OrderRewardGroup", order_id).into());
            }
            Ok(())
        })
    }

    async fn delete_order_reward_items_by_order(&self, order_id: i64) -> Result<()> {
        self.transaction(|state| {
            let before = state.order_items.len();
            state.order_items.retain(|(order, _), _| *order != order_id);
            if state.order_items.len() == before {
                return Err(RewardError::not_found("OrderRewardItem", order_id).into());
            }
            Ok(())
        })
    }

    async fn delete_reward_items_by_reward_group_id(&self, reward_group_id: i64) -> Result<()> {
        self.transaction(|state| {
            let before = state.group_items.len();
            state
                .group_items
                .retain(|(group, _)| *group != reward_group_id);
            if state.group_items.len() == before {
                return Err(
                    RewardError::not_found("RewardGroupRewardItem", reward_group_id).into(),
                );
            }
            Ok(())
        })
    }

    async fn delete_reward_group(&self, reward_group_id: i64) -> Result<()> {
        self.transaction(|state| match state.groups.remove(&reward_group_id) {
            Some(_) => Ok(()),
            None => Err(RewardError::not_found("RewardGroup", reward_group_id).into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn group(id: i64) -> RewardGroup {
        RewardGroup::new(id, "test group", None, 1, Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_failure_in_second_batch_commits_nothing() {
        let repo = InMemoryRewardRepository::new();
        repo.fail_on_batch(1);

        let items: Vec<i64> = (1..=7).collect();
        let result = repo
            .create_reward_group_allocation(&group(9), 42, &items, 5)
            .await;

        assert!(result.is_err());
        assert_eq!(repo.reward_group_count(), 0);
        assert_eq!(repo.group_item_count(), 0);
        assert!(repo.get_reward_group_ids_by_order(42).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_order_item_batch_failure_rolls_back() {
        let repo = InMemoryRewardRepository::new();
        repo.fail_on_batch(1);

        let now = Utc::now();
        let rows: Vec<OrderRewardItem> = (1..=6)
            .map(|id| OrderRewardItem::allocated(42, id, now))
            .collect();

        assert!(repo.update_order_reward_items_batch(&rows, 5).await.is_err());
        assert!(repo.order_reward_items(42).is_empty());

        // 注入只生效一次
        repo.update_order_reward_items_batch(&rows, 5).await.unwrap();
        assert_eq!(repo.order_reward_items(42).len(), 6);
    }

    #[tokio::test]
    async fn test_group_holders_follow_associations() {
        let repo = InMemoryRewardRepository::new()
            .with_group(group(9), &[501])
            .with_order_allocation(41, 9, &[501]);
        assert_eq!(repo.get_order_ids_by_reward_group(9).await.unwrap(), vec![41]);
        assert!(matches!(
            repo.associate_order_with_reward_group(42, 9).await,
            Err(ServiceError::RewardGroupInUse(9))
        ));

        repo.delete_order_reward_group(41, 9).await.unwrap();
        assert!(repo.get_order_ids_by_reward_group(9).await.unwrap().is_empty());
        repo.associate_order_with_reward_group(42, 9).await.unwrap();
        assert_eq!(repo.get_order_ids_by_reward_group(9).await.unwrap(), vec![42]);
    }

    #[tokio::test]
    async fn test_delete_missing_rows_is_not_found() {
        let repo = InMemoryRewardRepository::new();
        let err = repo.delete_order_reward_items_by_order(42).await.unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
        assert!(repo.delete_order_reward_group(42, 1).await.is_err());
    }
}
