//! 奖励仓储 PostgreSQL 实现
//!
//! 批量写入使用 QueryBuilder 拼接多值 INSERT，所有批次共享同一事务，
//! 事务未提交即被丢弃时自动回滚。

use async_trait::async_trait;
use chrono::Utc;
use reward_shared::error::RewardError;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::{debug, instrument};

use super::traits::RewardRepositoryTrait;
use crate::error::{Result, ServiceError};
use crate::models::{OrderRewardItem, RewardGroup};

/// 奖励仓储
pub struct PgRewardRepository {
    pool: PgPool,
}

impl PgRewardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 在事务内分批插入奖励组与奖励项的关联
    async fn insert_reward_item_batches(
        conn: &mut PgConnection,
        reward_group_id: i64,
        reward_item_ids: &[i64],
        batch_size: usize,
    ) -> Result<()> {
        for (index, chunk) in reward_item_ids.chunks(batch_size.max(1)).enumerate() {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO reward_group_reward_items (reward_group_id, reward_item_id) ",
            );
            builder.push_values(chunk, |mut row, item_id| {
                row.push_bind(reward_group_id).push_bind(*item_id);
            });
            builder.build().execute(&mut *conn).await?;

            debug!(reward_group_id, batch = index, size = chunk.len(), "奖励项批次已写入");
        }
        Ok(())
    }

    async fn insert_order_reward_group(
        conn: &mut PgConnection,
        order_id: i64,
        reward_group_id: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_reward_group (order_id, reward_group_id)
            VALUES ($1, $2)
            "#,
        )
        .bind(order_id)
        .bind(reward_group_id)
        .execute(conn)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl RewardRepositoryTrait for PgRewardRepository {
    async fn get_reward_group_by_id(&self, id: i64) -> Result<Option<RewardGroup>> {
        let group = sqlx::query_as::<_, RewardGroup>(
            r#"
            SELECT id, name, expires_at, campaign_id
            FROM reward_groups
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(group)
    }

    async fn get_reward_item_ids_from_reward_group(&self, reward_group_id: i64) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT reward_item_id
            FROM reward_group_reward_items
            WHERE reward_group_id = $1
            ORDER BY reward_item_id
            "#,
        )
        .bind(reward_group_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn get_product_ids_for_reward_group(&self, reward_group_id: i64) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT product_id
            FROM reward_group_reward_products
            WHERE reward_group_id = $1
            ORDER BY product_id
            "#,
        )
        .bind(reward_group_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn get_reward_group_ids_by_order(&self, order_id: i64) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT reward_group_id
            FROM order_reward_group
            WHERE order_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn get_order_ids_by_reward_group(&self, reward_group_id: i64) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT order_id
            FROM order_reward_group
            WHERE reward_group_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(reward_group_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    #[instrument(skip(self, group, reward_item_ids), fields(reward_group_id = group.id, items = reward_item_ids.len()))]
    async fn create_reward_group_allocation(
        &self,
        group: &RewardGroup,
        order_id: i64,
        reward_item_ids: &[i64],
        batch_size: usize,
    ) -> Result<()> {
        if reward_item_ids.is_empty() {
            return Err(ServiceError::Validation(format!(
                "奖励组 {} 没有可写入的奖励项",
                group.id
            )));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO reward_groups (id, name, expires_at, campaign_id)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(group.id)
        .bind(&group.name)
        .bind(group.expires_at)
        .bind(group.campaign_id)
        .execute(&mut *tx)
        .await?;

        Self::insert_order_reward_group(&mut *tx, order_id, group.id).await?;
        Self::insert_reward_item_batches(&mut *tx, group.id, reward_item_ids, batch_size).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn associate_order_with_reward_group(
        &self,
        order_id: i64,
        reward_group_id: i64,
    ) -> Result<()> {
        // 奖励组只能被一个订单持有，已有关联时不插入
        let result = sqlx::query(
            r#"
            INSERT INTO order_reward_group (order_id, reward_group_id)
            SELECT $1, $2
            WHERE NOT EXISTS (
                SELECT 1 FROM order_reward_group WHERE reward_group_id = $2
            )
            "#,
        )
        .bind(order_id)
        .bind(reward_group_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::RewardGroupInUse(reward_group_id));
        }
        Ok(())
    }

    #[instrument(skip(self, items), fields(items = items.len()))]
    async fn update_order_reward_items_batch(
        &self,
        items: &[OrderRewardItem],
        batch_size: usize,
    ) -> Result<()> {
        if items.is_empty() {
            return Err(ServiceError::Validation("没有需要写入的订单奖励项".to_string()));
        }

        let now = Utc::now();
        for item in items {
            item.validate(now)?;
        }

        let mut tx = self.pool.begin().await?;

        for chunk in items.chunks(batch_size.max(1)) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO order_reward_item \
                 (order_id, reward_item_id, shipment_id, allocated_date, is_redeemed, redeemed_date) ",
            );
            builder.push_values(chunk, |mut row, item| {
                row.push_bind(item.order_id)
                    .push_bind(item.reward_item_id)
                    .push_bind(item.shipment_id)
                    .push_bind(item.allocated_date)
                    .push_bind(item.is_redeemed)
                    .push_bind(item.redeemed_date);
            });
            builder.push(
                " ON CONFLICT (order_id, reward_item_id) DO UPDATE SET \
                 shipment_id = EXCLUDED.shipment_id, \
                 allocated_date = EXCLUDED.allocated_date, \
                 is_redeemed = EXCLUDED.is_redeemed, \
                 redeemed_date = EXCLUDED.redeemed_date",
            );
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_order_reward_group(&self, order_id: i64, reward_group_id: i64) -> Result<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM order_reward_group
            WHERE order_id = $1 AND reward_group_id = $2
            "#,
        )
        .bind(order_id)
        .bind(reward_group_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RewardError::not_found("OrderRewardGroup", order_id).into());
        }
        Ok(())
    }

    async fn delete_order_reward_items_by_order(&self, order_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM order_reward_item WHERE order_id = $1")
            .bind(order_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RewardError::not_found("OrderRewardItem", order_id).into());
        }
        Ok(())
    }

    async fn delete_reward_items_by_reward_group_id(&self, reward_group_id: i64) -> Result<()> {
        let result =
            sqlx::query("DELETE FROM reward_group_reward_items WHERE reward_group_id = $1")
                .bind(reward_group_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RewardError::not_found("RewardGroupRewardItem", reward_group_id).into());
        }
        Ok(())
    }

    async fn delete_reward_group(&self, reward_group_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM reward_groups WHERE id = $1")
            .bind(reward_group_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RewardError::not_found("RewardGroup", reward_group_id).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reward_shared::config::DatabaseConfig;
    use reward_shared::database::Database;

    async fn setup() -> PgRewardRepository {
        let mut config = DatabaseConfig::default();
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.url = url;
        }
        let db = Database::connect(&config).await.unwrap();
        db.run_migrations(&crate::MIGRATOR).await.unwrap();
        PgRewardRepository::new(db.pool().clone())
    }

    fn unique_id() -> i64 {
        rand::random_range(1_000_000..i64::MAX / 2)
    }

    #[tokio::test]
    #[ignore] // 需要数据库连接
    async fn test_failed_batch_rolls_back_whole_allocation() {
        let repo = setup().await;
        let group = RewardGroup::new(unique_id(), "rollback", None, 1, Utc::now()).unwrap();
        let order_id = unique_id();

        // 第二批中的重复主键使事务失败
        let items = [1, 2, 3, 4, 5, 6, 6];
        let result = repo
            .create_reward_group_allocation(&group, order_id, &items, 5)
            .await;
        assert!(result.is_err());

        assert!(repo.get_reward_group_by_id(group.id).await.unwrap().is_none());
        assert!(repo.get_reward_group_ids_by_order(order_id).await.unwrap().is_empty());
        assert!(
            repo.get_reward_item_ids_from_reward_group(group.id)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    #[ignore] // 需要数据库连接
    async fn test_allocation_then_cancel_keeps_group_items() {
        let repo = setup().await;
        let group = RewardGroup::new(unique_id(), "kept", None, 1, Utc::now()).unwrap();
        let order_id = unique_id();
        let items: Vec<i64> = (1..=7).collect();

        repo.create_reward_group_allocation(&group, order_id, &items, 5)
            .await
            .unwrap();
        let rows: Vec<OrderRewardItem> = items
            .iter()
            .map(|id| OrderRewardItem::allocated(order_id, *id, Utc::now()))
            .collect();
        repo.update_order_reward_items_batch(&rows, 5).await.unwrap();
        // 重复写入按主键更新，不报冲突
        repo.update_order_reward_items_batch(&rows, 5).await.unwrap();
        assert_eq!(
            repo.get_order_ids_by_reward_group(group.id).await.unwrap(),
            vec![order_id]
        );

        repo.delete_order_reward_group(order_id, group.id).await.unwrap();
        assert!(repo.get_order_ids_by_reward_group(group.id).await.unwrap().is_empty());
        repo.delete_order_reward_items_by_order(order_id).await.unwrap();

        assert!(matches!(
            repo.delete_order_reward_items_by_order(order_id).await,
            Err(ServiceError::Shared(RewardError::NotFound { .. }))
        ));
        assert_eq!(
            repo.get_reward_item_ids_from_reward_group(group.id)
                .await
                .unwrap(),
            items
        );
    }
}
