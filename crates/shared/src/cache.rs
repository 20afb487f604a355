//! Redis 缓存管理模块
//!
//! 提供 Redis 连接管理和订单快照读写所需的缓存操作封装。

use crate::config::RedisConfig;
use crate::error::{Result, RewardError};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{info, instrument};

/// Redis 缓存客户端
#[derive(Clone)]
pub struct Cache {
    client: Client,
}

impl Cache {
    /// 创建 Redis 客户端
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())?;
        info!("Redis client created");
        Ok(Self { client })
    }

    /// 获取连接
    async fn get_conn(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(RewardError::from)
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.get_conn().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(RewardError::from)
    }

    /// 获取值
    #[instrument(skip(self))]
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.get_conn().await?;
        let value: Option<String> = conn.get(key).await?;

        match value {
            Some(v) => Ok(Some(serde_json::from_str(&v)?)),
            None => Ok(None),
        }
    }

    /// 原子性地仅在 key 不存在时设置值，并指定 TTL
    ///
    /// 基于 Redis SET NX EX 实现，用于单订单分配占位。
    /// 返回 true 表示设置成功（key 不存在），false 表示 key 已存在。
    #[instrument(skip(self, value))]
    pub async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.get_conn().await?;

        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;

        Ok(result.is_some())
    }

    /// 仅当 key 的当前值等于 `expected` 时删除
    ///
    /// 返回 false 表示键已过期或已被其他持有者占用
    #[instrument(skip(self, expected))]
    pub async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let mut conn = self.get_conn().await?;

        let removed: i32 = redis::Script::new(COMPARE_AND_DELETE)
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;

        Ok(removed == 1)
    }

    /// 仅当 key 的当前值等于 `expected` 时替换为 `replacement`，保留原 TTL
    #[instrument(skip(self, expected, replacement))]
    pub async fn compare_and_swap(&self, key: &str, expected: &str, replacement: &str) -> Result<bool> {
        let mut conn = self.get_conn().await?;

        let swapped: i32 = redis::Script::new(COMPARE_AND_SWAP)
            .key(key)
            .arg(expected)
            .arg(replacement)
            .invoke_async(&mut conn)
            .await?;

        Ok(swapped == 1)
    }
}

// 校验当前值后再操作，两步在 Redis 内原子执行
const COMPARE_AND_DELETE: &str = r#"
    if redis.call("get", KEYS[1]) == ARGV[1] then
        return redis.call("del", KEYS[1])
    else
        return 0
    end
"#;

const COMPARE_AND_SWAP: &str = r#"
    if redis.call("get", KEYS[1]) == ARGV[1] then
        redis.call("set", KEYS[1], ARGV[2], "KEEPTTL")
        return 1
    else
        return 0
    end
"#;

/// 缓存键生成器
pub struct CacheKey;

impl CacheKey {
    /// 订单快照键，由订单子系统写入
    pub fn order(order_id: i64) -> String {
        format!("order:{}", order_id)
    }

    /// 订单奖励分配占位键
    pub fn allocation_claim(order_id: i64) -> String {
        format!("order:{}:allocation", order_id)
    }
}
