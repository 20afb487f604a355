//! 消息代理连接
//!
//! 启动时以有界指数退避建立连接，超出尝试次数或总耗时后返回错误，
//! 是否继续运行由调用方决定。

use std::time::Duration;

use lapin::{Channel, Connection, ConnectionProperties};
use tracing::{info, warn};

use crate::config::AmqpConfig;
use crate::error::{Result, RewardError};
use crate::retry::{RetryPolicy, retry_with_policy};

/// RabbitMQ 连接
pub struct AmqpConnection {
    connection: Connection,
}

impl AmqpConnection {
    /// 建立连接，失败时按配置退避重试
    pub async fn connect_with_retry(config: &AmqpConfig) -> Result<Self> {
        let policy = Self::connect_policy(config);

        let connection = retry_with_policy(
            &policy,
            "amqp_connect",
            RewardError::is_retryable,
            || async {
                Connection::connect(
                    &config.url,
                    ConnectionProperties::default().with_connection_name("reward-service".into()),
                )
                .await
                .map_err(RewardError::from)
            },
        )
        .await?;

        info!("RabbitMQ 连接已建立");
        Ok(Self { connection })
    }

    fn connect_policy(config: &AmqpConfig) -> RetryPolicy {
        RetryPolicy::exponential(
            config.connect_max_attempts.max(1),
            Duration::from_millis(config.connect_initial_backoff_ms),
            config.connect_max_elapsed(),
        )
    }

    /// 创建新的通道，每个订阅独占一个
    pub async fn create_channel(&self) -> Result<Channel> {
        self.connection
            .create_channel()
            .await
            .map_err(RewardError::from)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    /// 关闭连接
    pub async fn close(&self) {
        if let Err(e) = self.connection.close(200, "shutdown").await {
            warn!(error = %e, "关闭 RabbitMQ 连接失败");
        }
    }
}
