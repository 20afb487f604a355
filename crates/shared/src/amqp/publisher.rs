//! 事件发布
//!
//! 序列化事件、幂等声明目标交换机，并以持久化模式发布。

use std::sync::Arc;

use chrono::Utc;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, ExchangeKind};
use tracing::info;
use uuid::Uuid;

use super::connection::AmqpConnection;
use super::observer::DeliveryObserver;
use super::schema::{Binding, EventSchema, Topology};
use crate::error::Result;
use crate::observability::metrics;

/// 持久化投递模式
const PERSISTENT: u8 = 2;

/// 发布上下文，携带调用方请求中的关联信息
#[derive(Debug, Clone, Default)]
pub struct PublishContext {
    pub correlation_id: Option<String>,
}

impl PublishContext {
    pub fn with_correlation_id(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
        }
    }
}

/// 构造消息属性
///
/// content-type 为 JSON，持久化投递，附带消息 ID、时间戳以及可选的关联 ID。
pub fn build_properties(ctx: &PublishContext, message_id: &str, timestamp: u64) -> BasicProperties {
    let properties = BasicProperties::default()
        .with_content_type("application/json".into())
        .with_delivery_mode(PERSISTENT)
        .with_message_id(message_id.into())
        .with_timestamp(timestamp);

    match &ctx.correlation_id {
        Some(id) => properties.with_correlation_id(id.as_str().into()),
        None => properties,
    }
}

/// 基于 lapin 的事件发布器
pub struct Publisher {
    channel: Channel,
    observer: Arc<dyn DeliveryObserver>,
}

impl Publisher {
    /// 创建发布器，开启发布确认
    pub async fn new(
        connection: &AmqpConnection,
        observer: Arc<dyn DeliveryObserver>,
    ) -> Result<Self> {
        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        Ok(Self { channel, observer })
    }

    /// 发布事件到其交换机，路由键取自绑定，返回生成的消息 ID
    pub async fn publish<E: EventSchema>(
        &self,
        ctx: &PublishContext,
        event: &E,
        binding: Binding,
    ) -> Result<String> {
        let topology = Topology::of::<E>(binding);
        let payload = serde_json::to_vec(event)?;

        self.channel
            .exchange_declare(
                &topology.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        let message_id = Uuid::new_v4().to_string();
        let properties = build_properties(ctx, &message_id, Utc::now().timestamp() as u64);

        let confirm = self
            .channel
            .basic_publish(
                &topology.exchange,
                &topology.routing_key,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await?;
        confirm.await?;

        info!(
            exchange = %topology.exchange,
            routing_key = %topology.routing_key,
            message_id = %message_id,
            "事件已发布"
        );

        metrics::record_event_published(&topology.exchange);
        self.observer.on_published(&topology.exchange);

        Ok(message_id)
    }
}
