//! 订阅与投递循环
//!
//! 每个订阅独占一个通道和一个后台任务，按到达顺序逐条处理投递。
//! 处理器错误只记录，不向代理传播；确认时机由 [`AckPolicy`] 决定。

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use lapin::acker::Acker;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, ExchangeKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::connection::AmqpConnection;
use super::observer::DeliveryObserver;
use super::publisher::PublishContext;
use super::schema::{Binding, EventSchema, Topology};
use crate::config::{AckPolicy, AmqpConfig};
use crate::error::{Result, RewardError};
use crate::observability::metrics;

/// 处理器返回的错误类型，由业务层自行定义具体错误
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// 单条投递的元数据
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryContext {
    pub queue: String,
    pub message_id: Option<String>,
    pub correlation_id: Option<String>,
}

impl DeliveryContext {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            ..Default::default()
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// 处理过程中发布的后续消息沿用的上下文
    ///
    /// 入站消息没有关联 ID 时以其消息 ID 作为关联 ID。
    pub fn publish_context(&self) -> PublishContext {
        PublishContext {
            correlation_id: self
                .correlation_id
                .clone()
                .or_else(|| self.message_id.clone()),
        }
    }
}

/// 绑定到某个队列的业务处理器
///
/// 业务依赖在构造处理器时显式注入，这里只传入投递元数据与负载。
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn handle(
        &self,
        delivery: &DeliveryContext,
        payload: &[u8],
    ) -> std::result::Result<(), HandlerError>;
}

/// 投递确认句柄
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> Result<()>;
    async fn nack(&self, requeue: bool) -> Result<()>;
}

#[async_trait]
impl Acknowledger for Acker {
    async fn ack(&self) -> Result<()> {
        Acker::ack(self, BasicAckOptions::default())
            .await
            .map_err(RewardError::from)
    }

    async fn nack(&self, requeue: bool) -> Result<()> {
        Acker::nack(
            self,
            BasicNackOptions {
                requeue,
                ..Default::default()
            },
        )
        .await
        .map_err(RewardError::from)
    }
}

// ---------------------------------------------------------------------------
// InboundMessage
// ---------------------------------------------------------------------------

/// 拥有所有权的投递消息
///
/// 把 lapin 的 `Delivery` 拆成纯数据与确认句柄，投递循环因此不依赖真实代理。
pub struct InboundMessage {
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub message_id: Option<String>,
    pub correlation_id: Option<String>,
    acker: Box<dyn Acknowledger>,
}

impl std::fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundMessage")
            .field("routing_key", &self.routing_key)
            .field("payload_len", &self.payload.len())
            .field("message_id", &self.message_id)
            .field("correlation_id", &self.correlation_id)
            .finish()
    }
}

impl InboundMessage {
    pub fn new(routing_key: impl Into<String>, payload: Vec<u8>, acker: Box<dyn Acknowledger>) -> Self {
        Self {
            routing_key: routing_key.into(),
            payload,
            message_id: None,
            correlation_id: None,
            acker,
        }
    }

    fn from_delivery(delivery: Delivery) -> Self {
        let message_id = delivery
            .properties
            .message_id()
            .as_ref()
            .map(|s| s.as_str().to_string());
        let correlation_id = delivery
            .properties
            .correlation_id()
            .as_ref()
            .map(|s| s.as_str().to_string());

        Self {
            routing_key: delivery.routing_key.as_str().to_string(),
            payload: delivery.data,
            message_id,
            correlation_id,
            acker: Box::new(delivery.acker),
        }
    }
}

// ---------------------------------------------------------------------------
// 投递循环
// ---------------------------------------------------------------------------

/// 投递循环参数
#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// 处理完成后、确认之前的固定延迟
    pub ack_delay: Duration,
    pub ack_policy: AckPolicy,
}

impl From<&AmqpConfig> for LoopSettings {
    fn from(config: &AmqpConfig) -> Self {
        Self {
            ack_delay: config.ack_delay(),
            ack_policy: config.ack_policy,
        }
    }
}

/// 投递循环的退出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// 收到关闭信号
    Shutdown,
    /// 投递流结束（代理断开或通道关闭）
    StreamClosed,
    /// 投递流返回错误
    StreamError,
}

/// 运行单个订阅的投递循环
///
/// 使用 `tokio::select!` 偏向关闭信号：
/// - 收到关闭信号后立即退出，不再开始处理新投递；正在执行的处理器不会被中断
/// - 收到投递时调用处理器，等待 `ack_delay` 后按确认策略确认
/// - 投递流结束或出错时记录日志并退出
pub async fn run_delivery_loop<S>(
    topology: &Topology,
    deliveries: S,
    handler: Arc<dyn DeliveryHandler>,
    observer: Arc<dyn DeliveryObserver>,
    settings: &LoopSettings,
    mut shutdown: watch::Receiver<bool>,
) -> LoopExit
where
    S: Stream<Item = Result<InboundMessage>> + Send,
{
    futures::pin_mut!(deliveries);

    if *shutdown.borrow() {
        info!(queue = %topology.queue, "订阅启动前已收到关闭信号");
        return LoopExit::Shutdown;
    }

    info!(
        exchange = %topology.exchange,
        queue = %topology.queue,
        "投递循环已启动"
    );

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                // 发送端被丢弃同样视为关闭
                if changed.is_err() || *shutdown.borrow() {
                    info!(queue = %topology.queue, "收到关闭信号，投递循环退出");
                    return LoopExit::Shutdown;
                }
            }

            next = deliveries.next() => {
                let Some(next) = next else {
                    warn!(queue = %topology.queue, "投递通道已关闭，订阅结束");
                    return LoopExit::StreamClosed;
                };

                match next {
                    Ok(message) => {
                        process_message(topology, message, handler.as_ref(), observer.as_ref(), settings).await;
                    }
                    Err(e) => {
                        error!(queue = %topology.queue, error = %e, "接收投递出错，订阅结束");
                        return LoopExit::StreamError;
                    }
                }
            }
        }
    }
}

async fn process_message(
    topology: &Topology,
    message: InboundMessage,
    handler: &dyn DeliveryHandler,
    observer: &dyn DeliveryObserver,
    settings: &LoopSettings,
) {
    let span = info_span!(
        "delivery",
        exchange = %topology.exchange,
        queue = %topology.queue,
        message_id = message.message_id.as_deref().unwrap_or(""),
        correlation_id = message.correlation_id.as_deref().unwrap_or(""),
    );

    async {
        debug!(routing_key = %message.routing_key, bytes = message.payload.len(), "收到投递");

        let context = DeliveryContext {
            queue: topology.queue.clone(),
            message_id: message.message_id.clone(),
            correlation_id: message.correlation_id.clone(),
        };

        let started = Instant::now();
        let outcome = handler.handle(&context, &message.payload).await;
        let elapsed = started.elapsed().as_secs_f64();

        let succeeded = match &outcome {
            Ok(()) => {
                debug!("投递处理成功");
                metrics::record_event_consumed(&topology.exchange, "success", elapsed);
                true
            }
            Err(e) => {
                error!(error = %e, "投递处理失败");
                metrics::record_event_consumed(&topology.exchange, "failure", elapsed);
                observer.on_failed(&topology.exchange, &e.to_string());
                false
            }
        };

        tokio::time::sleep(settings.ack_delay).await;

        let ack_result = match settings.ack_policy {
            AckPolicy::AfterAttempt => message.acker.ack().await,
            AckPolicy::AfterSuccess if succeeded => message.acker.ack().await,
            AckPolicy::AfterSuccess => message.acker.nack(false).await,
        };
        if let Err(e) = ack_result {
            error!(error = %e, "确认投递失败");
        }

        observer.on_processed(&topology.exchange);
    }
    .instrument(span)
    .await
}

// ---------------------------------------------------------------------------
// Subscriber
// ---------------------------------------------------------------------------

/// 基于 lapin 的订阅器
pub struct Subscriber {
    connection: Arc<AmqpConnection>,
    settings: LoopSettings,
    prefetch_count: u16,
}

impl Subscriber {
    pub fn new(connection: Arc<AmqpConnection>, config: &AmqpConfig) -> Self {
        Self {
            connection,
            settings: LoopSettings::from(config),
            prefetch_count: config.prefetch_count,
        }
    }

    /// 订阅事件 `E` 的指定绑定
    ///
    /// 拓扑声明失败会同步返回错误；成功后投递循环在后台任务中运行，
    /// 关闭信号触发后关闭通道并结束任务。
    pub async fn subscribe<E: EventSchema>(
        &self,
        binding: Binding,
        handler: Arc<dyn DeliveryHandler>,
        observer: Arc<dyn DeliveryObserver>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<JoinHandle<LoopExit>> {
        let topology = Topology::of::<E>(binding);
        let channel = self.connection.create_channel().await?;

        channel
            .basic_qos(self.prefetch_count, BasicQosOptions::default())
            .await?;
        self.declare_topology(&channel, &topology).await?;

        let consumer = channel
            .basic_consume(
                &topology.queue,
                &format!("{}-consumer", topology.queue),
                BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        info!(
            exchange = %topology.exchange,
            queue = %topology.queue,
            routing_key = %topology.routing_key,
            "订阅已建立"
        );

        let deliveries = consumer.map(|d| d.map(InboundMessage::from_delivery).map_err(RewardError::from));
        let settings = self.settings.clone();

        Ok(tokio::spawn(async move {
            let exit =
                run_delivery_loop(&topology, deliveries, handler, observer, &settings, shutdown)
                    .await;

            if exit == LoopExit::Shutdown
                && let Err(e) = channel.close(200, "subscription cancelled").await
            {
                warn!(queue = %topology.queue, error = %e, "关闭订阅通道失败");
            }
            exit
        }))
    }

    /// 声明交换机、队列与绑定
    async fn declare_topology(&self, channel: &Channel, topology: &Topology) -> Result<()> {
        channel
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

        let mut queue_args = FieldTable::default();
        if self.settings.ack_policy == AckPolicy::AfterSuccess {
            self.declare_dead_letter(channel, topology).await?;
            queue_args.insert(
                "x-dead-letter-exchange".into(),
                AMQPValue::LongString(topology.dead_letter_exchange().into()),
            );
        }

        channel
            .queue_declare(
                &topology.queue,
                QueueDeclareOptions {
                    durable: false,
                    exclusive: true,
                    ..Default::default()
                },
                queue_args,
            )
            .await?;

        channel
            .queue_bind(
                &topology.queue,
                &topology.exchange,
                &topology.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok(())
    }

    /// 为拒绝的投递声明死信交换机与持久队列
    async fn declare_dead_letter(&self, channel: &Channel, topology: &Topology) -> Result<()> {
        let dlx = topology.dead_letter_exchange();
        let dlq = topology.dead_letter_queue();

        channel
            .exchange_declare(
                &dlx,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_declare(
                &dlq,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_bind(&dlq, &dlx, "", QueueBindOptions::default(), FieldTable::default())
            .await?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amqp::observer::ProcessedLog;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingAcker {
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Acknowledger for RecordingAcker {
        async fn ack(&self) -> Result<()> {
            self.log.lock().push("ack");
            Ok(())
        }

        async fn nack(&self, requeue: bool) -> Result<()> {
            self.log.lock().push(if requeue { "nack_requeue" } else { "nack" });
            Ok(())
        }
    }

    /// 负载为 "fail" 时返回错误的处理器
    #[derive(Default)]
    struct CountingHandler {
        calls: AtomicUsize,
        deliveries: Mutex<Vec<DeliveryContext>>,
    }

    #[async_trait]
    impl DeliveryHandler for CountingHandler {
        async fn handle(
            &self,
            delivery: &DeliveryContext,
            payload: &[u8],
        ) -> std::result::Result<(), HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.deliveries.lock().push(delivery.clone());
            if payload == b"fail" {
                return Err("handler failed".into());
            }
            Ok(())
        }
    }

    fn topology() -> Topology {
        Topology::for_exchange("allocate_reward".to_string(), Binding::new("order_confirmed"))
    }

    fn settings(policy: AckPolicy) -> LoopSettings {
        LoopSettings {
            ack_delay: Duration::from_millis(1),
            ack_policy: policy,
        }
    }

    fn message(payload: &[u8], log: &Arc<Mutex<Vec<&'static str>>>) -> Result<InboundMessage> {
        Ok(InboundMessage::new(
            "allocate_reward_order_confirmed",
            payload.to_vec(),
            Box::new(RecordingAcker { log: log.clone() }),
        ))
    }

    #[tokio::test]
    async fn test_acks_after_attempt_even_on_failure() {
        let acks = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(CountingHandler::default());
        let observer = Arc::new(ProcessedLog::new());
        let (_tx, rx) = watch::channel(false);

        let stream = futures::stream::iter(vec![message(b"ok", &acks), message(b"fail", &acks)]);
        let exit = run_delivery_loop(
            &topology(),
            stream,
            handler.clone(),
            observer.clone(),
            &settings(AckPolicy::AfterAttempt),
            rx,
        )
        .await;

        assert_eq!(exit, LoopExit::StreamClosed);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
        assert_eq!(*acks.lock(), vec!["ack", "ack"]);
        assert_eq!(observer.processed_count("allocate_reward"), 2);
        assert_eq!(observer.failed_count("allocate_reward"), 1);
        assert_eq!(
            handler.deliveries.lock()[0].queue,
            "allocate_reward_order_confirmed"
        );
    }

    #[tokio::test]
    async fn test_handler_receives_inbound_correlation_id() {
        let acks = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(CountingHandler::default());
        let (_tx, rx) = watch::channel(false);

        let mut inbound = message(b"ok", &acks).unwrap();
        inbound.message_id = Some("msg-7".to_string());
        inbound.correlation_id = Some("corr-42".to_string());

        run_delivery_loop(
            &topology(),
            futures::stream::iter(vec![Ok(inbound)]),
            handler.clone(),
            Arc::new(ProcessedLog::new()),
            &settings(AckPolicy::AfterAttempt),
            rx,
        )
        .await;

        let delivery = handler.deliveries.lock()[0].clone();
        assert_eq!(delivery.message_id.as_deref(), Some("msg-7"));
        assert_eq!(delivery.correlation_id.as_deref(), Some("corr-42"));
        assert_eq!(
            delivery.publish_context().correlation_id.as_deref(),
            Some("corr-42")
        );
    }

    #[test]
    fn test_publish_context_falls_back_to_message_id() {
        let delivery = DeliveryContext {
            message_id: Some("msg-7".to_string()),
            ..DeliveryContext::new("q")
        };
        assert_eq!(
            delivery.publish_context().correlation_id.as_deref(),
            Some("msg-7")
        );
        assert!(DeliveryContext::new("q").publish_context().correlation_id.is_none());
    }

    #[tokio::test]
    async fn test_after_success_policy_nacks_failures() {
        let acks = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(CountingHandler::default());
        let (_tx, rx) = watch::channel(false);

        let stream = futures::stream::iter(vec![message(b"fail", &acks), message(b"ok", &acks)]);
        run_delivery_loop(
            &topology(),
            stream,
            handler,
            Arc::new(ProcessedLog::new()),
            &settings(AckPolicy::AfterSuccess),
            rx,
        )
        .await;

        assert_eq!(*acks.lock(), vec!["nack", "ack"]);
    }

    #[tokio::test]
    async fn test_shutdown_while_idle_stops_loop_without_handling() {
        let handler = Arc::new(CountingHandler::default());
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn({
            let handler = handler.clone();
            async move {
                run_delivery_loop(
                    &topology(),
                    futures::stream::pending::<Result<InboundMessage>>(),
                    handler,
                    Arc::new(ProcessedLog::new()),
                    &settings(AckPolicy::AfterAttempt),
                    rx,
                )
                .await
            }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();

        let exit = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("循环应在关闭信号后退出")
            .unwrap();
        assert_eq!(exit, LoopExit::Shutdown);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_already_cancelled_does_not_consume() {
        let acks = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(CountingHandler::default());
        let (_tx, rx) = watch::channel(true);

        let exit = run_delivery_loop(
            &topology(),
            futures::stream::iter(vec![message(b"ok", &acks)]),
            handler.clone(),
            Arc::new(ProcessedLog::new()),
            &settings(AckPolicy::AfterAttempt),
            rx,
        )
        .await;

        assert_eq!(exit, LoopExit::Shutdown);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        assert!(acks.lock().is_empty());
    }

    #[tokio::test]
    async fn test_stream_error_ends_subscription() {
        let acks = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(CountingHandler::default());
        let (_tx, rx) = watch::channel(false);

        let stream = futures::stream::iter(vec![
            Err(RewardError::Amqp("connection reset".to_string())),
            message(b"ok", &acks),
        ]);
        let exit = run_delivery_loop(
            &topology(),
            stream,
            handler.clone(),
            Arc::new(ProcessedLog::new()),
            &settings(AckPolicy::AfterAttempt),
            rx,
        )
        .await;

        assert_eq!(exit, LoopExit::StreamError);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_stops_loop() {
        let handler = Arc::new(CountingHandler::default());
        let (tx, rx) = watch::channel(false);
        drop(tx);

        let exit = tokio::time::timeout(
            Duration::from_secs(1),
            run_delivery_loop(
                &topology(),
                futures::stream::pending::<Result<InboundMessage>>(),
                handler,
                Arc::new(ProcessedLog::new()),
                &settings(AckPolicy::AfterAttempt),
                rx,
            ),
        )
        .await
        .unwrap();

        assert_eq!(exit, LoopExit::Shutdown);
    }
}
