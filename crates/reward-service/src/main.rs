//! 奖励分配服务入口
//!
//! 启动 HTTP 资格查询接口，并在消息代理可用时订阅三个奖励事件队列。

use std::sync::Arc;

use anyhow::Result;
use reward_service::api::{self, AppState, InfraHealth};
use reward_service::consumer::{
    AllocateRewardHandler, BufferSettings, EventPublisher, ReAllocateRewardHandler,
    RevokeRewardHandler,
};
use reward_service::events::{
    ALLOCATE_ON_ORDER_CONFIRMED, AllocateReward, REALLOCATE_FROM_BUFFER,
    REVOKE_ON_ORDER_CANCELLED, ReAllocateReward, RevokeReward,
};
use reward_service::proxies::{
    HttpCampaignCatalog, HttpInventoryService, HttpOrderStatusNotifier, HttpShipper,
    HttpUserDirectory, LogMailer, ShippingProxy, build_http_client,
};
use reward_service::repository::PgRewardRepository;
use reward_service::service::{
    CachedOrderStore, OrchestratorSettings, RewardDependencies, RewardOrchestrator, RewardUseCase,
};
use reward_shared::amqp::{AmqpConnection, DeliveryObserver, LoopExit, ProcessedLog, Publisher, Subscriber};
use reward_shared::cache::Cache;
use reward_shared::config::{AmqpConfig, AppConfig};
use reward_shared::database::Database;
use reward_shared::observability;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const SERVICE_NAME: &str = "reward-service";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置，失败时使用默认值
    let config = AppConfig::load(SERVICE_NAME).unwrap_or_else(|e| {
        eprintln!("加载配置失败，使用默认配置: {e}");
        AppConfig::default()
    });

    let _guard = observability::init(SERVICE_NAME, &config.observability).await?;
    info!(environment = %config.environment, "奖励服务启动中");

    // 2. 基础设施
    let db = Database::connect(&config.database).await?;
    db.run_migrations(&reward_service::MIGRATOR).await?;
    let cache = Cache::new(&config.redis)?;
    if let Err(e) = cache.health_check().await {
        warn!(error = %e, "Redis 暂不可用，订单快照读取将失败");
    }

    // 3. 协作服务与编排器
    let http = build_http_client(&config.services)?;
    let deps = RewardDependencies {
        repository: Arc::new(PgRewardRepository::new(db.pool().clone())),
        orders: Arc::new(CachedOrderStore::new(cache.clone())),
        inventory: Arc::new(HttpInventoryService::new(http.clone(), &config.services)),
        shipping: Arc::new(ShippingProxy::new(Arc::new(HttpShipper::new(
            http.clone(),
            &config.services,
        )))),
        users: Arc::new(HttpUserDirectory::new(http.clone(), &config.services)),
        mailer: Arc::new(LogMailer::default()),
        campaigns: Arc::new(HttpCampaignCatalog::new(http.clone(), &config.services)),
        order_status: Arc::new(HttpOrderStatusNotifier::new(http, &config.services)),
        settings: OrchestratorSettings::from_redis_config(&config.redis),
    };
    let rewards: Arc<dyn RewardUseCase> = Arc::new(RewardOrchestrator::new(deps));

    // 4. 消息订阅，代理不可用时只提供 HTTP 接口
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let subscriptions = match start_subscriptions(&config.amqp, rewards.clone(), shutdown_rx).await {
        Ok(handles) => handles,
        Err(e) => {
            error!(error = %e, "消息订阅启动失败，仅提供 HTTP 服务");
            Vec::new()
        }
    };

    // 5. HTTP 服务
    let state = AppState::new(rewards, Arc::new(InfraHealth::new(db.clone(), cache)));
    let listener = TcpListener::bind(config.server_addr()).await?;
    info!(addr = %config.server_addr(), "HTTP 服务已启动");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 停止订阅，正在处理的投递会执行完毕
    let _ = shutdown_tx.send(true);
    for handle in subscriptions {
        match handle.await {
            Ok(exit) => info!(?exit, "订阅已停止"),
            Err(e) => warn!(error = %e, "订阅任务异常结束"),
        }
    }

    db.close().await;
    info!("奖励服务已停止");
    Ok(())
}

/// 连接消息代理并订阅分配、缓冲、撤销三个队列
async fn start_subscriptions(
    config: &AmqpConfig,
    rewards: Arc<dyn RewardUseCase>,
    shutdown: watch::Receiver<bool>,
) -> reward_shared::error::Result<Vec<JoinHandle<LoopExit>>> {
    let connection = Arc::new(AmqpConnection::connect_with_retry(config).await?);
    let observer: Arc<dyn DeliveryObserver> = Arc::new(ProcessedLog::new());

    let buffer: Arc<dyn EventPublisher> =
        Arc::new(Publisher::new(&connection, observer.clone()).await?);
    let subscriber = Subscriber::new(connection, config);

    let handles = vec![
        subscriber
            .subscribe::<AllocateReward>(
                ALLOCATE_ON_ORDER_CONFIRMED,
                Arc::new(AllocateRewardHandler::new(rewards.clone(), buffer.clone())),
                observer.clone(),
                shutdown.clone(),
            )
            .await?,
        subscriber
            .subscribe::<ReAllocateReward>(
                REALLOCATE_FROM_BUFFER,
                Arc::new(ReAllocateRewardHandler::new(
                    rewards.clone(),
                    buffer,
                    BufferSettings::from(config),
                )),
                observer.clone(),
                shutdown.clone(),
            )
            .await?,
        subscriber
            .subscribe::<RevokeReward>(
                REVOKE_ON_ORDER_CANCELLED,
                Arc::new(RevokeRewardHandler::new(rewards)),
                observer,
                shutdown,
            )
            .await?,
    ];

    info!(subscriptions = handles.len(), "消息订阅已启动");
    Ok(handles)
}

/// 监听 Ctrl+C 与 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "注册 Ctrl+C 处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "注册 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("收到 Ctrl+C，开始优雅关闭"),
        _ = terminate => info!("收到 SIGTERM，开始优雅关闭"),
    }
}
