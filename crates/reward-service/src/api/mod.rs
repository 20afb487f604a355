//! HTTP 接口
//!
//! 对外只暴露奖励资格查询与健康检查。

mod handlers;
mod state;

use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Router, middleware};
use reward_shared::observability::middleware as obs_middleware;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use handlers::{EligibilityBody, StandardResponse};
pub use state::{AppState, DependencyHealth, InfraHealth};

/// 单个请求的处理时限
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// 构建应用路由
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/health", get(handlers::health))
        .route("/v1/rewards/eligibility", post(handlers::check_eligibility))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            REQUEST_TIMEOUT,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::correlation_id))
        .with_state(state)
}
