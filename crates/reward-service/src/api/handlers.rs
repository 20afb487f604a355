//! 请求处理器

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use reward_shared::observability::middleware::CorrelationId;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, warn};

use super::state::AppState;
use crate::service::dto::{EligibilityDecision, EligibilityRequest};

/// 统一响应结构
#[derive(Debug, Serialize, Deserialize)]
pub struct StandardResponse<T> {
    pub message: String,
    pub response: T,
}

impl<T: Serialize> StandardResponse<T> {
    fn send(status: StatusCode, message: &str, response: T) -> Response {
        let body = Self {
            message: message.to_string(),
            response,
        };
        (status, Json(body)).into_response()
    }
}

/// 不带数据的响应
fn send_message(status: StatusCode, message: &str) -> Response {
    StandardResponse::send(status, message, json!({}))
}

/// 资格查询结果
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct EligibilityBody {
    pub eligible: bool,
    pub message: String,
    pub reason: String,
}

impl From<EligibilityDecision> for EligibilityBody {
    fn from(decision: EligibilityDecision) -> Self {
        match decision.reason {
            Some(reason) => Self {
                eligible: false,
                message: reason.message().to_string(),
                reason: reason.as_str().to_string(),
            },
            None => Self {
                eligible: decision.eligible,
                message: "reward is eligible".to_string(),
                reason: String::new(),
            },
        }
    }
}

/// 订单奖励资格查询
///
/// POST /v1/rewards/eligibility
pub async fn check_eligibility(
    State(state): State<AppState>,
    Extension(correlation_id): Extension<CorrelationId>,
    payload: Result<Json<EligibilityRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(rejection) => {
            warn!(
                correlation_id = correlation_id.as_str(),
                error = %rejection,
                "资格查询请求体解析失败"
            );
            return send_message(StatusCode::BAD_REQUEST, "Bad request");
        }
    };

    match state.rewards.check_reward_eligibility(&request).await {
        // 外层 message 只表示请求成功，资格说明放在 response.message
        Ok(decision) => {
            StandardResponse::send(StatusCode::OK, "OK", EligibilityBody::from(decision))
        }
        Err(e) => {
            error!(
                correlation_id = correlation_id.as_str(),
                order_id = request.order_id,
                error = %e,
                "资格查询失败"
            );
            send_message(
                StatusCode::INTERNAL_SERVER_ERROR,
                "could not check, please try again",
            )
        }
    }
}

/// 健康检查：数据库与 Redis 均可用时返回 200
///
/// GET /v1/health
pub async fn health(State(state): State<AppState>) -> Response {
    let (db_ok, redis_ok) = tokio::join!(state.health.database_ok(), state.health.redis_ok());
    let all_ok = db_ok && redis_ok;

    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = json!({
        "status": if all_ok { "ok" } else { "degraded" },
        "service": "reward-service",
        "checks": {
            "database": if db_ok { "ok" } else { "fail" },
            "redis": if redis_ok { "ok" } else { "fail" }
        }
    });
    (status, Json(body)).into_response()
}
