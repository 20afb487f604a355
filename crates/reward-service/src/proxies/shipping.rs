//! 发货代理
//!
//! 在承运方之上加固定间隔重试：最多 3 次尝试，每次间隔 1 秒。
//! 只有传输失败和系统故障会重试，地址无效等数据问题立即返回。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reward_shared::retry::{RetryPolicy, retry_with_policy};
use thiserror::Error;
use tracing::{info, warn};

use super::traits::Shipper;
use crate::error::Result;
use crate::models::{ShipmentErrorKind, ShipmentResponse, ShipmentStatus, UserDetail};

const SHIP_ATTEMPTS: u32 = 3;
const SHIP_RETRY_DELAY: Duration = Duration::from_secs(1);

/// 发货失败
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ShippingError {
    #[error("承运方拒绝发货: {0}")]
    Rejected(ShipmentErrorKind),

    #[error("承运方无法承运")]
    NotPossible,

    #[error("发货暂时失败: {0}")]
    Transient(String),

    #[error("发货重试 {attempts} 次后仍失败: {message}")]
    Exhausted { attempts: u32, message: String },
}

impl ShippingError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// 带重试的发货代理
pub struct ShippingProxy {
    shipper: Arc<dyn Shipper>,
    policy: RetryPolicy,
}

impl ShippingProxy {
    pub fn new(shipper: Arc<dyn Shipper>) -> Self {
        Self::with_policy(shipper, RetryPolicy::fixed(SHIP_ATTEMPTS, SHIP_RETRY_DELAY))
    }

    pub fn with_policy(shipper: Arc<dyn Shipper>, policy: RetryPolicy) -> Self {
        Self { shipper, policy }
    }

    /// 单个奖励项发货
    pub async fn ship_item(
        &self,
        reward_item_id: i64,
        user: &UserDetail,
    ) -> std::result::Result<ShipmentResponse, ShippingError> {
        self.with_retry("ship_item", || async move {
            classify(self.shipper.ship_item(reward_item_id, user).await)
        })
        .await
    }

    /// 多个奖励项合并为一个物流单发货
    pub async fn ship_items(
        &self,
        reward_item_ids: &[i64],
        user: &UserDetail,
    ) -> std::result::Result<ShipmentResponse, ShippingError> {
        let response = self
            .with_retry("ship_items", || async move {
                classify(self.shipper.ship_items(reward_item_ids, user).await)
            })
            .await?;

        info!(
            items = reward_item_ids.len(),
            confirmation_id = ?response.confirmation_id,
            cost = response.cost,
            "发货成功"
        );
        Ok(response)
    }

    pub async fn get_shipment_status(&self, shipment_id: &str) -> Result<ShipmentStatus> {
        let status = self.shipper.get_shipment_status(shipment_id).await?;
        info!(shipment_id, ?status, "查询物流单状态");
        Ok(status)
    }

    pub async fn cancel_shipment(&self, shipment_id: &str) -> Result<()> {
        self.shipper.cancel_shipment(shipment_id).await
    }

    async fn with_retry<F, Fut>(
        &self,
        operation: &str,
        op: F,
    ) -> std::result::Result<ShipmentResponse, ShippingError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<ShipmentResponse, ShippingError>>,
    {
        retry_with_policy(&self.policy, operation, ShippingError::is_transient, op)
            .await
            .map_err(|err| match err {
                ShippingError::Transient(message) => {
                    warn!(operation, %message, "发货重试次数耗尽");
                    ShippingError::Exhausted {
                        attempts: self.policy.max_retries + 1,
                        message,
                    }
                }
                other => other,
            })
    }
}

/// 按错误分类决定是否可重试
fn classify(
    result: Result<ShipmentResponse>,
) -> std::result::Result<ShipmentResponse, ShippingError> {
    let response = result.map_err(|e| ShippingError::Transient(e.to_string()))?;

    match response.error {
        Some(kind) if kind.is_transient() => Err(ShippingError::Transient(kind.to_string())),
        Some(kind) => Err(ShippingError::Rejected(kind)),
        None if !response.is_shipping_possible => Err(ShippingError::NotPossible),
        None => Ok(response),
    }
}
