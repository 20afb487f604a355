//! 基于 HTTP 的协作服务客户端
//!
//! 各服务地址来自 `services` 配置段，请求体与响应体均为 JSON

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use reward_shared::config::ServicesConfig;
use reward_shared::error::RewardError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use super::traits::{CampaignCatalog, InventoryService, OrderStatusNotifier, Shipper, UserDirectory};
use crate::error::Result;
use crate::models::{
    Campaign, InventoryCheck, RewardStatus, ShipmentResponse, ShipmentStatus, UserDetail,
};

/// 单个协作服务的 JSON 客户端
#[derive(Clone)]
pub struct ServiceClient {
    client: Client,
    base_url: String,
    service: &'static str,
}

impl ServiceClient {
    pub fn new(client: Client, base_url: &str, service: &'static str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn error(&self, err: impl ToString) -> RewardError {
        RewardError::external(self.service, err)
    }

    /// GET 请求，404 视为不存在
    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| self.error(e))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp.error_for_status().map_err(|e| self.error(e))?;
        Ok(Some(resp.json().await.map_err(|e| self.error(e))?))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_optional(path)
            .await?
            .ok_or_else(|| RewardError::not_found(self.service, path).into())
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        debug!(service = self.service, path, "发送请求");
        let resp = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| self.error(e))?
            .error_for_status()
            .map_err(|e| self.error(e))?;

        Ok(resp.json().await.map_err(|e| self.error(e))?)
    }

    async fn send_without_body(&self, request: reqwest::RequestBuilder) -> Result<()> {
        request
            .send()
            .await
            .map_err(|e| self.error(e))?
            .error_for_status()
            .map_err(|e| self.error(e))?;
        Ok(())
    }
}

/// 构造各协作服务客户端共用的 reqwest 客户端
pub fn build_http_client(config: &ServicesConfig) -> Result<Client> {
    Client::builder()
        .timeout(config.request_timeout())
        .build()
        .map_err(|e| RewardError::Internal(format!("创建 HTTP 客户端失败: {}", e)).into())
}

// ==================== 库存 ====================

pub struct HttpInventoryService {
    client: ServiceClient,
}

impl HttpInventoryService {
    pub fn new(client: Client, config: &ServicesConfig) -> Self {
        Self {
            client: ServiceClient::new(client, &config.inventory_url, "inventory"),
        }
    }
}

#[async_trait]
impl InventoryService for HttpInventoryService {
    async fn verify_bulk_availability(&self, product_ids: &[i64]) -> Result<InventoryCheck> {
        self.client
            .post("/v1/inventory/availability", &json!({ "product_ids": product_ids }))
            .await
    }

    async fn block_for_products(&self, product_ids: &[i64]) -> Result<InventoryCheck> {
        self.client
            .post("/v1/inventory/blocks", &json!({ "product_ids": product_ids }))
            .await
    }

    async fn release_items(&self, reward_item_ids: &[i64]) -> Result<()> {
        let request = self
            .client
            .client
            .post(self.client.url("/v1/inventory/releases"))
            .json(&json!({ "item_ids": reward_item_ids }));
        self.client.send_without_body(request).await
    }
}

// ==================== 物流 ====================

pub struct HttpShipper {
    client: ServiceClient,
}

impl HttpShipper {
    pub fn new(client: Client, config: &ServicesConfig) -> Self {
        Self {
            client: ServiceClient::new(client, &config.shipping_url, "shipping"),
        }
    }
}

#[derive(serde::Deserialize)]
struct ShipmentStatusBody {
    status: ShipmentStatus,
}

#[async_trait]
impl Shipper for HttpShipper {
    async fn ship_item(&self, reward_item_id: i64, user: &UserDetail) -> Result<ShipmentResponse> {
        self.ship_items(&[reward_item_id], user).await
    }

    async fn ship_items(
        &self,
        reward_item_ids: &[i64],
        user: &UserDetail,
    ) -> Result<ShipmentResponse> {
        self.client
            .post(
                "/v1/shipments",
                &json!({ "item_ids": reward_item_ids, "recipient": user }),
            )
            .await
    }

    async fn get_shipment_status(&self, shipment_id: &str) -> Result<ShipmentStatus> {
        let body: ShipmentStatusBody = self
            .client
            .get(&format!("/v1/shipments/{}/status", shipment_id))
            .await?;
        Ok(body.status)
    }

    async fn cancel_shipment(&self, shipment_id: &str) -> Result<()> {
        let request = self
            .client
            .client
            .delete(self.client.url(&format!("/v1/shipments/{}", shipment_id)));
        self.client.send_without_body(request).await
    }
}

// ==================== 用户 ====================

pub struct HttpUserDirectory {
    client: ServiceClient,
}

impl HttpUserDirectory {
    pub fn new(client: Client, config: &ServicesConfig) -> Self {
        Self {
            client: ServiceClient::new(client, &config.user_url, "user"),
        }
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn get_user_details(&self, user_id: &str) -> Result<Option<UserDetail>> {
        self.client
            .get_optional(&format!("/v1/users/{}", user_id))
            .await
    }
}

// ==================== 营销活动 ====================

pub struct HttpCampaignCatalog {
    client: ServiceClient,
}

impl HttpCampaignCatalog {
    pub fn new(client: Client, config: &ServicesConfig) -> Self {
        Self {
            client: ServiceClient::new(client, &config.campaign_url, "campaign"),
        }
    }
}

#[async_trait]
impl CampaignCatalog for HttpCampaignCatalog {
    async fn fetch_most_eligible_campaign(&self) -> Result<Option<Campaign>> {
        self.client.get_optional("/v1/campaigns/most-eligible").await
    }
}

// ==================== 订单 ====================

pub struct HttpOrderStatusNotifier {
    client: ServiceClient,
}

impl HttpOrderStatusNotifier {
    pub fn new(client: Client, config: &ServicesConfig) -> Self {
        Self {
            client: ServiceClient::new(client, &config.order_url, "order"),
        }
    }
}

#[async_trait]
impl OrderStatusNotifier for HttpOrderStatusNotifier {
    async fn update_order_reward_status(
        &self,
        order_id: i64,
        reward_group_id: i64,
        status: RewardStatus,
    ) -> Result<()> {
        let request = self
            .client
            .client
            .put(self.client.url(&format!("/v1/orders/{}/reward-status", order_id)))
            .json(&json!({ "reward_group_id": reward_group_id, "reward_status": status }));
        self.client.send_without_body(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use tokio::net::TcpListener;

    /// 启动本地桩服务，返回其地址
    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn config_for(url: &str) -> ServicesConfig {
        ServicesConfig {
            inventory_url: url.to_string(),
            shipping_url: url.to_string(),
            user_url: url.to_string(),
            campaign_url: url.to_string(),
            order_url: url.to_string(),
            request_timeout_ms: 2_000,
        }
    }

    #[tokio::test]
    async fn test_unknown_user_is_none() {
        let router = Router::new().route(
            "/v1/users/{id}",
            get(|Path(id): Path<String>| async move {
                if id == "u-1" {
                    Ok(Json(UserDetail {
                        user_id: id,
                        user_name: "Mei".to_string(),
                        email: "mei@example.com".to_string(),
                        ..Default::default()
                    }))
                } else {
                    Err(StatusCode::NOT_FOUND)
                }
            }),
        );
        let config = config_for(&serve(router).await);
        let users = HttpUserDirectory::new(build_http_client(&config).unwrap(), &config);

        let found = users.get_user_details("u-1").await.unwrap().unwrap();
        assert_eq!(found.email, "mei@example.com");
        assert!(users.get_user_details("u-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_shipment_rejection_is_decoded() {
        let router = Router::new().route(
            "/v1/shipments",
            post(|| async {
                Json(serde_json::json!({
                    "is_shipping_possible": false,
                    "error": "Out of Service Area"
                }))
            }),
        );
        let config = config_for(&serve(router).await);
        let shipper = HttpShipper::new(build_http_client(&config).unwrap(), &config);

        let response = shipper
            .ship_items(&[1, 2], &UserDetail::default())
            .await
            .unwrap();
        assert_eq!(
            response.error,
            Some(crate::models::ShipmentErrorKind::OutOfServiceArea)
        );
    }

    #[tokio::test]
    async fn test_server_error_maps_to_external_service_error() {
        let router = Router::new().route(
            "/v1/inventory/blocks",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let config = config_for(&serve(router).await);
        let inventory = HttpInventoryService::new(build_http_client(&config).unwrap(), &config);

        let err = inventory.block_for_products(&[1]).await.unwrap_err();
        assert_eq!(err.error_code(), "EXTERNAL_SERVICE_ERROR");
    }
}
