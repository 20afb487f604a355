//! 用户收货信息与发货结果

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::ShipmentErrorKind;

/// 收货地址
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserLocation {
    pub street_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line_2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// 用户详情
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserDetail {
    pub user_id: String,
    pub user_name: String,
    pub email: String,
    pub location: UserLocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_notes: Option<String>,
}

/// 创建物流单的结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShipmentResponse {
    pub is_shipping_possible: bool,
    #[serde(default)]
    pub cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tentative_shipment_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ShipmentErrorKind>,
}

impl ShipmentResponse {
    /// 已成功受理的物流单
    pub fn confirmed(confirmation_id: impl Into<String>, cost: f64) -> Self {
        Self {
            is_shipping_possible: true,
            cost,
            tentative_shipment_date: None,
            confirmation_id: Some(confirmation_id.into()),
            error: None,
        }
    }

    /// 带错误分类的失败结果
    pub fn failed(kind: ShipmentErrorKind) -> Self {
        Self {
            is_shipping_possible: false,
            error: Some(kind),
            ..Default::default()
        }
    }
}
