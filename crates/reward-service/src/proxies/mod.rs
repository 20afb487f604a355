//! 外部协作服务代理
//!
//! - `traits`: 能力接口，编排器只依赖这些接口
//! - `shipping`: 带重试的发货代理
//! - `http`: 基于 reqwest 的协作服务客户端
//! - `mailer`: 模拟邮件发送

mod http;
mod mailer;
mod shipping;
mod traits;

pub use http::{
    HttpCampaignCatalog, HttpInventoryService, HttpOrderStatusNotifier, HttpShipper,
    HttpUserDirectory, build_http_client,
};
pub use mailer::{LogMailer, allocation_email_body};
pub use shipping::{ShippingError, ShippingProxy};
pub use traits::*;
