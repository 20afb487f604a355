//! 邮件发送
//!
//! 当前为模拟实现，只记录日志，生产环境需要接入真实的邮件服务

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use super::traits::Mailer;
use crate::error::{Result, ServiceError};

/// 只记录日志的邮件发送器
pub struct LogMailer {
    from_address: String,
}

impl LogMailer {
    pub fn new(from_address: impl Into<String>) -> Self {
        Self {
            from_address: from_address.into(),
        }
    }
}

impl Default for LogMailer {
    fn default() -> Self {
        Self::new("noreply@rewards.example.com")
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send_email(&self, name: &str, address: &str, body: &str) -> Result<()> {
        if !address.contains('@') {
            return Err(ServiceError::Validation(format!("无效的邮箱地址: {}", address)));
        }

        let message_id = Uuid::new_v4();
        info!(
            %message_id,
            from = %self.from_address,
            to = %address,
            recipient = %name,
            body_len = body.len(),
            "邮件已发送（模拟）"
        );
        Ok(())
    }
}

/// 奖励分配成功的通知正文
pub fn allocation_email_body(user_name: &str, order_id: i64) -> String {
    format!(
        "{}，您好！您的订单 {} 已获得奖励，奖品将随物流单寄出。",
        user_name, order_id
    )
}
