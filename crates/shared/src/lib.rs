//! 共享库
//!
//! 包含奖励服务使用的配置、错误处理、数据库连接、缓存、RabbitMQ 等基础设施代码。

pub mod amqp;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod observability;
pub mod retry;
