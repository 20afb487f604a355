//! 奖励分配服务
//!
//! 消费订单确认、订单取消以及缓冲队列事件，为订单分配、撤销和重新分配奖励；
//! 同时通过 HTTP 提供订单奖励资格查询。

pub mod api;
pub mod consumer;
pub mod error;
pub mod events;
pub mod models;
pub mod proxies;
pub mod repository;
pub mod service;

pub use error::{Result, ServiceError};

/// 奖励表结构迁移
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
