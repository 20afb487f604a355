//! RabbitMQ 基础设施封装
//!
//! 每种事件类型绑定独立的 topic 交换机与队列：
//! - 交换机：事件类型名的 snake_case 形式，持久化
//! - 队列：`{exchange}_{suffix}`，非持久、独占
//! - 路由键：与队列名相同
//!
//! 订阅方手动确认投递，发布方使用持久化投递模式。

mod connection;
mod consumer;
mod observer;
mod publisher;
mod schema;

pub use connection::AmqpConnection;
pub use consumer::{
    Acknowledger, DeliveryContext, DeliveryHandler, HandlerError, InboundMessage, LoopExit,
    LoopSettings, Subscriber, run_delivery_loop,
};
pub use observer::{DeliveryObserver, ProcessedLog};
pub use publisher::{PublishContext, Publisher, build_properties};
pub use schema::{Binding, EventSchema, Topology, to_snake_case};
