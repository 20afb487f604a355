//! 奖励事件消费者
//!
//! 每个处理器绑定一个队列，解析事件后交给奖励用例处理。
//! 处理失败只返回给投递循环，确认策略由投递循环决定。

mod buffer;
mod handlers;

#[cfg(test)]
pub use buffer::MockEventPublisher;
pub use buffer::EventPublisher;
pub use handlers::{
    AllocateRewardHandler, BufferSettings, ReAllocateRewardHandler, RevokeRewardHandler,
};
