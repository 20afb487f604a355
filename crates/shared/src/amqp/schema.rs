//! 事件类型到交换机/队列/路由键的映射

use serde::Serialize;
use serde::de::DeserializeOwned;

/// 可通过消息代理传递的事件
///
/// `TYPE_NAME` 取事件的类型名，交换机名由其 snake_case 形式派生。
pub trait EventSchema: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TYPE_NAME: &'static str;

    fn exchange_name() -> String {
        to_snake_case(Self::TYPE_NAME)
    }
}

/// 队列绑定用途
///
/// 同一事件可以有多个用途不同的队列，如 "order_confirmed"、"buffer"。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub suffix: &'static str,
}

impl Binding {
    pub const fn new(suffix: &'static str) -> Self {
        Self { suffix }
    }

    /// 无特殊用途的普通绑定
    pub const fn plain() -> Self {
        Self { suffix: "queue" }
    }
}

/// 一次订阅/发布所使用的完整拓扑
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
}

impl Topology {
    pub fn of<E: EventSchema>(binding: Binding) -> Self {
        Self::for_exchange(E::exchange_name(), binding)
    }

    pub fn for_exchange(exchange: String, binding: Binding) -> Self {
        let queue = format!("{}_{}", exchange, binding.suffix);
        Self {
            routing_key: queue.clone(),
            queue,
            exchange,
        }
    }

    /// 死信交换机名，仅在 AfterSuccess 确认策略下声明
    pub fn dead_letter_exchange(&self) -> String {
        format!("{}_dlx", self.queue)
    }

    pub fn dead_letter_queue(&self) -> String {
        format!("{}_dlq", self.queue)
    }
}

/// 将 PascalCase / camelCase 名称转换为 snake_case
///
/// 连续大写视为缩写，如 `HTTPRequest` -> `http_request`。
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else if c == '-' || c == ' ' {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
        } else {
            out.push(c);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize)]
    struct AllocateReward {}

    impl EventSchema for AllocateReward {
        const TYPE_NAME: &'static str = "AllocateReward";
    }

    #[test]
    fn test_snake_case_conversion() {
        assert_eq!(to_snake_case("AllocateReward"), "allocate_reward");
        assert_eq!(to_snake_case("ReAllocateReward"), "re_allocate_reward");
        assert_eq!(to_snake_case("RevokeReward"), "revoke_reward");
        assert_eq!(to_snake_case("HTTPRequest"), "http_request");
        assert_eq!(to_snake_case("order2Shipped"), "order2_shipped");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn test_topology_derivation() {
        let topology = Topology::of::<AllocateReward>(Binding::new("order_confirmed"));

        assert_eq!(topology.exchange, "allocate_reward");
        assert_eq!(topology.queue, "allocate_reward_order_confirmed");
        assert_eq!(topology.routing_key, "allocate_reward_order_confirmed");
    }

    #[test]
    fn test_plain_binding() {
        let topology = Topology::of::<AllocateReward>(Binding::plain());
        assert_eq!(topology.queue, "allocate_reward_queue");
        assert_eq!(topology.dead_letter_exchange(), "allocate_reward_queue_dlx");
    }
}
