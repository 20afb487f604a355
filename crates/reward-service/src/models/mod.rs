//! 领域模型

mod campaign;
mod enums;
mod inventory;
mod order;
mod reward;
mod shipping;

pub use campaign::{Campaign, EligibilityCriteria};
pub use enums::{CampaignStatus, OrderStatus, RewardStatus, ShipmentErrorKind, ShipmentStatus};
pub use inventory::InventoryCheck;
pub use order::{Order, OrderItem};
pub use reward::{OrderRewardItem, RewardGroup};
pub use shipping::{ShipmentResponse, UserDetail, UserLocation};

#[cfg(test)]
pub(crate) use campaign::fixtures;
