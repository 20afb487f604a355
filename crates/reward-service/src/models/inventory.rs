//! 库存操作结果

use serde::{Deserialize, Serialize};

/// 库存校验或锁定的结果
///
/// `item_ids` 为库存服务实际分配的奖励项 ID，仅在锁定成功时非空
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryCheck {
    pub success: bool,
    #[serde(default)]
    pub item_ids: Vec<i64>,
}

impl InventoryCheck {
    pub fn granted(item_ids: Vec<i64>) -> Self {
        Self {
            success: true,
            item_ids,
        }
    }

    pub fn denied() -> Self {
        Self::default()
    }

    /// 锁定是否完全成功：请求的每个商品都拿到了奖励项
    pub fn is_fully_blocked(&self, requested: usize) -> bool {
        self.success && !self.item_ids.is_empty() && self.item_ids.len() >= requested
    }
}
