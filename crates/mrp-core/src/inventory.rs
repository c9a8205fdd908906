//! 庫存模型

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal;

/// 庫存資訊（來自庫存服務，數值為浮點數）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryInfo {
    /// 現有庫存
    pub on_hand: Option<f64>,
    /// 可用庫存（現有 - 已預留）
    pub available_quantity: Option<f64>,
    /// 已預留數量
    pub reserved_quantity: Option<f64>,
    /// 在途數量
    pub in_transit_quantity: Option<f64>,
}

impl InventoryInfo {
    /// 創建新的庫存記錄，可用庫存預設等於現有庫存
    pub fn new(on_hand: f64) -> Self {
        Self {
            on_hand: Some(on_hand),
            available_quantity: Some(on_hand),
            reserved_quantity: Some(0.0),
            in_transit_quantity: Some(0.0),
        }
    }

    /// 建構器模式：設置已預留數量（同步扣減可用庫存）
    pub fn with_reserved(mut self, reserved: f64) -> Self {
        self.reserved_quantity = Some(reserved);
        self.available_quantity = self.on_hand.map(|on_hand| on_hand - reserved);
        self
    }

    /// 建構器模式：設置在途數量
    pub fn with_in_transit(mut self, in_transit: f64) -> Self {
        self.in_transit_quantity = Some(in_transit);
        self
    }

    /// 轉為 Decimal 形式的庫存位置
    pub fn position(&self) -> StockPosition {
        StockPosition {
            on_hand: self.on_hand.and_then(decimal::from_f64),
            available_quantity: self.available_quantity.and_then(decimal::from_f64),
            reserved_quantity: self.reserved_quantity.and_then(decimal::from_f64),
            in_transit_quantity: self.in_transit_quantity.and_then(decimal::from_f64),
        }
    }
}

/// 庫存位置（Decimal）；`None` 表示缺值而非零
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockPosition {
    pub on_hand: Option<Decimal>,
    pub available_quantity: Option<Decimal>,
    pub reserved_quantity: Option<Decimal>,
    pub in_transit_quantity: Option<Decimal>,
}
