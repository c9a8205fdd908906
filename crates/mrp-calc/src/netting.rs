//! 淨需求計算

use mrp_core::{ComputationParams, SourceType, StockPosition};
use rust_decimal::Decimal;
use serde::Serialize;

/// 淨需求計算開關
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NettingFlags {
    pub include_safety_stock: bool,
    pub include_in_transit: bool,
    pub include_reserved: bool,
    pub include_reorder_point: bool,
}

impl NettingFlags {
    pub fn from_params(params: &ComputationParams) -> Self {
        Self {
            include_safety_stock: params.include_safety_stock(),
            include_in_transit: params.include_in_transit(),
            include_reserved: params.include_reserved(),
            include_reorder_point: params.include_reorder_point(),
        }
    }
}

impl Default for NettingFlags {
    fn default() -> Self {
        Self {
            include_safety_stock: true,
            include_in_transit: false,
            include_reserved: false,
            include_reorder_point: false,
        }
    }
}

/// 淨需求計算結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetRequirement {
    /// 總需求
    pub gross_requirement: Decimal,
    /// 基準庫存
    pub available: Decimal,
    /// 可用供應 = 基準庫存 + 在途 - 安全庫存
    pub supply: Decimal,
    /// 未考慮再訂購點的淨需求
    pub net_base: Decimal,
    /// 淨需求
    pub net_requirement: Decimal,
}

/// 淨需求計算器
pub struct NettingCalculator;

impl NettingCalculator {
    /// 計算淨需求
    ///
    /// # 參數
    /// * `flags.include_reserved`
    ///   - true: 以可用庫存（已扣預留）為基準
    ///   - false: 以現有庫存為基準，缺值時退回可用庫存
    /// * `flags.include_reorder_point` - 供應低於再訂購點時，淨需求至少補足到再訂購點
    pub fn calculate(
        gross: Decimal,
        position: &StockPosition,
        safety_stock: Option<Decimal>,
        reorder_point: Option<Decimal>,
        flags: NettingFlags,
    ) -> NetRequirement {
        let available = if flags.include_reserved {
            position.available_quantity
        } else {
            position.on_hand.or(position.available_quantity)
        }
        .unwrap_or(Decimal::ZERO);

        let mut supply = available;
        if flags.include_in_transit {
            supply += position.in_transit_quantity.unwrap_or(Decimal::ZERO);
        }
        if flags.include_safety_stock {
            supply -= safety_stock.unwrap_or(Decimal::ZERO);
        }

        let net_base = (gross - supply).max(Decimal::ZERO);

        let net_requirement = match reorder_point {
            Some(rop) if flags.include_reorder_point && rop > Decimal::ZERO && supply < rop => {
                net_base.max(rop - supply)
            }
            _ => net_base,
        };

        NetRequirement {
            gross_requirement: gross,
            available,
            supply,
            net_base,
            net_requirement,
        }
    }

    /// 依來源類型產生建議數量 `(工單, 採購)`
    ///
    /// 自製件需通過來源驗證才產生工單建議。
    pub fn suggest(
        source_type: Option<SourceType>,
        net_requirement: Decimal,
        validation_passed: bool,
    ) -> (Decimal, Decimal) {
        if net_requirement <= Decimal::ZERO {
            return (Decimal::ZERO, Decimal::ZERO);
        }
        match source_type {
            Some(SourceType::Make) if !validation_passed => (Decimal::ZERO, Decimal::ZERO),
            Some(t) if t.suggests_work_order() => (net_requirement, Decimal::ZERO),
            Some(t) if t.suggests_purchase() => (Decimal::ZERO, net_requirement),
            _ => (Decimal::ZERO, Decimal::ZERO),
        }
    }
}
