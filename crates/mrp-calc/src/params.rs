//! 參數合併
//!
//! 計算參數配置按作用範圍由低到高合併（global → warehouse → material → material_warehouse），
//! 同一範圍內依優先級遞增，後者覆寫前者。

use mrp_core::config::keys;
use mrp_core::{ComputationConfig, ComputationParams, Material, RecordId};
use rust_decimal::Decimal;

/// 合併適用的配置記錄
pub fn merge_scoped(
    configs: &[ComputationConfig],
    material_id: Option<RecordId>,
    warehouse_id: Option<RecordId>,
) -> ComputationParams {
    let mut applicable: Vec<&ComputationConfig> = configs
        .iter()
        .filter(|c| c.applies_to(material_id, warehouse_id))
        .collect();
    applicable.sort_by_key(|c| (c.scope, c.priority, c.id));

    applicable
        .into_iter()
        .fold(ComputationParams::new(), |merged, config| {
            merged.merged_with(&ComputationParams::from_value(&config.params))
        })
}

/// 安全庫存與再訂購點
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StockParameters {
    pub safety_stock: Option<Decimal>,
    pub reorder_point: Option<Decimal>,
}

impl StockParameters {
    /// 依序取值，後者覆寫前者：配置 → 物料預設 → 本次計算參數
    pub fn resolve(config: &ComputationParams, material: &Material, run: &ComputationParams) -> Self {
        let defaults = &material.defaults.inventory;
        let mut resolved = Self {
            safety_stock: config.decimal(keys::SAFETY_STOCK),
            reorder_point: config.decimal(keys::REORDER_POINT),
        };
        if defaults.safety_stock.is_some() {
            resolved.safety_stock = defaults.safety_stock;
        }
        if defaults.reorder_point.is_some() {
            resolved.reorder_point = defaults.reorder_point;
        }
        if let Some(value) = run.decimal(keys::SAFETY_STOCK) {
            resolved.safety_stock = Some(value);
        }
        if let Some(value) = run.decimal(keys::REORDER_POINT) {
            resolved.reorder_point = Some(value);
        }
        resolved
    }

    /// 只保留已開啟旗標對應的值（明細欄位用）
    pub fn visible(&self, params: &ComputationParams) -> Self {
        Self {
            safety_stock: self.safety_stock.filter(|_| params.include_safety_stock()),
            reorder_point: self.reorder_point.filter(|_| params.include_reorder_point()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mrp_core::ConfigScope;
    use serde_json::json;

    #[test]
    fn test_scope_precedence() {
        let configs = vec![
            ComputationConfig::global(1, 1, json!({"safety_stock": 1, "include_in_transit": true}))
                .with_scope(ConfigScope::MaterialWarehouse, Some(7), Some(2)),
            ComputationConfig::global(2, 1, json!({"safety_stock": 2, "reorder_point": 9})),
            ComputationConfig::global(3, 1, json!({"safety_stock": 3}))
                .with_scope(ConfigScope::Material, Some(7), None),
            ComputationConfig::global(4, 1, json!({"safety_stock": 4}))
                .with_scope(ConfigScope::Warehouse, None, Some(2)),
        ];

        let merged = merge_scoped(&configs, Some(7), Some(2));
        assert_eq!(merged.decimal("safety_stock"), Some(Decimal::from(1)));
        assert_eq!(merged.decimal("reorder_point"), Some(Decimal::from(9)));
        assert!(merged.include_in_transit());

        let merged = merge_scoped(&configs, Some(7), None);
        assert_eq!(merged.decimal("safety_stock"), Some(Decimal::from(3)));

        let merged = merge_scoped(&configs, None, None);
        assert_eq!(merged.decimal("safety_stock"), Some(Decimal::from(2)));
    }

    #[test]
    fn test_inactive_configs_ignored() {
        let mut inactive = ComputationConfig::global(1, 1, json!({"safety_stock": 50}));
        inactive.is_active = false;
        let merged = merge_scoped(&[inactive], None, None);
        assert!(merged.as_map().is_empty());
    }

    #[test]
    fn test_stock_parameter_priority() {
        let config = ComputationParams::from_value(&json!({"safety_stock": 5, "reorder_point": 20}));
        let material = Material::new(1, "M1", "钢板").with_inventory_defaults(Some(Decimal::from(8)), None);
        let run = ComputationParams::from_value(&json!({"reorder_point": "12.5"}));

        let stock = StockParameters::resolve(&config, &material, &run);
        assert_eq!(stock.safety_stock, Some(Decimal::from(8)));
        assert_eq!(stock.reorder_point, Some(Decimal::new(125, 1)));

        let visible = stock.visible(&run);
        assert_eq!(visible.safety_stock, Some(Decimal::from(8)));
        assert_eq!(visible.reorder_point, None);
    }
}
