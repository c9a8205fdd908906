//! 計算參數配置模型

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::decimal;
use crate::{RecordId, TenantId};

/// 參數鍵
pub mod keys {
    pub const INCLUDE_SAFETY_STOCK: &str = "include_safety_stock";
    pub const INCLUDE_IN_TRANSIT: &str = "include_in_transit";
    pub const INCLUDE_RESERVED: &str = "include_reserved";
    pub const INCLUDE_REORDER_POINT: &str = "include_reorder_point";
    pub const SAFETY_STOCK: &str = "safety_stock";
    pub const REORDER_POINT: &str = "reorder_point";
    pub const BOM_VERSION: &str = "bom_version";
    pub const USE_DEFAULT_BOM: &str = "use_default_bom";
    pub const ONLY_APPROVED: &str = "only_approved";
    pub const MATERIAL_BOM_VERSIONS: &str = "material_bom_versions";
    pub const WAREHOUSE_ID: &str = "warehouse_id";
    pub const EXPAND_MAKE_CHILDREN: &str = "expand_make_children";
    pub const CONSIDER_CAPACITY: &str = "consider_capacity";
    pub const CONSIDER_MATERIAL_READINESS: &str = "consider_material_readiness";
    pub const CONSIDER_EQUIPMENT_AVAILABILITY: &str = "consider_equipment_availability";
    pub const CONSIDER_MOLD_TOOL_AVAILABILITY: &str = "consider_mold_tool_availability";
}

/// 配置作用範圍，依優先順序由低到高
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigScope {
    Global,
    Warehouse,
    Material,
    MaterialWarehouse,
}

impl ConfigScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Warehouse => "warehouse",
            Self::Material => "material",
            Self::MaterialWarehouse => "material_warehouse",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "global" => Some(Self::Global),
            "warehouse" => Some(Self::Warehouse),
            "material" => Some(Self::Material),
            "material_warehouse" => Some(Self::MaterialWarehouse),
            _ => None,
        }
    }
}

/// 計算參數配置記錄
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputationConfig {
    pub id: RecordId,
    pub tenant_id: TenantId,
    pub scope: ConfigScope,
    pub material_id: Option<RecordId>,
    pub warehouse_id: Option<RecordId>,
    pub priority: i32,
    pub is_active: bool,
    pub params: Value,
}

impl ComputationConfig {
    /// 創建全域配置
    pub fn global(id: RecordId, tenant_id: TenantId, params: Value) -> Self {
        Self {
            id,
            tenant_id,
            scope: ConfigScope::Global,
            material_id: None,
            warehouse_id: None,
            priority: 0,
            is_active: true,
            params,
        }
    }

    /// 建構器模式：設置作用範圍
    pub fn with_scope(
        mut self,
        scope: ConfigScope,
        material_id: Option<RecordId>,
        warehouse_id: Option<RecordId>,
    ) -> Self {
        self.scope = scope;
        self.material_id = material_id;
        self.warehouse_id = warehouse_id;
        self
    }

    /// 建構器模式：設置優先級
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// 是否適用於指定物料/倉庫
    pub fn applies_to(&self, material_id: Option<RecordId>, warehouse_id: Option<RecordId>) -> bool {
        if !self.is_active {
            return false;
        }
        match self.scope {
            ConfigScope::Global => true,
            ConfigScope::Warehouse => warehouse_id.is_some() && self.warehouse_id == warehouse_id,
            ConfigScope::Material => material_id.is_some() && self.material_id == material_id,
            ConfigScope::MaterialWarehouse => {
                material_id.is_some()
                    && warehouse_id.is_some()
                    && self.material_id == material_id
                    && self.warehouse_id == warehouse_id
            }
        }
    }
}

/// 計算參數（JSON 物件的型別化視圖）
///
/// 未知鍵原樣保留並傳遞。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComputationParams(Map<String, Value>);

impl ComputationParams {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// 從 JSON 建立；非物件視為空參數
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self(map.clone()),
            _ => Self::new(),
        }
    }

    /// 驗證後建立：null 視為空，其餘非物件為錯誤
    pub fn try_from_value(value: &Value) -> crate::Result<Self> {
        match value {
            Value::Null => Ok(Self::new()),
            Value::Object(map) => Ok(Self(map.clone())),
            other => Err(crate::MrpError::validation(format!(
                "计算参数必须是JSON对象: {other}"
            ))),
        }
    }

    /// 後者覆寫前者
    pub fn merged_with(&self, overrides: &ComputationParams) -> Self {
        let mut merged = self.0.clone();
        for (key, value) in &overrides.0 {
            merged.insert(key.clone(), value.clone());
        }
        Self(merged)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// 建構器模式：設置參數
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// 布林旗標；接受 bool、數字與常見字串
    pub fn flag(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(default),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => default,
            },
            _ => default,
        }
    }

    pub fn decimal(&self, key: &str) -> Option<Decimal> {
        self.get(key).and_then(decimal::from_json)
    }

    pub fn string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn record_id(&self, key: &str) -> Option<RecordId> {
        match self.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn include_safety_stock(&self) -> bool {
        self.flag(keys::INCLUDE_SAFETY_STOCK, true)
    }

    pub fn include_in_transit(&self) -> bool {
        self.flag(keys::INCLUDE_IN_TRANSIT, false)
    }

    pub fn include_reserved(&self) -> bool {
        self.flag(keys::INCLUDE_RESERVED, false)
    }

    pub fn include_reorder_point(&self) -> bool {
        self.flag(keys::INCLUDE_REORDER_POINT, false)
    }

    pub fn only_approved(&self) -> bool {
        self.flag(keys::ONLY_APPROVED, true)
    }

    pub fn use_default_bom(&self) -> bool {
        self.flag(keys::USE_DEFAULT_BOM, false)
    }

    pub fn expand_make_children(&self) -> bool {
        self.flag(keys::EXPAND_MAKE_CHILDREN, false)
    }

    pub fn bom_version(&self) -> Option<String> {
        self.string(keys::BOM_VERSION)
    }

    pub fn warehouse_id(&self) -> Option<RecordId> {
        self.record_id(keys::WAREHOUSE_ID)
    }

    /// 物料級 BOM 版本 `{material_id: version}`
    pub fn material_bom_versions(&self) -> HashMap<RecordId, String> {
        let Some(Value::Object(map)) = self.get(keys::MATERIAL_BOM_VERSIONS) else {
            return HashMap::new();
        };
        map.iter()
            .filter_map(|(key, value)| {
                let material_id = key.trim().parse::<RecordId>().ok()?;
                let version = match value {
                    Value::String(s) if !s.trim().is_empty() => s.clone(),
                    Value::Number(n) => n.to_string(),
                    _ => return None,
                };
                Some((material_id, version))
            })
            .collect()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flag_defaults() {
        let params = ComputationParams::new();

        assert!(params.include_safety_stock());
        assert!(!params.include_in_transit());
        assert!(!params.include_reserved());
        assert!(!params.include_reorder_point());
        assert!(params.only_approved());
    }

    #[test]
    fn test_merge_keeps_unknown_keys() {
        let base = ComputationParams::from_value(&json!({"include_in_transit": false, "planning_horizon": 3}));
        let overrides = ComputationParams::from_value(&json!({"include_in_transit": "true"}));
        let merged = base.merged_with(&overrides);

        assert!(merged.include_in_transit());
        assert_eq!(merged.get("planning_horizon"), Some(&json!(3)));
    }

    #[test]
    fn test_material_bom_versions() {
        let params = ComputationParams::from_value(&json!({
            "material_bom_versions": {"12": "V2", "13": 3, "bad": "V1"}
        }));
        let versions = params.material_bom_versions();

        assert_eq!(versions.get(&12), Some(&"V2".to_string()));
        assert_eq!(versions.get(&13), Some(&"3".to_string()));
        assert_eq!(versions.len(), 2);
    }

    #[test]
    fn test_try_from_value_rejects_arrays() {
        assert!(ComputationParams::try_from_value(&json!([1, 2])).is_err());
        assert!(ComputationParams::try_from_value(&Value::Null).unwrap().as_map().is_empty());
    }

    #[test]
    fn test_config_scope_matching() {
        let global = ComputationConfig::global(1, 1, json!({}));
        let material = ComputationConfig::global(2, 1, json!({}))
            .with_scope(ConfigScope::Material, Some(5), None);
        let mw = ComputationConfig::global(3, 1, json!({}))
            .with_scope(ConfigScope::MaterialWarehouse, Some(5), Some(9));

        assert!(global.applies_to(None, None));
        assert!(material.applies_to(Some(5), None));
        assert!(!material.applies_to(Some(6), None));
        assert!(mw.applies_to(Some(5), Some(9)));
        assert!(!mw.applies_to(Some(5), None));
        assert!(ConfigScope::Global < ConfigScope::MaterialWarehouse);
    }
}
