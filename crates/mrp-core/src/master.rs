//! 主數據視圖（物料、BOM、業務配置）
//!
//! 這些資料由主數據服務維護，需求計算只讀取。

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::source::{SourceConfig, SourceType};
use crate::RecordId;

/// 物料
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub id: RecordId,
    pub main_code: String,
    pub name: String,
    pub specification: Option<String>,
    pub base_unit: Option<String>,
    pub material_type: Option<String>,
    /// 物料主檔上的來源類型（後備值）
    pub source_type: Option<SourceType>,
    /// 來源配置 JSON，可包含 `source_type` 覆寫
    pub source_config: Value,
    pub process_route_id: Option<RecordId>,
    pub variant_attributes: Option<Value>,
    #[serde(default)]
    pub defaults: MaterialDefaults,
}

/// 物料預設值
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterialDefaults {
    #[serde(default)]
    pub inventory: InventoryDefaults,
}

/// 物料庫存預設（安全庫存、再訂購點）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryDefaults {
    pub safety_stock: Option<Decimal>,
    pub reorder_point: Option<Decimal>,
}

impl Material {
    /// 創建新的物料
    pub fn new(id: RecordId, main_code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            main_code: main_code.into(),
            name: name.into(),
            specification: None,
            base_unit: Some("件".to_string()),
            material_type: None,
            source_type: None,
            source_config: Value::Object(Default::default()),
            process_route_id: None,
            variant_attributes: None,
            defaults: MaterialDefaults::default(),
        }
    }

    /// 建構器模式：設置來源類型
    pub fn with_source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = Some(source_type);
        self
    }

    /// 建構器模式：設置來源配置
    pub fn with_source_config(mut self, config: Value) -> Self {
        self.source_config = config;
        self
    }

    /// 建構器模式：設置工藝路線
    pub fn with_process_route(mut self, route_id: RecordId) -> Self {
        self.process_route_id = Some(route_id);
        self
    }

    /// 建構器模式：設置庫存預設
    pub fn with_inventory_defaults(
        mut self,
        safety_stock: Option<Decimal>,
        reorder_point: Option<Decimal>,
    ) -> Self {
        self.defaults.inventory = InventoryDefaults {
            safety_stock,
            reorder_point,
        };
        self
    }

    /// 解析來源類型：來源配置中的 `source_type` 優先於主檔欄位
    pub fn resolved_source_type(&self) -> Option<SourceType> {
        self.source_config
            .get("source_type")
            .and_then(Value::as_str)
            .and_then(SourceType::parse)
            .or(self.source_type)
    }

    /// 依指定來源類型解讀來源配置
    pub fn source_config_for(&self, source_type: SourceType) -> SourceConfig {
        SourceConfig::parse(source_type, &self.source_config)
    }
}

/// BOM 表頭
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bom {
    pub id: RecordId,
    pub material_id: RecordId,
    pub bom_code: String,
    pub version: String,
    pub approved: bool,
    pub is_default: bool,
    pub lines: Vec<BomLine>,
}

/// BOM 明細
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomLine {
    pub component_id: RecordId,
    /// 每單位父件用量
    pub quantity: Decimal,
    pub unit: Option<String>,
    /// 損耗率（百分比）
    pub waste_rate: Option<Decimal>,
    pub is_alternative: bool,
    pub priority: i32,
}

impl BomLine {
    pub fn new(component_id: RecordId, quantity: Decimal) -> Self {
        Self {
            component_id,
            quantity,
            unit: None,
            waste_rate: None,
            is_alternative: false,
            priority: 0,
        }
    }

    /// 建構器模式：設置損耗率
    pub fn with_waste_rate(mut self, rate: Decimal) -> Self {
        self.waste_rate = Some(rate);
        self
    }

    /// 建構器模式：標記為替代料
    pub fn as_alternative(mut self) -> Self {
        self.is_alternative = true;
        self
    }

    /// 子件需求數量 = 父件數量 × 用量 × (1 + 損耗率/100)
    pub fn component_quantity(&self, parent_quantity: Decimal) -> Decimal {
        let base = parent_quantity * self.quantity;
        match self.waste_rate {
            Some(rate) if rate > Decimal::ZERO => {
                base * (Decimal::ONE + rate / Decimal::ONE_HUNDRED)
            }
            _ => base,
        }
    }
}

/// 租戶業務配置
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyFlags {
    /// 允許需求計算直接生成工單（否則只能經生產計劃）
    pub can_direct_generate_work_order_from_computation: bool,
    /// 允許多版本 BOM
    pub allow_multi_version_bom: bool,
}
