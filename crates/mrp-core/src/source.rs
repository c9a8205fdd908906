//! 物料來源類型與來源配置

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::decimal;
use crate::RecordId;

/// 物料來源類型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    /// 自製件
    Make,
    /// 採購件
    Buy,
    /// 虛擬件（僅用於 BOM 展開）
    Phantom,
    /// 委外件
    Outsource,
    /// 配置件
    Configure,
}

impl SourceType {
    pub const ALL: [SourceType; 5] = [
        SourceType::Make,
        SourceType::Buy,
        SourceType::Phantom,
        SourceType::Outsource,
        SourceType::Configure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Make => "Make",
            Self::Buy => "Buy",
            Self::Phantom => "Phantom",
            Self::Outsource => "Outsource",
            Self::Configure => "Configure",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }

    /// 淨需求轉為工單建議（含委外工單）
    pub fn suggests_work_order(&self) -> bool {
        matches!(self, Self::Make | Self::Outsource | Self::Configure)
    }

    /// 淨需求轉為採購建議
    pub fn suggests_purchase(&self) -> bool {
        *self == Self::Buy
    }

    /// 廠內生產（不含委外）
    pub fn is_in_house_production(&self) -> bool {
        matches!(self, Self::Make | Self::Configure)
    }
}

/// 來源配置
///
/// `source_config` JSON 依來源類型解讀後的結構化形式。
#[derive(Debug, Clone, PartialEq)]
pub enum SourceConfig {
    Make {
        process_route_id: Option<RecordId>,
        lead_time_days: Option<i64>,
        min_batch: Option<Decimal>,
    },
    Buy {
        default_supplier_id: Option<RecordId>,
        default_supplier_name: Option<String>,
        purchase_price: Option<Decimal>,
        lead_time_days: Option<i64>,
    },
    Outsource {
        supplier_id: Option<RecordId>,
        supplier_name: Option<String>,
        operation: Option<String>,
        price: Option<Decimal>,
        lead_time_days: Option<i64>,
    },
    Phantom,
    Configure {
        variant_rules: Option<Value>,
        default_variant: Option<String>,
        lead_time_days: Option<i64>,
    },
}

impl SourceConfig {
    /// 依來源類型解析原始 JSON
    pub fn parse(source_type: SourceType, raw: &Value) -> Self {
        let generic_lead = int_field(raw, "lead_time_days").or_else(|| int_field(raw, "lead_time"));
        match source_type {
            SourceType::Make => Self::Make {
                process_route_id: int_field(raw, "process_route_id"),
                lead_time_days: int_field(raw, "production_lead_time").or(generic_lead),
                min_batch: decimal_field(raw, "min_production_batch"),
            },
            SourceType::Buy => Self::Buy {
                default_supplier_id: int_field(raw, "default_supplier_id"),
                default_supplier_name: string_field(raw, "default_supplier_name"),
                purchase_price: decimal_field(raw, "purchase_price"),
                lead_time_days: int_field(raw, "purchase_lead_time").or(generic_lead),
            },
            SourceType::Outsource => Self::Outsource {
                supplier_id: int_field(raw, "outsource_supplier_id"),
                supplier_name: string_field(raw, "outsource_supplier_name"),
                operation: string_field(raw, "outsource_operation"),
                price: decimal_field(raw, "outsource_price"),
                lead_time_days: int_field(raw, "outsource_lead_time").or(generic_lead),
            },
            SourceType::Phantom => Self::Phantom,
            SourceType::Configure => Self::Configure {
                variant_rules: raw.get("bom_variants").filter(|v| !v.is_null()).cloned(),
                default_variant: string_field(raw, "default_variant"),
                lead_time_days: int_field(raw, "production_lead_time").or(generic_lead),
            },
        }
    }

    /// 從計算明細保存的快照 `{source_type, source_config}` 還原
    pub fn from_snapshot(snapshot: &Value) -> Option<Self> {
        let source_type = snapshot
            .get("source_type")
            .and_then(Value::as_str)
            .and_then(SourceType::parse)?;
        let raw = snapshot.get("source_config").cloned().unwrap_or(Value::Null);
        Some(Self::parse(source_type, &raw))
    }

    /// 組裝計算時保存的來源配置快照
    pub fn snapshot(source_type: SourceType, raw: &Value) -> Value {
        let raw = if raw.is_object() { raw.clone() } else { json!({}) };
        json!({
            "source_type": source_type.as_str(),
            "source_config": raw,
        })
    }

    pub fn source_type(&self) -> SourceType {
        match self {
            Self::Make { .. } => SourceType::Make,
            Self::Buy { .. } => SourceType::Buy,
            Self::Outsource { .. } => SourceType::Outsource,
            Self::Phantom => SourceType::Phantom,
            Self::Configure { .. } => SourceType::Configure,
        }
    }

    /// 提前期（日曆天），未配置時為 0
    pub fn lead_time_days(&self) -> i64 {
        match self {
            Self::Make { lead_time_days, .. }
            | Self::Buy { lead_time_days, .. }
            | Self::Outsource { lead_time_days, .. }
            | Self::Configure { lead_time_days, .. } => lead_time_days.unwrap_or(0).max(0),
            Self::Phantom => 0,
        }
    }

    /// 預設採購供應商
    pub fn default_supplier(&self) -> Option<(RecordId, Option<String>)> {
        match self {
            Self::Buy {
                default_supplier_id: Some(id),
                default_supplier_name,
                ..
            } => Some((*id, default_supplier_name.clone())),
            _ => None,
        }
    }
}

fn int_field(raw: &Value, key: &str) -> Option<i64> {
    match raw.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn decimal_field(raw: &Value, key: &str) -> Option<Decimal> {
    raw.get(key).and_then(decimal::from_json)
}

fn string_field(raw: &Value, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// 來源配置驗證結果
///
/// `errors` 會阻擋下推；`warnings` 僅提示（例如採購件缺少預設供應商）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl SourceValidation {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_buy_config() {
        let raw = json!({
            "default_supplier_id": 7,
            "default_supplier_name": "华东钢材",
            "purchase_price": "12.50",
            "purchase_lead_time": "5",
        });
        let config = SourceConfig::parse(SourceType::Buy, &raw);

        assert_eq!(config.lead_time_days(), 5);
        assert_eq!(config.default_supplier(), Some((7, Some("华东钢材".to_string()))));
        match config {
            SourceConfig::Buy { purchase_price, .. } => {
                assert_eq!(purchase_price, Some(Decimal::new(1250, 2)))
            }
            other => panic!("unexpected config: {other:?}"),
        }
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let raw = json!({"outsource_supplier_id": 3, "outsource_operation": "电镀", "outsource_lead_time": 4});
        let snapshot = SourceConfig::snapshot(SourceType::Outsource, &raw);
        let config = SourceConfig::from_snapshot(&snapshot).unwrap();

        assert_eq!(config.source_type(), SourceType::Outsource);
        assert_eq!(config.lead_time_days(), 4);
    }

    #[test]
    fn test_missing_lead_time_is_zero() {
        let config = SourceConfig::parse(SourceType::Make, &Value::Null);
        assert_eq!(config.lead_time_days(), 0);
        assert!(SourceType::Make.suggests_work_order());
        assert!(!SourceType::Phantom.suggests_work_order());
        assert!(SourceType::Buy.suggests_purchase());
    }
}
