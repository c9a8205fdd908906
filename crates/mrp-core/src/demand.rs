//! 需求模型

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{RecordId, TenantId};

/// 需求狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemandStatus {
    Draft,
    Pending,
    Audited,
    Rejected,
}

impl DemandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Audited => "audited",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "pending" => Some(Self::Pending),
            "audited" => Some(Self::Audited),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// 審核狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// 業務模式
///
/// MTO 按單生產、MTS 按庫存生產；多需求合併且模式不一致時為 Mixed。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BusinessMode {
    #[serde(rename = "MTO")]
    Mto,
    #[serde(rename = "MTS")]
    Mts,
    #[serde(rename = "MIXED")]
    Mixed,
    /// 其他模式（例如預測需求），原樣保留
    #[serde(untagged)]
    Other(String),
}

impl BusinessMode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Mto => "MTO",
            Self::Mts => "MTS",
            Self::Mixed => "MIXED",
            Self::Other(value) => value.as_str(),
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "MTO" => Self::Mto,
            "MTS" => Self::Mts,
            "MIXED" => Self::Mixed,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_mto(&self) -> bool {
        *self == Self::Mto
    }
}

/// 需求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Demand {
    pub id: RecordId,
    pub tenant_id: TenantId,
    pub demand_code: String,
    pub demand_name: Option<String>,
    /// 需求類型（sales_order / sales_forecast ...）
    pub demand_type: String,
    pub business_mode: BusinessMode,
    /// 來源單據類型與 ID
    pub source_type: Option<String>,
    pub source_id: Option<RecordId>,
    pub status: DemandStatus,
    pub review_status: ReviewStatus,
    pub pushed_to_computation: bool,
    pub computation_id: Option<RecordId>,
    pub computation_code: Option<String>,
}

impl Demand {
    /// 創建新的需求（預設為已審核通過）
    pub fn new(
        id: RecordId,
        tenant_id: TenantId,
        demand_code: impl Into<String>,
        business_mode: BusinessMode,
    ) -> Self {
        Self {
            id,
            tenant_id,
            demand_code: demand_code.into(),
            demand_name: None,
            demand_type: "sales_forecast".to_string(),
            business_mode,
            source_type: None,
            source_id: None,
            status: DemandStatus::Audited,
            review_status: ReviewStatus::Approved,
            pushed_to_computation: false,
            computation_id: None,
            computation_code: None,
        }
    }

    /// 建構器模式：設置來源單據
    pub fn with_source(mut self, source_type: impl Into<String>, source_id: RecordId) -> Self {
        let source_type = source_type.into();
        self.demand_type = source_type.clone();
        self.source_type = Some(source_type);
        self.source_id = Some(source_id);
        self
    }

    /// 建構器模式：設置狀態
    pub fn with_status(mut self, status: DemandStatus, review_status: ReviewStatus) -> Self {
        self.status = status;
        self.review_status = review_status;
        self
    }

    /// 只有已審核且審核通過的需求可以被計算消費
    pub fn is_consumable(&self) -> bool {
        self.status == DemandStatus::Audited && self.review_status == ReviewStatus::Approved
    }

    /// 來源是否為銷售訂單（決定 MTO 工單關聯）
    pub fn sales_order_id(&self) -> Option<RecordId> {
        match (self.source_type.as_deref(), self.demand_type.as_str()) {
            (Some("sales_order"), _) | (_, "sales_order") => self.source_id,
            _ => None,
        }
    }
}

/// 需求明細
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandItem {
    pub id: RecordId,
    pub tenant_id: TenantId,
    pub demand_id: RecordId,
    pub material_id: RecordId,
    pub required_quantity: Decimal,
    pub delivery_date: Option<NaiveDate>,
}

impl DemandItem {
    pub fn new(
        id: RecordId,
        tenant_id: TenantId,
        demand_id: RecordId,
        material_id: RecordId,
        required_quantity: Decimal,
    ) -> Self {
        Self {
            id,
            tenant_id,
            demand_id,
            material_id,
            required_quantity,
            delivery_date: None,
        }
    }

    /// 建構器模式：設置交貨日期
    pub fn with_delivery_date(mut self, date: NaiveDate) -> Self {
        self.delivery_date = Some(date);
        self
    }
}

/// 需求與計算的關聯標記
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemandLink {
    pub pushed_to_computation: bool,
    pub computation_id: Option<RecordId>,
    pub computation_code: Option<String>,
}

impl DemandLink {
    pub fn linked(computation_id: RecordId, computation_code: impl Into<String>) -> Self {
        Self {
            pushed_to_computation: true,
            computation_id: Some(computation_id),
            computation_code: Some(computation_code.into()),
        }
    }

    pub fn cleared() -> Self {
        Self {
            pushed_to_computation: false,
            computation_id: None,
            computation_code: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumable_demand() {
        let demand = Demand::new(1, 1, "DM-001", BusinessMode::Mts);
        assert!(demand.is_consumable());

        let pending = demand
            .clone()
            .with_status(DemandStatus::Audited, ReviewStatus::Pending);
        assert!(!pending.is_consumable());
    }

    #[test]
    fn test_sales_order_source() {
        let demand = Demand::new(1, 1, "DM-002", BusinessMode::Mto).with_source("sales_order", 88);
        assert_eq!(demand.sales_order_id(), Some(88));

        let forecast = Demand::new(2, 1, "DM-003", BusinessMode::Mts).with_source("sales_forecast", 9);
        assert_eq!(forecast.sales_order_id(), None);
    }

    #[test]
    fn test_business_mode_roundtrip_keeps_unknown() {
        let mode = BusinessMode::parse("ATO");
        assert_eq!(mode, BusinessMode::Other("ATO".to_string()));
        assert_eq!(mode.as_str(), "ATO");
        assert!(!mode.is_mto());
        assert_eq!(serde_json::to_string(&BusinessMode::Mto).unwrap(), "\"MTO\"");
    }
}
