//! 下游單據請求與回應
//!
//! 需求計算只負責創建與關聯下游單據（工單、委外工單、採購單、生產計劃、採購申請），
//! 單據內部模型由各自領域服務維護。

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::RecordId;

/// 下游單據類型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    WorkOrder,
    OutsourceWorkOrder,
    PurchaseOrder,
    PurchaseRequisition,
    ProductionPlan,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 5] = [
        DocumentKind::WorkOrder,
        DocumentKind::OutsourceWorkOrder,
        DocumentKind::PurchaseOrder,
        DocumentKind::PurchaseRequisition,
        DocumentKind::ProductionPlan,
    ];

    /// 關聯表中的單據類型
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkOrder => "work_order",
            Self::OutsourceWorkOrder => "outsource_work_order",
            Self::PurchaseOrder => "purchase_order",
            Self::PurchaseRequisition => "purchase_requisition",
            Self::ProductionPlan => "production_plan",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == value)
    }

    /// 顯示名稱
    pub fn label(&self) -> &'static str {
        match self {
            Self::WorkOrder => "工单",
            Self::OutsourceWorkOrder => "委外工单",
            Self::PurchaseOrder => "采购单",
            Self::PurchaseRequisition => "采购申请",
            Self::ProductionPlan => "生产计划",
        }
    }
}

/// 生產模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductionMode {
    #[serde(rename = "MTO")]
    Mto,
    #[serde(rename = "MTS")]
    Mts,
}

impl ProductionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mto => "MTO",
            Self::Mts => "MTS",
        }
    }
}

/// 供應商引用
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SupplierRef {
    pub id: RecordId,
    pub name: Option<String>,
}

impl SupplierRef {
    pub fn new(id: RecordId, name: Option<String>) -> Self {
        Self { id, name }
    }
}

/// 下推來源資訊，所有下游請求共用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentOrigin {
    pub computation_id: RecordId,
    pub computation_code: String,
    pub created_by: Option<RecordId>,
    /// 允許以草稿狀態創建（驗證未通過的物料仍可下推）
    pub allow_draft: bool,
}

/// 單據明細行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentLine {
    pub material_id: RecordId,
    pub material_code: String,
    pub material_name: String,
    pub material_unit: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Option<Decimal>,
    pub start_date: Option<NaiveDate>,
    pub required_date: Option<NaiveDate>,
}

/// 工單請求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrderRequest {
    pub origin: DocumentOrigin,
    pub material_id: RecordId,
    pub material_code: String,
    pub material_name: String,
    pub quantity: Decimal,
    pub process_route_id: Option<RecordId>,
    pub production_mode: ProductionMode,
    pub sales_order_id: Option<RecordId>,
    pub planned_start_date: Option<NaiveDate>,
    pub planned_end_date: Option<NaiveDate>,
}

/// 委外工單請求（每個明細一張）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutsourceWorkOrderRequest {
    pub origin: DocumentOrigin,
    pub material_id: RecordId,
    pub material_code: String,
    pub material_name: String,
    pub quantity: Decimal,
    pub supplier: SupplierRef,
    pub operation: Option<String>,
    pub unit_price: Option<Decimal>,
    pub planned_start_date: Option<NaiveDate>,
    pub planned_end_date: Option<NaiveDate>,
}

/// 採購單請求（按供應商分組）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrderRequest {
    pub origin: DocumentOrigin,
    pub supplier: SupplierRef,
    pub lines: Vec<DocumentLine>,
}

/// 生產計劃請求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionPlanRequest {
    pub origin: DocumentOrigin,
    /// MRP / LRP
    pub plan_type: String,
    pub lines: Vec<DocumentLine>,
}

/// 採購申請請求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRequisitionRequest {
    pub origin: DocumentOrigin,
    pub lines: Vec<DocumentLine>,
}

/// 已創建的下游單據
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedDocument {
    pub kind: DocumentKind,
    pub id: RecordId,
    pub code: String,
    pub name: Option<String>,
    pub status: String,
    /// 單據涵蓋的物料
    pub material_ids: Vec<RecordId>,
}

impl CreatedDocument {
    /// 關聯說明文字
    pub fn relation_desc(&self) -> String {
        format!("需求计算下推{}", self.kind.label())
    }
}
