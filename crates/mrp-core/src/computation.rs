//! 需求計算模型
//!
//! 一次計算（`DemandComputation`）對應一個或多個需求的合併運算，
//! 擁有其結果明細、快照與重算歷史。

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ComputationParams;
use crate::demand::BusinessMode;
use crate::source::SourceType;
use crate::{MrpError, RecordId, Result, TenantId};

/// 計算類型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComputationType {
    /// 物料需求計劃（只算數量）
    #[serde(rename = "MRP")]
    Mrp,
    /// 物流需求計劃（數量 + 生產/採購時間窗）
    #[serde(rename = "LRP")]
    Lrp,
}

impl ComputationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mrp => "MRP",
            Self::Lrp => "LRP",
        }
    }

    /// 解析計算類型；未知類型為驗證錯誤
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "MRP" => Ok(Self::Mrp),
            "LRP" => Ok(Self::Lrp),
            other => Err(MrpError::validation(format!("不支持的计算类型: {other}"))),
        }
    }

    /// 多需求合併時推斷：任一 MTO 需求即為 LRP
    pub fn infer<'a>(modes: impl IntoIterator<Item = &'a BusinessMode>) -> Self {
        if modes.into_iter().any(BusinessMode::is_mto) {
            Self::Lrp
        } else {
            Self::Mrp
        }
    }
}

/// 計算狀態
///
/// `进行中 → 计算中 → {完成, 失败}`；完成/失败可經重算回到进行中。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComputationStatus {
    #[serde(rename = "进行中")]
    InProgress,
    #[serde(rename = "计算中")]
    Computing,
    #[serde(rename = "完成")]
    Completed,
    #[serde(rename = "失败")]
    Failed,
}

impl ComputationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "进行中",
            Self::Computing => "计算中",
            Self::Completed => "完成",
            Self::Failed => "失败",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "进行中" => Some(Self::InProgress),
            "计算中" => Some(Self::Computing),
            "完成" => Some(Self::Completed),
            "失败" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn can_execute(&self) -> bool {
        matches!(self, Self::InProgress | Self::Failed)
    }

    pub fn can_recompute(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn is_editable(&self) -> bool {
        *self == Self::InProgress
    }
}

/// 需求計算
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandComputation {
    pub id: RecordId,
    pub tenant_id: TenantId,
    pub computation_code: String,
    /// 主需求
    pub demand_id: RecordId,
    /// 參與合併的全部需求
    pub demand_ids: Vec<RecordId>,
    /// 需求編碼（顯示用，逗號分隔）
    pub demand_code: String,
    pub business_mode: BusinessMode,
    pub computation_type: ComputationType,
    pub computation_params: ComputationParams,
    pub computation_status: ComputationStatus,
    pub computation_start_time: Option<DateTime<Utc>>,
    pub computation_end_time: Option<DateTime<Utc>>,
    pub computation_summary: Option<Value>,
    pub error_message: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<RecordId>,
    pub updated_by: Option<RecordId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DemandComputation {
    /// 是否為多需求合併計算
    pub fn is_merged(&self) -> bool {
        self.demand_ids.len() > 1
    }

    /// 進入计算中
    pub fn mark_computing(&mut self, now: DateTime<Utc>) {
        self.computation_status = ComputationStatus::Computing;
        self.computation_start_time = Some(now);
        self.computation_end_time = None;
        self.updated_at = now;
    }

    /// 計算成功
    pub fn mark_completed(&mut self, summary: Value, now: DateTime<Utc>) {
        self.computation_status = ComputationStatus::Completed;
        self.computation_summary = Some(summary);
        self.error_message = None;
        self.computation_end_time = Some(now);
        self.updated_at = now;
    }

    /// 重算前重置
    pub fn reset_for_recompute(&mut self, now: DateTime<Utc>) {
        self.computation_status = ComputationStatus::InProgress;
        self.computation_summary = None;
        self.error_message = None;
        self.computation_end_time = None;
        self.updated_at = now;
    }
}

/// 計算結果明細（單一物料）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandComputationItem {
    pub id: RecordId,
    pub tenant_id: TenantId,
    pub computation_id: RecordId,
    pub material_id: RecordId,
    pub material_code: String,
    pub material_name: String,
    pub material_spec: Option<String>,
    pub material_unit: Option<String>,
    /// 毛需求
    pub required_quantity: Decimal,
    pub available_inventory: Decimal,
    pub net_requirement: Decimal,
    pub safety_stock: Option<Decimal>,
    pub reorder_point: Option<Decimal>,
    pub suggested_work_order_quantity: Decimal,
    pub suggested_purchase_order_quantity: Decimal,
    // LRP 專用
    pub planned_production: Option<Decimal>,
    pub planned_procurement: Option<Decimal>,
    pub production_start_date: Option<NaiveDate>,
    pub production_completion_date: Option<NaiveDate>,
    pub procurement_start_date: Option<NaiveDate>,
    pub procurement_completion_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub material_source_type: Option<SourceType>,
    /// 計算當下的來源配置快照 `{source_type, source_config}`
    pub material_source_config: Option<Value>,
    pub source_validation_passed: bool,
    pub source_validation_errors: Vec<String>,
    /// 來源需求明細
    pub demand_item_ids: Vec<RecordId>,
    /// 在途、預留等明細
    pub detail_results: Option<Value>,
}

impl DemandComputationItem {
    /// 創建空白明細，數量均為零
    pub fn new(
        material_id: RecordId,
        material_code: impl Into<String>,
        material_name: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            tenant_id: 0,
            computation_id: 0,
            material_id,
            material_code: material_code.into(),
            material_name: material_name.into(),
            material_spec: None,
            material_unit: None,
            required_quantity: Decimal::ZERO,
            available_inventory: Decimal::ZERO,
            net_requirement: Decimal::ZERO,
            safety_stock: None,
            reorder_point: None,
            suggested_work_order_quantity: Decimal::ZERO,
            suggested_purchase_order_quantity: Decimal::ZERO,
            planned_production: None,
            planned_procurement: None,
            production_start_date: None,
            production_completion_date: None,
            procurement_start_date: None,
            procurement_completion_date: None,
            delivery_date: None,
            material_source_type: None,
            material_source_config: None,
            source_validation_passed: true,
            source_validation_errors: Vec::new(),
            demand_item_ids: Vec::new(),
            detail_results: None,
        }
    }

    /// 捕獲的原始來源配置（`source_config` 部分）
    pub fn captured_source_config(&self) -> Value {
        self.material_source_config
            .as_ref()
            .and_then(|snapshot| snapshot.get("source_config"))
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// 精簡投影，用於預覽與比對
    pub fn projection(&self) -> ItemProjection {
        ItemProjection {
            material_id: self.material_id,
            material_code: self.material_code.clone(),
            material_name: self.material_name.clone(),
            material_unit: self.material_unit.clone(),
            required_quantity: self.required_quantity,
            available_inventory: self.available_inventory,
            net_requirement: self.net_requirement,
            suggested_work_order_quantity: self.suggested_work_order_quantity,
            suggested_purchase_order_quantity: self.suggested_purchase_order_quantity,
            material_source_type: self.material_source_type,
        }
    }
}

/// 明細投影
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemProjection {
    pub material_id: RecordId,
    pub material_code: String,
    pub material_name: String,
    pub material_unit: Option<String>,
    pub required_quantity: Decimal,
    pub available_inventory: Decimal,
    pub net_requirement: Decimal,
    pub suggested_work_order_quantity: Decimal,
    pub suggested_purchase_order_quantity: Decimal,
    pub material_source_type: Option<SourceType>,
}

/// 創建計算請求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewComputation {
    pub demand_id: Option<RecordId>,
    #[serde(default)]
    pub demand_ids: Vec<RecordId>,
    pub computation_type: Option<ComputationType>,
    #[serde(default)]
    pub computation_params: Value,
    /// 初始明細（通常為空，由執行產生）
    #[serde(default)]
    pub items: Vec<DemandComputationItem>,
    pub notes: Option<String>,
}

impl NewComputation {
    pub fn for_demands(demand_ids: impl IntoIterator<Item = RecordId>) -> Self {
        Self {
            demand_ids: demand_ids.into_iter().collect(),
            ..Self::default()
        }
    }

    /// 建構器模式：設置計算參數
    pub fn with_params(mut self, params: Value) -> Self {
        self.computation_params = params;
        self
    }

    /// 建構器模式：指定計算類型
    pub fn with_type(mut self, computation_type: ComputationType) -> Self {
        self.computation_type = Some(computation_type);
        self
    }

    /// 合併 `demand_id` 與 `demand_ids`，去重並保持順序
    pub fn resolved_demand_ids(&self) -> Vec<RecordId> {
        let mut ids = Vec::new();
        for id in self.demand_id.into_iter().chain(self.demand_ids.iter().copied()) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }
}

/// 更新計算請求（僅进行中可改）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComputationUpdate {
    pub notes: Option<String>,
    pub computation_params: Option<Value>,
    pub computation_type: Option<ComputationType>,
}

/// 計算列表篩選條件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComputationFilter {
    pub demand_id: Option<RecordId>,
    pub demand_code: Option<String>,
    pub computation_code: Option<String>,
    pub computation_type: Option<ComputationType>,
    pub computation_status: Option<ComputationStatus>,
    pub business_mode: Option<BusinessMode>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl ComputationFilter {
    /// 判斷計算是否符合篩選（編碼類條件為包含匹配）
    pub fn matches(&self, computation: &DemandComputation) -> bool {
        if let Some(demand_id) = self.demand_id {
            if computation.demand_id != demand_id && !computation.demand_ids.contains(&demand_id) {
                return false;
            }
        }
        if let Some(code) = &self.demand_code {
            if !computation.demand_code.contains(code.as_str()) {
                return false;
            }
        }
        if let Some(code) = &self.computation_code {
            if !computation.computation_code.contains(code.as_str()) {
                return false;
            }
        }
        if self.computation_type.is_some_and(|t| t != computation.computation_type) {
            return false;
        }
        if self.computation_status.is_some_and(|s| s != computation.computation_status) {
            return false;
        }
        if self
            .business_mode
            .as_ref()
            .is_some_and(|m| *m != computation.business_mode)
        {
            return false;
        }
        let started = computation.computation_start_time;
        if let Some(from) = self.start_date {
            if started.map_or(true, |t| t < from) {
                return false;
            }
        }
        if let Some(to) = self.end_date {
            if started.map_or(true, |t| t > to) {
                return false;
            }
        }
        true
    }
}

/// 分頁結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationPage {
    pub data: Vec<DemandComputation>,
    pub total: u64,
    pub success: bool,
}

/// 計算詳情（含明細）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationResponse {
    #[serde(flatten)]
    pub computation: DemandComputation,
    pub items: Vec<DemandComputationItem>,
}

/// 計算摘要
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComputationSummary {
    pub material_count: usize,
    pub total_required_quantity: Decimal,
    pub total_net_requirement: Decimal,
    pub work_order_suggestions: usize,
    pub purchase_suggestions: usize,
    pub outsource_suggestions: usize,
    pub validation_failures: usize,
}

impl ComputationSummary {
    pub fn from_items(items: &[DemandComputationItem]) -> Self {
        let mut summary = Self {
            material_count: items.len(),
            ..Self::default()
        };
        for item in items {
            summary.total_required_quantity += item.required_quantity;
            summary.total_net_requirement += item.net_requirement;
            if item.suggested_work_order_quantity > Decimal::ZERO {
                if item.material_source_type == Some(SourceType::Outsource) {
                    summary.outsource_suggestions += 1;
                } else {
                    summary.work_order_suggestions += 1;
                }
            }
            if item.suggested_purchase_order_quantity > Decimal::ZERO {
                summary.purchase_suggestions += 1;
            }
            if !item.source_validation_passed {
                summary.validation_failures += 1;
            }
        }
        summary
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
