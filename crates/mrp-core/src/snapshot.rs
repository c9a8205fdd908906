//! 重算快照與重算歷史

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::computation::{DemandComputation, DemandComputationItem};
use crate::decimal::to_plain_string;
use crate::{RecordId, TenantId};

/// 重算前的計算快照（不可變）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandComputationSnapshot {
    pub id: RecordId,
    pub tenant_id: TenantId,
    pub computation_id: RecordId,
    pub snapshot_time: DateTime<Utc>,
    pub trigger_reason: String,
    pub computation_summary: Option<Value>,
    pub items_snapshot: Vec<SnapshotItem>,
}

impl DemandComputationSnapshot {
    /// 擷取當前計算摘要與明細要點；ID 由儲存層分配
    pub fn capture(
        computation: &DemandComputation,
        items: &[DemandComputationItem],
        trigger_reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            tenant_id: computation.tenant_id,
            computation_id: computation.id,
            snapshot_time: now,
            trigger_reason: trigger_reason.into(),
            computation_summary: computation.computation_summary.clone(),
            items_snapshot: items.iter().map(SnapshotItem::from).collect(),
        }
    }
}

/// 快照中的明細要點；數量以字串保存精度
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotItem {
    pub material_id: RecordId,
    pub material_code: String,
    pub material_name: String,
    pub required_quantity: String,
    pub net_requirement: String,
    pub suggested_work_order_quantity: String,
    pub suggested_purchase_order_quantity: String,
}

impl From<&DemandComputationItem> for SnapshotItem {
    fn from(item: &DemandComputationItem) -> Self {
        Self {
            material_id: item.material_id,
            material_code: item.material_code.clone(),
            material_name: item.material_name.clone(),
            required_quantity: to_plain_string(item.required_quantity),
            net_requirement: to_plain_string(item.net_requirement),
            suggested_work_order_quantity: to_plain_string(item.suggested_work_order_quantity),
            suggested_purchase_order_quantity: to_plain_string(
                item.suggested_purchase_order_quantity,
            ),
        }
    }
}

/// 重算觸發方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecalcTrigger {
    Manual,
    System,
}

impl RecalcTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "manual" => Some(Self::Manual),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// 重算結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecalcResult {
    Success,
    Failed,
}

impl RecalcResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// 重算歷史（每次重算一筆）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecalcHistory {
    pub id: RecordId,
    pub tenant_id: TenantId,
    pub computation_id: RecordId,
    pub recalc_time: DateTime<Utc>,
    pub trigger_type: RecalcTrigger,
    pub operator_id: Option<RecordId>,
    pub result: RecalcResult,
    pub snapshot_id: Option<RecordId>,
    pub message: Option<String>,
}
