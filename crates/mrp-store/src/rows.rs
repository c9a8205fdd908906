//! 資料列映射

use chrono::{DateTime, NaiveDate, Utc};
use mrp_core::{
    BusinessMode, ComputationConfig, ComputationParams, ComputationStatus, ComputationType,
    ConfigScope, Demand, DemandComputation, DemandComputationItem, DemandComputationSnapshot,
    DemandItem, DemandStatus, DocumentRelation, MrpError, RecalcHistory, RecalcResult,
    RecalcTrigger, Result, ReviewStatus, SnapshotItem, SourceType,
};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::types::Json;

fn invalid(column: &str, value: &str) -> MrpError {
    MrpError::database(format!("欄位 {column} 含無效值: {value}"))
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct DemandRow {
    pub id: i64,
    pub tenant_id: i64,
    pub demand_code: String,
    pub demand_name: Option<String>,
    pub demand_type: String,
    pub business_mode: String,
    pub source_type: Option<String>,
    pub source_id: Option<i64>,
    pub status: String,
    pub review_status: String,
    pub pushed_to_computation: bool,
    pub computation_id: Option<i64>,
    pub computation_code: Option<String>,
}

impl TryFrom<DemandRow> for Demand {
    type Error = MrpError;

    fn try_from(row: DemandRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            tenant_id: row.tenant_id,
            demand_code: row.demand_code,
            demand_name: row.demand_name,
            demand_type: row.demand_type,
            business_mode: BusinessMode::parse(&row.business_mode),
            source_type: row.source_type,
            source_id: row.source_id,
            status: DemandStatus::parse(&row.status).ok_or_else(|| invalid("status", &row.status))?,
            review_status: ReviewStatus::parse(&row.review_status)
                .ok_or_else(|| invalid("review_status", &row.review_status))?,
            pushed_to_computation: row.pushed_to_computation,
            computation_id: row.computation_id,
            computation_code: row.computation_code,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct DemandItemRow {
    pub id: i64,
    pub tenant_id: i64,
    pub demand_id: i64,
    pub material_id: i64,
    pub required_quantity: Decimal,
    pub delivery_date: Option<NaiveDate>,
}

impl From<DemandItemRow> for DemandItem {
    fn from(row: DemandItemRow) -> Self {
        Self {
            id: row.id,
            tenant_id: row.tenant_id,
            demand_id: row.demand_id,
            material_id: row.material_id,
            required_quantity: row.required_quantity,
            delivery_date: row.delivery_date,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ComputationRow {
    pub id: i64,
    pub tenant_id: i64,
    pub computation_code: String,
    pub demand_id: i64,
    pub demand_ids: Json<Vec<i64>>,
    pub demand_code: String,
    pub business_mode: String,
    pub computation_type: String,
    pub computation_params: Option<Value>,
    pub computation_status: String,
    pub computation_start_time: Option<DateTime<Utc>>,
    pub computation_end_time: Option<DateTime<Utc>>,
    pub computation_summary: Option<Value>,
    pub error_message: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<i64>,
    pub updated_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ComputationRow> for DemandComputation {
    type Error = MrpError;

    fn try_from(row: ComputationRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            tenant_id: row.tenant_id,
            computation_code: row.computation_code,
            demand_id: row.demand_id,
            demand_ids: row.demand_ids.0,
            demand_code: row.demand_code,
            business_mode: BusinessMode::parse(&row.business_mode),
            computation_type: ComputationType::parse(&row.computation_type)
                .map_err(|_| invalid("computation_type", &row.computation_type))?,
            computation_params: row
                .computation_params
                .as_ref()
                .map(ComputationParams::from_value)
                .unwrap_or_default(),
            computation_status: ComputationStatus::parse(&row.computation_status)
                .ok_or_else(|| invalid("computation_status", &row.computation_status))?,
            computation_start_time: row.computation_start_time,
            computation_end_time: row.computation_end_time,
            computation_summary: row.computation_summary,
            error_message: row.error_message,
            notes: row.notes,
            created_by: row.created_by,
            updated_by: row.updated_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ItemRow {
    pub id: i64,
    pub tenant_id: i64,
    pub computation_id: i64,
    pub material_id: i64,
    pub material_code: String,
    pub material_name: String,
    pub material_spec: Option<String>,
    pub material_unit: Option<String>,
    pub required_quantity: Decimal,
    pub available_inventory: Decimal,
    pub net_requirement: Decimal,
    pub safety_stock: Option<Decimal>,
    pub reorder_point: Option<Decimal>,
    pub suggested_work_order_quantity: Decimal,
    pub suggested_purchase_order_quantity: Decimal,
    pub planned_production: Option<Decimal>,
    pub planned_procurement: Option<Decimal>,
    pub production_start_date: Option<NaiveDate>,
    pub production_completion_date: Option<NaiveDate>,
    pub procurement_start_date: Option<NaiveDate>,
    pub procurement_completion_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub material_source_type: Option<String>,
    pub material_source_config: Option<Value>,
    pub source_validation_passed: bool,
    pub source_validation_errors: Json<Vec<String>>,
    pub demand_item_ids: Json<Vec<i64>>,
    pub detail_results: Option<Value>,
}

impl TryFrom<ItemRow> for DemandComputationItem {
    type Error = MrpError;

    fn try_from(row: ItemRow) -> Result<Self> {
        let material_source_type = match row.material_source_type.as_deref() {
            Some(value) => Some(
                SourceType::parse(value).ok_or_else(|| invalid("material_source_type", value))?,
            ),
            None => None,
        };
        Ok(Self {
            id: row.id,
            tenant_id: row.tenant_id,
            computation_id: row.computation_id,
            material_id: row.material_id,
            material_code: row.material_code,
            material_name: row.material_name,
            material_spec: row.material_spec,
            material_unit: row.material_unit,
            required_quantity: row.required_quantity,
            available_inventory: row.available_inventory,
            net_requirement: row.net_requirement,
            safety_stock: row.safety_stock,
            reorder_point: row.reorder_point,
            suggested_work_order_quantity: row.suggested_work_order_quantity,
            suggested_purchase_order_quantity: row.suggested_purchase_order_quantity,
            planned_production: row.planned_production,
            planned_procurement: row.planned_procurement,
            production_start_date: row.production_start_date,
            production_completion_date: row.production_completion_date,
            procurement_start_date: row.procurement_start_date,
            procurement_completion_date: row.procurement_completion_date,
            delivery_date: row.delivery_date,
            material_source_type,
            material_source_config: row.material_source_config,
            source_validation_passed: row.source_validation_passed,
            source_validation_errors: row.source_validation_errors.0,
            demand_item_ids: row.demand_item_ids.0,
            detail_results: row.detail_results,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SnapshotRow {
    pub id: i64,
    pub tenant_id: i64,
    pub computation_id: i64,
    pub snapshot_time: DateTime<Utc>,
    pub trigger_reason: String,
    pub computation_summary: Option<Value>,
    pub items_snapshot: Json<Vec<SnapshotItem>>,
}

impl From<SnapshotRow> for DemandComputationSnapshot {
    fn from(row: SnapshotRow) -> Self {
        Self {
            id: row.id,
            tenant_id: row.tenant_id,
            computation_id: row.computation_id,
            snapshot_time: row.snapshot_time,
            trigger_reason: row.trigger_reason,
            computation_summary: row.computation_summary,
            items_snapshot: row.items_snapshot.0,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RecalcHistoryRow {
    pub id: i64,
    pub tenant_id: i64,
    pub computation_id: i64,
    pub recalc_time: DateTime<Utc>,
    pub trigger_type: String,
    pub operator_id: Option<i64>,
    pub result: String,
    pub snapshot_id: Option<i64>,
    pub message: Option<String>,
}

impl TryFrom<RecalcHistoryRow> for RecalcHistory {
    type Error = MrpError;

    fn try_from(row: RecalcHistoryRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            tenant_id: row.tenant_id,
            computation_id: row.computation_id,
            recalc_time: row.recalc_time,
            trigger_type: RecalcTrigger::parse(&row.trigger_type)
                .ok_or_else(|| invalid("trigger_type", &row.trigger_type))?,
            operator_id: row.operator_id,
            result: RecalcResult::parse(&row.result).ok_or_else(|| invalid("result", &row.result))?,
            snapshot_id: row.snapshot_id,
            message: row.message,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RelationRow {
    pub id: i64,
    pub tenant_id: i64,
    pub source_type: String,
    pub source_id: i64,
    pub source_code: Option<String>,
    pub target_type: String,
    pub target_id: i64,
    pub target_code: Option<String>,
    pub target_name: Option<String>,
    pub relation_type: String,
    pub relation_mode: String,
    pub relation_desc: Option<String>,
    pub business_mode: Option<String>,
    pub demand_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<RelationRow> for DocumentRelation {
    fn from(row: RelationRow) -> Self {
        Self {
            id: row.id,
            tenant_id: row.tenant_id,
            source_type: row.source_type,
            source_id: row.source_id,
            source_code: row.source_code,
            target_type: row.target_type,
            target_id: row.target_id,
            target_code: row.target_code,
            target_name: row.target_name,
            relation_type: row.relation_type,
            relation_mode: row.relation_mode,
            relation_desc: row.relation_desc,
            business_mode: row.business_mode,
            demand_id: row.demand_id,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ConfigRow {
    pub id: i64,
    pub tenant_id: i64,
    pub config_scope: String,
    pub material_id: Option<i64>,
    pub warehouse_id: Option<i64>,
    pub priority: i32,
    pub is_active: bool,
    pub computation_params: Option<Value>,
}

impl TryFrom<ConfigRow> for ComputationConfig {
    type Error = MrpError;

    fn try_from(row: ConfigRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            tenant_id: row.tenant_id,
            scope: ConfigScope::parse(&row.config_scope)
                .ok_or_else(|| invalid("config_scope", &row.config_scope))?,
            material_id: row.material_id,
            warehouse_id: row.warehouse_id,
            priority: row.priority,
            is_active: row.is_active,
            params: row.computation_params.unwrap_or(Value::Null),
        })
    }
}
