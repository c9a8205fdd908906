//! PostgreSQL 儲存

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mrp_core::{
    ComputationConfig, ComputationFilter, ComputationStatus, Demand, DemandComputation,
    DemandComputationItem, DemandComputationSnapshot, DemandItem, DemandLink, DocumentRelation,
    MrpError, NewRelation, RecalcHistory, RecordId, RelationKey, Result, TenantId,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{debug, info, warn};

use crate::rows::{
    ComputationRow, ConfigRow, DemandItemRow, DemandRow, ItemRow, RecalcHistoryRow, RelationRow,
    SnapshotRow,
};
use crate::{Store, StoreTx};

const UNDEFINED_TABLE: &str = "42P01";

const SCHEMA: &str = include_str!("../schema/demand_computation.sql");

const COMPUTATION_COLUMNS: &str = "id, tenant_id, computation_code, demand_id, demand_ids, demand_code, \
     business_mode, computation_type, computation_params, computation_status, computation_start_time, \
     computation_end_time, computation_summary, error_message, notes, created_by, updated_by, \
     created_at, updated_at";

const ITEM_COLUMNS: &str = "id, tenant_id, computation_id, material_id, material_code, material_name, \
     material_spec, material_unit, required_quantity, available_inventory, net_requirement, \
     safety_stock, reorder_point, suggested_work_order_quantity, suggested_purchase_order_quantity, \
     planned_production, planned_procurement, production_start_date, production_completion_date, \
     procurement_start_date, procurement_completion_date, delivery_date, material_source_type, \
     material_source_config, source_validation_passed, source_validation_errors, demand_item_ids, \
     detail_results";

const RELATION_COLUMNS: &str = "id, tenant_id, source_type, source_id, source_code, target_type, \
     target_id, target_code, target_name, relation_type, relation_mode, relation_desc, \
     business_mode, demand_id, created_at";

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> MrpError {
    move |e| MrpError::database(format!("{context}: {e}"))
}

fn is_undefined_table(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(UNDEFINED_TABLE),
        _ => false,
    }
}

/// PostgreSQL 儲存
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 建立連線池
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(db_error("連接資料庫失敗"))?;
        info!(max_connections, "資料庫連線池已建立");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 建立需求計算使用的資料表（已存在則略過）
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(db_error("建立資料表失敗"))?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx> {
        let tx = self.pool.begin().await.map_err(db_error("開啟交易失敗"))?;
        Ok(PgTx { tx })
    }

    async fn record_failure(
        &self,
        tenant_id: TenantId,
        computation_id: RecordId,
        message: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE demand_computations
            SET computation_status = $3, error_message = $4, computation_end_time = $5, updated_at = $5
            WHERE tenant_id = $1 AND id = $2 AND computation_status <> $6
            "#,
        )
        .bind(tenant_id)
        .bind(computation_id)
        .bind(ComputationStatus::Failed.as_str())
        .bind(message)
        .bind(at)
        .bind(ComputationStatus::Completed.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error("記錄計算失敗狀態失敗"))?;

        if result.rows_affected() == 0 {
            warn!(computation_id, "計算不存在或已完成，未記錄失敗");
        }
        Ok(())
    }

    async fn computation_codes(&self, tenant_id: TenantId, prefix: &str) -> Result<Vec<String>> {
        let codes: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT computation_code FROM demand_computations
            WHERE tenant_id = $1 AND computation_code LIKE $2
            "#,
        )
        .bind(tenant_id)
        .bind(format!("{prefix}%"))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("查詢計算編碼序號失敗"))?;

        Ok(codes.into_iter().map(|(code,)| code).collect())
    }

    async fn load_computation_configs(
        &self,
        tenant_id: TenantId,
        material_id: Option<RecordId>,
        warehouse_id: Option<RecordId>,
    ) -> Result<Vec<ComputationConfig>> {
        let rows = sqlx::query_as::<_, ConfigRow>(
            r#"
            SELECT id, tenant_id, config_scope, material_id, warehouse_id, priority, is_active, computation_params
            FROM computation_configs
            WHERE tenant_id = $1 AND is_active = TRUE AND deleted_at IS NULL
              AND (
                config_scope = 'global'
                OR (config_scope = 'warehouse' AND warehouse_id = $3)
                OR (config_scope = 'material' AND material_id = $2)
                OR (config_scope = 'material_warehouse' AND material_id = $2 AND warehouse_id = $3)
              )
            ORDER BY priority ASC, id ASC
            "#,
        )
        .bind(tenant_id)
        .bind(material_id)
        .bind(warehouse_id)
        .fetch_all(&self.pool)
        .await;

        match rows {
            Ok(rows) => rows.into_iter().map(ComputationConfig::try_from).collect(),
            Err(e) if is_undefined_table(&e) => {
                warn!(tenant_id, "計算參數配置表不存在，使用空配置");
                Ok(Vec::new())
            }
            Err(e) => Err(db_error("查詢計算參數配置失敗")(e)),
        }
    }
}

/// PostgreSQL 主交易
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn get_demand(&mut self, tenant_id: TenantId, demand_id: RecordId) -> Result<Option<Demand>> {
        let row = sqlx::query_as::<_, DemandRow>(
            r#"
            SELECT id, tenant_id, demand_code, demand_name, demand_type, business_mode, source_type,
                   source_id, status, review_status, pushed_to_computation, computation_id, computation_code
            FROM demands
            WHERE tenant_id = $1 AND id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(tenant_id)
        .bind(demand_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error("查詢需求失敗"))?;

        row.map(Demand::try_from).transpose()
    }

    async fn list_demand_items(&mut self, tenant_id: TenantId, demand_id: RecordId) -> Result<Vec<DemandItem>> {
        let rows = sqlx::query_as::<_, DemandItemRow>(
            r#"
            SELECT id, tenant_id, demand_id, material_id, required_quantity, delivery_date
            FROM demand_items
            WHERE tenant_id = $1 AND demand_id = $2 AND deleted_at IS NULL
            ORDER BY id
            "#,
        )
        .bind(tenant_id)
        .bind(demand_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error("查詢需求明細失敗"))?;

        Ok(rows.into_iter().map(DemandItem::from).collect())
    }

    async fn update_demand_link(&mut self, tenant_id: TenantId, demand_id: RecordId, link: &DemandLink) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE demands
            SET pushed_to_computation = $3, computation_id = $4, computation_code = $5, updated_at = NOW()
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(demand_id)
        .bind(link.pushed_to_computation)
        .bind(link.computation_id)
        .bind(&link.computation_code)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("更新需求關聯失敗"))?;
        Ok(())
    }

    async fn insert_computation(&mut self, mut computation: DemandComputation) -> Result<DemandComputation> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO demand_computations (
                tenant_id, computation_code, demand_id, demand_ids, demand_code, business_mode,
                computation_type, computation_params, computation_status, computation_start_time,
                computation_end_time, computation_summary, error_message, notes, created_by, updated_by,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING id
            "#,
        )
        .bind(computation.tenant_id)
        .bind(&computation.computation_code)
        .bind(computation.demand_id)
        .bind(Json(&computation.demand_ids))
        .bind(&computation.demand_code)
        .bind(computation.business_mode.as_str())
        .bind(computation.computation_type.as_str())
        .bind(computation.computation_params.to_value())
        .bind(computation.computation_status.as_str())
        .bind(computation.computation_start_time)
        .bind(computation.computation_end_time)
        .bind(&computation.computation_summary)
        .bind(&computation.error_message)
        .bind(&computation.notes)
        .bind(computation.created_by)
        .bind(computation.updated_by)
        .bind(computation.created_at)
        .bind(computation.updated_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error("寫入需求計算失敗"))?;

        computation.id = id;
        Ok(computation)
    }

    async fn get_computation(&mut self, tenant_id: TenantId, id: RecordId) -> Result<Option<DemandComputation>> {
        let sql = format!(
            "SELECT {COMPUTATION_COLUMNS} FROM demand_computations WHERE tenant_id = $1 AND id = $2 AND deleted_at IS NULL"
        );
        let row = sqlx::query_as::<_, ComputationRow>(&sql)
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error("查詢需求計算失敗"))?;

        row.map(DemandComputation::try_from).transpose()
    }

    async fn claim_computation(
        &mut self,
        tenant_id: TenantId,
        id: RecordId,
        started: DateTime<Utc>,
    ) -> Result<Option<DemandComputation>> {
        // 並發執行時後到者在列鎖上等待，先到者提交後狀態已變，條件不再成立
        let sql = format!(
            r#"
            UPDATE demand_computations
            SET computation_status = $3, computation_start_time = $4, computation_end_time = NULL, updated_at = $4
            WHERE tenant_id = $1 AND id = $2 AND deleted_at IS NULL AND computation_status IN ($5, $6)
            RETURNING {COMPUTATION_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, ComputationRow>(&sql)
            .bind(tenant_id)
            .bind(id)
            .bind(ComputationStatus::Computing.as_str())
            .bind(started)
            .bind(ComputationStatus::InProgress.as_str())
            .bind(ComputationStatus::Failed.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error("鎖定需求計算失敗"))?;

        row.map(DemandComputation::try_from).transpose()
    }

    async fn update_computation(&mut self, computation: &DemandComputation) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE demand_computations SET
                computation_type = $3, computation_params = $4, computation_status = $5,
                computation_start_time = $6, computation_end_time = $7, computation_summary = $8,
                error_message = $9, notes = $10, updated_by = $11, updated_at = $12
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(computation.tenant_id)
        .bind(computation.id)
        .bind(computation.computation_type.as_str())
        .bind(computation.computation_params.to_value())
        .bind(computation.computation_status.as_str())
        .bind(computation.computation_start_time)
        .bind(computation.computation_end_time)
        .bind(&computation.computation_summary)
        .bind(&computation.error_message)
        .bind(&computation.notes)
        .bind(computation.updated_by)
        .bind(computation.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("更新需求計算失敗"))?;

        if result.rows_affected() == 0 {
            return Err(MrpError::not_found(format!("需求计算不存在: {}", computation.id)));
        }
        Ok(())
    }

    async fn delete_computation(&mut self, tenant_id: TenantId, id: RecordId) -> Result<()> {
        sqlx::query("DELETE FROM demand_computations WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error("刪除需求計算失敗"))?;
        Ok(())
    }

    async fn list_computations(
        &mut self,
        tenant_id: TenantId,
        filter: &ComputationFilter,
        skip: u64,
        limit: u64,
    ) -> Result<(Vec<DemandComputation>, u64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM demand_computations");
        push_filters(&mut count, tenant_id, filter);
        let (total,): (i64,) = count
            .build_query_as()
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_error("統計需求計算失敗"))?;

        let mut query = QueryBuilder::<Postgres>::new(format!("SELECT {COMPUTATION_COLUMNS} FROM demand_computations"));
        push_filters(&mut query, tenant_id, filter);
        query
            .push(" ORDER BY computation_start_time DESC NULLS LAST, id DESC OFFSET ")
            .push_bind(skip as i64)
            .push(" LIMIT ")
            .push_bind(limit as i64);
        let rows: Vec<ComputationRow> = query
            .build_query_as()
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_error("查詢需求計算列表失敗"))?;

        let data = rows
            .into_iter()
            .map(DemandComputation::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((data, total.max(0) as u64))
    }

    async fn insert_items(
        &mut self,
        tenant_id: TenantId,
        computation_id: RecordId,
        items: Vec<DemandComputationItem>,
    ) -> Result<Vec<DemandComputationItem>> {
        let mut inserted = Vec::with_capacity(items.len());
        for mut item in items {
            let (id,): (i64,) = sqlx::query_as(
                r#"
                INSERT INTO demand_computation_items (
                    tenant_id, computation_id, material_id, material_code, material_name, material_spec,
                    material_unit, required_quantity, available_inventory, net_requirement, safety_stock,
                    reorder_point, suggested_work_order_quantity, suggested_purchase_order_quantity,
                    planned_production, planned_procurement, production_start_date,
                    production_completion_date, procurement_start_date, procurement_completion_date,
                    delivery_date, material_source_type, material_source_config, source_validation_passed,
                    source_validation_errors, demand_item_ids, detail_results
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
                        $19, $20, $21, $22, $23, $24, $25, $26, $27)
                RETURNING id
                "#,
            )
            .bind(tenant_id)
            .bind(computation_id)
            .bind(item.material_id)
            .bind(&item.material_code)
            .bind(&item.material_name)
            .bind(&item.material_spec)
            .bind(&item.material_unit)
            .bind(item.required_quantity)
            .bind(item.available_inventory)
            .bind(item.net_requirement)
            .bind(item.safety_stock)
            .bind(item.reorder_point)
            .bind(item.suggested_work_order_quantity)
            .bind(item.suggested_purchase_order_quantity)
            .bind(item.planned_production)
            .bind(item.planned_procurement)
            .bind(item.production_start_date)
            .bind(item.production_completion_date)
            .bind(item.procurement_start_date)
            .bind(item.procurement_completion_date)
            .bind(item.delivery_date)
            .bind(item.material_source_type.map(|t| t.as_str()))
            .bind(&item.material_source_config)
            .bind(item.source_validation_passed)
            .bind(Json(&item.source_validation_errors))
            .bind(Json(&item.demand_item_ids))
            .bind(&item.detail_results)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_error("寫入計算明細失敗"))?;

            item.id = id;
            item.tenant_id = tenant_id;
            item.computation_id = computation_id;
            inserted.push(item);
        }
        debug!(computation_id, count = inserted.len(), "寫入計算明細");
        Ok(inserted)
    }

    async fn list_items(&mut self, tenant_id: TenantId, computation_id: RecordId) -> Result<Vec<DemandComputationItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM demand_computation_items WHERE tenant_id = $1 AND computation_id = $2 ORDER BY id"
        );
        let rows = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(tenant_id)
            .bind(computation_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_error("查詢計算明細失敗"))?;

        rows.into_iter().map(DemandComputationItem::try_from).collect()
    }

    async fn delete_items(&mut self, tenant_id: TenantId, computation_id: RecordId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM demand_computation_items WHERE tenant_id = $1 AND computation_id = $2")
            .bind(tenant_id)
            .bind(computation_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error("刪除計算明細失敗"))?;
        Ok(result.rows_affected())
    }

    async fn insert_snapshot(&mut self, mut snapshot: DemandComputationSnapshot) -> Result<DemandComputationSnapshot> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO demand_computation_snapshots (
                tenant_id, computation_id, snapshot_time, trigger_reason, computation_summary, items_snapshot
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(snapshot.tenant_id)
        .bind(snapshot.computation_id)
        .bind(snapshot.snapshot_time)
        .bind(&snapshot.trigger_reason)
        .bind(&snapshot.computation_summary)
        .bind(Json(&snapshot.items_snapshot))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error("寫入計算快照失敗"))?;

        snapshot.id = id;
        Ok(snapshot)
    }

    async fn list_snapshots(
        &mut self,
        tenant_id: TenantId,
        computation_id: RecordId,
        limit: u64,
    ) -> Result<Vec<DemandComputationSnapshot>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT id, tenant_id, computation_id, snapshot_time, trigger_reason, computation_summary, items_snapshot
            FROM demand_computation_snapshots
            WHERE tenant_id = $1 AND computation_id = $2
            ORDER BY snapshot_time DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(tenant_id)
        .bind(computation_id)
        .bind(limit as i64)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error("查詢計算快照失敗"))?;

        Ok(rows.into_iter().map(DemandComputationSnapshot::from).collect())
    }

    async fn delete_snapshots(&mut self, tenant_id: TenantId, computation_id: RecordId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM demand_computation_snapshots WHERE tenant_id = $1 AND computation_id = $2")
            .bind(tenant_id)
            .bind(computation_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error("刪除計算快照失敗"))?;
        Ok(result.rows_affected())
    }

    async fn insert_recalc_history(&mut self, mut history: RecalcHistory) -> Result<RecalcHistory> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO demand_computation_recalc_history (
                tenant_id, computation_id, recalc_time, trigger_type, operator_id, result, snapshot_id, message
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(history.tenant_id)
        .bind(history.computation_id)
        .bind(history.recalc_time)
        .bind(history.trigger_type.as_str())
        .bind(history.operator_id)
        .bind(history.result.as_str())
        .bind(history.snapshot_id)
        .bind(&history.message)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error("寫入重算歷史失敗"))?;

        history.id = id;
        Ok(history)
    }

    async fn list_recalc_history(
        &mut self,
        tenant_id: TenantId,
        computation_id: RecordId,
        limit: u64,
    ) -> Result<Vec<RecalcHistory>> {
        let rows = sqlx::query_as::<_, RecalcHistoryRow>(
            r#"
            SELECT id, tenant_id, computation_id, recalc_time, trigger_type, operator_id, result, snapshot_id, message
            FROM demand_computation_recalc_history
            WHERE tenant_id = $1 AND computation_id = $2
            ORDER BY recalc_time DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(tenant_id)
        .bind(computation_id)
        .bind(limit as i64)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error("查詢重算歷史失敗"))?;

        rows.into_iter().map(RecalcHistory::try_from).collect()
    }

    async fn delete_recalc_history(&mut self, tenant_id: TenantId, computation_id: RecordId) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM demand_computation_recalc_history WHERE tenant_id = $1 AND computation_id = $2")
                .bind(tenant_id)
                .bind(computation_id)
                .execute(&mut *self.tx)
                .await
                .map_err(db_error("刪除重算歷史失敗"))?;
        Ok(result.rows_affected())
    }

    async fn find_relation(&mut self, tenant_id: TenantId, key: &RelationKey) -> Result<Option<DocumentRelation>> {
        let sql = format!(
            "SELECT {RELATION_COLUMNS} FROM document_relations \
             WHERE tenant_id = $1 AND source_type = $2 AND source_id = $3 \
               AND target_type = $4 AND target_id = $5 AND relation_type = $6"
        );
        let row = sqlx::query_as::<_, RelationRow>(&sql)
            .bind(tenant_id)
            .bind(&key.source_type)
            .bind(key.source_id)
            .bind(&key.target_type)
            .bind(key.target_id)
            .bind(&key.relation_type)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error("查詢單據關聯失敗"))?;

        Ok(row.map(DocumentRelation::from))
    }

    async fn insert_relation(&mut self, tenant_id: TenantId, relation: NewRelation) -> Result<DocumentRelation> {
        let sql = format!(
            "INSERT INTO document_relations (tenant_id, source_type, source_id, source_code, target_type, \
             target_id, target_code, target_name, relation_type, relation_mode, relation_desc, business_mode, \
             demand_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW()) \
             ON CONFLICT (tenant_id, source_type, source_id, target_type, target_id, relation_type) DO NOTHING \
             RETURNING {RELATION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, RelationRow>(&sql)
            .bind(tenant_id)
            .bind(&relation.source_type)
            .bind(relation.source_id)
            .bind(&relation.source_code)
            .bind(&relation.target_type)
            .bind(relation.target_id)
            .bind(&relation.target_code)
            .bind(&relation.target_name)
            .bind(&relation.relation_type)
            .bind(&relation.relation_mode)
            .bind(&relation.relation_desc)
            .bind(&relation.business_mode)
            .bind(relation.demand_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error("寫入單據關聯失敗"))?;

        row.map(DocumentRelation::from)
            .ok_or_else(|| MrpError::conflict("关联关系已存在"))
    }

    async fn outgoing_relations(
        &mut self,
        tenant_id: TenantId,
        source_type: &str,
        source_id: RecordId,
    ) -> Result<Vec<DocumentRelation>> {
        let sql = format!(
            "SELECT {RELATION_COLUMNS} FROM document_relations \
             WHERE tenant_id = $1 AND source_type = $2 AND source_id = $3 ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, RelationRow>(&sql)
            .bind(tenant_id)
            .bind(source_type)
            .bind(source_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_error("查詢下游關聯失敗"))?;

        Ok(rows.into_iter().map(DocumentRelation::from).collect())
    }

    async fn incoming_relations(
        &mut self,
        tenant_id: TenantId,
        target_type: &str,
        target_id: RecordId,
    ) -> Result<Vec<DocumentRelation>> {
        let sql = format!(
            "SELECT {RELATION_COLUMNS} FROM document_relations \
             WHERE tenant_id = $1 AND target_type = $2 AND target_id = $3 ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, RelationRow>(&sql)
            .bind(tenant_id)
            .bind(target_type)
            .bind(target_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_error("查詢上游關聯失敗"))?;

        Ok(rows.into_iter().map(DocumentRelation::from).collect())
    }

    async fn delete_relations_touching(&mut self, tenant_id: TenantId, doc_type: &str, doc_id: RecordId) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM document_relations
            WHERE tenant_id = $1
              AND ((source_type = $2 AND source_id = $3) OR (target_type = $2 AND target_id = $3))
            "#,
        )
        .bind(tenant_id)
        .bind(doc_type)
        .bind(doc_id)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("刪除單據關聯失敗"))?;
        Ok(result.rows_affected())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(db_error("提交交易失敗"))
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.map_err(db_error("回滾交易失敗"))
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, tenant_id: TenantId, filter: &ComputationFilter) {
    builder
        .push(" WHERE deleted_at IS NULL AND tenant_id = ")
        .push_bind(tenant_id);
    if let Some(demand_id) = filter.demand_id {
        builder
            .push(" AND (demand_id = ")
            .push_bind(demand_id)
            .push(" OR demand_ids @> ")
            .push_bind(Json(vec![demand_id]))
            .push(")");
    }
    if let Some(code) = &filter.demand_code {
        builder.push(" AND demand_code LIKE ").push_bind(format!("%{code}%"));
    }
    if let Some(code) = &filter.computation_code {
        builder.push(" AND computation_code LIKE ").push_bind(format!("%{code}%"));
    }
    if let Some(computation_type) = filter.computation_type {
        builder.push(" AND computation_type = ").push_bind(computation_type.as_str());
    }
    if let Some(status) = filter.computation_status {
        builder.push(" AND computation_status = ").push_bind(status.as_str());
    }
    if let Some(mode) = &filter.business_mode {
        builder.push(" AND business_mode = ").push_bind(mode.as_str().to_string());
    }
    if let Some(from) = filter.start_date {
        builder.push(" AND computation_start_time >= ").push_bind(from);
    }
    if let Some(to) = filter.end_date {
        builder.push(" AND computation_start_time <= ").push_bind(to);
    }
}
