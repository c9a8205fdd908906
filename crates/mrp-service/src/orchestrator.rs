//! 需求計算編排
//!
//! 計算的完整生命週期：創建、執行、預覽、重算、刪除、查詢與比對。
//!
//! 交易邊界：
//! - 創建、刪除、執行的寫入各自在一個主交易內完成；
//! - 預覽走完整執行路徑後以 [`TxOutcome::RollbackWith`] 回滾並帶回結果；
//! - 執行失敗時先回滾主交易，再經環境連線池記錄失敗狀態；
//! - 重算分三段：快照與重置（提交）→ 執行 → 記錄重算歷史，互不嵌套。

use chrono::Utc;
use mrp_calc::{code_gen, compare, ComputationDiff};
use mrp_core::relation::DEMAND_COMPUTATION;
use mrp_core::{
    BusinessMode, ComputationFilter, ComputationPage, ComputationParams, ComputationResponse,
    ComputationStatus, ComputationSummary, ComputationType, ComputationUpdate, Demand,
    DemandComputation, DemandComputationItem, DemandComputationSnapshot, DemandLink, DocumentKind,
    ItemProjection, MrpError, NewComputation, NewRelation, RecalcHistory, RecalcResult,
    RecalcTrigger, RecordId, Result, SourceType, TenantId,
};
use mrp_store::{settle, truncate_message, Store, StoreTx, TxOutcome};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::executor::ComputationExecutor;
use crate::ledger::{self, PushRecords};
use crate::settings::EngineConfig;
use crate::validator::SourceValidator;
use crate::Collaborators;

/// 預覽結果（不落庫）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewResult {
    pub computation_id: RecordId,
    pub computation_code: String,
    pub computation_type: ComputationType,
    pub item_count: usize,
    pub items: Vec<ItemProjection>,
}

impl PreviewResult {
    fn new(computation: &DemandComputation, items: &[DemandComputationItem]) -> Self {
        Self {
            computation_id: computation.id,
            computation_code: computation.computation_code.clone(),
            computation_type: computation.computation_type,
            item_count: items.len(),
            items: items.iter().map(DemandComputationItem::projection).collect(),
        }
    }
}

/// 物料來源資訊
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialSourceEntry {
    pub item_id: RecordId,
    pub material_id: RecordId,
    pub material_code: String,
    pub material_name: String,
    pub source_type: Option<SourceType>,
    pub source_config: Option<Value>,
    pub validation_passed: bool,
    pub validation_errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialSources {
    pub computation_id: RecordId,
    pub total: usize,
    pub items: Vec<MaterialSourceEntry>,
}

/// 單一物料的來源驗證結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemValidation {
    pub material_id: RecordId,
    pub material_code: String,
    pub source_type: SourceType,
    pub passed: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceValidationReport {
    pub computation_id: RecordId,
    pub all_passed: bool,
    pub passed_count: usize,
    pub failed_count: usize,
    pub results: Vec<ItemValidation>,
}

/// 刪除進度；中斷時已刪除單據的關聯仍需提交
enum DeleteProgress {
    Done,
    Interrupted(MrpError),
}

/// 需求計算服務
pub struct DemandComputationService<S: Store> {
    pub(crate) store: S,
    pub(crate) deps: Collaborators,
    pub(crate) settings: EngineConfig,
}

impl<S: Store> DemandComputationService<S> {
    pub fn new(store: S, deps: Collaborators, settings: EngineConfig) -> Self {
        Self {
            store,
            deps,
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &EngineConfig {
        &self.settings
    }

    /// 創建計算
    ///
    /// 需求必須全部存在、已審核通過且尚未被其他計算消費；
    /// 未指定計算類型時，任一 MTO 需求即為 LRP。
    pub async fn create_computation(
        &self,
        tenant_id: TenantId,
        request: NewComputation,
        created_by: Option<RecordId>,
    ) -> Result<ComputationResponse> {
        let demand_ids = request.resolved_demand_ids();
        if demand_ids.is_empty() {
            return Err(MrpError::validation("至少需要指定一个需求"));
        }
        let params = ComputationParams::try_from_value(&request.computation_params)?;

        let mut tx = self.store.begin().await?;
        let result = self
            .create_in(&mut tx, tenant_id, &demand_ids, request, params, created_by)
            .await;
        settle(tx, result.map(TxOutcome::Commit)).await
    }

    async fn create_in(
        &self,
        tx: &mut S::Tx,
        tenant_id: TenantId,
        demand_ids: &[RecordId],
        request: NewComputation,
        params: ComputationParams,
        created_by: Option<RecordId>,
    ) -> Result<ComputationResponse> {
        let demands = load_consumable_demands(tx, tenant_id, demand_ids).await?;
        let primary = demands
            .first()
            .ok_or_else(|| MrpError::validation("至少需要指定一个需求"))?;

        let computation_type = request
            .computation_type
            .unwrap_or_else(|| ComputationType::infer(demands.iter().map(|d| &d.business_mode)));
        let business_mode = if demands.iter().all(|d| d.business_mode == primary.business_mode) {
            primary.business_mode.clone()
        } else {
            BusinessMode::Mixed
        };

        let now = Utc::now();
        let today = now.date_naive();
        let prefix = code_gen::code_prefix(computation_type, today);
        // 經環境連線池查詢，失敗不會中止主交易
        let sequence = match self.store.computation_codes(tenant_id, &prefix).await {
            Ok(codes) => Some(code_gen::next_sequence(codes.iter().map(String::as_str), &prefix)),
            Err(err) => {
                warn!(error = %err, "查詢計算編碼序號失敗，使用 NEW");
                None
            }
        };

        let computation = DemandComputation {
            id: 0,
            tenant_id,
            computation_code: code_gen::computation_code(computation_type, today, sequence),
            demand_id: primary.id,
            demand_ids: demands.iter().map(|d| d.id).collect(),
            demand_code: demands
                .iter()
                .map(|d| d.demand_code.as_str())
                .collect::<Vec<_>>()
                .join(","),
            business_mode,
            computation_type,
            computation_params: params,
            computation_status: ComputationStatus::InProgress,
            computation_start_time: None,
            computation_end_time: None,
            computation_summary: None,
            error_message: None,
            notes: request.notes,
            created_by,
            updated_by: created_by,
            created_at: now,
            updated_at: now,
        };
        let computation = tx.insert_computation(computation).await?;

        let items = if request.items.is_empty() {
            Vec::new()
        } else {
            tx.insert_items(tenant_id, computation.id, request.items).await?
        };

        for demand in &demands {
            let link = DemandLink::linked(computation.id, &computation.computation_code);
            tx.update_demand_link(tenant_id, demand.id, &link).await?;
            let relation = NewRelation::demand_to_computation(
                demand.id,
                &demand.demand_code,
                computation.id,
                &computation.computation_code,
            )
            .with_business(demand.business_mode.as_str(), Some(demand.id));
            ledger::create_relation(tx, tenant_id, relation).await?;
        }

        info!(
            tenant_id,
            computation_id = computation.id,
            computation_code = %computation.computation_code,
            computation_type = computation_type.as_str(),
            demands = demands.len(),
            "需求計算已創建"
        );
        Ok(ComputationResponse { computation, items })
    }

    /// 執行計算
    ///
    /// `params_override` 只作用於本次執行，不寫回計算參數。
    pub async fn execute_computation(
        &self,
        tenant_id: TenantId,
        computation_id: RecordId,
        params_override: Option<Value>,
    ) -> Result<ComputationResponse> {
        let run_id = Uuid::new_v4();
        let span = info_span!("execute_computation", tenant_id, computation_id, %run_id);
        self.execute_in(tenant_id, computation_id, params_override.as_ref())
            .instrument(span)
            .await
    }

    async fn execute_in(
        &self,
        tenant_id: TenantId,
        computation_id: RecordId,
        params_override: Option<&Value>,
    ) -> Result<ComputationResponse> {
        let mut tx = self.store.begin().await?;
        let (mut computation, params) = match self
            .prepare_run(&mut tx, tenant_id, computation_id, params_override)
            .await
        {
            Ok(prepared) => prepared,
            Err(err) => return settle(tx, Err(err)).await,
        };

        match self.run_and_persist(&mut tx, &mut computation, &params).await {
            Ok(items) => {
                let response = ComputationResponse { computation, items };
                match settle(tx, Ok(TxOutcome::Commit(response))).await {
                    Ok(response) => {
                        info!(items = response.items.len(), "需求計算完成");
                        Ok(response)
                    }
                    Err(err @ MrpError::Conflict(_)) => {
                        warn!(error = %err, "提交衝突，計算由其他執行佔用");
                        Err(err)
                    }
                    Err(err) => {
                        self.record_failure(tenant_id, computation_id, &err).await;
                        Err(err)
                    }
                }
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "交易回滾失敗");
                }
                self.record_failure(tenant_id, computation_id, &err).await;
                Err(err)
            }
        }
    }

    /// 載入計算並確認可執行，合併本次參數，並在主交易內佔用該計算
    async fn prepare_run(
        &self,
        tx: &mut S::Tx,
        tenant_id: TenantId,
        computation_id: RecordId,
        params_override: Option<&Value>,
    ) -> Result<(DemandComputation, ComputationParams)> {
        let computation = load_computation(tx, tenant_id, computation_id).await?;
        if !computation.computation_status.can_execute() {
            return Err(MrpError::business(format!(
                "计算状态为{}，只有进行中或失败的计算可以执行",
                computation.computation_status.as_str()
            )));
        }

        let params = match params_override {
            Some(value) => computation
                .computation_params
                .merged_with(&ComputationParams::try_from_value(value)?),
            None => computation.computation_params.clone(),
        };

        let computation = tx
            .claim_computation(tenant_id, computation_id, Utc::now())
            .await?
            .ok_or_else(|| MrpError::conflict("需求计算正在被其他执行占用"))?;
        Ok((computation, params))
    }

    async fn run_and_persist(
        &self,
        tx: &mut S::Tx,
        computation: &mut DemandComputation,
        params: &ComputationParams,
    ) -> Result<Vec<DemandComputationItem>> {
        let tenant_id = computation.tenant_id;
        let removed = tx.delete_items(tenant_id, computation.id).await?;
        if removed > 0 {
            debug!(removed, "清除先前的計算明細");
        }

        let started = computation.computation_start_time.unwrap_or_else(Utc::now);

        let items = ComputationExecutor::new(&self.store, &self.deps, &self.settings)
            .run(tx, computation, params, started.date_naive())
            .await?;
        let items = tx.insert_items(tenant_id, computation.id, items).await?;

        let summary = ComputationSummary::from_items(&items);
        computation.mark_completed(summary.to_value(), Utc::now());
        tx.update_computation(computation).await?;
        Ok(items)
    }

    /// 經環境連線池記錄失敗；記錄本身失敗只寫日誌
    async fn record_failure(&self, tenant_id: TenantId, computation_id: RecordId, err: &MrpError) {
        let message = truncate_message(&err.to_string(), self.settings.error_message_limit);
        warn!(tenant_id, computation_id, error = %err, "需求計算失敗");
        if let Err(record_err) = self
            .store
            .record_failure(tenant_id, computation_id, &message, Utc::now())
            .await
        {
            error!(tenant_id, computation_id, error = %record_err, "記錄計算失敗狀態失敗");
        }
    }

    /// 預覽執行：結果不落庫
    pub async fn preview_execute_computation(
        &self,
        tenant_id: TenantId,
        computation_id: RecordId,
        params_override: Option<Value>,
    ) -> Result<PreviewResult> {
        let run_id = Uuid::new_v4();
        let span = info_span!("preview_computation", tenant_id, computation_id, %run_id);
        async {
            let mut tx = self.store.begin().await?;
            let result = self
                .preview_in(&mut tx, tenant_id, computation_id, params_override.as_ref())
                .await;
            settle(tx, result).await
        }
        .instrument(span)
        .await
    }

    async fn preview_in(
        &self,
        tx: &mut S::Tx,
        tenant_id: TenantId,
        computation_id: RecordId,
        params_override: Option<&Value>,
    ) -> Result<TxOutcome<PreviewResult>> {
        let (mut computation, params) = self
            .prepare_run(tx, tenant_id, computation_id, params_override)
            .await?;
        let items = self.run_and_persist(tx, &mut computation, &params).await?;
        debug!(items = items.len(), "預覽完成，回滾");
        Ok(TxOutcome::RollbackWith(PreviewResult::new(&computation, &items)))
    }

    /// 重算
    ///
    /// 有操作人為手動觸發，否則為系統觸發；每次呼叫恰好寫入一筆重算歷史。
    pub async fn recompute_computation(
        &self,
        tenant_id: TenantId,
        computation_id: RecordId,
        operator: Option<RecordId>,
    ) -> Result<ComputationResponse> {
        let run_id = Uuid::new_v4();
        let span = info_span!("recompute_computation", tenant_id, computation_id, %run_id);
        self.recompute_in(tenant_id, computation_id, operator)
            .instrument(span)
            .await
    }

    async fn recompute_in(
        &self,
        tenant_id: TenantId,
        computation_id: RecordId,
        operator: Option<RecordId>,
    ) -> Result<ComputationResponse> {
        let mut tx = self.store.begin().await?;
        let snapshot = self
            .snapshot_and_reset(&mut tx, tenant_id, computation_id, operator)
            .await;
        let snapshot = settle(tx, snapshot.map(TxOutcome::Commit)).await?;

        let executed = self.execute_computation(tenant_id, computation_id, None).await;

        let (result, message) = match &executed {
            Ok(_) => (RecalcResult::Success, None),
            Err(err) => (
                RecalcResult::Failed,
                Some(truncate_message(&err.to_string(), self.settings.error_message_limit)),
            ),
        };
        let history = RecalcHistory {
            id: 0,
            tenant_id,
            computation_id,
            recalc_time: Utc::now(),
            trigger_type: if operator.is_some() {
                RecalcTrigger::Manual
            } else {
                RecalcTrigger::System
            },
            operator_id: operator,
            result,
            snapshot_id: Some(snapshot.id),
            message,
        };
        let mut tx = self.store.begin().await?;
        let recorded = tx.insert_recalc_history(history).await;
        let recorded = settle(tx, recorded.map(TxOutcome::Commit)).await;

        match (executed, recorded) {
            (Ok(response), Ok(history)) => {
                info!(snapshot_id = snapshot.id, history_id = history.id, "重算完成");
                Ok(response)
            }
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(_)) => Err(err),
            (Err(err), Err(record_err)) => {
                error!(error = %record_err, "寫入重算歷史失敗");
                Err(err)
            }
        }
    }

    async fn snapshot_and_reset(
        &self,
        tx: &mut S::Tx,
        tenant_id: TenantId,
        computation_id: RecordId,
        operator: Option<RecordId>,
    ) -> Result<DemandComputationSnapshot> {
        let mut computation = load_computation(tx, tenant_id, computation_id).await?;
        if !computation.computation_status.can_recompute() {
            return Err(MrpError::business(format!(
                "计算状态为{}，只有完成或失败的计算可以重算",
                computation.computation_status.as_str()
            )));
        }

        let now = Utc::now();
        let items = tx.list_items(tenant_id, computation_id).await?;
        let snapshot = tx
            .insert_snapshot(DemandComputationSnapshot::capture(&computation, &items, "recompute", now))
            .await?;
        tx.delete_items(tenant_id, computation_id).await?;

        computation.reset_for_recompute(now);
        if operator.is_some() {
            computation.updated_by = operator;
        }
        tx.update_computation(&computation).await?;
        debug!(snapshot_id = snapshot.id, items = items.len(), "重算快照已建立");
        Ok(snapshot)
    }

    /// 刪除計算
    ///
    /// 任一下推單據已執行即拒絕；否則逐張刪除未執行的下游單據，再刪除明細、快照、
    /// 重算歷史、全部關聯，並清除需求上的計算標記。
    ///
    /// 下游單據由其所屬服務刪除，無法隨本地交易回滾。某張刪除失敗時立即停止：
    /// 計算保留，只移除已刪單據的關聯並提交，錯誤中列出已刪除的單據，重試時從剩餘單據繼續。
    pub async fn delete_computation(&self, tenant_id: TenantId, computation_id: RecordId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        match self.delete_in(&mut tx, tenant_id, computation_id).await {
            Ok(DeleteProgress::Done) => settle(tx, Ok(TxOutcome::Commit(()))).await,
            Ok(DeleteProgress::Interrupted(err)) => {
                settle(tx, Ok(TxOutcome::Commit(()))).await?;
                Err(err)
            }
            Err(err) => settle(tx, Err(err)).await,
        }
    }

    async fn delete_in(
        &self,
        tx: &mut S::Tx,
        tenant_id: TenantId,
        computation_id: RecordId,
    ) -> Result<DeleteProgress> {
        let computation = load_computation(tx, tenant_id, computation_id).await?;
        let relations = tx
            .outgoing_relations(tenant_id, DEMAND_COMPUTATION, computation_id)
            .await?;

        let downstream = self.deps.downstream.as_ref();
        let mut executed = Vec::new();
        let mut unexecuted = Vec::new();
        for relation in &relations {
            let Some(kind) = DocumentKind::parse(&relation.target_type) else {
                continue;
            };
            if !downstream.document_exists(tenant_id, kind, relation.target_id).await? {
                continue;
            }
            let code = relation
                .target_code
                .clone()
                .unwrap_or_else(|| format!("{}#{}", kind.label(), relation.target_id));
            if downstream.is_executed(tenant_id, kind, relation.target_id).await? {
                executed.push(code);
            } else {
                unexecuted.push((kind, relation.target_id, code));
            }
        }

        if !executed.is_empty() {
            return Err(MrpError::business(format!(
                "下游单据已执行，不能删除需求计算: {}",
                executed.join(", ")
            )));
        }

        let mut removed: Vec<(DocumentKind, RecordId, String)> = Vec::new();
        for (kind, target_id, code) in unexecuted {
            if let Err(err) = downstream.delete_document(tenant_id, kind, target_id).await {
                warn!(tenant_id, computation_id, document = %code, error = %err, "刪除下游單據失敗，停止刪除");
                for (removed_kind, removed_id, _) in &removed {
                    tx.delete_relations_touching(tenant_id, removed_kind.as_str(), *removed_id)
                        .await?;
                }
                let removed_codes: Vec<&str> = removed.iter().map(|(_, _, code)| code.as_str()).collect();
                let message = if removed_codes.is_empty() {
                    format!("删除{}失败: {err}", kind.label())
                } else {
                    format!(
                        "删除{}失败: {err}；已删除: {}",
                        kind.label(),
                        removed_codes.join(", ")
                    )
                };
                return Ok(DeleteProgress::Interrupted(MrpError::business(message)));
            }
            removed.push((kind, target_id, code));
        }

        let items = tx.delete_items(tenant_id, computation_id).await?;
        let snapshots = tx.delete_snapshots(tenant_id, computation_id).await?;
        let history = tx.delete_recalc_history(tenant_id, computation_id).await?;
        let relations = tx
            .delete_relations_touching(tenant_id, DEMAND_COMPUTATION, computation_id)
            .await?;
        for &demand_id in &computation.demand_ids {
            tx.update_demand_link(tenant_id, demand_id, &DemandLink::cleared())
                .await?;
        }
        tx.delete_computation(tenant_id, computation_id).await?;

        info!(
            tenant_id,
            computation_id,
            items,
            snapshots,
            history,
            relations,
            documents = removed.len(),
            "需求計算已刪除"
        );
        Ok(DeleteProgress::Done)
    }

    pub async fn get_computation_by_id(
        &self,
        tenant_id: TenantId,
        computation_id: RecordId,
        include_items: bool,
    ) -> Result<ComputationResponse> {
        let mut tx = self.store.begin().await?;
        let result = load_response(&mut tx, tenant_id, computation_id, include_items).await;
        settle(tx, result.map(TxOutcome::Commit)).await
    }

    /// 按開始時間倒序分頁
    pub async fn list_computations(
        &self,
        tenant_id: TenantId,
        filter: &ComputationFilter,
        skip: u64,
        limit: u64,
    ) -> Result<ComputationPage> {
        let mut tx = self.store.begin().await?;
        let result = tx.list_computations(tenant_id, filter, skip, limit).await;
        let (data, total) = settle(tx, result.map(TxOutcome::Commit)).await?;
        Ok(ComputationPage {
            data,
            total,
            success: true,
        })
    }

    /// 修改計算（僅进行中）
    pub async fn update_computation(
        &self,
        tenant_id: TenantId,
        computation_id: RecordId,
        update: ComputationUpdate,
        updated_by: Option<RecordId>,
    ) -> Result<ComputationResponse> {
        let mut tx = self.store.begin().await?;
        let result = self
            .update_in(&mut tx, tenant_id, computation_id, update, updated_by)
            .await;
        settle(tx, result.map(TxOutcome::Commit)).await
    }

    async fn update_in(
        &self,
        tx: &mut S::Tx,
        tenant_id: TenantId,
        computation_id: RecordId,
        update: ComputationUpdate,
        updated_by: Option<RecordId>,
    ) -> Result<ComputationResponse> {
        let mut computation = load_computation(tx, tenant_id, computation_id).await?;
        if !computation.computation_status.is_editable() {
            return Err(MrpError::business(format!(
                "计算状态为{}，只有进行中的计算可以修改",
                computation.computation_status.as_str()
            )));
        }

        if let Some(notes) = update.notes {
            computation.notes = Some(notes);
        }
        if let Some(params) = update.computation_params {
            computation.computation_params = ComputationParams::try_from_value(&params)?;
        }
        if let Some(computation_type) = update.computation_type {
            computation.computation_type = computation_type;
        }
        computation.updated_by = updated_by.or(computation.updated_by);
        computation.updated_at = Utc::now();
        tx.update_computation(&computation).await?;

        let items = tx.list_items(tenant_id, computation_id).await?;
        Ok(ComputationResponse { computation, items })
    }

    /// 比對兩次計算
    pub async fn compare_computations(
        &self,
        tenant_id: TenantId,
        first_id: RecordId,
        second_id: RecordId,
    ) -> Result<ComputationDiff> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let first = load_response(&mut tx, tenant_id, first_id, true).await?;
            let second = load_response(&mut tx, tenant_id, second_id, true).await?;
            Ok((first, second))
        }
        .await;
        let (first, second) = settle(tx, result.map(TxOutcome::Commit)).await?;
        Ok(compare(
            &first.computation,
            &first.items,
            &second.computation,
            &second.items,
        ))
    }

    /// 重算快照（新到舊）
    pub async fn list_computation_snapshots(
        &self,
        tenant_id: TenantId,
        computation_id: RecordId,
        limit: Option<u64>,
    ) -> Result<Vec<DemandComputationSnapshot>> {
        let limit = limit.unwrap_or(self.settings.snapshot_list_limit);
        let mut tx = self.store.begin().await?;
        let result = tx.list_snapshots(tenant_id, computation_id, limit).await;
        settle(tx, result.map(TxOutcome::Commit)).await
    }

    /// 重算歷史（新到舊）
    pub async fn list_computation_recalc_history(
        &self,
        tenant_id: TenantId,
        computation_id: RecordId,
        limit: Option<u64>,
    ) -> Result<Vec<RecalcHistory>> {
        let limit = limit.unwrap_or(self.settings.recalc_history_limit);
        let mut tx = self.store.begin().await?;
        let result = tx.list_recalc_history(tenant_id, computation_id, limit).await;
        settle(tx, result.map(TxOutcome::Commit)).await
    }

    /// 下推記錄
    pub async fn get_push_records(&self, tenant_id: TenantId, computation_id: RecordId) -> Result<PushRecords> {
        let mut tx = self.store.begin().await?;
        let result = async {
            load_computation(&mut tx, tenant_id, computation_id).await?;
            ledger::push_records(&mut tx, self.deps.downstream.as_ref(), tenant_id, computation_id).await
        }
        .await;
        settle(tx, result.map(TxOutcome::Commit)).await
    }

    /// 各明細的物料來源與計算時的驗證結果
    pub async fn get_material_sources(&self, tenant_id: TenantId, computation_id: RecordId) -> Result<MaterialSources> {
        let response = self.get_computation_by_id(tenant_id, computation_id, true).await?;
        let items: Vec<MaterialSourceEntry> = response
            .items
            .into_iter()
            .map(|item| MaterialSourceEntry {
                item_id: item.id,
                material_id: item.material_id,
                material_code: item.material_code,
                material_name: item.material_name,
                source_type: item.material_source_type,
                source_config: item.material_source_config,
                validation_passed: item.source_validation_passed,
                validation_errors: item.source_validation_errors,
            })
            .collect();
        Ok(MaterialSources {
            computation_id,
            total: items.len(),
            items,
        })
    }

    /// 以當前主數據重新驗證各明細的物料來源（不寫回）
    pub async fn validate_material_sources(
        &self,
        tenant_id: TenantId,
        computation_id: RecordId,
    ) -> Result<SourceValidationReport> {
        let response = self.get_computation_by_id(tenant_id, computation_id, true).await?;
        let validator = SourceValidator::new(self.deps.materials.as_ref(), self.deps.boms.as_ref());

        let mut results = Vec::new();
        for item in &response.items {
            let Some(source_type) = item.material_source_type else {
                continue;
            };
            let validation = validator.validate(tenant_id, item.material_id, source_type).await?;
            results.push(ItemValidation {
                material_id: item.material_id,
                material_code: item.material_code.clone(),
                source_type,
                passed: validation.passed(),
                errors: validation.errors,
                warnings: validation.warnings,
            });
        }

        let passed_count = results.iter().filter(|r| r.passed).count();
        let failed_count = results.len() - passed_count;
        Ok(SourceValidationReport {
            computation_id,
            all_passed: failed_count == 0,
            passed_count,
            failed_count,
            results,
        })
    }
}

pub(crate) async fn load_computation<Tx: StoreTx>(
    tx: &mut Tx,
    tenant_id: TenantId,
    computation_id: RecordId,
) -> Result<DemandComputation> {
    tx.get_computation(tenant_id, computation_id)
        .await?
        .ok_or_else(|| MrpError::not_found(format!("需求计算不存在: {computation_id}")))
}

async fn load_response<Tx: StoreTx>(
    tx: &mut Tx,
    tenant_id: TenantId,
    computation_id: RecordId,
    include_items: bool,
) -> Result<ComputationResponse> {
    let computation = load_computation(tx, tenant_id, computation_id).await?;
    let items = if include_items {
        tx.list_items(tenant_id, computation_id).await?
    } else {
        Vec::new()
    };
    Ok(ComputationResponse { computation, items })
}

async fn load_consumable_demands<Tx: StoreTx>(
    tx: &mut Tx,
    tenant_id: TenantId,
    demand_ids: &[RecordId],
) -> Result<Vec<Demand>> {
    let mut demands = Vec::with_capacity(demand_ids.len());
    for &demand_id in demand_ids {
        let demand = tx
            .get_demand(tenant_id, demand_id)
            .await?
            .ok_or_else(|| MrpError::business(format!("需求不存在: {demand_id}")))?;
        if !demand.is_consumable() {
            return Err(MrpError::business(format!(
                "需求[{}]未审核通过，不能进行需求计算",
                demand.demand_code
            )));
        }
        if demand.pushed_to_computation {
            return Err(MrpError::business(format!(
                "需求[{}]已下推需求计算[{}]",
                demand.demand_code,
                demand.computation_code.as_deref().unwrap_or_default()
            )));
        }
        demands.push(demand);
    }
    Ok(demands)
}
