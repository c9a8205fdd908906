//! # MRP Store
//!
//! 需求計算自有資料表的持久化：計算、明細、快照、重算歷史、單據關聯。
//!
//! 存取分為兩種控制代碼：
//! - [`StoreTx`]：主交易，所有業務寫入都在其中進行；
//! - [`Store`] 本身：環境連線池，只用於失敗記錄與配置查詢，
//!   不會重用已中止的主交易連線。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mrp_core::{
    ComputationConfig, ComputationFilter, Demand, DemandComputation, DemandComputationItem,
    DemandComputationSnapshot, DemandItem, DemandLink, DocumentRelation, NewRelation,
    RecalcHistory, RecordId, RelationKey, Result, TenantId,
};
use tracing::warn;

pub mod memory;
pub mod postgres;
mod rows;

pub use memory::{MemoryState, MemoryStore, MemoryTx};
pub use postgres::{PgStore, PgTx};

/// 儲存層（環境連線池）
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    type Tx: StoreTx;

    /// 開啟主交易
    async fn begin(&self) -> Result<Self::Tx>;

    /// 以獨立連線記錄計算失敗（狀態失败 + 錯誤訊息）；已完成的計算不覆寫
    async fn record_failure(
        &self,
        tenant_id: TenantId,
        computation_id: RecordId,
        message: &str,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// 以獨立連線列出以 `prefix` 開頭的計算編碼，供生成序號
    async fn computation_codes(&self, tenant_id: TenantId, prefix: &str) -> Result<Vec<String>>;

    /// 以獨立連線讀取計算參數配置；資料表不存在時返回空列表
    async fn load_computation_configs(
        &self,
        tenant_id: TenantId,
        material_id: Option<RecordId>,
        warehouse_id: Option<RecordId>,
    ) -> Result<Vec<ComputationConfig>>;
}

/// 主交易；所有操作顯式帶租戶
#[async_trait]
pub trait StoreTx: Send {
    // 需求
    async fn get_demand(&mut self, tenant_id: TenantId, demand_id: RecordId) -> Result<Option<Demand>>;
    async fn list_demand_items(&mut self, tenant_id: TenantId, demand_id: RecordId) -> Result<Vec<DemandItem>>;
    async fn update_demand_link(&mut self, tenant_id: TenantId, demand_id: RecordId, link: &DemandLink) -> Result<()>;

    // 計算
    /// 寫入計算，返回分配 ID 後的記錄
    async fn insert_computation(&mut self, computation: DemandComputation) -> Result<DemandComputation>;
    async fn get_computation(&mut self, tenant_id: TenantId, id: RecordId) -> Result<Option<DemandComputation>>;
    /// 原子地把进行中或失败的計算轉為计算中；不可執行時返回 `None`
    async fn claim_computation(
        &mut self,
        tenant_id: TenantId,
        id: RecordId,
        started: DateTime<Utc>,
    ) -> Result<Option<DemandComputation>>;
    async fn update_computation(&mut self, computation: &DemandComputation) -> Result<()>;
    async fn delete_computation(&mut self, tenant_id: TenantId, id: RecordId) -> Result<()>;
    /// 按開始時間倒序分頁，返回 `(資料, 總數)`
    async fn list_computations(
        &mut self,
        tenant_id: TenantId,
        filter: &ComputationFilter,
        skip: u64,
        limit: u64,
    ) -> Result<(Vec<DemandComputation>, u64)>;

    // 明細
    async fn insert_items(
        &mut self,
        tenant_id: TenantId,
        computation_id: RecordId,
        items: Vec<DemandComputationItem>,
    ) -> Result<Vec<DemandComputationItem>>;
    async fn list_items(&mut self, tenant_id: TenantId, computation_id: RecordId) -> Result<Vec<DemandComputationItem>>;
    async fn delete_items(&mut self, tenant_id: TenantId, computation_id: RecordId) -> Result<u64>;

    // 快照與重算歷史（新到舊）
    async fn insert_snapshot(&mut self, snapshot: DemandComputationSnapshot) -> Result<DemandComputationSnapshot>;
    async fn list_snapshots(
        &mut self,
        tenant_id: TenantId,
        computation_id: RecordId,
        limit: u64,
    ) -> Result<Vec<DemandComputationSnapshot>>;
    async fn delete_snapshots(&mut self, tenant_id: TenantId, computation_id: RecordId) -> Result<u64>;
    async fn insert_recalc_history(&mut self, history: RecalcHistory) -> Result<RecalcHistory>;
    async fn list_recalc_history(
        &mut self,
        tenant_id: TenantId,
        computation_id: RecordId,
        limit: u64,
    ) -> Result<Vec<RecalcHistory>>;
    async fn delete_recalc_history(&mut self, tenant_id: TenantId, computation_id: RecordId) -> Result<u64>;

    // 單據關聯
    async fn find_relation(&mut self, tenant_id: TenantId, key: &RelationKey) -> Result<Option<DocumentRelation>>;
    async fn insert_relation(&mut self, tenant_id: TenantId, relation: NewRelation) -> Result<DocumentRelation>;
    async fn outgoing_relations(
        &mut self,
        tenant_id: TenantId,
        source_type: &str,
        source_id: RecordId,
    ) -> Result<Vec<DocumentRelation>>;
    async fn incoming_relations(
        &mut self,
        tenant_id: TenantId,
        target_type: &str,
        target_id: RecordId,
    ) -> Result<Vec<DocumentRelation>>;
    /// 刪除以該單據為來源或目標的全部關聯
    async fn delete_relations_touching(&mut self, tenant_id: TenantId, doc_type: &str, doc_id: RecordId) -> Result<u64>;

    async fn commit(self) -> Result<()>;
    async fn rollback(self) -> Result<()>;
}

/// 交易結果：提交，或回滾但仍攜帶結果（預覽）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome<T> {
    Commit(T),
    RollbackWith(T),
}

/// 依結果結束交易
///
/// 錯誤時回滾並原樣返回錯誤；回滾本身失敗只記錄警告。
pub async fn settle<Tx, T>(tx: Tx, result: Result<TxOutcome<T>>) -> Result<T>
where
    Tx: StoreTx,
{
    match result {
        Ok(TxOutcome::Commit(value)) => {
            tx.commit().await?;
            Ok(value)
        }
        Ok(TxOutcome::RollbackWith(value)) => {
            tx.rollback().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "交易回滾失敗");
            }
            Err(err)
        }
    }
}

/// 截斷錯誤訊息（按字元）
pub fn truncate_message(message: &str, limit: usize) -> String {
    message.chars().take(limit).collect()
}
