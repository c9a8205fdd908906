//! 記憶體儲存
//!
//! 交易開始時複製整份狀態，寫入先作用於副本並記入寫入日誌。
//! 提交時逐列比對版本：只有本交易寫過、且在交易開始後被其他交易改過的列才算衝突；
//! 無衝突則把寫入日誌重放到共享狀態。回滾只需丟棄副本與日誌。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mrp_core::{
    ComputationConfig, ComputationFilter, ComputationStatus, Demand, DemandComputation,
    DemandComputationItem, DemandComputationSnapshot, DemandItem, DemandLink, DocumentRelation,
    MrpError, NewRelation, RecalcHistory, RecordId, RelationKey, Result, TenantId,
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{Store, StoreTx};

/// 衝突檢測的列鍵；明細、快照、重算歷史歸屬其計算
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RowKey {
    Demand(TenantId, RecordId),
    Computation(TenantId, RecordId),
    /// 以某單據為來源或目標的關聯
    Relations(TenantId, String, RecordId),
}

/// 交易內的一筆寫入
#[derive(Debug, Clone)]
enum Write {
    DemandLink {
        tenant_id: TenantId,
        demand_id: RecordId,
        link: DemandLink,
    },
    PutComputation(DemandComputation),
    DeleteComputation(TenantId, RecordId),
    InsertItems(TenantId, RecordId, Vec<DemandComputationItem>),
    DeleteItems(TenantId, RecordId),
    InsertSnapshot(DemandComputationSnapshot),
    DeleteSnapshots(TenantId, RecordId),
    InsertHistory(RecalcHistory),
    DeleteHistory(TenantId, RecordId),
    InsertRelation(DocumentRelation),
    DeleteRelationsTouching {
        tenant_id: TenantId,
        doc_type: String,
        doc_id: RecordId,
    },
}

impl Write {
    fn keys(&self) -> Vec<RowKey> {
        match self {
            Self::DemandLink {
                tenant_id, demand_id, ..
            } => vec![RowKey::Demand(*tenant_id, *demand_id)],
            Self::PutComputation(c) => vec![RowKey::Computation(c.tenant_id, c.id)],
            Self::DeleteComputation(tenant_id, id)
            | Self::InsertItems(tenant_id, id, _)
            | Self::DeleteItems(tenant_id, id)
            | Self::DeleteSnapshots(tenant_id, id)
            | Self::DeleteHistory(tenant_id, id) => vec![RowKey::Computation(*tenant_id, *id)],
            Self::InsertSnapshot(s) => vec![RowKey::Computation(s.tenant_id, s.computation_id)],
            Self::InsertHistory(h) => vec![RowKey::Computation(h.tenant_id, h.computation_id)],
            Self::InsertRelation(r) => vec![
                RowKey::Relations(r.tenant_id, r.source_type.clone(), r.source_id),
                RowKey::Relations(r.tenant_id, r.target_type.clone(), r.target_id),
            ],
            Self::DeleteRelationsTouching {
                tenant_id,
                doc_type,
                doc_id,
            } => vec![RowKey::Relations(*tenant_id, doc_type.clone(), *doc_id)],
        }
    }
}

/// 記憶體中的全部資料表
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryState {
    version: u64,
    row_versions: HashMap<RowKey, u64>,
    pub demands: Vec<Demand>,
    pub demand_items: Vec<DemandItem>,
    pub computations: Vec<DemandComputation>,
    pub items: Vec<DemandComputationItem>,
    pub snapshots: Vec<DemandComputationSnapshot>,
    pub recalc_history: Vec<RecalcHistory>,
    pub relations: Vec<DocumentRelation>,
    pub configs: Vec<ComputationConfig>,
    /// 計算參數配置表是否已建立
    pub config_table_present: bool,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            version: 0,
            row_versions: HashMap::new(),
            demands: Vec::new(),
            demand_items: Vec::new(),
            computations: Vec::new(),
            items: Vec::new(),
            snapshots: Vec::new(),
            recalc_history: Vec::new(),
            relations: Vec::new(),
            configs: Vec::new(),
            config_table_present: true,
        }
    }
}

impl MemoryState {
    pub fn version(&self) -> u64 {
        self.version
    }

    /// 標記列已在新版本中變更
    fn touch(&mut self, keys: impl IntoIterator<Item = RowKey>) {
        self.version += 1;
        let version = self.version;
        for key in keys {
            self.row_versions.insert(key, version);
        }
    }

    fn changed_since(&self, key: &RowKey, base_version: u64) -> bool {
        self.row_versions
            .get(key)
            .is_some_and(|&version| version > base_version)
    }

    fn apply(&mut self, write: &Write) -> Result<()> {
        match write {
            Write::DemandLink {
                tenant_id,
                demand_id,
                link,
            } => {
                if let Some(demand) = self
                    .demands
                    .iter_mut()
                    .find(|d| d.tenant_id == *tenant_id && d.id == *demand_id)
                {
                    demand.pushed_to_computation = link.pushed_to_computation;
                    demand.computation_id = link.computation_id;
                    demand.computation_code = link.computation_code.clone();
                }
            }
            Write::PutComputation(computation) => {
                match self
                    .computations
                    .iter_mut()
                    .find(|c| c.tenant_id == computation.tenant_id && c.id == computation.id)
                {
                    Some(existing) => *existing = computation.clone(),
                    None => self.computations.push(computation.clone()),
                }
            }
            Write::DeleteComputation(tenant_id, id) => {
                self.computations
                    .retain(|c| !(c.tenant_id == *tenant_id && c.id == *id));
            }
            Write::InsertItems(_, _, items) => self.items.extend(items.iter().cloned()),
            Write::DeleteItems(tenant_id, computation_id) => {
                self.items
                    .retain(|i| !(i.tenant_id == *tenant_id && i.computation_id == *computation_id));
            }
            Write::InsertSnapshot(snapshot) => self.snapshots.push(snapshot.clone()),
            Write::DeleteSnapshots(tenant_id, computation_id) => {
                self.snapshots
                    .retain(|s| !(s.tenant_id == *tenant_id && s.computation_id == *computation_id));
            }
            Write::InsertHistory(history) => self.recalc_history.push(history.clone()),
            Write::DeleteHistory(tenant_id, computation_id) => {
                self.recalc_history
                    .retain(|h| !(h.tenant_id == *tenant_id && h.computation_id == *computation_id));
            }
            Write::InsertRelation(relation) => {
                let key = relation.key();
                if self
                    .relations
                    .iter()
                    .any(|r| r.tenant_id == relation.tenant_id && r.key() == key)
                {
                    return Err(MrpError::conflict("关联关系已存在"));
                }
                self.relations.push(relation.clone());
            }
            Write::DeleteRelationsTouching {
                tenant_id,
                doc_type,
                doc_id,
            } => {
                self.relations
                    .retain(|r| !(r.tenant_id == *tenant_id && r.touches(doc_type, *doc_id)));
            }
        }
        Ok(())
    }
}

/// 記憶體儲存
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    /// 跨交易共用的 ID 序列；回滾留下空號
    ids: Arc<AtomicI64>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            ids: Arc::new(AtomicI64::new(1)),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 寫入需求及其明細
    pub async fn seed_demand(&self, demand: Demand, items: Vec<DemandItem>) {
        let mut state = self.state.lock().await;
        let next = items.iter().map(|i| i.id + 1).max().unwrap_or(0).max(demand.id + 1);
        self.ids.fetch_max(next, Ordering::SeqCst);
        let key = RowKey::Demand(demand.tenant_id, demand.id);
        state.demands.retain(|d| !(d.tenant_id == demand.tenant_id && d.id == demand.id));
        state.demands.push(demand);
        state.demand_items.extend(items);
        state.touch([key]);
    }

    /// 寫入計算參數配置
    pub async fn seed_config(&self, config: ComputationConfig) {
        let mut state = self.state.lock().await;
        self.ids.fetch_max(config.id + 1, Ordering::SeqCst);
        state.configs.push(config);
        state.touch([]);
    }

    pub async fn set_config_table_present(&self, present: bool) {
        let mut state = self.state.lock().await;
        state.config_table_present = present;
        state.touch([]);
    }

    /// 當前狀態副本
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx> {
        let state = self.state.lock().await.clone();
        Ok(MemoryTx {
            shared: Arc::clone(&self.state),
            ids: Arc::clone(&self.ids),
            base_version: state.version,
            state,
            writes: Vec::new(),
        })
    }

    async fn record_failure(
        &self,
        tenant_id: TenantId,
        computation_id: RecordId,
        message: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(computation) = state
            .computations
            .iter_mut()
            .find(|c| c.tenant_id == tenant_id && c.id == computation_id)
        else {
            warn!(computation_id, "記錄失敗時找不到計算");
            return Ok(());
        };
        if computation.computation_status == ComputationStatus::Completed {
            warn!(computation_id, "計算已完成，不覆寫為失敗");
            return Ok(());
        }
        computation.computation_status = ComputationStatus::Failed;
        computation.error_message = Some(message.to_string());
        computation.computation_end_time = Some(at);
        computation.updated_at = at;
        state.touch([RowKey::Computation(tenant_id, computation_id)]);
        Ok(())
    }

    async fn computation_codes(&self, tenant_id: TenantId, prefix: &str) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        Ok(state
            .computations
            .iter()
            .filter(|c| c.tenant_id == tenant_id && c.computation_code.starts_with(prefix))
            .map(|c| c.computation_code.clone())
            .collect())
    }

    async fn load_computation_configs(
        &self,
        tenant_id: TenantId,
        material_id: Option<RecordId>,
        warehouse_id: Option<RecordId>,
    ) -> Result<Vec<ComputationConfig>> {
        let state = self.state.lock().await;
        if !state.config_table_present {
            warn!(tenant_id, "計算參數配置表不存在，使用空配置");
            return Ok(Vec::new());
        }
        Ok(state
            .configs
            .iter()
            .filter(|c| c.tenant_id == tenant_id && c.applies_to(material_id, warehouse_id))
            .cloned()
            .collect())
    }
}

/// 記憶體交易
#[derive(Debug)]
pub struct MemoryTx {
    shared: Arc<Mutex<MemoryState>>,
    ids: Arc<AtomicI64>,
    base_version: u64,
    state: MemoryState,
    writes: Vec<Write>,
}

impl MemoryTx {
    fn allocate_id(&self) -> RecordId {
        self.ids.fetch_add(1, Ordering::SeqCst)
    }

    fn write(&mut self, write: Write) -> Result<()> {
        self.state.apply(&write)?;
        self.writes.push(write);
        Ok(())
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn get_demand(&mut self, tenant_id: TenantId, demand_id: RecordId) -> Result<Option<Demand>> {
        Ok(self
            .state
            .demands
            .iter()
            .find(|d| d.tenant_id == tenant_id && d.id == demand_id)
            .cloned())
    }

    async fn list_demand_items(&mut self, tenant_id: TenantId, demand_id: RecordId) -> Result<Vec<DemandItem>> {
        Ok(self
            .state
            .demand_items
            .iter()
            .filter(|i| i.tenant_id == tenant_id && i.demand_id == demand_id)
            .cloned()
            .collect())
    }

    async fn update_demand_link(&mut self, tenant_id: TenantId, demand_id: RecordId, link: &DemandLink) -> Result<()> {
        self.write(Write::DemandLink {
            tenant_id,
            demand_id,
            link: link.clone(),
        })
    }

    async fn insert_computation(&mut self, mut computation: DemandComputation) -> Result<DemandComputation> {
        computation.id = self.allocate_id();
        self.write(Write::PutComputation(computation.clone()))?;
        Ok(computation)
    }

    async fn get_computation(&mut self, tenant_id: TenantId, id: RecordId) -> Result<Option<DemandComputation>> {
        Ok(self
            .state
            .computations
            .iter()
            .find(|c| c.tenant_id == tenant_id && c.id == id)
            .cloned())
    }

    async fn claim_computation(
        &mut self,
        tenant_id: TenantId,
        id: RecordId,
        started: DateTime<Utc>,
    ) -> Result<Option<DemandComputation>> {
        let Some(mut computation) = self.get_computation(tenant_id, id).await? else {
            return Ok(None);
        };
        if !computation.computation_status.can_execute() {
            return Ok(None);
        }
        computation.mark_computing(started);
        self.write(Write::PutComputation(computation.clone()))?;
        Ok(Some(computation))
    }

    async fn update_computation(&mut self, computation: &DemandComputation) -> Result<()> {
        if self
            .get_computation(computation.tenant_id, computation.id)
            .await?
            .is_none()
        {
            return Err(MrpError::not_found(format!("需求计算不存在: {}", computation.id)));
        }
        self.write(Write::PutComputation(computation.clone()))
    }

    async fn delete_computation(&mut self, tenant_id: TenantId, id: RecordId) -> Result<()> {
        self.write(Write::DeleteComputation(tenant_id, id))
    }

    async fn list_computations(
        &mut self,
        tenant_id: TenantId,
        filter: &ComputationFilter,
        skip: u64,
        limit: u64,
    ) -> Result<(Vec<DemandComputation>, u64)> {
        let mut matched: Vec<&DemandComputation> = self
            .state
            .computations
            .iter()
            .filter(|c| c.tenant_id == tenant_id && filter.matches(c))
            .collect();
        matched.sort_by(|a, b| {
            b.computation_start_time
                .cmp(&a.computation_start_time)
                .then(b.id.cmp(&a.id))
        });
        let total = matched.len() as u64;
        let page = matched
            .into_iter()
            .skip(skip as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn insert_items(
        &mut self,
        tenant_id: TenantId,
        computation_id: RecordId,
        items: Vec<DemandComputationItem>,
    ) -> Result<Vec<DemandComputationItem>> {
        let inserted: Vec<DemandComputationItem> = items
            .into_iter()
            .map(|mut item| {
                item.id = self.allocate_id();
                item.tenant_id = tenant_id;
                item.computation_id = computation_id;
                item
            })
            .collect();
        self.write(Write::InsertItems(tenant_id, computation_id, inserted.clone()))?;
        debug!(computation_id, count = inserted.len(), "寫入計算明細");
        Ok(inserted)
    }

    async fn list_items(&mut self, tenant_id: TenantId, computation_id: RecordId) -> Result<Vec<DemandComputationItem>> {
        Ok(self
            .state
            .items
            .iter()
            .filter(|i| i.tenant_id == tenant_id && i.computation_id == computation_id)
            .cloned()
            .collect())
    }

    async fn delete_items(&mut self, tenant_id: TenantId, computation_id: RecordId) -> Result<u64> {
        let before = self.state.items.len();
        self.write(Write::DeleteItems(tenant_id, computation_id))?;
        Ok((before - self.state.items.len()) as u64)
    }

    async fn insert_snapshot(&mut self, mut snapshot: DemandComputationSnapshot) -> Result<DemandComputationSnapshot> {
        snapshot.id = self.allocate_id();
        self.write(Write::InsertSnapshot(snapshot.clone()))?;
        Ok(snapshot)
    }

    async fn list_snapshots(
        &mut self,
        tenant_id: TenantId,
        computation_id: RecordId,
        limit: u64,
    ) -> Result<Vec<DemandComputationSnapshot>> {
        let mut snapshots: Vec<DemandComputationSnapshot> = self
            .state
            .snapshots
            .iter()
            .filter(|s| s.tenant_id == tenant_id && s.computation_id == computation_id)
            .cloned()
            .collect();
        snapshots.sort_by(|a, b| b.snapshot_time.cmp(&a.snapshot_time).then(b.id.cmp(&a.id)));
        snapshots.truncate(limit as usize);
        Ok(snapshots)
    }

    async fn delete_snapshots(&mut self, tenant_id: TenantId, computation_id: RecordId) -> Result<u64> {
        let before = self.state.snapshots.len();
        self.write(Write::DeleteSnapshots(tenant_id, computation_id))?;
        Ok((before - self.state.snapshots.len()) as u64)
    }

    async fn insert_recalc_history(&mut self, mut history: RecalcHistory) -> Result<RecalcHistory> {
        history.id = self.allocate_id();
        self.write(Write::InsertHistory(history.clone()))?;
        Ok(history)
    }

    async fn list_recalc_history(
        &mut self,
        tenant_id: TenantId,
        computation_id: RecordId,
        limit: u64,
    ) -> Result<Vec<RecalcHistory>> {
        let mut history: Vec<RecalcHistory> = self
            .state
            .recalc_history
            .iter()
            .filter(|h| h.tenant_id == tenant_id && h.computation_id == computation_id)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.recalc_time.cmp(&a.recalc_time).then(b.id.cmp(&a.id)));
        history.truncate(limit as usize);
        Ok(history)
    }

    async fn delete_recalc_history(&mut self, tenant_id: TenantId, computation_id: RecordId) -> Result<u64> {
        let before = self.state.recalc_history.len();
        self.write(Write::DeleteHistory(tenant_id, computation_id))?;
        Ok((before - self.state.recalc_history.len()) as u64)
    }

    async fn find_relation(&mut self, tenant_id: TenantId, key: &RelationKey) -> Result<Option<DocumentRelation>> {
        Ok(self
            .state
            .relations
            .iter()
            .find(|r| r.tenant_id == tenant_id && r.key() == *key)
            .cloned())
    }

    async fn insert_relation(&mut self, tenant_id: TenantId, relation: NewRelation) -> Result<DocumentRelation> {
        if self.find_relation(tenant_id, &relation.key()).await?.is_some() {
            return Err(MrpError::conflict("关联关系已存在"));
        }
        let relation = relation.into_relation(self.allocate_id(), tenant_id, Utc::now());
        self.write(Write::InsertRelation(relation.clone()))?;
        Ok(relation)
    }

    async fn outgoing_relations(
        &mut self,
        tenant_id: TenantId,
        source_type: &str,
        source_id: RecordId,
    ) -> Result<Vec<DocumentRelation>> {
        Ok(self
            .state
            .relations
            .iter()
            .filter(|r| r.tenant_id == tenant_id && r.source_type == source_type && r.source_id == source_id)
            .cloned()
            .collect())
    }

    async fn incoming_relations(
        &mut self,
        tenant_id: TenantId,
        target_type: &str,
        target_id: RecordId,
    ) -> Result<Vec<DocumentRelation>> {
        Ok(self
            .state
            .relations
            .iter()
            .filter(|r| r.tenant_id == tenant_id && r.target_type == target_type && r.target_id == target_id)
            .cloned()
            .collect())
    }

    async fn delete_relations_touching(&mut self, tenant_id: TenantId, doc_type: &str, doc_id: RecordId) -> Result<u64> {
        let before = self.state.relations.len();
        self.write(Write::DeleteRelationsTouching {
            tenant_id,
            doc_type: doc_type.to_string(),
            doc_id,
        })?;
        Ok((before - self.state.relations.len()) as u64)
    }

    async fn commit(self) -> Result<()> {
        if self.writes.is_empty() {
            return Ok(());
        }
        let touched: HashSet<RowKey> = self.writes.iter().flat_map(Write::keys).collect();

        let mut shared = self.shared.lock().await;
        if let Some(key) = touched
            .iter()
            .find(|key| shared.changed_since(key, self.base_version))
        {
            debug!(?key, "提交衝突");
            return Err(MrpError::conflict("資料已被其他交易修改"));
        }

        let mut next = shared.clone();
        for write in &self.writes {
            next.apply(write)?;
        }
        next.touch(touched);
        *shared = next;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
