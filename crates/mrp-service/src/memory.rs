//! 記憶體協作者
//!
//! 主數據、庫存、業務配置與下游單據的記憶體實作，供示範與測試使用。

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use mrp_core::{
    Bom, BomSource, BusinessPolicy, CreatedDocument, DocumentKind, DownstreamDocuments,
    InventoryInfo, InventoryService, Material, MaterialCatalog, MrpError,
    OutsourceWorkOrderRequest, PolicyFlags, ProductionMode, ProductionPlanRequest,
    PurchaseOrderRequest, PurchaseRequisitionRequest, RecordId, Result, SupplierRef, TenantId,
    WorkOrderRequest,
};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::debug;

/// 記憶體主數據（物料 + BOM）
#[derive(Debug, Clone, Default)]
pub struct InMemoryMasterData {
    materials: HashMap<(TenantId, RecordId), Material>,
    boms: HashMap<(TenantId, RecordId), Vec<Bom>>,
}

impl InMemoryMasterData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_material(mut self, tenant_id: TenantId, material: Material) -> Self {
        self.materials.insert((tenant_id, material.id), material);
        self
    }

    pub fn with_bom(mut self, tenant_id: TenantId, bom: Bom) -> Self {
        self.boms
            .entry((tenant_id, bom.material_id))
            .or_default()
            .push(bom);
        self
    }
}

#[async_trait]
impl MaterialCatalog for InMemoryMasterData {
    async fn get_material(&self, tenant_id: TenantId, material_id: RecordId) -> Result<Option<Material>> {
        Ok(self.materials.get(&(tenant_id, material_id)).cloned())
    }
}

#[async_trait]
impl BomSource for InMemoryMasterData {
    async fn find_bom(
        &self,
        tenant_id: TenantId,
        material_id: RecordId,
        version: Option<&str>,
        only_approved: bool,
    ) -> Result<Option<Bom>> {
        let Some(boms) = self.boms.get(&(tenant_id, material_id)) else {
            return Ok(None);
        };
        let mut candidates = boms.iter().filter(|b| b.approved || !only_approved);
        let found = match version {
            Some(version) => candidates.find(|b| b.version == version),
            None => {
                let candidates: Vec<&Bom> = candidates.collect();
                candidates
                    .iter()
                    .find(|b| b.is_default)
                    .or_else(|| candidates.first())
                    .copied()
            }
        };
        Ok(found.cloned())
    }
}

/// 記憶體庫存；未登記的物料庫存全部缺值
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventory {
    stock: HashMap<(TenantId, RecordId), InventoryInfo>,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stock(mut self, tenant_id: TenantId, material_id: RecordId, info: InventoryInfo) -> Self {
        self.stock.insert((tenant_id, material_id), info);
        self
    }
}

#[async_trait]
impl InventoryService for InMemoryInventory {
    async fn get_inventory(
        &self,
        tenant_id: TenantId,
        material_id: RecordId,
        _warehouse_id: Option<RecordId>,
    ) -> Result<InventoryInfo> {
        Ok(self
            .stock
            .get(&(tenant_id, material_id))
            .cloned()
            .unwrap_or_default())
    }
}

/// 固定的業務配置
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticPolicy(pub PolicyFlags);

#[async_trait]
impl BusinessPolicy for StaticPolicy {
    async fn policy_flags(&self, _tenant_id: TenantId) -> Result<PolicyFlags> {
        Ok(self.0)
    }
}

/// 記憶體中的下游單據
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    pub tenant_id: TenantId,
    pub document: CreatedDocument,
    pub status: String,
    pub deleted: bool,
    pub supplier: Option<SupplierRef>,
    pub production_mode: Option<ProductionMode>,
    pub sales_order_id: Option<RecordId>,
    pub quantity: Decimal,
}

impl DocumentRecord {
    /// 草稿與待處理視為未執行
    pub fn is_executed(&self) -> bool {
        !matches!(self.status.as_str(), "draft" | "草稿" | "pending")
    }
}

#[derive(Debug, Default)]
struct DownstreamState {
    next_id: RecordId,
    documents: BTreeMap<(DocumentKind, RecordId), DocumentRecord>,
    suppliers: Vec<SupplierRef>,
    /// 拒絕刪除的單據類型
    undeletable: BTreeSet<DocumentKind>,
}

/// 記憶體下游單據服務
#[derive(Debug, Default)]
pub struct InMemoryDownstream {
    state: Mutex<DownstreamState>,
}

fn code_prefix(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::WorkOrder => "WO",
        DocumentKind::OutsourceWorkOrder => "OWO",
        DocumentKind::PurchaseOrder => "PO",
        DocumentKind::PurchaseRequisition => "PR",
        DocumentKind::ProductionPlan => "PP",
    }
}

struct Draft {
    kind: DocumentKind,
    name: Option<String>,
    allow_draft: bool,
    material_ids: Vec<RecordId>,
    supplier: Option<SupplierRef>,
    production_mode: Option<ProductionMode>,
    sales_order_id: Option<RecordId>,
    quantity: Decimal,
}

impl InMemoryDownstream {
    pub fn new() -> Self {
        Self::default()
    }

    async fn store(&self, tenant_id: TenantId, draft: Draft) -> Result<CreatedDocument> {
        if draft.quantity <= Decimal::ZERO {
            return Err(MrpError::validation("数量必须大于0"));
        }
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = state.next_id;
        let document = CreatedDocument {
            kind: draft.kind,
            id,
            code: format!("{}-{id:04}", code_prefix(draft.kind)),
            name: draft.name,
            status: if draft.allow_draft { "draft" } else { "pending" }.to_string(),
            material_ids: draft.material_ids,
        };
        state.documents.insert(
            (draft.kind, id),
            DocumentRecord {
                tenant_id,
                document: document.clone(),
                status: document.status.clone(),
                deleted: false,
                supplier: draft.supplier,
                production_mode: draft.production_mode,
                sales_order_id: draft.sales_order_id,
                quantity: draft.quantity,
            },
        );
        debug!(kind = draft.kind.as_str(), id, "創建下游單據");
        Ok(document)
    }

    /// 未刪除的指定類型單據
    pub async fn documents(&self, kind: DocumentKind) -> Vec<DocumentRecord> {
        let state = self.state.lock().await;
        state
            .documents
            .iter()
            .filter(|((k, _), record)| *k == kind && !record.deleted)
            .map(|(_, record)| record.clone())
            .collect()
    }

    /// 修改單據狀態（模擬下游執行）
    pub async fn set_status(&self, kind: DocumentKind, id: RecordId, status: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let record = state
            .documents
            .get_mut(&(kind, id))
            .ok_or_else(|| MrpError::not_found(format!("{}不存在: {id}", kind.label())))?;
        record.status = status.to_string();
        Ok(())
    }

    /// 之後刪除該類型單據一律失敗（模擬下游服務拒絕）
    pub async fn reject_deletes(&self, kind: DocumentKind) {
        self.state.lock().await.undeletable.insert(kind);
    }

    pub async fn suppliers(&self) -> Vec<SupplierRef> {
        self.state.lock().await.suppliers.clone()
    }

    async fn find(&self, tenant_id: TenantId, kind: DocumentKind, id: RecordId) -> Option<DocumentRecord> {
        let state = self.state.lock().await;
        state
            .documents
            .get(&(kind, id))
            .filter(|record| record.tenant_id == tenant_id && !record.deleted)
            .cloned()
    }
}

#[async_trait]
impl DownstreamDocuments for InMemoryDownstream {
    async fn create_work_order(&self, tenant_id: TenantId, request: WorkOrderRequest) -> Result<CreatedDocument> {
        self.store(
            tenant_id,
            Draft {
                kind: DocumentKind::WorkOrder,
                name: Some(request.material_name.clone()),
                allow_draft: request.origin.allow_draft,
                material_ids: vec![request.material_id],
                supplier: None,
                production_mode: Some(request.production_mode),
                sales_order_id: request.sales_order_id,
                quantity: request.quantity,
            },
        )
        .await
    }

    async fn create_outsource_work_order(
        &self,
        tenant_id: TenantId,
        request: OutsourceWorkOrderRequest,
    ) -> Result<CreatedDocument> {
        self.store(
            tenant_id,
            Draft {
                kind: DocumentKind::OutsourceWorkOrder,
                name: Some(request.material_name.clone()),
                allow_draft: request.origin.allow_draft,
                material_ids: vec![request.material_id],
                supplier: Some(request.supplier),
                production_mode: None,
                sales_order_id: None,
                quantity: request.quantity,
            },
        )
        .await
    }

    async fn create_purchase_order(&self, tenant_id: TenantId, request: PurchaseOrderRequest) -> Result<CreatedDocument> {
        self.store(
            tenant_id,
            Draft {
                kind: DocumentKind::PurchaseOrder,
                name: request.supplier.name.clone(),
                allow_draft: request.origin.allow_draft,
                material_ids: request.lines.iter().map(|l| l.material_id).collect(),
                supplier: Some(request.supplier),
                production_mode: None,
                sales_order_id: None,
                quantity: request.lines.iter().map(|l| l.quantity).sum(),
            },
        )
        .await
    }

    async fn create_production_plan(
        &self,
        tenant_id: TenantId,
        request: ProductionPlanRequest,
    ) -> Result<CreatedDocument> {
        self.store(
            tenant_id,
            Draft {
                kind: DocumentKind::ProductionPlan,
                name: Some(format!("{}生产计划", request.plan_type)),
                allow_draft: request.origin.allow_draft,
                material_ids: request.lines.iter().map(|l| l.material_id).collect(),
                supplier: None,
                production_mode: None,
                sales_order_id: None,
                quantity: request.lines.iter().map(|l| l.quantity).sum(),
            },
        )
        .await
    }

    async fn create_purchase_requisition(
        &self,
        tenant_id: TenantId,
        request: PurchaseRequisitionRequest,
    ) -> Result<CreatedDocument> {
        self.store(
            tenant_id,
            Draft {
                kind: DocumentKind::PurchaseRequisition,
                name: Some(format!("{}采购申请", request.origin.computation_code)),
                allow_draft: request.origin.allow_draft,
                material_ids: request.lines.iter().map(|l| l.material_id).collect(),
                supplier: None,
                production_mode: None,
                sales_order_id: None,
                quantity: request.lines.iter().map(|l| l.quantity).sum(),
            },
        )
        .await
    }

    async fn ensure_placeholder_supplier(&self, _tenant_id: TenantId, name: &str) -> Result<SupplierRef> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.suppliers.iter().find(|s| s.name.as_deref() == Some(name)) {
            return Ok(existing.clone());
        }
        state.next_id += 1;
        let supplier = SupplierRef::new(state.next_id, Some(name.to_string()));
        state.suppliers.push(supplier.clone());
        Ok(supplier)
    }

    async fn document_exists(&self, tenant_id: TenantId, kind: DocumentKind, id: RecordId) -> Result<bool> {
        Ok(self.find(tenant_id, kind, id).await.is_some())
    }

    async fn is_executed(&self, tenant_id: TenantId, kind: DocumentKind, id: RecordId) -> Result<bool> {
        Ok(self
            .find(tenant_id, kind, id)
            .await
            .is_some_and(|record| record.is_executed()))
    }

    async fn covered_materials(&self, tenant_id: TenantId, kind: DocumentKind, id: RecordId) -> Result<Vec<RecordId>> {
        Ok(self
            .find(tenant_id, kind, id)
            .await
            .map(|record| record.document.material_ids)
            .unwrap_or_default())
    }

    async fn delete_document(&self, tenant_id: TenantId, kind: DocumentKind, id: RecordId) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.undeletable.contains(&kind) {
            return Err(MrpError::business(format!("{}不允许删除: {id}", kind.label())));
        }
        match state.documents.get_mut(&(kind, id)) {
            Some(record) if record.tenant_id == tenant_id => {
                record.deleted = true;
                Ok(())
            }
            _ => Err(MrpError::not_found(format!("{}不存在: {id}", kind.label()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mrp_core::{BomLine, DocumentOrigin};

    fn origin(allow_draft: bool) -> DocumentOrigin {
        DocumentOrigin {
            computation_id: 1,
            computation_code: "MRP-20251016-0001".to_string(),
            created_by: None,
            allow_draft,
        }
    }

    fn bom(id: RecordId, version: &str, approved: bool, is_default: bool) -> Bom {
        Bom {
            id,
            material_id: 1,
            bom_code: format!("BOM-{id}"),
            version: version.to_string(),
            approved,
            is_default,
            lines: vec![BomLine::new(2, Decimal::ONE)],
        }
    }

    #[tokio::test]
    async fn test_bom_lookup_prefers_default_and_respects_approval() {
        let master = InMemoryMasterData::new()
            .with_bom(1, bom(10, "V1", true, false))
            .with_bom(1, bom(11, "V2", true, true))
            .with_bom(1, bom(12, "V3", false, false));

        let default = master.find_bom(1, 1, None, true).await.unwrap().unwrap();
        assert_eq!(default.id, 11);

        assert!(master.find_bom(1, 1, Some("V3"), true).await.unwrap().is_none());
        assert_eq!(master.find_bom(1, 1, Some("V3"), false).await.unwrap().unwrap().id, 12);
        assert!(master.find_bom(2, 1, None, true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_draft_documents_are_not_executed() {
        let downstream = InMemoryDownstream::new();
        let request = PurchaseRequisitionRequest {
            origin: origin(true),
            lines: vec![mrp_core::DocumentLine {
                material_id: 5,
                material_code: "M-5".to_string(),
                material_name: "螺丝".to_string(),
                material_unit: None,
                quantity: Decimal::from(3),
                unit_price: None,
                start_date: None,
                required_date: None,
            }],
        };
        let doc = downstream.create_purchase_requisition(1, request).await.unwrap();

        assert!(downstream.document_exists(1, doc.kind, doc.id).await.unwrap());
        assert!(!downstream.is_executed(1, doc.kind, doc.id).await.unwrap());

        downstream.set_status(doc.kind, doc.id, "approved").await.unwrap();
        assert!(downstream.is_executed(1, doc.kind, doc.id).await.unwrap());

        downstream.delete_document(1, doc.kind, doc.id).await.unwrap();
        assert!(!downstream.document_exists(1, doc.kind, doc.id).await.unwrap());
        assert!(downstream.covered_materials(1, doc.kind, doc.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_placeholder_supplier_is_reused() {
        let downstream = InMemoryDownstream::new();
        let first = downstream.ensure_placeholder_supplier(1, "待指定").await.unwrap();
        let second = downstream.ensure_placeholder_supplier(1, "待指定").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(downstream.suppliers().await.len(), 1);
    }
}
