//! 外部協作者介面
//!
//! 主數據、庫存、業務配置與下游單據服務由其他領域維護，
//! 需求計算只透過這些 trait 讀取或下推，所有操作都顯式帶租戶。

use async_trait::async_trait;

use crate::downstream::{
    CreatedDocument, DocumentKind, OutsourceWorkOrderRequest, ProductionPlanRequest,
    PurchaseOrderRequest, PurchaseRequisitionRequest, SupplierRef, WorkOrderRequest,
};
use crate::inventory::InventoryInfo;
use crate::master::{Bom, Material, PolicyFlags};
use crate::{RecordId, Result, TenantId};

/// 物料主數據
#[async_trait]
pub trait MaterialCatalog: Send + Sync {
    async fn get_material(&self, tenant_id: TenantId, material_id: RecordId) -> Result<Option<Material>>;
}

/// BOM 主數據
#[async_trait]
pub trait BomSource: Send + Sync {
    /// 查找 BOM；`version` 為 `None` 時返回預設 BOM
    async fn find_bom(
        &self,
        tenant_id: TenantId,
        material_id: RecordId,
        version: Option<&str>,
        only_approved: bool,
    ) -> Result<Option<Bom>>;
}

/// 庫存服務
#[async_trait]
pub trait InventoryService: Send + Sync {
    async fn get_inventory(
        &self,
        tenant_id: TenantId,
        material_id: RecordId,
        warehouse_id: Option<RecordId>,
    ) -> Result<InventoryInfo>;
}

/// 租戶業務配置
#[async_trait]
pub trait BusinessPolicy: Send + Sync {
    async fn policy_flags(&self, tenant_id: TenantId) -> Result<PolicyFlags>;
}

/// 下游單據服務
///
/// 「是否已執行」的判定由各下游領域決定，需求計算只提問。
#[async_trait]
pub trait DownstreamDocuments: Send + Sync {
    async fn create_work_order(&self, tenant_id: TenantId, request: WorkOrderRequest) -> Result<CreatedDocument>;

    async fn create_outsource_work_order(
        &self,
        tenant_id: TenantId,
        request: OutsourceWorkOrderRequest,
    ) -> Result<CreatedDocument>;

    async fn create_purchase_order(&self, tenant_id: TenantId, request: PurchaseOrderRequest) -> Result<CreatedDocument>;

    async fn create_production_plan(
        &self,
        tenant_id: TenantId,
        request: ProductionPlanRequest,
    ) -> Result<CreatedDocument>;

    async fn create_purchase_requisition(
        &self,
        tenant_id: TenantId,
        request: PurchaseRequisitionRequest,
    ) -> Result<CreatedDocument>;

    /// 取得或創建佔位供應商（例如「待指定」）
    async fn ensure_placeholder_supplier(&self, tenant_id: TenantId, name: &str) -> Result<SupplierRef>;

    /// 單據是否存在（已軟刪除視為不存在）
    async fn document_exists(&self, tenant_id: TenantId, kind: DocumentKind, id: RecordId) -> Result<bool>;

    /// 單據是否已越過草稿/未執行階段
    async fn is_executed(&self, tenant_id: TenantId, kind: DocumentKind, id: RecordId) -> Result<bool>;

    /// 單據涵蓋的物料
    async fn covered_materials(&self, tenant_id: TenantId, kind: DocumentKind, id: RecordId) -> Result<Vec<RecordId>>;

    async fn delete_document(&self, tenant_id: TenantId, kind: DocumentKind, id: RecordId) -> Result<()>;
}
