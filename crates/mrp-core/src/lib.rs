//! # MRP Core
//!
//! 統一需求計算的核心資料模型、協作者介面與錯誤類型

pub mod computation;
pub mod config;
pub mod decimal;
pub mod demand;
pub mod downstream;
pub mod inventory;
pub mod master;
pub mod ports;
pub mod relation;
pub mod snapshot;
pub mod source;

// Re-export 主要類型
pub use computation::{
    ComputationFilter, ComputationPage, ComputationResponse, ComputationStatus,
    ComputationSummary, ComputationType, ComputationUpdate, DemandComputation,
    DemandComputationItem, ItemProjection, NewComputation,
};
pub use config::{ComputationConfig, ComputationParams, ConfigScope};
pub use demand::{BusinessMode, Demand, DemandItem, DemandLink, DemandStatus, ReviewStatus};
pub use downstream::{
    CreatedDocument, DocumentKind, DocumentLine, DocumentOrigin, OutsourceWorkOrderRequest,
    ProductionMode, ProductionPlanRequest, PurchaseOrderRequest, PurchaseRequisitionRequest,
    SupplierRef, WorkOrderRequest,
};
pub use inventory::{InventoryInfo, StockPosition};
pub use master::{Bom, BomLine, InventoryDefaults, Material, MaterialDefaults, PolicyFlags};
pub use ports::{BomSource, BusinessPolicy, DownstreamDocuments, InventoryService, MaterialCatalog};
pub use relation::{DocumentRelation, NewRelation, RelationKey, RelationOutcome};
pub use snapshot::{
    DemandComputationSnapshot, RecalcHistory, RecalcResult, RecalcTrigger, SnapshotItem,
};
pub use source::{SourceConfig, SourceType, SourceValidation};

/// 租戶 ID
pub type TenantId = i64;

/// 資料列 ID
pub type RecordId = i64;

/// 需求計算錯誤類型
#[derive(Debug, thiserror::Error)]
pub enum MrpError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    BusinessLogic(String),

    #[error("並發衝突: {0}")]
    Conflict(String),

    #[error("資料庫錯誤: {0}")]
    Database(String),

    #[error("BOM 展開錯誤: {0}")]
    BomExplosion(String),

    #[error("計算錯誤: {0}")]
    Calculation(String),
}

impl MrpError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn business(msg: impl Into<String>) -> Self {
        Self::BusinessLogic(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// 包裝下游服務錯誤，統一以業務錯誤對外
    pub fn downstream(kind: DocumentKind, err: MrpError) -> Self {
        Self::BusinessLogic(format!("创建{}失败: {}", kind.label(), err))
    }

    /// 轉換為 HTTP 狀態碼
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Validation(_) => 400,
            Self::BusinessLogic(_) => 422,
            Self::Conflict(_) => 409,
            Self::Database(_) | Self::BomExplosion(_) | Self::Calculation(_) => 500,
        }
    }

    /// 是否為業務規則錯誤
    pub fn is_business(&self) -> bool {
        matches!(self, Self::BusinessLogic(_))
    }
}

pub type Result<T> = std::result::Result<T, MrpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downstream_error_is_business() {
        let err = MrpError::downstream(
            DocumentKind::WorkOrder,
            MrpError::validation("产品不存在"),
        );

        assert!(err.is_business());
        assert_eq!(err.status_code(), 422);
        assert!(err.to_string().contains("产品不存在"));
        assert!(err.to_string().contains("工单"));
    }
}
