//! # MRP Service
//!
//! 需求計算服務：計算生命週期、下游單據生成、關聯帳本與引擎設定。
//!
//! ## 快速開始
//!
//! ```rust,ignore
//! let service = DemandComputationService::new(store, collaborators, EngineConfig::default());
//! let created = service
//!     .create_computation(tenant_id, NewComputation::for_demands([demand_id]), Some(user_id))
//!     .await?;
//! let executed = service.execute_computation(tenant_id, created.computation.id, None).await?;
//! ```

use std::sync::Arc;

use mrp_core::{BomSource, BusinessPolicy, DownstreamDocuments, InventoryService, MaterialCatalog};

pub mod config_resolver;
mod executor;
pub mod generator;
pub mod ledger;
pub mod memory;
pub mod orchestrator;
pub mod push_plan;
pub mod settings;
pub mod telemetry;
pub mod validator;

pub use generator::{GenerateResult, PushOptions, PushPreview, PushResult};
pub use ledger::{PushExclusions, PushRecord, PushRecords};
pub use orchestrator::{
    DemandComputationService, ItemValidation, MaterialSourceEntry, MaterialSources,
    PreviewResult, SourceValidationReport,
};
pub use push_plan::{
    GenerateMode, ProductionPush, PurchasePush, PushConfig, PushScope, RequisitionCandidate,
};
pub use settings::{EngineConfig, EngineSettings, SettingsError};

/// 外部協作者
#[derive(Clone)]
pub struct Collaborators {
    pub materials: Arc<dyn MaterialCatalog>,
    pub boms: Arc<dyn BomSource>,
    pub inventory: Arc<dyn InventoryService>,
    pub policy: Arc<dyn BusinessPolicy>,
    pub downstream: Arc<dyn DownstreamDocuments>,
}
