//! 下游單據生成
//!
//! 依生成模式或一鍵下推配置，把已完成計算的明細轉成工單、委外工單、採購單、
//! 生產計劃與採購申請，並為每張新單據寫入關聯。
//!
//! 流程：讀取計算與已下推排除集 → 建立下推計劃 → 預先驗證 → 逐張創建並記錄關聯。
//! 預先驗證失敗且不允許草稿時，不創建任何單據。

use std::collections::HashSet;

use mrp_core::{
    ComputationStatus, CreatedDocument, DemandComputation, DemandComputationItem, DocumentKind,
    DocumentOrigin, MrpError, NewRelation, OutsourceWorkOrderRequest, ProductionMode,
    ProductionPlanRequest, PurchaseOrderRequest, PurchaseRequisitionRequest, RecordId, Result,
    SupplierRef, TenantId, WorkOrderRequest,
};
use mrp_store::{settle, Store, StoreTx, TxOutcome};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ledger::{self, PushExclusions};
use crate::orchestrator::{load_computation, DemandComputationService, ItemValidation};
use crate::push_plan::{
    GenerateMode, ProductionPush, PurchasePush, PushConfig, PushPlan, PushScope, RequisitionCandidate,
};
use crate::validator::SourceValidator;

/// 下推結果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushResult {
    pub production_plan: Option<CreatedDocument>,
    pub work_orders: Vec<CreatedDocument>,
    pub outsource_work_orders: Vec<CreatedDocument>,
    pub purchase_requisition: Option<CreatedDocument>,
    pub purchase_orders: Vec<CreatedDocument>,
    /// 缺少預設供應商、需改走採購申請的物料
    pub requisition_required: Vec<RequisitionCandidate>,
    /// 已被既有單據涵蓋而略過的物料
    pub skipped_materials: Vec<RecordId>,
    pub warnings: Vec<String>,
    pub relations_created: usize,
}

impl PushResult {
    pub fn document_count(&self) -> usize {
        usize::from(self.production_plan.is_some())
            + self.work_orders.len()
            + self.outsource_work_orders.len()
            + usize::from(self.purchase_requisition.is_some())
            + self.purchase_orders.len()
    }
}

pub type GenerateResult = PushResult;

/// 下推能力與待下推數量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushOptions {
    pub computation_id: RecordId,
    pub computation_status: ComputationStatus,
    pub can_push: bool,
    pub can_direct_generate_work_order: bool,
    pub production_options: Vec<ProductionPush>,
    pub purchase_options: Vec<PurchasePush>,
    pub production_item_count: usize,
    pub purchase_item_count: usize,
    pub outsource_item_count: usize,
    pub requisition_required_count: usize,
    pub production_plan_exists: bool,
    pub purchase_requisition_exists: bool,
}

/// 下推預覽（無副作用）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushPreview {
    pub production_plan_count: usize,
    pub work_order_count: usize,
    pub outsource_work_order_count: usize,
    pub purchase_requisition_count: usize,
    pub purchase_order_count: usize,
    pub requisition_required: Vec<RequisitionCandidate>,
    pub skipped_materials: Vec<RecordId>,
    pub validation_failures: Vec<ItemValidation>,
}

/// 下推所需的計算狀態
struct PushContext {
    computation: DemandComputation,
    items: Vec<DemandComputationItem>,
    exclusions: PushExclusions,
    sales_order_id: Option<RecordId>,
}

impl<S: Store> DemandComputationService<S> {
    /// 生成工單與採購單
    pub async fn generate_work_orders_and_purchase_orders(
        &self,
        tenant_id: TenantId,
        computation_id: RecordId,
        created_by: Option<RecordId>,
        mode: GenerateMode,
        allow_draft: bool,
    ) -> Result<GenerateResult> {
        info!(
            tenant_id,
            computation_id,
            mode = mode.as_str(),
            allow_draft,
            "生成下游單據"
        );
        self.push(tenant_id, computation_id, created_by, PushScope::from(mode), allow_draft)
            .await
    }

    /// 一鍵下推
    pub async fn push_all(
        &self,
        tenant_id: TenantId,
        computation_id: RecordId,
        production: Option<ProductionPush>,
        purchase: Option<PurchasePush>,
        include_outsource: bool,
    ) -> Result<PushResult> {
        let scope = PushScope::from(PushConfig {
            production,
            purchase,
            include_outsource,
        });
        if scope.production.is_none() && scope.purchase.is_none() && !scope.outsource {
            return Err(MrpError::validation("未选择任何下推类型"));
        }
        info!(tenant_id, computation_id, ?production, ?purchase, include_outsource, "一鍵下推");
        self.push(tenant_id, computation_id, None, scope, false).await
    }

    pub async fn get_push_options(&self, tenant_id: TenantId, computation_id: RecordId) -> Result<PushOptions> {
        let context = self.push_context(tenant_id, computation_id).await?;
        let policy = self.deps.policy.policy_flags(tenant_id).await?;
        let can_direct = policy.can_direct_generate_work_order_from_computation;

        let mut production_options = vec![ProductionPush::Plan];
        if can_direct {
            production_options.push(ProductionPush::WorkOrder);
        }

        let full = PushPlan::build(
            &context.items,
            &PushExclusions::default(),
            PushScope::from(GenerateMode::All),
        );
        let purchase_item_count = full
            .purchase_groups
            .iter()
            .map(|g| g.lines.len())
            .sum::<usize>()
            + full.requisition_required.len();

        Ok(PushOptions {
            computation_id,
            computation_status: context.computation.computation_status,
            can_push: context.computation.computation_status == ComputationStatus::Completed,
            can_direct_generate_work_order: can_direct,
            production_options,
            purchase_options: vec![PurchasePush::Requisition, PurchasePush::PurchaseOrder],
            production_item_count: full.work_orders.len(),
            purchase_item_count,
            outsource_item_count: full.outsource_orders.len(),
            requisition_required_count: full.requisition_required.len(),
            production_plan_exists: context.exclusions.production_plan_exists,
            purchase_requisition_exists: context.exclusions.purchase_requisition_exists,
        })
    }

    pub async fn get_push_preview(
        &self,
        tenant_id: TenantId,
        computation_id: RecordId,
        config: PushConfig,
    ) -> Result<PushPreview> {
        let context = self.push_context(tenant_id, computation_id).await?;
        let scope = PushScope::from(config);
        let plan = PushPlan::build(&context.items, &context.exclusions, scope);
        let validation_failures = self
            .prevalidate(tenant_id, &context.items, &plan, scope)
            .await?;

        Ok(PushPreview {
            production_plan_count: plan.production_plan_count(),
            work_order_count: plan.work_orders.len(),
            outsource_work_order_count: plan.outsource_orders.len(),
            purchase_requisition_count: plan.purchase_requisition_count(),
            purchase_order_count: plan.purchase_groups.len(),
            requisition_required: plan.requisition_required,
            skipped_materials: plan.skipped_materials,
            validation_failures,
        })
    }

    async fn push_context(&self, tenant_id: TenantId, computation_id: RecordId) -> Result<PushContext> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let computation = load_computation(&mut tx, tenant_id, computation_id).await?;
            let items = tx.list_items(tenant_id, computation_id).await?;
            let exclusions = ledger::already_pushed_exclusions(
                &mut tx,
                self.deps.downstream.as_ref(),
                tenant_id,
                computation_id,
            )
            .await?;
            let sales_order_id = tx
                .get_demand(tenant_id, computation.demand_id)
                .await?
                .and_then(|d| d.sales_order_id());
            Ok(PushContext {
                computation,
                items,
                exclusions,
                sales_order_id,
            })
        }
        .await;
        settle(tx, result.map(TxOutcome::Commit)).await
    }

    async fn push(
        &self,
        tenant_id: TenantId,
        computation_id: RecordId,
        created_by: Option<RecordId>,
        scope: PushScope,
        allow_draft: bool,
    ) -> Result<PushResult> {
        let context = self.push_context(tenant_id, computation_id).await?;
        let computation = &context.computation;
        if computation.computation_status != ComputationStatus::Completed {
            return Err(MrpError::business(format!(
                "计算状态为{}，只有完成的计算可以下推",
                computation.computation_status.as_str()
            )));
        }

        if scope.creates_work_orders() {
            let policy = self.deps.policy.policy_flags(tenant_id).await?;
            if !policy.can_direct_generate_work_order_from_computation {
                return Err(MrpError::business(
                    "当前租户不允许从需求计算直接生成工单，请通过生产计划下推",
                ));
            }
        }

        let plan = PushPlan::build(&context.items, &context.exclusions, scope);
        let failures = self
            .prevalidate(tenant_id, &context.items, &plan, scope)
            .await?;

        let mut result = PushResult {
            requisition_required: plan.requisition_required.clone(),
            skipped_materials: plan.skipped_materials.clone(),
            ..PushResult::default()
        };

        if !failures.is_empty() {
            let message = failures
                .iter()
                .map(|f| format!("{}: {}", f.material_code, f.errors.join("，")))
                .collect::<Vec<_>>()
                .join("; ");
            if !allow_draft {
                return Err(MrpError::business(format!("物料来源验证失败: {message}")));
            }
            result
                .warnings
                .push(format!("物料来源验证未通过，以草稿创建: {message}"));
        }
        if !plan.requisition_required.is_empty() {
            result.warnings.push(format!(
                "{}个物料缺少默认供应商，需通过采购申请下推",
                plan.requisition_required.len()
            ));
        }
        if plan.is_empty() {
            debug!(computation_id, "沒有需要下推的物料");
            return Ok(result);
        }

        let origin = DocumentOrigin {
            computation_id,
            computation_code: computation.computation_code.clone(),
            created_by,
            allow_draft,
        };
        let production_mode = if context.sales_order_id.is_some() {
            ProductionMode::Mto
        } else {
            ProductionMode::Mts
        };
        let downstream = self.deps.downstream.as_ref();

        if !plan.plan_lines.is_empty() {
            let document = downstream
                .create_production_plan(
                    tenant_id,
                    ProductionPlanRequest {
                        origin: origin.clone(),
                        plan_type: computation.computation_type.as_str().to_string(),
                        lines: plan.plan_lines.clone(),
                    },
                )
                .await
                .map_err(|e| MrpError::downstream(DocumentKind::ProductionPlan, e))?;
            result.relations_created += self.record_push(tenant_id, computation, &document).await?;
            result.production_plan = Some(document);
        }

        for draft in &plan.work_orders {
            let document = downstream
                .create_work_order(
                    tenant_id,
                    WorkOrderRequest {
                        origin: origin.clone(),
                        material_id: draft.material_id,
                        material_code: draft.material_code.clone(),
                        material_name: draft.material_name.clone(),
                        quantity: draft.quantity,
                        process_route_id: draft.process_route_id,
                        production_mode,
                        sales_order_id: context.sales_order_id,
                        planned_start_date: draft.start_date,
                        planned_end_date: draft.end_date,
                    },
                )
                .await
                .map_err(|e| MrpError::downstream(DocumentKind::WorkOrder, e))?;
            result.relations_created += self.record_push(tenant_id, computation, &document).await?;
            result.work_orders.push(document);
        }

        let mut placeholder: Option<SupplierRef> = None;
        for draft in &plan.outsource_orders {
            let supplier = match (&draft.supplier, allow_draft) {
                (Some(supplier), _) => supplier.clone(),
                (None, true) => match &placeholder {
                    Some(supplier) => supplier.clone(),
                    None => {
                        let supplier = downstream
                            .ensure_placeholder_supplier(tenant_id, &self.settings.placeholder_supplier_name)
                            .await?;
                        warn!(supplier_id = supplier.id, "委外物料缺少供應商，使用待指定供應商");
                        placeholder = Some(supplier.clone());
                        supplier
                    }
                },
                (None, false) => {
                    return Err(MrpError::business(format!(
                        "委外物料[{}]未配置委外供应商",
                        draft.material_code
                    )))
                }
            };
            let document = downstream
                .create_outsource_work_order(
                    tenant_id,
                    OutsourceWorkOrderRequest {
                        origin: origin.clone(),
                        material_id: draft.material_id,
                        material_code: draft.material_code.clone(),
                        material_name: draft.material_name.clone(),
                        quantity: draft.quantity,
                        supplier,
                        operation: draft.operation.clone(),
                        unit_price: draft.unit_price,
                        planned_start_date: draft.start_date,
                        planned_end_date: draft.end_date,
                    },
                )
                .await
                .map_err(|e| MrpError::downstream(DocumentKind::OutsourceWorkOrder, e))?;
            result.relations_created += self.record_push(tenant_id, computation, &document).await?;
            result.outsource_work_orders.push(document);
        }

        if !plan.requisition_lines.is_empty() {
            let document = downstream
                .create_purchase_requisition(
                    tenant_id,
                    PurchaseRequisitionRequest {
                        origin: origin.clone(),
                        lines: plan.requisition_lines.clone(),
                    },
                )
                .await
                .map_err(|e| MrpError::downstream(DocumentKind::PurchaseRequisition, e))?;
            result.relations_created += self.record_push(tenant_id, computation, &document).await?;
            result.purchase_requisition = Some(document);
        }

        for group in &plan.purchase_groups {
            let document = downstream
                .create_purchase_order(
                    tenant_id,
                    PurchaseOrderRequest {
                        origin: origin.clone(),
                        supplier: group.supplier.clone(),
                        lines: group.lines.clone(),
                    },
                )
                .await
                .map_err(|e| MrpError::downstream(DocumentKind::PurchaseOrder, e))?;
            result.relations_created += self.record_push(tenant_id, computation, &document).await?;
            result.purchase_orders.push(document);
        }

        info!(
            computation_id,
            documents = result.document_count(),
            relations = result.relations_created,
            skipped = result.skipped_materials.len(),
            "下推完成"
        );
        Ok(result)
    }

    /// 驗證會產生單據的物料，並帶上計算時已記錄的驗證失敗
    async fn prevalidate(
        &self,
        tenant_id: TenantId,
        items: &[DemandComputationItem],
        plan: &PushPlan,
        scope: PushScope,
    ) -> Result<Vec<ItemValidation>> {
        let validator = SourceValidator::new(self.deps.materials.as_ref(), self.deps.boms.as_ref());
        let mut failures: Vec<ItemValidation> = Vec::new();

        for &(material_id, source_type) in &plan.targets {
            let validation = validator.validate(tenant_id, material_id, source_type).await?;
            if validation.passed() {
                continue;
            }
            let material_code = items
                .iter()
                .find(|i| i.material_id == material_id)
                .map(|i| i.material_code.clone())
                .unwrap_or_else(|| material_id.to_string());
            failures.push(ItemValidation {
                material_id,
                material_code,
                source_type,
                passed: false,
                errors: validation.errors,
                warnings: validation.warnings,
            });
        }

        let skipped: HashSet<RecordId> = plan.skipped_materials.iter().copied().collect();
        for item in items.iter().filter(|i| !i.source_validation_passed) {
            let Some(source_type) = item.material_source_type else {
                continue;
            };
            if !scope.covers(source_type) || skipped.contains(&item.material_id) {
                continue;
            }
            match failures.iter_mut().find(|f| f.material_id == item.material_id) {
                Some(failure) => {
                    for error in &item.source_validation_errors {
                        if !failure.errors.contains(error) {
                            failure.errors.push(error.clone());
                        }
                    }
                }
                None => failures.push(ItemValidation {
                    material_id: item.material_id,
                    material_code: item.material_code.clone(),
                    source_type,
                    passed: false,
                    errors: item.source_validation_errors.clone(),
                    warnings: Vec::new(),
                }),
            }
        }
        Ok(failures)
    }

    /// 以獨立交易寫入下推關聯；返回新建數量
    async fn record_push(
        &self,
        tenant_id: TenantId,
        computation: &DemandComputation,
        document: &CreatedDocument,
    ) -> Result<usize> {
        let relation = NewRelation::pushed_document(computation.id, &computation.computation_code, document)
            .with_business(computation.business_mode.as_str(), Some(computation.demand_id));
        let mut tx = self.store.begin().await?;
        let outcome = ledger::create_relation(&mut tx, tenant_id, relation).await;
        let outcome = settle(tx, outcome.map(TxOutcome::Commit)).await?;
        debug!(
            kind = document.kind.as_str(),
            document_id = document.id,
            created = outcome.is_created(),
            "下推關聯"
        );
        Ok(usize::from(outcome.is_created()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryDownstream, InMemoryInventory, InMemoryMasterData, StaticPolicy};
    use crate::settings::EngineConfig;
    use crate::Collaborators;
    use mrp_core::{
        Bom, BomLine, BusinessMode, Demand, DemandItem, Material, NewComputation, PolicyFlags,
        SourceType,
    };
    use mrp_store::MemoryStore;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::sync::Arc;

    const TENANT: TenantId = 1;

    struct Fixture {
        service: DemandComputationService<MemoryStore>,
        downstream: Arc<InMemoryDownstream>,
        computation_id: RecordId,
    }

    async fn fixture(can_direct: bool) -> Fixture {
        let master = Arc::new(
            InMemoryMasterData::new()
                .with_material(
                    TENANT,
                    Material::new(1, "FRAME", "车架")
                        .with_source_type(SourceType::Make)
                        .with_process_route(5),
                )
                .with_material(
                    TENANT,
                    Material::new(2, "TUBE", "钢管")
                        .with_source_type(SourceType::Buy)
                        .with_source_config(json!({"default_supplier_id": 30, "default_supplier_name": "钢材供应商"})),
                )
                .with_material(TENANT, Material::new(3, "BOLT", "螺栓").with_source_type(SourceType::Buy))
                .with_bom(
                    TENANT,
                    Bom {
                        id: 10,
                        material_id: 1,
                        bom_code: "BOM-FRAME".to_string(),
                        version: "V1".to_string(),
                        approved: true,
                        is_default: true,
                        lines: vec![
                            BomLine::new(2, Decimal::from(3)),
                            BomLine::new(3, Decimal::from(8)),
                        ],
                    },
                ),
        );
        let downstream = Arc::new(InMemoryDownstream::new());
        let store = MemoryStore::new();
        store
            .seed_demand(
                Demand::new(100, TENANT, "DM-100", BusinessMode::Mts),
                vec![DemandItem::new(1000, TENANT, 100, 1, Decimal::from(2))],
            )
            .await;

        let deps = Collaborators {
            materials: master.clone(),
            boms: master,
            inventory: Arc::new(InMemoryInventory::new()),
            policy: Arc::new(StaticPolicy(PolicyFlags {
                can_direct_generate_work_order_from_computation: can_direct,
                allow_multi_version_bom: false,
            })),
            downstream: downstream.clone(),
        };
        let service = DemandComputationService::new(store, deps, EngineConfig::default());
        let computation_id = service
            .create_computation(TENANT, NewComputation::for_demands([100]), None)
            .await
            .unwrap()
            .computation
            .id;
        Fixture {
            service,
            downstream,
            computation_id,
        }
    }

    #[tokio::test]
    async fn test_push_requires_completed_computation() {
        let f = fixture(true).await;
        let err = f
            .service
            .generate_work_orders_and_purchase_orders(TENANT, f.computation_id, None, GenerateMode::All, false)
            .await
            .unwrap_err();
        assert!(err.is_business());
    }

    #[tokio::test]
    async fn test_work_orders_need_tenant_policy() {
        let f = fixture(false).await;
        f.service.execute_computation(TENANT, f.computation_id, None).await.unwrap();

        let err = f
            .service
            .generate_work_orders_and_purchase_orders(
                TENANT,
                f.computation_id,
                None,
                GenerateMode::WorkOrderOnly,
                false,
            )
            .await
            .unwrap_err();
        assert!(err.is_business());
        assert!(f.downstream.documents(DocumentKind::WorkOrder).await.is_empty());

        let pushed = f
            .service
            .push_all(TENANT, f.computation_id, Some(ProductionPush::Plan), None, false)
            .await
            .unwrap();
        assert!(pushed.production_plan.is_some());
        assert_eq!(pushed.relations_created, 1);
    }

    #[tokio::test]
    async fn test_generate_all_splits_by_supplier() {
        let f = fixture(true).await;
        f.service.execute_computation(TENANT, f.computation_id, None).await.unwrap();

        let result = f
            .service
            .generate_work_orders_and_purchase_orders(TENANT, f.computation_id, Some(8), GenerateMode::All, false)
            .await
            .unwrap();

        assert_eq!(result.work_orders.len(), 1);
        assert_eq!(result.purchase_orders.len(), 1);
        assert_eq!(result.requisition_required.len(), 1);
        assert_eq!(result.requisition_required[0].material_code, "BOLT");
        assert_eq!(result.relations_created, 2);
        assert_eq!(result.warnings.len(), 1);

        let records = f.service.get_push_records(TENANT, f.computation_id).await.unwrap();
        assert_eq!(records.records.len(), 2);
        assert!(records.records.iter().all(|r| r.target_exists));
    }

    #[tokio::test]
    async fn test_preview_has_no_side_effects() {
        let f = fixture(true).await;
        f.service.execute_computation(TENANT, f.computation_id, None).await.unwrap();

        let config = PushConfig {
            production: Some(ProductionPush::Plan),
            purchase: Some(PurchasePush::Requisition),
            include_outsource: true,
        };
        let preview = f
            .service
            .get_push_preview(TENANT, f.computation_id, config)
            .await
            .unwrap();
        assert_eq!(preview.production_plan_count, 1);
        assert_eq!(preview.purchase_requisition_count, 1);
        assert_eq!(preview.work_order_count, 0);
        assert!(preview.validation_failures.is_empty());

        let options = f.service.get_push_options(TENANT, f.computation_id).await.unwrap();
        assert!(options.can_push);
        assert!(options.can_direct_generate_work_order);
        assert_eq!(options.production_item_count, 1);
        assert_eq!(options.purchase_item_count, 2);
        assert_eq!(options.requisition_required_count, 1);

        for kind in DocumentKind::ALL {
            assert!(f.downstream.documents(kind).await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_push_all_requires_a_target() {
        let f = fixture(true).await;
        let err = f
            .service
            .push_all(TENANT, f.computation_id, None, None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, MrpError::Validation(_)));
    }
}
