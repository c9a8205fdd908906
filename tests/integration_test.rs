//! 集成測試
//!
//! 以記憶體儲存與記憶體協作者跑完整的需求計算流程。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mrp_core::{
    Bom, BomLine, BusinessMode, ComputationStatus, ComputationType, Demand, DemandItem,
    DocumentKind, DownstreamDocuments, InventoryInfo, InventoryService, Material, MrpError,
    NewComputation, PolicyFlags, RecalcResult, RecalcTrigger, RecordId, SourceType, TenantId,
};
use mrp_service::memory::{InMemoryDownstream, InMemoryInventory, InMemoryMasterData, StaticPolicy};
use mrp_service::{Collaborators, DemandComputationService, EngineConfig, GenerateMode};
use mrp_store::MemoryStore;
use proptest::prelude::*;
use rust_decimal::Decimal;
use serde_json::json;

const TENANT: TenantId = 1;

struct Harness {
    service: DemandComputationService<MemoryStore>,
    downstream: Arc<InMemoryDownstream>,
}

impl Harness {
    async fn new(master: InMemoryMasterData, inventory: InMemoryInventory, demands: Vec<(Demand, Vec<DemandItem>)>) -> Self {
        let master = Arc::new(master);
        let downstream = Arc::new(InMemoryDownstream::new());
        let store = MemoryStore::new();
        for (demand, items) in demands {
            store.seed_demand(demand, items).await;
        }
        let deps = Collaborators {
            materials: master.clone(),
            boms: master,
            inventory: Arc::new(inventory),
            policy: Arc::new(StaticPolicy(PolicyFlags {
                can_direct_generate_work_order_from_computation: true,
                allow_multi_version_bom: false,
            })),
            downstream: downstream.clone(),
        };
        Self {
            service: DemandComputationService::new(store, deps, EngineConfig::default()),
            downstream,
        }
    }

    async fn create(&self, demand_ids: &[RecordId]) -> RecordId {
        self.service
            .create_computation(TENANT, NewComputation::for_demands(demand_ids.iter().copied()), Some(1))
            .await
            .unwrap()
            .computation
            .id
    }
}

fn bom(id: RecordId, parent: RecordId, lines: &[(RecordId, i64)]) -> Bom {
    Bom {
        id,
        material_id: parent,
        bom_code: format!("BOM-{parent}"),
        version: "V1".to_string(),
        approved: true,
        is_default: true,
        lines: lines
            .iter()
            .map(|&(component, qty)| BomLine::new(component, Decimal::from(qty)))
            .collect(),
    }
}

fn demand(id: RecordId, material_id: RecordId, qty: i64) -> (Demand, Vec<DemandItem>) {
    (
        Demand::new(id, TENANT, format!("DM-{id}"), BusinessMode::Mts),
        vec![DemandItem::new(id * 10, TENANT, id, material_id, Decimal::from(qty))],
    )
}

fn make(id: RecordId, code: &str) -> Material {
    Material::new(id, code, code)
        .with_source_type(SourceType::Make)
        .with_process_route(900 + id)
}

fn buy(id: RecordId, code: &str, supplier: Option<RecordId>) -> Material {
    let config = match supplier {
        Some(supplier) => json!({"default_supplier_id": supplier, "default_supplier_name": format!("供应商{supplier}")}),
        None => json!({}),
    };
    Material::new(id, code, code)
        .with_source_type(SourceType::Buy)
        .with_source_config(config)
}

/// 可切換為失敗的庫存服務
#[derive(Default)]
struct FlakyInventory {
    fail: AtomicBool,
}

#[async_trait]
impl InventoryService for FlakyInventory {
    async fn get_inventory(
        &self,
        _tenant_id: TenantId,
        _material_id: RecordId,
        _warehouse_id: Option<RecordId>,
    ) -> mrp_core::Result<InventoryInfo> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MrpError::database("库存服务不可用"));
        }
        Ok(InventoryInfo::default())
    }
}

/// 每次查詢都延遲的庫存服務，讓並發執行的交易互相重疊
struct SlowInventory;

#[async_trait]
impl InventoryService for SlowInventory {
    async fn get_inventory(
        &self,
        _tenant_id: TenantId,
        _material_id: RecordId,
        _warehouse_id: Option<RecordId>,
    ) -> mrp_core::Result<InventoryInfo> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(InventoryInfo::default())
    }
}

/// 兩個租戶各有一份相同主數據與需求
async fn slow_two_tenant_service() -> DemandComputationService<MemoryStore> {
    let mut master = InMemoryMasterData::new();
    for tenant in [TENANT, 2] {
        master = master
            .with_material(tenant, make(1, "M1"))
            .with_material(tenant, buy(2, "M2", Some(50)))
            .with_bom(tenant, bom(11, 1, &[(2, 2)]));
    }
    let master = Arc::new(master);

    let store = MemoryStore::new();
    for (tenant, demand_id) in [(TENANT, 1), (TENANT, 2), (2, 3)] {
        store
            .seed_demand(
                Demand::new(demand_id, tenant, format!("DM-{demand_id}"), BusinessMode::Mts),
                vec![DemandItem::new(demand_id * 10, tenant, demand_id, 1, Decimal::from(5))],
            )
            .await;
    }
    let deps = Collaborators {
        materials: master.clone(),
        boms: master,
        inventory: Arc::new(SlowInventory),
        policy: Arc::new(StaticPolicy(PolicyFlags::default())),
        downstream: Arc::new(InMemoryDownstream::new()),
    };
    DemandComputationService::new(store, deps, EngineConfig::default())
}

fn d(value: i64) -> Decimal {
    Decimal::from(value)
}

/// M1(自製) → 2×M2(採購) + 3×M3(自製)；M3 → 1×M4(採購)
fn bike_master() -> InMemoryMasterData {
    InMemoryMasterData::new()
        .with_material(TENANT, make(1, "M1"))
        .with_material(TENANT, buy(2, "M2", Some(50)))
        .with_material(TENANT, make(3, "M3"))
        .with_material(TENANT, buy(4, "M4", Some(50)))
        .with_bom(TENANT, bom(11, 1, &[(2, 2), (3, 3)]))
        .with_bom(TENANT, bom(13, 3, &[(4, 1)]))
}

#[tokio::test]
async fn test_single_mts_demand_all_make() {
    let h = Harness::new(bike_master(), InMemoryInventory::new(), vec![demand(1, 1, 10)]).await;
    let id = h.create(&[1]).await;

    let executed = h.service.execute_computation(TENANT, id, None).await.unwrap();
    assert_eq!(executed.computation.computation_status, ComputationStatus::Completed);
    assert_eq!(executed.computation.computation_type, ComputationType::Mrp);

    let mut rows: Vec<_> = executed
        .items
        .iter()
        .map(|i| {
            (
                i.material_code.as_str(),
                i.required_quantity,
                i.net_requirement,
                i.suggested_work_order_quantity,
                i.suggested_purchase_order_quantity,
            )
        })
        .collect();
    rows.sort();
    assert_eq!(
        rows,
        vec![
            ("M1", d(10), d(10), d(10), d(0)),
            ("M2", d(20), d(20), d(0), d(20)),
            ("M3", d(30), d(30), d(30), d(0)),
        ]
    );

    let summary = executed.computation.computation_summary.unwrap();
    assert_eq!(summary["material_count"], json!(3));
    assert_eq!(summary["work_order_suggestions"], json!(2));
}

#[tokio::test]
async fn test_phantom_passes_through() {
    let master = InMemoryMasterData::new()
        .with_material(TENANT, make(1, "M1"))
        .with_material(TENANT, Material::new(5, "MP", "虚拟件").with_source_type(SourceType::Phantom))
        .with_material(TENANT, buy(6, "MX", Some(50)))
        .with_bom(TENANT, bom(11, 1, &[(5, 1)]))
        .with_bom(TENANT, bom(15, 5, &[(6, 4)]));
    let h = Harness::new(master, InMemoryInventory::new(), vec![demand(1, 1, 5)]).await;
    let id = h.create(&[1]).await;

    let items = h.service.execute_computation(TENANT, id, None).await.unwrap().items;
    assert!(items.iter().all(|i| i.material_id != 5));
    assert!(items
        .iter()
        .all(|i| i.material_source_type != Some(SourceType::Phantom)));

    let m1 = items.iter().find(|i| i.material_id == 1).unwrap();
    assert_eq!((m1.net_requirement, m1.suggested_work_order_quantity), (d(5), d(5)));
    let mx = items.iter().find(|i| i.material_id == 6).unwrap();
    assert_eq!((mx.net_requirement, mx.suggested_purchase_order_quantity), (d(20), d(20)));
}

#[tokio::test]
async fn test_netting_with_safety_stock_and_reorder_point() {
    let master = InMemoryMasterData::new().with_material(
        TENANT,
        buy(1, "M1", Some(50)).with_inventory_defaults(Some(d(4)), Some(d(25))),
    );
    let inventory = InMemoryInventory::new().with_stock(
        TENANT,
        1,
        InventoryInfo::new(10.0).with_in_transit(5.0).with_reserved(2.0),
    );
    let h = Harness::new(master, inventory, vec![demand(1, 1, 30)]).await;
    let id = h
        .service
        .create_computation(
            TENANT,
            NewComputation::for_demands([1]).with_params(json!({
                "include_safety_stock": true,
                "include_in_transit": true,
                "include_reserved": false,
                "include_reorder_point": true,
            })),
            None,
        )
        .await
        .unwrap()
        .computation
        .id;

    let items = h.service.execute_computation(TENANT, id, None).await.unwrap().items;
    let m1 = &items[0];
    assert_eq!(m1.required_quantity, d(30));
    assert_eq!(m1.available_inventory, d(10));
    assert_eq!(m1.net_requirement, d(19));
    assert_eq!(m1.suggested_purchase_order_quantity, d(19));
    assert_eq!(m1.safety_stock, Some(d(4)));
    assert_eq!(m1.reorder_point, Some(d(25)));
    let supply = m1.detail_results.as_ref().unwrap()["supply"]
        .as_str()
        .and_then(|s| s.parse::<Decimal>().ok());
    assert_eq!(supply, Some(d(11)));
}

#[tokio::test]
async fn test_validation_failure_blocks_push() {
    let master = InMemoryMasterData::new().with_material(
        TENANT,
        Material::new(1, "M1", "电镀件")
            .with_source_type(SourceType::Outsource)
            .with_source_config(json!({"outsource_operation": "电镀"})),
    );
    let h = Harness::new(master, InMemoryInventory::new(), vec![demand(1, 1, 8)]).await;
    let id = h.create(&[1]).await;
    let items = h.service.execute_computation(TENANT, id, None).await.unwrap().items;
    assert!(!items[0].source_validation_passed);

    let err = h
        .service
        .generate_work_orders_and_purchase_orders(TENANT, id, None, GenerateMode::All, false)
        .await
        .unwrap_err();
    assert!(err.is_business());
    for kind in DocumentKind::ALL {
        assert!(h.downstream.documents(kind).await.is_empty());
    }

    let drafted = h
        .service
        .generate_work_orders_and_purchase_orders(TENANT, id, None, GenerateMode::OutsourceOnly, true)
        .await
        .unwrap();
    assert_eq!(drafted.outsource_work_orders.len(), 1);
    assert_eq!(drafted.outsource_work_orders[0].status, "draft");
    assert!(!drafted.warnings.is_empty());

    let suppliers = h.downstream.suppliers().await;
    assert_eq!(suppliers.len(), 1);
    assert_eq!(suppliers[0].name.as_deref(), Some("待指定"));
    let records = h.downstream.documents(DocumentKind::OutsourceWorkOrder).await;
    assert_eq!(records[0].supplier.as_ref().map(|s| s.id), Some(suppliers[0].id));
}

#[tokio::test]
async fn test_delete_respects_executed_downstream() {
    let h = Harness::new(bike_master(), InMemoryInventory::new(), vec![demand(1, 1, 10)]).await;
    let id = h.create(&[1]).await;
    h.service.execute_computation(TENANT, id, None).await.unwrap();
    let pushed = h
        .service
        .generate_work_orders_and_purchase_orders(TENANT, id, None, GenerateMode::All, false)
        .await
        .unwrap();
    let work_order = pushed.work_orders[0].id;

    h.downstream
        .set_status(DocumentKind::WorkOrder, work_order, "released")
        .await
        .unwrap();
    let err = h.service.delete_computation(TENANT, id).await.unwrap_err();
    assert!(err.is_business());
    assert!(err.to_string().contains("下游单据已执行"));
    assert_eq!(h.downstream.documents(DocumentKind::WorkOrder).await.len(), 2);
    assert_eq!(h.downstream.documents(DocumentKind::PurchaseOrder).await.len(), 1);

    for wo in &pushed.work_orders {
        h.downstream
            .set_status(DocumentKind::WorkOrder, wo.id, "pending")
            .await
            .unwrap();
    }
    h.service.delete_computation(TENANT, id).await.unwrap();

    assert!(h.downstream.documents(DocumentKind::PurchaseOrder).await.is_empty());
    assert!(h.downstream.documents(DocumentKind::WorkOrder).await.is_empty());

    let state = h.service.store().snapshot().await;
    assert!(state.computations.is_empty());
    assert!(state.items.is_empty());
    assert!(state
        .relations
        .iter()
        .all(|r| !r.touches("demand_computation", id)));
    assert!(state.demands.iter().all(|d| !d.pushed_to_computation && d.computation_id.is_none()));
}

#[tokio::test]
async fn test_dedup_across_repeated_pushes() {
    let h = Harness::new(bike_master(), InMemoryInventory::new(), vec![demand(1, 1, 10)]).await;
    let id = h.create(&[1]).await;
    h.service.execute_computation(TENANT, id, None).await.unwrap();

    let first = h
        .service
        .generate_work_orders_and_purchase_orders(TENANT, id, None, GenerateMode::All, false)
        .await
        .unwrap();
    assert_eq!(first.work_orders.len(), 2);
    assert_eq!(first.purchase_orders.len(), 1);

    let second = h
        .service
        .generate_work_orders_and_purchase_orders(TENANT, id, None, GenerateMode::All, false)
        .await
        .unwrap();
    assert!(second.work_orders.is_empty());
    assert!(second.purchase_orders.is_empty());
    assert_eq!(second.document_count(), 0);
    assert_eq!(second.relations_created, 0);
    assert_eq!(second.skipped_materials.len(), 3);
    assert_eq!(h.downstream.documents(DocumentKind::WorkOrder).await.len(), 2);

    // 刪除的下游單據不阻擋重新下推
    let removed = first.work_orders[0].clone();
    h.downstream
        .delete_document(TENANT, DocumentKind::WorkOrder, removed.id)
        .await
        .unwrap();
    let third = h
        .service
        .generate_work_orders_and_purchase_orders(TENANT, id, None, GenerateMode::WorkOrderOnly, false)
        .await
        .unwrap();
    assert_eq!(third.work_orders.len(), 1);
    assert_eq!(third.work_orders[0].material_ids, removed.material_ids);
}

#[tokio::test]
async fn test_multi_demand_merge_infers_lrp() {
    let mut mto = demand(2, 3, 4);
    mto.0.business_mode = BusinessMode::Mto;
    mto.0 = mto.0.with_source("sales_order", 77);
    let h = Harness::new(bike_master(), InMemoryInventory::new(), vec![demand(1, 1, 10), mto]).await;
    let id = h.create(&[1, 2]).await;

    let executed = h.service.execute_computation(TENANT, id, None).await.unwrap();
    assert_eq!(executed.computation.computation_type, ComputationType::Lrp);
    assert!(executed.computation.is_merged());
    let m3 = executed.items.iter().find(|i| i.material_id == 3).unwrap();
    assert_eq!(m3.required_quantity, d(34));
    assert_eq!(m3.demand_item_ids, vec![10, 20]);
    assert_eq!(m3.planned_production, Some(d(34)));
    assert!(m3.production_start_date.is_some());
}

#[tokio::test]
async fn test_failed_execution_is_recorded_and_retryable() {
    let master = InMemoryMasterData::new().with_material(TENANT, make(1, "M1"));
    let h = Harness::new(master, InMemoryInventory::new(), vec![demand(1, 1, 3), demand(2, 99, 1)]).await;
    let id = h.create(&[2]).await;

    let err = h.service.execute_computation(TENANT, id, None).await.unwrap_err();
    let stored = h.service.get_computation_by_id(TENANT, id, false).await.unwrap();
    assert_eq!(stored.computation.computation_status, ComputationStatus::Failed);
    assert_eq!(stored.computation.error_message, Some(err.to_string()));

    // 失敗後可重試（仍失敗，狀態維持）
    let again = h.service.execute_computation(TENANT, id, None).await;
    assert!(again.is_err());
    let state = h.service.store().snapshot().await;
    assert!(state.items.iter().all(|i| i.computation_id != id));
}

#[tokio::test]
async fn test_preview_is_pure_and_matches_execute() {
    let h = Harness::new(bike_master(), InMemoryInventory::new(), vec![demand(1, 1, 10)]).await;
    let id = h.create(&[1]).await;

    let before = h.service.store().snapshot().await;
    let preview = h.service.preview_execute_computation(TENANT, id, None).await.unwrap();
    let after = h.service.store().snapshot().await;
    assert_eq!(before, after);
    assert_eq!(preview.item_count, 3);

    let executed = h.service.execute_computation(TENANT, id, None).await.unwrap();
    let mut expected: Vec<_> = executed.items.iter().map(|i| i.projection()).collect();
    let mut actual = preview.items;
    expected.sort_by_key(|p| p.material_id);
    actual.sort_by_key(|p| p.material_id);
    assert_eq!(actual, expected);
}

#[tokio::test]
async fn test_recompute_appends_exactly_one_history_row() {
    let h = Harness::new(bike_master(), InMemoryInventory::new(), vec![demand(1, 1, 10)]).await;
    let id = h.create(&[1]).await;

    let err = h.service.recompute_computation(TENANT, id, Some(5)).await.unwrap_err();
    assert!(err.is_business());
    assert!(h
        .service
        .list_computation_recalc_history(TENANT, id, None)
        .await
        .unwrap()
        .is_empty());

    h.service.execute_computation(TENANT, id, None).await.unwrap();
    h.service.recompute_computation(TENANT, id, Some(5)).await.unwrap();
    h.service.recompute_computation(TENANT, id, None).await.unwrap();

    let history = h
        .service
        .list_computation_recalc_history(TENANT, id, None)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|r| r.result == RecalcResult::Success && r.snapshot_id.is_some()));
    assert_eq!(history[0].trigger_type, RecalcTrigger::System);
    assert_eq!(history[1].trigger_type, RecalcTrigger::Manual);

    let snapshots = h.service.list_computation_snapshots(TENANT, id, Some(1)).await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].items_snapshot.len(), 3);

    let computation = h.service.get_computation_by_id(TENANT, id, true).await.unwrap();
    assert_eq!(computation.computation.computation_status, ComputationStatus::Completed);
    assert_eq!(computation.items.len(), 3);
}

#[tokio::test]
async fn test_recompute_failure_records_failed_history() {
    let inventory = Arc::new(FlakyInventory::default());
    let master = Arc::new(bike_master());
    let store = MemoryStore::new();
    let (seeded, items) = demand(1, 1, 10);
    store.seed_demand(seeded, items).await;
    let deps = Collaborators {
        materials: master.clone(),
        boms: master,
        inventory: inventory.clone(),
        policy: Arc::new(StaticPolicy(PolicyFlags::default())),
        downstream: Arc::new(InMemoryDownstream::new()),
    };
    let service = DemandComputationService::new(store, deps, EngineConfig::default());
    let id = service
        .create_computation(TENANT, NewComputation::for_demands([1]), None)
        .await
        .unwrap()
        .computation
        .id;
    service.execute_computation(TENANT, id, None).await.unwrap();

    inventory.fail.store(true, Ordering::SeqCst);
    let err = service.recompute_computation(TENANT, id, Some(3)).await.unwrap_err();
    assert!(matches!(err, MrpError::Database(_)));

    let history = service.list_computation_recalc_history(TENANT, id, None).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].result, RecalcResult::Failed);
    assert!(history[0].snapshot_id.is_some());
    assert_eq!(history[0].message, Some(err.to_string()));

    let stored = service.get_computation_by_id(TENANT, id, true).await.unwrap();
    assert_eq!(stored.computation.computation_status, ComputationStatus::Failed);
    assert!(stored.items.is_empty());

    inventory.fail.store(false, Ordering::SeqCst);
    service.recompute_computation(TENANT, id, None).await.unwrap();
    let snapshots = service.list_computation_snapshots(TENANT, id, None).await.unwrap();
    assert_eq!(snapshots.len(), 2);
    assert!(snapshots[0].items_snapshot.is_empty());
    assert_eq!(snapshots[1].items_snapshot.len(), 3);
}

#[tokio::test]
async fn test_compare_and_override_params() {
    let h = Harness::new(bike_master(), InMemoryInventory::new(), vec![demand(1, 1, 10), demand(2, 1, 4)]).await;
    let first = h.create(&[1]).await;
    let second = h.create(&[2]).await;
    h.service.execute_computation(TENANT, first, None).await.unwrap();

    let rejected = h.service.execute_computation(TENANT, second, Some(json!("oops"))).await;
    assert!(matches!(rejected, Err(MrpError::Validation(_))));
    let untouched = h.service.get_computation_by_id(TENANT, second, false).await.unwrap();
    assert_eq!(untouched.computation.computation_status, ComputationStatus::InProgress);

    h.service
        .execute_computation(TENANT, second, Some(json!({"include_in_transit": true})))
        .await
        .unwrap();
    let executed = h.service.get_computation_by_id(TENANT, second, false).await.unwrap();
    assert!(!executed.computation.computation_params.contains("include_in_transit"));

    let diff = h.service.compare_computations(TENANT, first, second).await.unwrap();
    let m1 = diff.material_diffs.iter().find(|m| m.material_id == 1).unwrap();
    let deltas = m1.deltas.as_ref().unwrap();
    assert_eq!(deltas.required_quantity.difference, d(-6));
    assert!(deltas.available_inventory.is_zero());
}

#[tokio::test]
async fn test_list_filters_and_pages() {
    let h = Harness::new(
        bike_master(),
        InMemoryInventory::new(),
        vec![demand(1, 1, 10), demand(2, 1, 5), demand(3, 1, 1)],
    )
    .await;
    let first = h.create(&[1]).await;
    h.create(&[2]).await;
    h.create(&[3]).await;
    h.service.execute_computation(TENANT, first, None).await.unwrap();

    let all = h
        .service
        .list_computations(TENANT, &Default::default(), 0, 2)
        .await
        .unwrap();
    assert!(all.success);
    assert_eq!(all.total, 3);
    assert_eq!(all.data.len(), 2);

    let filter = mrp_core::ComputationFilter {
        computation_status: Some(ComputationStatus::Completed),
        ..Default::default()
    };
    let done = h.service.list_computations(TENANT, &filter, 0, 20).await.unwrap();
    assert_eq!(done.total, 1);
    assert_eq!(done.data[0].id, first);

    let other_tenant = h.service.list_computations(2, &Default::default(), 0, 20).await.unwrap();
    assert_eq!(other_tenant.total, 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// 淨需求非負，毛需求等於需求量乘以用量
    #[test]
    fn prop_net_non_negative_and_gross_conserved(
        qty in 1i64..500,
        per_unit in 1i64..6,
        on_hand in 0u32..3000,
        safety in 0i64..50,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let master = InMemoryMasterData::new()
                .with_material(TENANT, make(1, "M1"))
                .with_material(TENANT, buy(2, "M2", Some(50)).with_inventory_defaults(Some(d(safety)), None))
                .with_bom(TENANT, bom(11, 1, &[(2, per_unit)]));
            let inventory = InMemoryInventory::new().with_stock(TENANT, 2, InventoryInfo::new(f64::from(on_hand)));
            let h = Harness::new(master, inventory, vec![demand(1, 1, qty)]).await;
            let id = h.create(&[1]).await;
            let items = h.service.execute_computation(TENANT, id, None).await.unwrap().items;

            for item in &items {
                assert!(item.net_requirement >= Decimal::ZERO);
            }
            let m2 = items.iter().find(|i| i.material_id == 2).unwrap();
            assert_eq!(m2.required_quantity, d(qty * per_unit));
            let expected = (d(qty * per_unit) - (Decimal::from(on_hand) - d(safety))).max(Decimal::ZERO);
            assert_eq!(m2.net_requirement, expected);
        });
    }
}

#[tokio::test]
async fn test_concurrent_executions_of_different_computations_all_complete() {
    let service = slow_two_tenant_service().await;
    let mut ids = Vec::new();
    for (tenant, demand_id) in [(TENANT, 1), (TENANT, 2), (2, 3)] {
        let created = service
            .create_computation(tenant, NewComputation::for_demands([demand_id]), None)
            .await
            .unwrap();
        ids.push((tenant, created.computation.id));
    }

    let (first, second, third) = tokio::join!(
        service.execute_computation(ids[0].0, ids[0].1, None),
        service.execute_computation(ids[1].0, ids[1].1, None),
        service.execute_computation(ids[2].0, ids[2].1, None),
    );
    for result in [first, second, third] {
        let response = result.unwrap();
        assert_eq!(response.computation.computation_status, ComputationStatus::Completed);
        assert_eq!(response.items.len(), 2);
    }

    let state = service.store().snapshot().await;
    assert!(state
        .computations
        .iter()
        .all(|c| c.computation_status == ComputationStatus::Completed && c.error_message.is_none()));
    assert_eq!(state.items.len(), 6);
}

#[tokio::test]
async fn test_concurrent_execute_of_same_computation_keeps_winner() {
    let service = slow_two_tenant_service().await;
    let id = service
        .create_computation(TENANT, NewComputation::for_demands([1]), None)
        .await
        .unwrap()
        .computation
        .id;

    let (first, second) = tokio::join!(
        service.execute_computation(TENANT, id, None),
        service.execute_computation(TENANT, id, None),
    );
    let (winner, loser) = match (first, second) {
        (Ok(winner), Err(loser)) | (Err(loser), Ok(winner)) => (winner, loser),
        other => panic!("exactly one execution should win: {other:?}"),
    };
    assert!(matches!(loser, MrpError::Conflict(_)));

    let state = service.store().snapshot().await;
    let stored = state.computations.iter().find(|c| c.id == id).unwrap();
    assert_eq!(stored.computation_status, ComputationStatus::Completed);
    assert!(stored.error_message.is_none());
    let stored_items: Vec<_> = state.items.iter().filter(|i| i.computation_id == id).collect();
    assert_eq!(stored_items.len(), winner.items.len());
    assert!(stored_items
        .iter()
        .all(|i| winner.items.iter().any(|w| w.id == i.id)));
}

#[tokio::test]
async fn test_delete_stops_at_first_downstream_failure() {
    let h = Harness::new(bike_master(), InMemoryInventory::new(), vec![demand(1, 1, 10)]).await;
    let id = h.create(&[1]).await;
    h.service.execute_computation(TENANT, id, None).await.unwrap();
    let pushed = h
        .service
        .generate_work_orders_and_purchase_orders(TENANT, id, None, GenerateMode::All, false)
        .await
        .unwrap();
    assert_eq!(pushed.work_orders.len(), 2);
    assert_eq!(pushed.purchase_orders.len(), 1);

    h.downstream.reject_deletes(DocumentKind::PurchaseOrder).await;
    let err = h.service.delete_computation(TENANT, id).await.unwrap_err();
    assert!(err.is_business());
    let message = err.to_string();
    assert!(message.contains("已删除"));
    for work_order in &pushed.work_orders {
        assert!(message.contains(&work_order.code));
    }

    // 已刪單據的關聯隨之移除，計算與未刪單據保持原狀
    assert!(h.downstream.documents(DocumentKind::WorkOrder).await.is_empty());
    assert_eq!(h.downstream.documents(DocumentKind::PurchaseOrder).await.len(), 1);
    let state = h.service.store().snapshot().await;
    assert!(state.computations.iter().any(|c| c.id == id));
    assert!(!state.items.is_empty());
    for work_order in &pushed.work_orders {
        assert!(state
            .relations
            .iter()
            .all(|r| !r.touches(DocumentKind::WorkOrder.as_str(), work_order.id)));
    }
    let purchase_order = pushed.purchase_orders[0].id;
    assert!(state
        .relations
        .iter()
        .any(|r| r.touches(DocumentKind::PurchaseOrder.as_str(), purchase_order)));

    // 重試只剩採購單，沒有單據被刪除
    let err = h.service.delete_computation(TENANT, id).await.unwrap_err();
    assert!(!err.to_string().contains("已删除"));
}
