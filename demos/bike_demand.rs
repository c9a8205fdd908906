//! # 腳踏車需求計算完整範例
//!
//! 這個範例展示從需求到下游單據的完整流程：
//! - 產品：腳踏車（自製），車架（自製）、輪子（採購）、烤漆（委外）
//! - 需求：一張銷售訂單（MTO）與一張預測（MTS）合併計算
//! - 下推：工單、委外工單、採購單，再示範重算與刪除保護

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use mrp_core::{
    Bom, BomLine, BusinessMode, Demand, DemandItem, DocumentKind, InventoryInfo, Material,
    NewComputation, PolicyFlags, SourceType,
};
use mrp_service::memory::{InMemoryDownstream, InMemoryInventory, InMemoryMasterData, StaticPolicy};
use mrp_service::{
    telemetry, Collaborators, DemandComputationService, EngineSettings, GenerateMode,
};
use mrp_store::MemoryStore;
use rust_decimal::Decimal;
use serde_json::json;

const TENANT: i64 = 1;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = EngineSettings::load().unwrap_or_default();
    telemetry::init_tracing(&settings.telemetry.log_level, settings.telemetry.json);

    println!("🚲 ===== 腳踏車需求計算範例 =====");
    println!();

    // ========== 1. 主數據 ==========
    println!("🔧 步驟 1: 建立物料與 BOM");
    let master = Arc::new(
        InMemoryMasterData::new()
            .with_material(
                TENANT,
                Material::new(1, "BIKE-001", "腳踏車")
                    .with_source_type(SourceType::Make)
                    .with_process_route(100)
                    .with_source_config(json!({"production_lead_time": 3})),
            )
            .with_material(
                TENANT,
                Material::new(2, "FRAME-001", "車架")
                    .with_source_type(SourceType::Make)
                    .with_process_route(101)
                    .with_source_config(json!({"production_lead_time": 5}))
                    .with_inventory_defaults(Some(Decimal::from(10)), None),
            )
            .with_material(
                TENANT,
                Material::new(3, "WHEEL-001", "輪子")
                    .with_source_type(SourceType::Buy)
                    .with_source_config(json!({
                        "default_supplier_id": 501,
                        "default_supplier_name": "輪胎供應商",
                        "purchase_price": "85.00",
                        "purchase_lead_time": 7,
                    })),
            )
            .with_material(
                TENANT,
                Material::new(4, "PAINT-001", "烤漆")
                    .with_source_type(SourceType::Outsource)
                    .with_source_config(json!({
                        "outsource_supplier_id": 601,
                        "outsource_operation": "烤漆",
                        "outsource_price": "30.00",
                        "outsource_lead_time": 2,
                    })),
            )
            .with_bom(
                TENANT,
                Bom {
                    id: 10,
                    material_id: 1,
                    bom_code: "BOM-BIKE-001".to_string(),
                    version: "V1".to_string(),
                    approved: true,
                    is_default: true,
                    lines: vec![
                        BomLine::new(2, Decimal::ONE),
                        BomLine::new(3, Decimal::from(2)).with_waste_rate(Decimal::from(5)),
                        BomLine::new(4, Decimal::ONE),
                    ],
                },
            )
            .with_bom(
                TENANT,
                Bom {
                    id: 11,
                    material_id: 2,
                    bom_code: "BOM-FRAME-001".to_string(),
                    version: "V1".to_string(),
                    approved: true,
                    is_default: true,
                    lines: Vec::new(),
                },
            ),
    );
    println!("   ✓ BIKE-001 = 1×FRAME-001 + 2×WHEEL-001（損耗 5%）+ 1×PAINT-001");
    println!();

    // ========== 2. 庫存與需求 ==========
    println!("📦 步驟 2: 建立庫存與需求");
    let inventory = InMemoryInventory::new()
        .with_stock(TENANT, 2, InventoryInfo::new(30.0).with_reserved(5.0))
        .with_stock(TENANT, 3, InventoryInfo::new(100.0).with_in_transit(40.0));

    let store = MemoryStore::new();
    let delivery = (Utc::now() + Duration::days(30)).date_naive();
    store
        .seed_demand(
            Demand::new(1, TENANT, "DM-SO-001", BusinessMode::Mto).with_source("sales_order", 9001),
            vec![DemandItem::new(11, TENANT, 1, 1, Decimal::from(150)).with_delivery_date(delivery)],
        )
        .await;
    store
        .seed_demand(
            Demand::new(2, TENANT, "DM-FC-001", BusinessMode::Mts),
            vec![DemandItem::new(21, TENANT, 2, 1, Decimal::from(100)).with_delivery_date(delivery)],
        )
        .await;
    println!("   ✓ DM-SO-001: 150 台（銷售訂單，MTO）");
    println!("   ✓ DM-FC-001: 100 台（預測，MTS）");
    println!();

    let downstream = Arc::new(InMemoryDownstream::new());
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
    let service = DemandComputationService::new(store, deps, settings.engine.clone());

    // ========== 3. 創建並執行計算 ==========
    println!("⚙️  步驟 3: 合併需求並執行計算");
    let created = service
        .create_computation(
            TENANT,
            NewComputation::for_demands([1, 2]).with_params(json!({"include_in_transit": true})),
            Some(7),
        )
        .await?;
    let computation_id = created.computation.id;
    println!(
        "   ✓ {}（{}，{}）",
        created.computation.computation_code,
        created.computation.computation_type.as_str(),
        created.computation.business_mode.as_str()
    );

    let executed = service.execute_computation(TENANT, computation_id, None).await?;
    println!();
    println!("   {:<10} {:>8} {:>8} {:>8} {:>8} {:>8}", "物料", "毛需求", "可用", "淨需求", "工單", "採購");
    for item in &executed.items {
        println!(
            "   {:<10} {:>8} {:>8} {:>8} {:>8} {:>8}",
            item.material_code,
            item.required_quantity,
            item.available_inventory,
            item.net_requirement,
            item.suggested_work_order_quantity,
            item.suggested_purchase_order_quantity
        );
    }
    println!();

    // ========== 4. 下推 ==========
    println!("📤 步驟 4: 生成下游單據");
    let preview = service
        .get_push_preview(TENANT, computation_id, Default::default())
        .await?;
    println!("   預覽：驗證失敗 {} 筆", preview.validation_failures.len());

    let pushed = service
        .generate_work_orders_and_purchase_orders(TENANT, computation_id, Some(7), GenerateMode::All, false)
        .await?;
    for document in pushed
        .work_orders
        .iter()
        .chain(&pushed.outsource_work_orders)
        .chain(&pushed.purchase_orders)
    {
        println!("   ✓ {} {}", document.kind.label(), document.code);
    }
    println!("   關聯 {} 筆", pushed.relations_created);

    let again = service
        .generate_work_orders_and_purchase_orders(TENANT, computation_id, Some(7), GenerateMode::All, false)
        .await?;
    println!("   再次下推：新單據 {} 張，略過 {} 個物料", again.document_count(), again.skipped_materials.len());
    println!();

    // ========== 5. 重算 ==========
    println!("🔁 步驟 5: 重算");
    service.recompute_computation(TENANT, computation_id, Some(7)).await?;
    let history = service
        .list_computation_recalc_history(TENANT, computation_id, None)
        .await?;
    for record in &history {
        println!(
            "   ✓ {} {:?} 快照 {:?}",
            record.recalc_time.format("%Y-%m-%d %H:%M:%S"),
            record.result,
            record.snapshot_id
        );
    }
    println!();

    // ========== 6. 刪除保護 ==========
    println!("🗑️  步驟 6: 刪除保護");
    if let Some(work_order) = pushed.work_orders.first() {
        downstream
            .set_status(DocumentKind::WorkOrder, work_order.id, "released")
            .await?;
    }
    match service.delete_computation(TENANT, computation_id).await {
        Ok(()) => println!("   ✓ 已刪除"),
        Err(err) => println!("   ⚠ {err}"),
    }

    println!();
    println!("✅ 範例完成");
    Ok(())
}
