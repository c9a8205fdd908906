//! MRP / LRP 執行
//!
//! 對計算的每個需求明細展開 BOM，按物料彙總毛需求，再逐物料淨算並產生建議數量。
//! LRP 另外依來源提前期推算生產/採購時間窗。

use chrono::NaiveDate;
use mrp_calc::{
    AggregatedRequirement, BomExpander, ExpansionOptions, LeadTimeCalculator, NettingCalculator,
    NettingFlags, RequirementAggregator, StockParameters,
};
use mrp_core::{
    ComputationParams, ComputationType, DemandComputation, DemandComputationItem, MrpError,
    Result, SourceConfig, TenantId,
};
use mrp_store::{Store, StoreTx};
use serde_json::json;
use tracing::{debug, info};

use crate::config_resolver::ConfigResolver;
use crate::settings::EngineConfig;
use crate::validator::SourceValidator;
use crate::Collaborators;

pub(crate) struct ComputationExecutor<'a, S: Store> {
    store: &'a S,
    deps: &'a Collaborators,
    settings: &'a EngineConfig,
}

impl<'a, S: Store> ComputationExecutor<'a, S> {
    pub(crate) fn new(store: &'a S, deps: &'a Collaborators, settings: &'a EngineConfig) -> Self {
        Self {
            store,
            deps,
            settings,
        }
    }

    /// 產生計算明細（尚未寫入）
    pub(crate) async fn run(
        &self,
        tx: &mut S::Tx,
        computation: &DemandComputation,
        params: &ComputationParams,
        today: NaiveDate,
    ) -> Result<Vec<DemandComputationItem>> {
        let tenant_id = computation.tenant_id;
        let requirements = self.collect_requirements(tx, computation, params).await?;
        info!(
            computation_id = computation.id,
            materials = requirements.len(),
            computation_type = computation.computation_type.as_str(),
            "需求彙總完成"
        );

        let mut items = Vec::with_capacity(requirements.len());
        for requirement in requirements {
            let item = self
                .resolve_item(tenant_id, computation.computation_type, requirement, params, today)
                .await?;
            items.push(item);
        }
        Ok(items)
    }

    async fn collect_requirements(
        &self,
        tx: &mut S::Tx,
        computation: &DemandComputation,
        params: &ComputationParams,
    ) -> Result<Vec<AggregatedRequirement>> {
        let tenant_id = computation.tenant_id;
        let policy = self.deps.policy.policy_flags(tenant_id).await?;
        let options = ExpansionOptions::from_params(params, &policy, self.settings.bom_max_depth);
        let expander = BomExpander::new(self.deps.materials.as_ref(), self.deps.boms.as_ref(), &options);

        let mut aggregator = RequirementAggregator::new();
        for &demand_id in &computation.demand_ids {
            let demand = tx
                .get_demand(tenant_id, demand_id)
                .await?
                .ok_or_else(|| MrpError::not_found(format!("需求不存在: {demand_id}")))?;
            let demand_items = tx.list_demand_items(tenant_id, demand.id).await?;
            debug!(demand_id, items = demand_items.len(), "展開需求明細");

            for item in demand_items {
                let leaves = expander
                    .expand(tenant_id, item.material_id, item.required_quantity)
                    .await?;
                aggregator.add_all(leaves, demand.id, item.id, item.delivery_date);
            }
        }
        Ok(aggregator.into_requirements())
    }

    async fn resolve_item(
        &self,
        tenant_id: TenantId,
        computation_type: ComputationType,
        requirement: AggregatedRequirement,
        params: &ComputationParams,
        today: NaiveDate,
    ) -> Result<DemandComputationItem> {
        let material = &requirement.material;
        let source_type = requirement.source_type;
        let warehouse_id = params.warehouse_id();

        let config_params = ConfigResolver::new(self.store)
            .resolve(tenant_id, Some(material.id), warehouse_id)
            .await?;
        let effective = config_params.merged_with(params);
        let stock = StockParameters::resolve(&config_params, material, params);

        let position = self
            .deps
            .inventory
            .get_inventory(tenant_id, material.id, warehouse_id)
            .await?
            .position();
        let net = NettingCalculator::calculate(
            requirement.gross_requirement,
            &position,
            stock.safety_stock,
            stock.reorder_point,
            NettingFlags::from_params(&effective),
        );

        let validation = SourceValidator::new(self.deps.materials.as_ref(), self.deps.boms.as_ref())
            .validate_material(tenant_id, material, source_type)
            .await?;
        let (work_order, purchase) =
            NettingCalculator::suggest(Some(source_type), net.net_requirement, validation.passed());
        let visible = stock.visible(&effective);

        let mut item = DemandComputationItem::new(material.id, &material.main_code, &material.name);
        item.tenant_id = tenant_id;
        item.material_spec = material.specification.clone();
        item.material_unit = material.base_unit.clone();
        item.required_quantity = requirement.gross_requirement;
        item.available_inventory = net.available;
        item.net_requirement = net.net_requirement;
        item.safety_stock = visible.safety_stock;
        item.reorder_point = visible.reorder_point;
        item.suggested_work_order_quantity = work_order;
        item.suggested_purchase_order_quantity = purchase;
        item.delivery_date = requirement.delivery_date;
        item.material_source_type = Some(source_type);
        item.material_source_config = Some(SourceConfig::snapshot(source_type, &material.source_config));
        item.source_validation_passed = validation.passed();
        item.source_validation_errors = validation.errors;
        item.demand_item_ids = requirement.demand_item_ids;
        item.detail_results = Some(json!({
            "on_hand": position.on_hand,
            "available_quantity": position.available_quantity,
            "reserved_quantity": position.reserved_quantity,
            "in_transit_quantity": position.in_transit_quantity,
            "supply": net.supply,
            "warnings": validation.warnings,
        }));

        if computation_type == ComputationType::Lrp {
            let window = LeadTimeCalculator::plan(
                &material.source_config_for(source_type),
                net.net_requirement,
                requirement.delivery_date,
                today,
            );
            item.planned_production = window.planned_production;
            item.planned_procurement = window.planned_procurement;
            item.production_start_date = window.production_start_date;
            item.production_completion_date = window.production_completion_date;
            item.procurement_start_date = window.procurement_start_date;
            item.procurement_completion_date = window.procurement_completion_date;
        }

        debug!(
            material_id = material.id,
            source_type = source_type.as_str(),
            gross = %item.required_quantity,
            net = %item.net_requirement,
            "物料淨算完成"
        );
        Ok(item)
    }
}
