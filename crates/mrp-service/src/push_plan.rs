//! 下推計劃
//!
//! 把計算明細依下推範圍整理成待建立的下游單據；
//! 實際下推、下推預覽與下推選項共用同一份計劃。

use chrono::NaiveDate;
use mrp_core::{
    DemandComputationItem, DocumentLine, MrpError, RecordId, Result, SourceConfig, SourceType,
    SupplierRef,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ledger::PushExclusions;

/// 生成模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerateMode {
    All,
    WorkOrderOnly,
    PurchaseOnly,
    OutsourceOnly,
}

impl GenerateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::WorkOrderOnly => "work_order_only",
            Self::PurchaseOnly => "purchase_only",
            Self::OutsourceOnly => "outsource_only",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "all" => Ok(Self::All),
            "work_order_only" => Ok(Self::WorkOrderOnly),
            "purchase_only" => Ok(Self::PurchaseOnly),
            "outsource_only" => Ok(Self::OutsourceOnly),
            other => Err(MrpError::validation(format!("不支持的生成模式: {other}"))),
        }
    }
}

/// 生產側下推方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionPush {
    Plan,
    WorkOrder,
}

/// 採購側下推方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchasePush {
    Requisition,
    PurchaseOrder,
}

/// 一鍵下推配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushConfig {
    pub production: Option<ProductionPush>,
    pub purchase: Option<PurchasePush>,
    #[serde(default = "default_include_outsource")]
    pub include_outsource: bool,
}

fn default_include_outsource() -> bool {
    true
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            production: None,
            purchase: None,
            include_outsource: default_include_outsource(),
        }
    }
}

/// 下推範圍
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushScope {
    pub production: Option<ProductionPush>,
    pub purchase: Option<PurchasePush>,
    pub outsource: bool,
}

impl PushScope {
    /// 該來源類型的明細是否在範圍內
    pub fn covers(&self, source_type: SourceType) -> bool {
        match source_type {
            SourceType::Make | SourceType::Configure => self.production.is_some(),
            SourceType::Outsource => self.outsource,
            SourceType::Buy => self.purchase.is_some(),
            SourceType::Phantom => false,
        }
    }

    pub fn creates_work_orders(&self) -> bool {
        self.production == Some(ProductionPush::WorkOrder)
    }
}

impl From<GenerateMode> for PushScope {
    fn from(mode: GenerateMode) -> Self {
        let (production, purchase, outsource) = match mode {
            GenerateMode::All => (
                Some(ProductionPush::WorkOrder),
                Some(PurchasePush::PurchaseOrder),
                true,
            ),
            GenerateMode::WorkOrderOnly => (Some(ProductionPush::WorkOrder), None, false),
            GenerateMode::PurchaseOnly => (None, Some(PurchasePush::PurchaseOrder), false),
            GenerateMode::OutsourceOnly => (None, None, true),
        };
        Self {
            production,
            purchase,
            outsource,
        }
    }
}

impl From<PushConfig> for PushScope {
    fn from(config: PushConfig) -> Self {
        Self {
            production: config.production,
            purchase: config.purchase,
            outsource: config.include_outsource,
        }
    }
}

/// 工單草案（按物料彙總）
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct WorkOrderDraft {
    pub material_id: RecordId,
    pub material_code: String,
    pub material_name: String,
    pub quantity: Decimal,
    pub process_route_id: Option<RecordId>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// 委外工單草案（每個明細一張）
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OutsourceDraft {
    pub material_id: RecordId,
    pub material_code: String,
    pub material_name: String,
    pub quantity: Decimal,
    pub supplier: Option<SupplierRef>,
    pub operation: Option<String>,
    pub unit_price: Option<Decimal>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// 同一供應商的採購明細
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PurchaseGroup {
    pub supplier: SupplierRef,
    pub lines: Vec<DocumentLine>,
}

/// 缺少預設供應商、需走採購申請的物料
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionCandidate {
    pub material_id: RecordId,
    pub material_code: String,
    pub material_name: String,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct PushPlan {
    pub work_orders: Vec<WorkOrderDraft>,
    pub outsource_orders: Vec<OutsourceDraft>,
    pub purchase_groups: Vec<PurchaseGroup>,
    pub plan_lines: Vec<DocumentLine>,
    pub requisition_lines: Vec<DocumentLine>,
    pub requisition_required: Vec<RequisitionCandidate>,
    /// 已被既有單據涵蓋而略過的物料
    pub skipped_materials: Vec<RecordId>,
    /// 會產生單據、需要預先驗證的物料
    pub targets: Vec<(RecordId, SourceType)>,
}

impl PushPlan {
    pub fn build(items: &[DemandComputationItem], exclusions: &PushExclusions, scope: PushScope) -> Self {
        let mut plan = Self::default();
        for item in items {
            let Some(source_type) = item.material_source_type else {
                continue;
            };
            if !scope.covers(source_type) {
                continue;
            }
            let config = item
                .material_source_config
                .as_ref()
                .and_then(SourceConfig::from_snapshot)
                .filter(|c| c.source_type() == source_type)
                .unwrap_or_else(|| SourceConfig::parse(source_type, &Value::Null));

            match source_type {
                SourceType::Make | SourceType::Configure => {
                    plan.add_production(item, &config, exclusions, scope)
                }
                SourceType::Outsource => plan.add_outsource(item, &config, exclusions),
                SourceType::Buy => plan.add_purchase(item, &config, exclusions, scope),
                SourceType::Phantom => {}
            }
        }
        plan
    }

    fn add_production(
        &mut self,
        item: &DemandComputationItem,
        config: &SourceConfig,
        exclusions: &PushExclusions,
        scope: PushScope,
    ) {
        let quantity = item.suggested_work_order_quantity;
        if quantity <= Decimal::ZERO {
            return;
        }
        match scope.production {
            Some(ProductionPush::WorkOrder) => {
                if exclusions.work_order_materials.contains(&item.material_id) {
                    self.skip(item.material_id);
                    return;
                }
                let process_route_id = match config {
                    SourceConfig::Make { process_route_id, .. } => *process_route_id,
                    _ => None,
                };
                match self
                    .work_orders
                    .iter_mut()
                    .find(|d| d.material_id == item.material_id)
                {
                    Some(draft) => {
                        draft.quantity += quantity;
                        draft.start_date = earliest(draft.start_date, item.production_start_date);
                        draft.end_date = latest(draft.end_date, item.production_completion_date);
                    }
                    None => self.work_orders.push(WorkOrderDraft {
                        material_id: item.material_id,
                        material_code: item.material_code.clone(),
                        material_name: item.material_name.clone(),
                        quantity,
                        process_route_id,
                        start_date: item.production_start_date,
                        end_date: item.production_completion_date,
                    }),
                }
                self.target(item);
            }
            Some(ProductionPush::Plan) => {
                if exclusions.production_plan_exists {
                    self.skip(item.material_id);
                    return;
                }
                self.plan_lines.push(line(
                    item,
                    quantity,
                    None,
                    item.production_start_date,
                    item.production_completion_date.or(item.delivery_date),
                ));
                self.target(item);
            }
            None => {}
        }
    }

    fn add_outsource(&mut self, item: &DemandComputationItem, config: &SourceConfig, exclusions: &PushExclusions) {
        let quantity = item.suggested_work_order_quantity;
        if quantity <= Decimal::ZERO {
            return;
        }
        if exclusions.outsource_materials.contains(&item.material_id) {
            self.skip(item.material_id);
            return;
        }
        let (supplier, operation, unit_price) = match config {
            SourceConfig::Outsource {
                supplier_id,
                supplier_name,
                operation,
                price,
                ..
            } => (
                supplier_id.map(|id| SupplierRef::new(id, supplier_name.clone())),
                operation.clone(),
                *price,
            ),
            _ => (None, None, None),
        };
        self.outsource_orders.push(OutsourceDraft {
            material_id: item.material_id,
            material_code: item.material_code.clone(),
            material_name: item.material_name.clone(),
            quantity,
            supplier,
            operation,
            unit_price,
            start_date: item.production_start_date,
            end_date: item.production_completion_date.or(item.delivery_date),
        });
        self.target(item);
    }

    fn add_purchase(
        &mut self,
        item: &DemandComputationItem,
        config: &SourceConfig,
        exclusions: &PushExclusions,
        scope: PushScope,
    ) {
        let quantity = item.suggested_purchase_order_quantity;
        if quantity <= Decimal::ZERO {
            return;
        }
        let unit_price = match config {
            SourceConfig::Buy { purchase_price, .. } => *purchase_price,
            _ => None,
        };
        let required_date = item.procurement_completion_date.or(item.delivery_date);

        match scope.purchase {
            Some(PurchasePush::PurchaseOrder) => match config.default_supplier() {
                Some((supplier_id, supplier_name)) => {
                    if exclusions.purchase_order_materials.contains(&item.material_id) {
                        self.skip(item.material_id);
                        return;
                    }
                    let line = line(item, quantity, unit_price, item.procurement_start_date, required_date);
                    match self
                        .purchase_groups
                        .iter_mut()
                        .find(|g| g.supplier.id == supplier_id)
                    {
                        Some(group) => group.lines.push(line),
                        None => self.purchase_groups.push(PurchaseGroup {
                            supplier: SupplierRef::new(supplier_id, supplier_name),
                            lines: vec![line],
                        }),
                    }
                    self.target(item);
                }
                None => self.requisition_required.push(RequisitionCandidate {
                    material_id: item.material_id,
                    material_code: item.material_code.clone(),
                    material_name: item.material_name.clone(),
                    quantity,
                }),
            },
            Some(PurchasePush::Requisition) => {
                if exclusions.purchase_requisition_exists {
                    self.skip(item.material_id);
                    return;
                }
                self.requisition_lines.push(line(
                    item,
                    quantity,
                    unit_price,
                    item.procurement_start_date,
                    required_date,
                ));
                self.target(item);
            }
            None => {}
        }
    }

    fn skip(&mut self, material_id: RecordId) {
        if !self.skipped_materials.contains(&material_id) {
            self.skipped_materials.push(material_id);
        }
    }

    fn target(&mut self, item: &DemandComputationItem) {
        if let Some(source_type) = item.material_source_type {
            let target = (item.material_id, source_type);
            if !self.targets.contains(&target) {
                self.targets.push(target);
            }
        }
    }

    pub fn production_plan_count(&self) -> usize {
        usize::from(!self.plan_lines.is_empty())
    }

    pub fn purchase_requisition_count(&self) -> usize {
        usize::from(!self.requisition_lines.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.work_orders.is_empty()
            && self.outsource_orders.is_empty()
            && self.purchase_groups.is_empty()
            && self.plan_lines.is_empty()
            && self.requisition_lines.is_empty()
    }
}

fn line(
    item: &DemandComputationItem,
    quantity: Decimal,
    unit_price: Option<Decimal>,
    start_date: Option<NaiveDate>,
    required_date: Option<NaiveDate>,
) -> DocumentLine {
    DocumentLine {
        material_id: item.material_id,
        material_code: item.material_code.clone(),
        material_name: item.material_name.clone(),
        material_unit: item.material_unit.clone(),
        quantity,
        unit_price,
        start_date,
        required_date,
    }
}

fn earliest(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Option<NaiveDate> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn latest(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Option<NaiveDate> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}
