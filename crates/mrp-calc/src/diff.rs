//! 計算結果比對

use std::collections::HashMap;

use mrp_core::{DemandComputation, DemandComputationItem, RecordId};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

/// 欄位比對
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDiff<T> {
    pub equal: bool,
    pub first: T,
    pub second: T,
}

impl<T: PartialEq> FieldDiff<T> {
    fn new(first: T, second: T) -> Self {
        Self {
            equal: first == second,
            first,
            second,
        }
    }
}

/// 數值差異（second - first）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuantityDelta {
    pub first: Decimal,
    pub second: Decimal,
    pub difference: Decimal,
}

impl QuantityDelta {
    fn new(first: Decimal, second: Decimal) -> Self {
        Self {
            first,
            second,
            difference: second - first,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.difference.is_zero()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuantityDeltas {
    pub required_quantity: QuantityDelta,
    pub available_inventory: QuantityDelta,
    pub net_requirement: QuantityDelta,
    pub suggested_work_order_quantity: QuantityDelta,
    pub suggested_purchase_order_quantity: QuantityDelta,
}

impl QuantityDeltas {
    fn between(first: &DemandComputationItem, second: &DemandComputationItem) -> Self {
        Self {
            required_quantity: QuantityDelta::new(first.required_quantity, second.required_quantity),
            available_inventory: QuantityDelta::new(first.available_inventory, second.available_inventory),
            net_requirement: QuantityDelta::new(first.net_requirement, second.net_requirement),
            suggested_work_order_quantity: QuantityDelta::new(
                first.suggested_work_order_quantity,
                second.suggested_work_order_quantity,
            ),
            suggested_purchase_order_quantity: QuantityDelta::new(
                first.suggested_purchase_order_quantity,
                second.suggested_purchase_order_quantity,
            ),
        }
    }

    pub fn all_zero(&self) -> bool {
        [
            self.required_quantity,
            self.available_inventory,
            self.net_requirement,
            self.suggested_work_order_quantity,
            self.suggested_purchase_order_quantity,
        ]
        .iter()
        .all(QuantityDelta::is_zero)
    }
}

/// 物料出現在哪一方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialPresence {
    Both,
    OnlyInFirst,
    OnlyInSecond,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialDiff {
    pub material_id: RecordId,
    pub material_code: String,
    pub material_name: String,
    pub presence: MaterialPresence,
    pub deltas: Option<QuantityDeltas>,
}

impl MaterialDiff {
    pub fn has_difference(&self) -> bool {
        match (&self.presence, &self.deltas) {
            (MaterialPresence::Both, Some(deltas)) => !deltas.all_zero(),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputationRef {
    pub id: RecordId,
    pub computation_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasicDiff {
    pub computation_type: FieldDiff<String>,
    pub computation_params: FieldDiff<Value>,
    pub computation_summary: FieldDiff<Value>,
}

impl BasicDiff {
    fn differences(&self) -> usize {
        [
            self.computation_type.equal,
            self.computation_params.equal,
            self.computation_summary.equal,
        ]
        .iter()
        .filter(|equal| !**equal)
        .count()
    }
}

/// 兩次計算的比對報告
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputationDiff {
    pub computation1: ComputationRef,
    pub computation2: ComputationRef,
    pub basic_diff: BasicDiff,
    pub material_diffs: Vec<MaterialDiff>,
    pub total_differences: usize,
}

/// 比對兩次計算
pub fn compare(
    first: &DemandComputation,
    first_items: &[DemandComputationItem],
    second: &DemandComputation,
    second_items: &[DemandComputationItem],
) -> ComputationDiff {
    let basic_diff = BasicDiff {
        computation_type: FieldDiff::new(
            first.computation_type.as_str().to_string(),
            second.computation_type.as_str().to_string(),
        ),
        computation_params: FieldDiff::new(
            first.computation_params.to_value(),
            second.computation_params.to_value(),
        ),
        computation_summary: FieldDiff::new(
            first.computation_summary.clone().unwrap_or(Value::Null),
            second.computation_summary.clone().unwrap_or(Value::Null),
        ),
    };

    let second_by_material: HashMap<RecordId, &DemandComputationItem> =
        second_items.iter().map(|i| (i.material_id, i)).collect();
    let first_by_material: HashMap<RecordId, &DemandComputationItem> =
        first_items.iter().map(|i| (i.material_id, i)).collect();

    let mut material_diffs = Vec::new();
    for item in first_items {
        let diff = match second_by_material.get(&item.material_id) {
            Some(other) => MaterialDiff {
                material_id: item.material_id,
                material_code: item.material_code.clone(),
                material_name: item.material_name.clone(),
                presence: MaterialPresence::Both,
                deltas: Some(QuantityDeltas::between(item, other)),
            },
            None => asymmetric(item, MaterialPresence::OnlyInFirst),
        };
        material_diffs.push(diff);
    }
    for item in second_items {
        if !first_by_material.contains_key(&item.material_id) {
            material_diffs.push(asymmetric(item, MaterialPresence::OnlyInSecond));
        }
    }

    let total_differences = basic_diff.differences()
        + material_diffs.iter().filter(|d| d.has_difference()).count();

    ComputationDiff {
        computation1: ComputationRef {
            id: first.id,
            computation_code: first.computation_code.clone(),
        },
        computation2: ComputationRef {
            id: second.id,
            computation_code: second.computation_code.clone(),
        },
        basic_diff,
        material_diffs,
        total_differences,
    }
}

fn asymmetric(item: &DemandComputationItem, presence: MaterialPresence) -> MaterialDiff {
    MaterialDiff {
        material_id: item.material_id,
        material_code: item.material_code.clone(),
        material_name: item.material_name.clone(),
        presence,
        deltas: None,
    }
}
