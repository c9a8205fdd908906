//! 需求彙總
//!
//! 按物料累加展開後的需求，保留首次出現順序，合併來源需求明細。

use std::collections::HashMap;

use chrono::NaiveDate;
use mrp_core::{Material, RecordId, SourceType};
use rust_decimal::Decimal;

use crate::explosion::LeafRequirement;

/// 單一物料的彙總需求
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedRequirement {
    pub material: Material,
    pub source_type: SourceType,
    /// 毛需求
    pub gross_requirement: Decimal,
    pub demand_item_ids: Vec<RecordId>,
    pub demand_ids: Vec<RecordId>,
    /// 最早交貨日期
    pub delivery_date: Option<NaiveDate>,
}

/// 需求彙總器
#[derive(Debug, Default)]
pub struct RequirementAggregator {
    index: HashMap<RecordId, usize>,
    entries: Vec<AggregatedRequirement>,
}

impl RequirementAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入一筆需求明細展開出的全部需求
    pub fn add_all(
        &mut self,
        leaves: Vec<LeafRequirement>,
        demand_id: RecordId,
        demand_item_id: RecordId,
        delivery_date: Option<NaiveDate>,
    ) {
        for leaf in leaves {
            self.add(leaf, demand_id, demand_item_id, delivery_date);
        }
    }

    pub fn add(
        &mut self,
        leaf: LeafRequirement,
        demand_id: RecordId,
        demand_item_id: RecordId,
        delivery_date: Option<NaiveDate>,
    ) {
        let material_id = leaf.material.id;
        let position = match self.index.get(&material_id) {
            Some(&position) => position,
            None => {
                let position = self.entries.len();
                self.index.insert(material_id, position);
                self.entries.push(AggregatedRequirement {
                    material: leaf.material,
                    source_type: leaf.source_type,
                    gross_requirement: Decimal::ZERO,
                    demand_item_ids: Vec::new(),
                    demand_ids: Vec::new(),
                    delivery_date: None,
                });
                position
            }
        };

        let entry = &mut self.entries[position];
        entry.gross_requirement += leaf.required_quantity;
        if !entry.demand_item_ids.contains(&demand_item_id) {
            entry.demand_item_ids.push(demand_item_id);
        }
        if !entry.demand_ids.contains(&demand_id) {
            entry.demand_ids.push(demand_id);
        }
        entry.delivery_date = match (entry.delivery_date, delivery_date) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_requirements(self) -> Vec<AggregatedRequirement> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: RecordId, quantity: i64) -> LeafRequirement {
        LeafRequirement {
            material: Material::new(id, format!("M{id}"), format!("物料{id}")),
            source_type: SourceType::Buy,
            required_quantity: Decimal::from(quantity),
            level: 1,
        }
    }

    #[test]
    fn test_aggregation_sums_and_unions() {
        let d1 = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2025, 3, 5).unwrap();

        let mut aggregator = RequirementAggregator::new();
        aggregator.add_all(vec![leaf(1, 10), leaf(2, 20)], 100, 1000, Some(d1));
        aggregator.add_all(vec![leaf(2, 5)], 101, 1001, Some(d2));
        aggregator.add_all(vec![leaf(2, 1)], 101, 1001, None);

        let requirements = aggregator.into_requirements();
        assert_eq!(requirements.len(), 2);
        assert_eq!(requirements[0].material.id, 1);

        let m2 = &requirements[1];
        assert_eq!(m2.gross_requirement, Decimal::from(26));
        assert_eq!(m2.demand_item_ids, vec![1000, 1001]);
        assert_eq!(m2.demand_ids, vec![100, 101]);
        assert_eq!(m2.delivery_date, Some(d2));
    }
}
