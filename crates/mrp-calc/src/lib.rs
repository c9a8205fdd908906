//! # MRP Calculation Engine
//!
//! 需求計算的核心演算法：BOM 展開、需求彙總、淨需求、LRP 時間窗、結果比對

pub mod aggregation;
pub mod code_gen;
pub mod diff;
pub mod explosion;
pub mod lead_time;
pub mod netting;
pub mod params;

// Re-export 主要類型
pub use aggregation::{AggregatedRequirement, RequirementAggregator};
pub use diff::{compare, ComputationDiff, MaterialDiff, MaterialPresence};
pub use explosion::{BomExpander, ExpansionOptions, LeafRequirement, DEFAULT_MAX_DEPTH};
pub use lead_time::{LeadTimeCalculator, PlanningWindow};
pub use netting::{NetRequirement, NettingCalculator, NettingFlags};
pub use params::{merge_scoped, StockParameters};
