//! # Demand Engine
//!
//! 統一需求計算引擎：把審核通過的需求展開、淨算為物料計劃，
//! 再依下推策略生成工單、委外工單、採購單、生產計劃與採購申請。
//!
//! - [`core`]：領域模型、錯誤型別與協作者介面
//! - [`calc`]：BOM 展開、需求彙總、淨算、LRP 時間窗與計算比對
//! - [`store`]：儲存層（記憶體與 PostgreSQL）
//! - [`service`]：計算編排、下游生成與關聯帳本

pub use mrp_calc as calc;
pub use mrp_core as core;
pub use mrp_service as service;
pub use mrp_store as store;

pub use mrp_core::{MrpError, Result};
pub use mrp_service::{Collaborators, DemandComputationService, EngineConfig, EngineSettings};
