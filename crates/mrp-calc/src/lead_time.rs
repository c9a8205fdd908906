//! 交期計算（LRP 時間窗）
//!
//! 提前期以日曆天計算。

use chrono::{Duration, NaiveDate};
use mrp_core::{SourceConfig, SourceType};
use rust_decimal::Decimal;

/// 生產/採購時間窗
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanningWindow {
    pub planned_production: Option<Decimal>,
    pub planned_procurement: Option<Decimal>,
    pub production_start_date: Option<NaiveDate>,
    pub production_completion_date: Option<NaiveDate>,
    pub procurement_start_date: Option<NaiveDate>,
    pub procurement_completion_date: Option<NaiveDate>,
}

/// 交期計算器
pub struct LeadTimeCalculator;

impl LeadTimeCalculator {
    /// 計算開工/下單日期（向後推算提前期）
    pub fn calculate_order_date(required_date: NaiveDate, lead_time_days: i64) -> NaiveDate {
        required_date - Duration::days(lead_time_days.max(0))
    }

    /// 計算完工/到貨日期（向前推算提前期）
    pub fn calculate_delivery_date(order_date: NaiveDate, lead_time_days: i64) -> NaiveDate {
        order_date + Duration::days(lead_time_days.max(0))
    }

    /// 依來源類型計算 LRP 時間窗
    ///
    /// 有交貨日期時：完成日 = 交貨日，開始日 = 交貨日 - 提前期；
    /// 無交貨日期時：開始日 = 今日，完成日 = 今日 + 提前期。
    pub fn plan(
        config: &SourceConfig,
        net_requirement: Decimal,
        delivery_date: Option<NaiveDate>,
        today: NaiveDate,
    ) -> PlanningWindow {
        let lead_time = config.lead_time_days();
        let (start, completion) = match delivery_date {
            Some(date) => (Self::calculate_order_date(date, lead_time), date),
            None => (today, Self::calculate_delivery_date(today, lead_time)),
        };

        let mut window = PlanningWindow::default();
        match config.source_type() {
            SourceType::Make | SourceType::Configure | SourceType::Outsource => {
                window.planned_production = Some(net_requirement);
                window.production_start_date = Some(start);
                window.production_completion_date = Some(completion);
            }
            SourceType::Buy => {
                window.planned_procurement = Some(net_requirement);
                window.procurement_start_date = Some(start);
                window.procurement_completion_date = Some(completion);
            }
            SourceType::Phantom => {}
        }
        window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_lead_time_roundtrip() {
        let required = date(2025, 11, 1);
        let order_date = LeadTimeCalculator::calculate_order_date(required, 5);

        assert_eq!(order_date, date(2025, 10, 27));
        assert_eq!(LeadTimeCalculator::calculate_delivery_date(order_date, 5), required);
    }

    #[test]
    fn test_production_window_from_delivery_date() {
        let config = SourceConfig::parse(SourceType::Make, &json!({"production_lead_time": 3}));
        let window = LeadTimeCalculator::plan(&config, Decimal::from(10), Some(date(2025, 6, 10)), date(2025, 6, 1));

        assert_eq!(window.planned_production, Some(Decimal::from(10)));
        assert_eq!(window.production_start_date, Some(date(2025, 6, 7)));
        assert_eq!(window.production_completion_date, Some(date(2025, 6, 10)));
        assert_eq!(window.procurement_start_date, None);
    }

    #[test]
    fn test_procurement_window_without_delivery_date() {
        let config = SourceConfig::parse(SourceType::Buy, &json!({"purchase_lead_time": 7}));
        let window = LeadTimeCalculator::plan(&config, Decimal::from(4), None, date(2025, 6, 1));

        assert_eq!(window.planned_procurement, Some(Decimal::from(4)));
        assert_eq!(window.procurement_start_date, Some(date(2025, 6, 1)));
        assert_eq!(window.procurement_completion_date, Some(date(2025, 6, 8)));
        assert_eq!(window.planned_production, None);
    }
}
