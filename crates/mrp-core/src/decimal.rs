//! 數值轉換
//!
//! 所有數量與金額使用 `Decimal`；來自外部的浮點數一律經字串轉換，避免二進位誤差。

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;

/// 浮點數經字串格式化轉為 Decimal
pub fn from_f64(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_str(&value.to_string())
        .or_else(|_| Decimal::from_scientific(&format!("{value:e}")))
        .ok()
        .map(|d| d.normalize())
}

/// JSON 數值或字串轉 Decimal
pub fn from_json(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::from(i))
            } else {
                Decimal::from_str(&n.to_string())
                    .ok()
                    .or_else(|| n.as_f64().and_then(from_f64))
            }
        }
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

/// Decimal 轉字串（保留精度，去除尾零）
pub fn to_plain_string(value: Decimal) -> String {
    value.normalize().to_string()
}
