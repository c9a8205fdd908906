//! 計算編碼生成
//!
//! 格式：`<MRP|LRP>-YYYYMMDD-<序號|NEW>`，日期取伺服器 UTC 日期。

use chrono::NaiveDate;
use mrp_core::ComputationType;

/// 當日編碼前綴，例如 `MRP-20250101-`
pub fn code_prefix(computation_type: ComputationType, date: NaiveDate) -> String {
    format!("{}-{}-", computation_type.as_str(), date.format("%Y%m%d"))
}

/// 生成計算編碼；取不到序號時使用 `NEW`
pub fn computation_code(computation_type: ComputationType, date: NaiveDate, sequence: Option<u32>) -> String {
    let prefix = code_prefix(computation_type, date);
    match sequence {
        Some(seq) => format!("{prefix}{seq:04}"),
        None => format!("{prefix}NEW"),
    }
}

/// 從既有編碼解析序號
pub fn parse_sequence(code: &str, prefix: &str) -> Option<u32> {
    code.strip_prefix(prefix)?.parse().ok()
}

/// 既有編碼中最大序號加一；`NEW` 之類無法解析的編碼不計
pub fn next_sequence<'a>(codes: impl IntoIterator<Item = &'a str>, prefix: &str) -> u32 {
    codes
        .into_iter()
        .filter_map(|code| parse_sequence(code, prefix))
        .max()
        .unwrap_or(0)
        + 1
}
