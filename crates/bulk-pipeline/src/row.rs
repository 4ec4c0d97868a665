//! 行级校验
//!
//! 每行独立校验：手机号规范化、金额为正整数、失效日期按 IST
//! 当日最后一刻解释。失败原因随行号记入任务的失败样本。

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use cashback_shared::phone::normalize_phone;
use cashback_shared::time::end_of_day_ist;

use crate::csv::ColumnMap;

/// 校验通过的发放行
#[derive(Debug, Clone)]
pub struct BulkRow {
    /// 数据行号（表头后的第一行为 0）
    pub row_index: usize,
    pub phone: String,
    pub amount: i64,
    pub expires_on: DateTime<Utc>,
}

/// 行失败样本（任务记录最多保留前 50 条）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowFailure {
    pub row_index: usize,
    pub reason: String,
}

/// 校验一行数据
pub fn parse_row(
    row_index: usize,
    fields: &[String],
    map: &ColumnMap,
) -> std::result::Result<BulkRow, RowFailure> {
    let fail = |reason: String| RowFailure { row_index, reason };

    let raw_phone = fields
        .get(map.phone)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| fail("手机号列为空".to_string()))?;
    let phone = normalize_phone(raw_phone)
        .ok_or_else(|| fail(format!("无效手机号: {raw_phone}")))?;

    let raw_amount = fields
        .get(map.amount)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| fail("金额列为空".to_string()))?;
    let amount: i64 = raw_amount
        .parse()
        .map_err(|_| fail(format!("金额不是整数: {raw_amount}")))?;
    if amount <= 0 {
        return Err(fail(format!("金额必须为正: {amount}")));
    }

    let raw_expiry = fields
        .get(map.expiry)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| fail("失效日期列为空".to_string()))?;
    let date = parse_expiry_date(raw_expiry)
        .ok_or_else(|| fail(format!("失效日期格式无效: {raw_expiry}")))?;

    Ok(BulkRow {
        row_index,
        phone,
        amount,
        expires_on: end_of_day_ist(date),
    })
}

/// 支持 YYYY-MM-DD 与 DD-MM-YYYY 两种日期写法
fn parse_expiry_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d-%m-%Y"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> ColumnMap {
        ColumnMap {
            phone: 0,
            amount: 1,
            expiry: 2,
        }
    }

    fn fields(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_valid_row_phone_forms() {
        // +91 前缀 / 裸 10 位 / 91 前缀三种写法都规范化为同一形式
        for raw in ["+919876543210", "9876543210", "919876543210"] {
            let row = parse_row(0, &fields(&[raw, "50", "2026-12-31"]), &map()).unwrap();
            assert_eq!(row.phone, "+919876543210");
            assert_eq!(row.amount, 50);
        }
    }

    #[test]
    fn test_both_date_formats() {
        let a = parse_row(0, &fields(&["9876543210", "50", "2026-12-31"]), &map()).unwrap();
        let b = parse_row(0, &fields(&["9876543210", "50", "31-12-2026"]), &map()).unwrap();
        assert_eq!(a.expires_on, b.expires_on);
    }

    #[test]
    fn test_invalid_rows_carry_reason_and_index() {
        // 首位不是 6-9 的手机号
        let err = parse_row(7, &fields(&["1234567890", "50", "2026-12-31"]), &map()).unwrap_err();
        assert_eq!(err.row_index, 7);
        assert!(err.reason.contains("手机号"));

        // 金额为负
        let err = parse_row(8, &fields(&["9876543210", "-5", "2026-12-31"]), &map()).unwrap_err();
        assert!(err.reason.contains("金额"));

        // 日期格式
        let err = parse_row(9, &fields(&["9876543210", "50", "31/12/2026"]), &map()).unwrap_err();
        assert!(err.reason.contains("日期"));

        // 缺列
        let err = parse_row(10, &fields(&["9876543210", "50"]), &map()).unwrap_err();
        assert!(err.reason.contains("失效日期"));
    }
}
