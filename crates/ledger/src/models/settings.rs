//! 全局配置单例
//!
//! 账本对配置只读。余额上限、过期天数、默认发放规则与抵扣上限
//! 规则都集中在单行 settings 记录中。

use serde::{Deserialize, Serialize};

use super::enums::RuleKind;

/// 发放/抵扣规则
///
/// fixed 直接取 value；percentage 取订单小计的 value%。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationRule {
    #[serde(rename = "type")]
    pub kind: RuleKind,
    pub value: f64,
}

impl AllocationRule {
    /// 对订单小计应用规则，返回未取整的金额
    pub fn apply(&self, subtotal: f64) -> f64 {
        match self.kind {
            RuleKind::Fixed => self.value,
            RuleKind::Percentage => subtotal * self.value / 100.0,
        }
    }
}

/// 返现折扣码规则
///
/// 订单携带匹配的折扣码时走该规则计算返现；`stack_with_allocation`
/// 为 true 的规则在此基础上叠加默认发放规则。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashbackCode {
    /// 折扣码前缀（大小写不敏感匹配）
    pub code: String,
    #[serde(rename = "type")]
    pub kind: RuleKind,
    pub value: f64,
    /// 是否叠加默认发放规则
    pub stack_with_allocation: bool,
}

impl CashbackCode {
    /// 折扣码是否命中该规则
    pub fn matches(&self, discount_code: &str) -> bool {
        discount_code
            .to_ascii_lowercase()
            .starts_with(&self.code.to_ascii_lowercase())
    }

    /// 对订单小计应用码规则，返回未取整的金额
    pub fn apply(&self, subtotal: f64) -> f64 {
        match self.kind {
            RuleKind::Fixed => self.value,
            RuleKind::Percentage => subtotal * self.value / 100.0,
        }
    }
}

/// 全局配置（单行记录，id 恒为 1）
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub id: i16,
    /// 钱包余额上限，发放时按 max_cashback - balance 截断
    pub max_cashback: i64,
    /// 批次有效期天数
    pub expiry_period_days: i32,
    /// 默认发放规则
    #[sqlx(json)]
    pub order_allocation: AllocationRule,
    /// 结算抵扣上限规则
    #[sqlx(json)]
    pub usage_rule: AllocationRule,
    /// 返现折扣码规则列表
    #[sqlx(json)]
    pub cashback_codes: Vec<CashbackCode>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Settings {
    /// 查找命中任一折扣码的返现规则
    pub fn matching_code(&self, discount_codes: &[String]) -> Option<&CashbackCode> {
        self.cashback_codes
            .iter()
            .find(|rule| discount_codes.iter().any(|code| rule.matches(code)))
    }

    /// 结算时允许抵扣的上限：min(余额, 抵扣规则计算值)，下限 0
    pub fn redeemable(&self, balance: i64, subtotal: f64) -> i64 {
        let by_rule = self.usage_rule.apply(subtotal).round() as i64;
        balance.min(by_rule).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn settings() -> Settings {
        Settings {
            id: 1,
            max_cashback: 500,
            expiry_period_days: 90,
            order_allocation: AllocationRule {
                kind: RuleKind::Percentage,
                value: 5.0,
            },
            usage_rule: AllocationRule {
                kind: RuleKind::Percentage,
                value: 20.0,
            },
            cashback_codes: vec![
                CashbackCode {
                    code: "CB10".to_string(),
                    kind: RuleKind::Percentage,
                    value: 10.0,
                    stack_with_allocation: false,
                },
                CashbackCode {
                    code: "FLAT50".to_string(),
                    kind: RuleKind::Fixed,
                    value: 50.0,
                    stack_with_allocation: true,
                },
            ],
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_allocation_rule_apply() {
        let fixed = AllocationRule {
            kind: RuleKind::Fixed,
            value: 30.0,
        };
        assert!((fixed.apply(1000.0) - 30.0).abs() < f64::EPSILON);

        let percentage = AllocationRule {
            kind: RuleKind::Percentage,
            value: 5.0,
        };
        assert!((percentage.apply(1000.0) - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_matching_code_case_insensitive_prefix() {
        let s = settings();

        // 前缀 + 大小写不敏感
        let matched = s.matching_code(&["cb10-summer".to_string()]);
        assert_eq!(matched.map(|c| c.code.as_str()), Some("CB10"));

        // 未命中
        assert!(s.matching_code(&["WELCOME".to_string()]).is_none());

        // 多个折扣码时任一命中即可
        let matched = s.matching_code(&["WELCOME".to_string(), "FLAT50X".to_string()]);
        assert_eq!(matched.map(|c| c.code.as_str()), Some("FLAT50"));
    }

    #[test]
    fn test_redeemable_capped_by_balance_and_rule() {
        let s = settings();

        // 规则允许 200，余额 150 -> 取余额
        assert_eq!(s.redeemable(150, 1000.0), 150);

        // 规则允许 200，余额 500 -> 取规则值
        assert_eq!(s.redeemable(500, 1000.0), 200);

        // 不为负
        assert_eq!(s.redeemable(0, 1000.0), 0);
    }

    #[test]
    fn test_settings_json_round_trip() {
        let s = settings();
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("maxCashback"));
        assert!(json.contains("stackWithAllocation"));

        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_cashback, 500);
        assert_eq!(back.cashback_codes.len(), 2);
    }
}
