//! 手机号规范化
//!
//! 平台面向印度市场，所有客户记录按 `+91XXXXXXXXXX` 规范形式存储。
//! 接受裸 10 位、`91` 前缀 12 位、`0` 前缀 11 位以及已带 `+91` 的
//! 形式；印度移动号段首位必须是 6-9。

/// 将输入规范化为 `+91XXXXXXXXXX`，无法规范化时返回 None
pub fn normalize_phone(raw: &str) -> Option<String> {
    let mut digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    // 本地拨号前缀 0
    if digits.len() == 11 && digits.starts_with('0') {
        digits.remove(0);
    }

    // 国家码 91
    if digits.len() == 12 && digits.starts_with("91") {
        digits.drain(0..2);
    }

    if digits.len() != 10 {
        return None;
    }

    let first = digits.chars().next()?;
    if !('6'..='9').contains(&first) {
        return None;
    }

    Some(format!("+91{digits}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_accepted_forms() {
        // 各种可接受形式都归一到同一规范形态
        let cases = vec![
            ("9876543210", Some("+919876543210")),
            ("919876543210", Some("+919876543210")),
            ("+919876543210", Some("+919876543210")),
            ("09876543210", Some("+919876543210")),
            ("98765 43210", Some("+919876543210")),
            ("+91-98765-43210", Some("+919876543210")),
        ];

        for (input, expected) in cases {
            assert_eq!(
                normalize_phone(input).as_deref(),
                expected,
                "input: {input}"
            );
        }
    }

    #[test]
    fn test_normalize_rejected_forms() {
        // 位数不对、首位非 6-9、空串都拒绝
        let cases = vec![
            "",
            "12345",
            "1234567890",     // 首位 1
            "5876543210",     // 首位 5
            "98765432101",    // 11 位且无前导 0
            "9198765432",     // 混淆的 91 前缀但总长不足
            "abcdefghij",
        ];

        for input in cases {
            assert_eq!(normalize_phone(input), None, "input: {input}");
        }
    }
}
