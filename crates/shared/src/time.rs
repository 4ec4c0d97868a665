//! 业务时区时间计算
//!
//! 过期截止与批量发放的失效日期都以 IST（UTC+05:30）为参照时区
//! 解释。这里只做固定偏移的算术换算，不引入时区数据库。

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// IST 相对 UTC 的偏移秒数（+05:30）
const IST_OFFSET_SECS: i64 = 5 * 3600 + 30 * 60;

/// IST 本地时间换算回 UTC
fn ist_local_to_utc(local: NaiveDateTime) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(local - Duration::seconds(IST_OFFSET_SECS), Utc)
}

/// 给定 UTC 时刻对应的 IST 日历日期
pub fn ist_date(now: DateTime<Utc>) -> NaiveDate {
    (now.naive_utc() + Duration::seconds(IST_OFFSET_SECS)).date()
}

/// IST 当日零点（过期清扫的截止时刻）
pub fn start_of_day_ist(now: DateTime<Utc>) -> DateTime<Utc> {
    ist_local_to_utc(ist_date(now).and_time(NaiveTime::MIN))
}

/// 指定 IST 日期的当日最后一毫秒（批量发放的失效时刻）
pub fn end_of_day_ist(date: NaiveDate) -> DateTime<Utc> {
    let next_midnight = date.and_time(NaiveTime::MIN) + Duration::days(1);
    ist_local_to_utc(next_midnight - Duration::milliseconds(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_ist_date_crosses_midnight_before_utc() {
        // UTC 19:00 已是 IST 次日 00:30
        let now = utc("2025-06-15T19:00:00Z");
        assert_eq!(
            ist_date(now),
            NaiveDate::from_ymd_opt(2025, 6, 16).unwrap()
        );

        // UTC 18:00 仍是 IST 当日 23:30
        let now = utc("2025-06-15T18:00:00Z");
        assert_eq!(
            ist_date(now),
            NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
        );
    }

    #[test]
    fn test_start_of_day_ist() {
        // IST 2025-06-16 00:00 对应 UTC 2025-06-15 18:30
        let now = utc("2025-06-15T20:00:00Z");
        assert_eq!(start_of_day_ist(now), utc("2025-06-15T18:30:00Z"));
    }

    #[test]
    fn test_end_of_day_ist() {
        // IST 2025-06-15 23:59:59.999 对应 UTC 2025-06-15 18:29:59.999
        let date = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        assert_eq!(end_of_day_ist(date), utc("2025-06-15T18:29:59.999Z"));
    }
}
