//! # Cron 表达式解析与求值
//!
//! 标准 5 字段表达式（分 时 日 月 周），支持 `*`、列表、区间与步进。
//! 求值在配置的时区内进行，夏令时跳变由按分钟推进的定点时间处理。

use crate::error::{GatewayError, Result};
use chrono::{DateTime, Datelike, Duration, Timelike};
use chrono_tz::Tz;

/// 向后搜索的上限（一年的分钟数，留足闰年余量）
const SEARCH_LIMIT_MINUTES: i64 = 366 * 24 * 60;

/// 解析后的 cron 表达式
///
/// 每个字段是一组允许取值的位集合；`dom_any`/`dow_any` 记录原始
/// 字段是否为 `*`，用于日/周字段的「任一命中」语义。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_any: bool,
    dow_any: bool,
}

impl CronExpr {
    /// 解析 5 字段表达式
    pub fn parse(expr: &str) -> Result<Self> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(GatewayError::config(format!(
                "cron 表达式必须是 5 个字段，实际 {} 个: {expr}",
                fields.len()
            )));
        }

        Ok(Self {
            minutes: parse_field(fields[0], 0, 59)?,
            hours: parse_field(fields[1], 0, 23)?,
            days_of_month: parse_field(fields[2], 1, 31)?,
            months: parse_field(fields[3], 1, 12)?,
            days_of_week: parse_dow_field(fields[4])?,
            dom_any: fields[2] == "*",
            dow_any: fields[4] == "*",
        })
    }

    /// 校验表达式是否合法
    pub fn validate(expr: &str) -> Result<()> {
        Self::parse(expr).map(|_| ())
    }

    /// 给定时刻是否命中
    #[must_use]
    pub fn matches(&self, at: &DateTime<Tz>) -> bool {
        if !bit_set(self.minutes, at.minute())
            || !bit_set(self.hours, at.hour())
            || !bit_set(self.months, at.month())
        {
            return false;
        }

        let dom_hit = bit_set(self.days_of_month, at.day());
        let dow_hit = bit_set(self.days_of_week, at.weekday().num_days_from_sunday());

        // vixie-cron 语义：日与周都受限时任一命中即可
        match (self.dom_any, self.dow_any) {
            (false, false) => dom_hit || dow_hit,
            (false, true) => dom_hit,
            (true, false) => dow_hit,
            (true, true) => true,
        }
    }

    /// 严格晚于 `after` 的下一次触发时刻
    #[must_use]
    pub fn next_after(&self, after: DateTime<Tz>) -> Option<DateTime<Tz>> {
        let mut cursor = truncate_to_minute(after) + Duration::minutes(1);
        for _ in 0..SEARCH_LIMIT_MINUTES {
            if self.matches(&cursor) {
                return Some(cursor);
            }
            cursor += Duration::minutes(1);
        }
        None
    }
}

fn truncate_to_minute(at: DateTime<Tz>) -> DateTime<Tz> {
    at - Duration::seconds(i64::from(at.second())) - Duration::nanoseconds(i64::from(at.nanosecond()))
}

const fn bit_set(mask: u64, value: u32) -> bool {
    mask & (1 << value) != 0
}

/// 周字段额外接受 7 表示周日
fn parse_dow_field(field: &str) -> Result<u64> {
    let mut mask = parse_field(field, 0, 7)?;
    if bit_set(mask, 7) {
        mask = (mask & !(1 << 7)) | 1;
    }
    Ok(mask)
}

fn parse_field(field: &str, min: u32, max: u32) -> Result<u64> {
    if field.is_empty() {
        return Err(GatewayError::config("cron 字段不能为空"));
    }

    let mut mask: u64 = 0;
    for part in field.split(',') {
        let (range_part, step) = match part.split_once('/') {
            Some((range, step_str)) => {
                let step: u32 = step_str.parse().map_err(|_| {
                    GatewayError::config(format!("cron 步进值非法: {part}"))
                })?;
                if step == 0 {
                    return Err(GatewayError::config(format!("cron 步进值不能为 0: {part}")));
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (start, end) = if range_part == "*" {
            (min, max)
        } else if let Some((a, b)) = range_part.split_once('-') {
            let start = parse_bounded(a, min, max)?;
            let end = parse_bounded(b, min, max)?;
            if start > end {
                return Err(GatewayError::config(format!("cron 区间倒置: {part}")));
            }
            (start, end)
        } else {
            let value = parse_bounded(range_part, min, max)?;
            // 单值带步进（如 `5/10`）按「从该值到上界」解释
            if step > 1 { (value, max) } else { (value, value) }
        };

        let mut value = start;
        while value <= end {
            mask |= 1 << value;
            value += step;
        }
    }
    Ok(mask)
}

fn parse_bounded(text: &str, min: u32, max: u32) -> Result<u32> {
    let value: u32 = text
        .parse()
        .map_err(|_| GatewayError::config(format!("cron 取值非法: {text}")))?;
    if value < min || value > max {
        return Err(GatewayError::config(format!(
            "cron 取值越界: {value}（允许 {min}-{max}）"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Tz> {
        chrono_tz::UTC.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_parse_validates_field_count() {
        assert!(CronExpr::validate("0 3 * * *").is_ok());
        assert!(CronExpr::validate("0 3 * *").is_err());
        assert!(CronExpr::validate("0 3 * * * *").is_err());
        assert!(CronExpr::validate("").is_err());
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        assert!(CronExpr::validate("60 * * * *").is_err());
        assert!(CronExpr::validate("* 24 * * *").is_err());
        assert!(CronExpr::validate("* * 0 * *").is_err());
        assert!(CronExpr::validate("* * * 13 *").is_err());
        assert!(CronExpr::validate("* * * * 8").is_err());
        assert!(CronExpr::validate("5-1 * * * *").is_err());
        assert!(CronExpr::validate("*/0 * * * *").is_err());
    }

    #[test]
    fn test_next_after_daily() {
        let cron = CronExpr::parse("0 2 * * *").unwrap();
        let next = cron.next_after(utc(2026, 3, 1, 1, 30)).unwrap();
        assert_eq!(next, utc(2026, 3, 1, 2, 0));

        let after_fire = cron.next_after(utc(2026, 3, 1, 2, 0)).unwrap();
        assert_eq!(after_fire, utc(2026, 3, 2, 2, 0));
    }

    #[test]
    fn test_next_after_step_and_list() {
        let cron = CronExpr::parse("*/15 * * * *").unwrap();
        assert_eq!(
            cron.next_after(utc(2026, 3, 1, 1, 1)).unwrap(),
            utc(2026, 3, 1, 1, 15)
        );

        let cron = CronExpr::parse("0 9,18 * * 1-5").unwrap();
        // 2026-03-01 是周日
        assert_eq!(
            cron.next_after(utc(2026, 3, 1, 10, 0)).unwrap(),
            utc(2026, 3, 2, 9, 0)
        );
    }

    #[test]
    fn test_dow_seven_means_sunday() {
        let with_seven = CronExpr::parse("0 0 * * 7").unwrap();
        let with_zero = CronExpr::parse("0 0 * * 0").unwrap();
        let sunday = utc(2026, 3, 1, 0, 0);
        assert!(with_seven.matches(&sunday));
        assert!(with_zero.matches(&sunday));
    }

    #[test]
    fn test_dom_dow_either_semantics() {
        // 日和周都受限：任一命中即可
        let cron = CronExpr::parse("0 0 13 * 5").unwrap();
        // 2026-03-13 是周五，双命中
        assert!(cron.matches(&utc(2026, 3, 13, 0, 0)));
        // 2026-03-06 是周五但不是 13 号，仍命中
        assert!(cron.matches(&utc(2026, 3, 6, 0, 0)));
        // 2026-04-13 是周一，日命中
        assert!(cron.matches(&utc(2026, 4, 13, 0, 0)));
        // 普通的周三不命中
        assert!(!cron.matches(&utc(2026, 3, 4, 0, 0)));
    }

    #[test]
    fn test_timezone_evaluation() {
        let tz: Tz = "Asia/Shanghai".parse().unwrap();
        let cron = CronExpr::parse("0 3 * * *").unwrap();
        let after = tz.with_ymd_and_hms(2026, 3, 1, 1, 0, 0).unwrap();
        let next = cron.next_after(after).unwrap();
        assert_eq!(next.hour(), 3);
        assert_eq!(next.day(), 1);
    }
}
