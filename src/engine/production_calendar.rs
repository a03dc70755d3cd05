// ==========================================
// MES 停机核心 - 生产日历
// ==========================================
// 生产日: 06:30 至次日 06:29:59（06:30 前归属前一日）
// 班次:   T1 [06:30,15:00) | T2 [15:00,23:20) | T3 [23:20,06:30)
// 所有判断基于工厂本地挂钟时间，不用 UTC
// ==========================================
// 纯函数，无依赖；任何合法时间戳都不会失败
// ==========================================

use crate::domain::timeline::TimeWindow;
use crate::domain::types::{ProductionDay, Shift};
use crate::error::ValidationError;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use serde::Serialize;

/// 生产日起点（分钟数，06:30）
pub const DAY_START_MINUTE: u32 = 6 * 60 + 30;
/// T2 起点（15:00）
pub const SHIFT2_START_MINUTE: u32 = 15 * 60;
/// T3 起点（23:20）
pub const SHIFT3_START_MINUTE: u32 = 23 * 60 + 20;

/// 班次定义
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftDefinition {
    pub shift: Shift,
    /// 起始时刻（含）
    pub start: NaiveTime,
    /// 结束时刻（不含）
    pub end: NaiveTime,
    pub crosses_midnight: bool,
}

fn time_of(minute_of_day: u32) -> NaiveTime {
    // minute_of_day 均来自上方常量，恒 < 1440
    NaiveTime::from_num_seconds_from_midnight_opt(minute_of_day * 60, 0).unwrap_or(NaiveTime::MIN)
}

fn minute_of_day(t: NaiveTime) -> u32 {
    t.hour() * 60 + t.minute()
}

/// 班次定义表
pub fn shift_definitions() -> [ShiftDefinition; 3] {
    [
        ShiftDefinition {
            shift: Shift::First,
            start: time_of(DAY_START_MINUTE),
            end: time_of(SHIFT2_START_MINUTE),
            crosses_midnight: false,
        },
        ShiftDefinition {
            shift: Shift::Second,
            start: time_of(SHIFT2_START_MINUTE),
            end: time_of(SHIFT3_START_MINUTE),
            crosses_midnight: false,
        },
        ShiftDefinition {
            shift: Shift::Third,
            start: time_of(SHIFT3_START_MINUTE),
            end: time_of(DAY_START_MINUTE),
            crosses_midnight: true,
        },
    ]
}

// ==========================================
// 核心函数
// ==========================================

/// 时间戳所属生产日
///
/// 本地时刻早于 06:30 → 前一个日历日，否则为当日。
pub fn production_day_of(ts: NaiveDateTime) -> ProductionDay {
    if minute_of_day(ts.time()) < DAY_START_MINUTE {
        ProductionDay::new(ts.date() - Duration::days(1))
    } else {
        ProductionDay::new(ts.date())
    }
}

/// 带时区的时间戳先换算为本地挂钟时间再判断
pub fn production_day_of_zoned<Tz: TimeZone>(ts: &DateTime<Tz>) -> ProductionDay {
    production_day_of(ts.naive_local())
}

/// 时间戳所属班次
pub fn shift_of(ts: NaiveDateTime) -> Shift {
    let minute = minute_of_day(ts.time());
    if (DAY_START_MINUTE..SHIFT2_START_MINUTE).contains(&minute) {
        Shift::First
    } else if (SHIFT2_START_MINUTE..SHIFT3_START_MINUTE).contains(&minute) {
        Shift::Second
    } else {
        Shift::Third
    }
}

pub fn shift_of_zoned<Tz: TimeZone>(ts: &DateTime<Tz>) -> Shift {
    shift_of(ts.naive_local())
}

/// 指定生产日某班次的绝对起止时间
///
/// T3 的结束落在下一个日历日。
pub fn window_of(shift: Shift, day: ProductionDay) -> TimeWindow {
    let date = day.date();
    let next = date + Duration::days(1);
    let (start, end) = match shift {
        Shift::First => (
            date.and_time(time_of(DAY_START_MINUTE)),
            date.and_time(time_of(SHIFT2_START_MINUTE)),
        ),
        Shift::Second => (
            date.and_time(time_of(SHIFT2_START_MINUTE)),
            date.and_time(time_of(SHIFT3_START_MINUTE)),
        ),
        Shift::Third => (
            date.and_time(time_of(SHIFT3_START_MINUTE)),
            next.and_time(time_of(DAY_START_MINUTE)),
        ),
    };
    TimeWindow { start, end }
}

/// 整个生产日的窗口 [D 06:30, D+1 06:30)
pub fn day_window(day: ProductionDay) -> TimeWindow {
    let date = day.date();
    TimeWindow {
        start: date.and_time(time_of(DAY_START_MINUTE)),
        end: (date + Duration::days(1)).and_time(time_of(DAY_START_MINUTE)),
    }
}

/// 生产日 + 时刻 → 绝对时间戳
///
/// 06:30 之前的时刻属于生产日的尾段（T3 后半），落在下一个日历日。
pub fn resolve_start(day: ProductionDay, time: NaiveTime) -> NaiveDateTime {
    if minute_of_day(time) < DAY_START_MINUTE {
        (day.date() + Duration::days(1)).and_time(time)
    } else {
        day.date().and_time(time)
    }
}

// ==========================================
// 解析辅助（调用前拒绝非法输入）
// ==========================================

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// 解析本地时间戳字符串
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, ValidationError> {
    let s = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .ok_or_else(|| ValidationError::MalformedTimestamp(raw.to_string()))
}

/// 解析 HH:MM 时刻
pub fn parse_time_of_day(raw: &str) -> Result<NaiveTime, ValidationError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| ValidationError::MalformedTimestamp(raw.to_string()))
}

/// 合并 YYYY-MM-DD 与 HH:MM
pub fn combine_date_and_time(date: &str, time: &str) -> Result<NaiveDateTime, ValidationError> {
    let d = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationError::MalformedTimestamp(date.to_string()))?;
    Ok(d.and_time(parse_time_of_day(time)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn ts(d: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, d)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn day(d: u32) -> ProductionDay {
        ProductionDay::new(NaiveDate::from_ymd_opt(2026, 3, d).unwrap())
    }

    #[test]
    fn test_production_day_rollover() {
        // 06:29:59 仍属于前一生产日，与前一日 23:00 相同
        assert_eq!(production_day_of(ts(3, 6, 29, 59)), production_day_of(ts(2, 23, 0, 0)));
        assert_eq!(production_day_of(ts(3, 6, 29, 59)).to_string(), "2026-03-02");
        // 06:30:00 为新生产日
        assert_eq!(production_day_of(ts(3, 6, 30, 0)).to_string(), "2026-03-03");
        // 跨月
        let first = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap().and_hms_opt(2, 0, 0).unwrap();
        assert_eq!(production_day_of(first).to_string(), "2026-03-31");
    }

    #[test]
    fn test_shift_boundaries() {
        assert_eq!(shift_of(ts(2, 6, 29, 59)), Shift::Third);
        assert_eq!(shift_of(ts(2, 6, 30, 0)), Shift::First);
        assert_eq!(shift_of(ts(2, 14, 59, 59)), Shift::First);
        assert_eq!(shift_of(ts(2, 15, 0, 0)), Shift::Second);
        assert_eq!(shift_of(ts(2, 23, 19, 59)), Shift::Second);
        assert_eq!(shift_of(ts(2, 23, 20, 0)), Shift::Third);
        assert_eq!(shift_of(ts(2, 0, 0, 0)), Shift::Third);
    }

    #[test]
    fn test_every_minute_in_exactly_one_window() {
        // 遍历一个生产日的每一分钟: 恰好落入一个班次窗口，且与 shift_of 一致
        let d = day(2);
        let window = day_window(d);
        let mut t = window.start;
        while t < window.end {
            let shift = shift_of(t);
            assert_eq!(production_day_of(t), d);
            let containing: Vec<Shift> = Shift::ALL
                .iter()
                .copied()
                .filter(|s| window_of(*s, d).contains(t))
                .collect();
            assert_eq!(containing, vec![shift], "t={}", t);
            t += Duration::minutes(1);
        }
    }

    #[test]
    fn test_window_of_third_shift_ends_next_date() {
        let w = window_of(Shift::Third, day(2));
        assert_eq!(w.start, ts(2, 23, 20, 0));
        assert_eq!(w.end, ts(3, 6, 30, 0));

        let w1 = window_of(Shift::First, day(2));
        assert_eq!(w1.duration_minutes(), 510);
        let w2 = window_of(Shift::Second, day(2));
        assert_eq!(w2.duration_minutes(), 500);
        assert_eq!(w.duration_minutes(), 430);
    }

    #[test]
    fn test_zoned_uses_local_wall_clock() {
        // UTC 09:00 在 -03:00 时区为本地 06:00 → 前一生产日、T3
        let tz = FixedOffset::west_opt(3 * 3600).unwrap();
        let utc = chrono::Utc.with_ymd_and_hms(2026, 3, 3, 9, 0, 0).unwrap();
        let local = utc.with_timezone(&tz);
        assert_eq!(production_day_of_zoned(&local).to_string(), "2026-03-02");
        assert_eq!(shift_of_zoned(&local), Shift::Third);
    }

    #[test]
    fn test_resolve_start() {
        let t = parse_time_of_day("00:30").unwrap();
        assert_eq!(resolve_start(day(2), t), ts(3, 0, 30, 0));
        let t = parse_time_of_day("07:10").unwrap();
        assert_eq!(resolve_start(day(2), t), ts(2, 7, 10, 0));
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_timestamp("2026-03-02T07:10:00").unwrap(), ts(2, 7, 10, 0));
        assert_eq!(parse_timestamp("2026-03-02 07:10").unwrap(), ts(2, 7, 10, 0));
        assert!(parse_timestamp("02/03/2026 07:10").is_err());
        assert_eq!(combine_date_and_time("2026-03-02", "23:45").unwrap(), ts(2, 23, 45, 0));
        assert!(combine_date_and_time("2026-03-02", "25:00").is_err());
    }

    #[test]
    fn test_shift_definitions() {
        let defs = shift_definitions();
        assert_eq!(defs[0].start, NaiveTime::from_hms_opt(6, 30, 0).unwrap());
        assert!(defs[2].crosses_midnight);
        assert_eq!(defs[2].end, defs[0].start);
    }
}
