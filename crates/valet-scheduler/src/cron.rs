use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone};
use valet_core::error::{Result, ValetError};

/// A parsed 5-field cron expression: minute hour day-of-month month
/// day-of-week. Supports `*`, lists, ranges, and steps.
#[derive(Debug, Clone)]
pub struct CronExpr {
    minutes: Vec<u32>,
    hours: Vec<u32>,
    days_of_month: Vec<u32>,
    months: Vec<u32>,
    days_of_week: Vec<u32>,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(ValetError::Scheduler(format!(
                "cron expression must have 5 fields, got {}: '{expr}'",
                fields.len()
            )));
        }

        let minutes = parse_field(fields[0], 0, 59)?;
        let hours = parse_field(fields[1], 0, 23)?;
        let days_of_month = parse_field(fields[2], 1, 31)?;
        let months = parse_field(fields[3], 1, 12)?;
        // 7 is an alias for Sunday (0)
        let mut days_of_week = parse_field(fields[4], 0, 7)?;
        for d in days_of_week.iter_mut() {
            if *d == 7 {
                *d = 0;
            }
        }
        days_of_week.sort_unstable();
        days_of_week.dedup();

        Ok(Self {
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            dom_restricted: fields[2] != "*",
            dow_restricted: fields[4] != "*",
        })
    }

    /// Standard cron day rule: when both day-of-month and day-of-week are
    /// restricted, a day matches if EITHER does.
    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom_ok = self.days_of_month.contains(&date.day());
        let dow_ok = self
            .days_of_week
            .contains(&date.weekday().num_days_from_sunday());

        match (self.dom_restricted, self.dow_restricted) {
            (true, true) => dom_ok || dow_ok,
            (true, false) => dom_ok,
            (false, true) => dow_ok,
            (false, false) => true,
        }
    }

    /// First fire time strictly after `after_unix`, in the given timezone
    /// (whole-hour offset). None if nothing matches within four years.
    pub fn next_fire(&self, after_unix: i64, tz_offset: i32) -> Option<i64> {
        let offset = FixedOffset::east_opt(tz_offset * 3600)?;
        let after: DateTime<FixedOffset> =
            DateTime::from_timestamp(after_unix, 0)?.with_timezone(&offset);

        let mut date = after.date_naive();
        // Leap years included, four years bounds any valid expression
        for _ in 0..(366 * 4) {
            if self.months.contains(&date.month()) && self.day_matches(date) {
                for &h in &self.hours {
                    for &m in &self.minutes {
                        let naive = date.and_hms_opt(h, m, 0)?;
                        let local = offset.from_local_datetime(&naive).single()?;
                        let ts = local.timestamp();
                        if ts > after_unix {
                            return Some(ts);
                        }
                    }
                }
            }
            date = date + Duration::days(1);
        }

        None
    }
}

/// Convenience wrapper: parse + next_fire in one call.
pub fn next_fire(expr: &str, after_unix: i64, tz_offset: i32) -> Option<i64> {
    CronExpr::parse(expr).ok()?.next_fire(after_unix, tz_offset)
}

/// Parse one cron field into a sorted list of allowed values.
fn parse_field(field: &str, min: u32, max: u32) -> Result<Vec<u32>> {
    let mut values = Vec::new();

    for part in field.split(',') {
        let (range_part, step) = match part.split_once('/') {
            Some((r, s)) => {
                let step: u32 = s.parse().map_err(|_| {
                    ValetError::Scheduler(format!("invalid cron step: '{part}'"))
                })?;
                if step == 0 {
                    return Err(ValetError::Scheduler(format!(
                        "cron step must be positive: '{part}'"
                    )));
                }
                (r, step)
            }
            None => (part, 1),
        };

        let (lo, hi) = if range_part == "*" {
            (min, max)
        } else if let Some((a, b)) = range_part.split_once('-') {
            let lo: u32 = a.parse().map_err(|_| {
                ValetError::Scheduler(format!("invalid cron range: '{part}'"))
            })?;
            let hi: u32 = b.parse().map_err(|_| {
                ValetError::Scheduler(format!("invalid cron range: '{part}'"))
            })?;
            (lo, hi)
        } else {
            let v: u32 = range_part.parse().map_err(|_| {
                ValetError::Scheduler(format!("invalid cron value: '{part}'"))
            })?;
            (v, v)
        };

        if lo < min || hi > max || lo > hi {
            return Err(ValetError::Scheduler(format!(
                "cron value out of range [{min},{max}]: '{part}'"
            )));
        }

        let mut v = lo;
        while v <= hi {
            values.push(v);
            v += step;
        }
    }

    values.sort_unstable();
    values.dedup();
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> i64 {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap().timestamp()
    }

    #[test]
    fn test_daily_at_nine() {
        // From 08:00, same day 09:00 fires
        let next = next_fire("0 9 * * *", ts(2026, 3, 2, 8, 0), 0).unwrap();
        assert_eq!(next, ts(2026, 3, 2, 9, 0));

        // From exactly 09:00, strictly-after means tomorrow
        let next = next_fire("0 9 * * *", ts(2026, 3, 2, 9, 0), 0).unwrap();
        assert_eq!(next, ts(2026, 3, 3, 9, 0));
    }

    #[test]
    fn test_every_fifteen_minutes() {
        let next = next_fire("*/15 * * * *", ts(2026, 3, 2, 10, 7), 0).unwrap();
        assert_eq!(next, ts(2026, 3, 2, 10, 15));
    }

    #[test]
    fn test_weekday_name_resolution() {
        // 2026-03-02 is a Monday; "0 9 * * 1" from Tuesday goes to next Monday
        let next = next_fire("0 9 * * 1", ts(2026, 3, 3, 12, 0), 0).unwrap();
        assert_eq!(next, ts(2026, 3, 9, 9, 0));
    }

    #[test]
    fn test_sunday_alias() {
        let a = CronExpr::parse("0 9 * * 0").unwrap();
        let b = CronExpr::parse("0 9 * * 7").unwrap();
        let after = ts(2026, 3, 2, 0, 0);
        assert_eq!(a.next_fire(after, 0), b.next_fire(after, 0));
    }

    #[test]
    fn test_dom_dow_or_rule() {
        // Both restricted: the 15th OR any Monday, whichever first.
        // From Tue 2026-03-03, next Monday (the 9th) beats the 15th.
        let next = next_fire("0 9 15 * 1", ts(2026, 3, 3, 12, 0), 0).unwrap();
        assert_eq!(next, ts(2026, 3, 9, 9, 0));
    }

    #[test]
    fn test_timezone_offset() {
        // 09:00 local at UTC+7 is 02:00 UTC
        let next = next_fire("0 9 * * *", ts(2026, 3, 2, 0, 0), 7).unwrap();
        assert_eq!(next, ts(2026, 3, 2, 2, 0));
    }

    #[test]
    fn test_invalid_expressions() {
        assert!(CronExpr::parse("0 9 * *").is_err());
        assert!(CronExpr::parse("60 9 * * *").is_err());
        assert!(CronExpr::parse("0 24 * * *").is_err());
        assert!(CronExpr::parse("0 9 0 * *").is_err());
        assert!(CronExpr::parse("*/0 * * * *").is_err());
        assert!(CronExpr::parse("a b c d e").is_err());
    }

    #[test]
    fn test_month_restriction() {
        // Only December; from March, jumps to Dec 1
        let next = next_fire("0 0 1 12 *", ts(2026, 3, 2, 0, 0), 0).unwrap();
        assert_eq!(next, ts(2026, 12, 1, 0, 0));
    }
}
