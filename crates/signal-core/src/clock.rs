//! Reference-date handling for the scoring engines.
//!
//! Everything downstream of the collectors is referentially transparent
//! given a reference date; wall clock is only consulted when no date is
//! injected. Tests always inject.

use chrono::{NaiveDate, Utc};

/// Days a malformed or missing date is treated as being in the past.
pub const MALFORMED_DATE_DAYS: i64 = 9999;

/// A fixed "today" for age and recency calculations.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    today: NaiveDate,
}

impl Default for Clock {
    fn default() -> Self {
        Self::now()
    }
}

impl Clock {
    /// Clock pinned to the current UTC date.
    pub fn now() -> Self {
        Clock {
            today: Utc::now().date_naive(),
        }
    }

    /// Clock pinned to a reference date (`YYYY-MM-DD`). Falls back to the
    /// current date when the string does not parse.
    pub fn fixed(reference_date: &str) -> Self {
        Clock {
            today: parse_date(reference_date).unwrap_or_else(|| Utc::now().date_naive()),
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn today_string(&self) -> String {
        self.today.format("%Y-%m-%d").to_string()
    }

    /// Days between `date_str` and today, clamped to zero for future dates.
    /// Malformed input counts as ancient ([`MALFORMED_DATE_DAYS`]).
    pub fn days_ago(&self, date_str: &str) -> i64 {
        match parse_date(date_str) {
            Some(d) => (self.today - d).num_days().max(0),
            None => MALFORMED_DATE_DAYS,
        }
    }

    /// Signed day difference, negative for future dates. Used by the V1
    /// formula engine, which clamps at the multiplier instead.
    pub fn days_since(&self, date_str: &str) -> i64 {
        match parse_date(date_str) {
            Some(d) => (self.today - d).num_days(),
            None => MALFORMED_DATE_DAYS,
        }
    }

    /// True when `date_str` falls within the last `days` days.
    pub fn within_days(&self, date_str: &str, days: i64) -> bool {
        self.days_ago(date_str) <= days
    }
}

/// Parse the leading `YYYY-MM-DD` of a date or datetime string.
pub fn parse_date(date_str: &str) -> Option<NaiveDate> {
    let head = date_str.get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Exponential recency decay: 1.0 at day 0, 0.5 at `half_life` days.
pub fn recency_decay(days: i64, half_life: f64) -> f64 {
    (-std::f64::consts::LN_2 * days as f64 / half_life).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_days_ago() {
        let clock = Clock::fixed("2026-01-26");
        assert_eq!(clock.days_ago("2026-01-20"), 6);
        assert_eq!(clock.days_ago("2026-01-26"), 0);
        // Future dates clamp to zero
        assert_eq!(clock.days_ago("2026-02-01"), 0);
        // Malformed dates are ancient
        assert_eq!(clock.days_ago("not-a-date"), MALFORMED_DATE_DAYS);
        assert_eq!(clock.days_ago(""), MALFORMED_DATE_DAYS);
    }

    #[test]
    fn test_days_ago_datetime_prefix() {
        let clock = Clock::fixed("2026-01-26");
        assert_eq!(clock.days_ago("2026-01-25T19:00:00"), 1);
    }

    #[test]
    fn test_days_since_unclamped() {
        let clock = Clock::fixed("2026-01-26");
        assert_eq!(clock.days_since("2026-02-01"), -6);
    }

    #[test]
    fn test_recency_decay() {
        assert!((recency_decay(0, 14.0) - 1.0).abs() < 1e-9);
        assert!((recency_decay(14, 14.0) - 0.5).abs() < 1e-9);
        assert!((recency_decay(28, 14.0) - 0.25).abs() < 1e-9);
        assert!(recency_decay(42, 14.0) < 0.13);
    }

    #[test]
    fn test_within_days() {
        let clock = Clock::fixed("2026-01-26");
        assert!(clock.within_days("2026-01-20", 7));
        assert!(!clock.within_days("2026-01-10", 7));
    }
}
