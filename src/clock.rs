use chrono::NaiveDateTime;

/// Source of the current local wall time.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// Always reports the same instant. Selected with `--now`.
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Accepts `YYYY-MM-DDTHH:MM[:SS]` or the same with a space separator.
pub fn parse_instant(s: &str) -> Option<NaiveDateTime> {
    let t = s.trim();
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(t, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    #[test]
    fn fixed_clock_parses_both_separators() {
        let expected = NaiveDate::from_ymd_opt(2024, 6, 12)
            .expect("date")
            .and_time(NaiveTime::from_hms_opt(14, 59, 0).expect("time"));
        assert_eq!(parse_instant("2024-06-12T14:59"), Some(expected));
        assert_eq!(parse_instant("2024-06-12 14:59:00"), Some(expected));
        assert_eq!(FixedClock(expected).now(), expected);
        assert_eq!(parse_instant("yesterday"), None);
    }
}
