//! Spreadsheet serial day numbers
//!
//! The 1900 date system counts 1900-01-01 as day 1 and, for compatibility
//! with Lotus 1-2-3, pretends 1900-02-29 existed, so every date from
//! 1900-03-01 on is one day later than a plain count would give. The 1904
//! system counts 1904-01-01 as day 0 and has no such quirk.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

const SECONDS_PER_DAY: f64 = 86_400.0;

fn midnight(y: i32, m: u32, d: u32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(y, m, d)?.and_hms_opt(0, 0, 0)
}

fn delta_days(delta: TimeDelta) -> f64 {
    let whole = delta.num_days();
    let rest = delta - TimeDelta::days(whole);
    let secs = rest.num_seconds() as f64 + rest.subsec_nanos() as f64 / 1e9;
    whole as f64 + secs / SECONDS_PER_DAY
}

/// Convert a timestamp to a serial day number.
///
/// Returns `None` for timestamps before the epoch of the chosen date system,
/// which the format cannot represent as numbers.
pub fn datetime_to_serial(dt: NaiveDateTime, date1904: bool) -> Option<f64> {
    if date1904 {
        let epoch = midnight(1904, 1, 1)?;
        if dt < epoch {
            return None;
        }
        return Some(delta_days(dt - epoch));
    }

    let start = midnight(1900, 1, 1)?;
    if dt < start {
        return None;
    }
    let leap_bug = midnight(1900, 3, 1)?;
    let epoch = if dt < leap_bug {
        midnight(1899, 12, 31)?
    } else {
        midnight(1899, 12, 30)?
    };
    Some(delta_days(dt - epoch))
}

/// Convert an elapsed duration to a fraction-of-day serial number
pub fn duration_to_serial(d: TimeDelta) -> f64 {
    delta_days(d)
}
