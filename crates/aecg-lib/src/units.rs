use crate::error::{AecgError, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::str::FromStr;

/// Physical voltage units accepted for lead origin and scale values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoltageUnit {
    Nanovolt,
    Microvolt,
    Millivolt,
    Volt,
}

impl VoltageUnit {
    /// Multiplier that converts a value in this unit to millivolts.
    pub fn millivolt_factor(self) -> f64 {
        match self {
            VoltageUnit::Nanovolt => 1e-6,
            VoltageUnit::Microvolt => 1e-3,
            VoltageUnit::Millivolt => 1.0,
            VoltageUnit::Volt => 1e3,
        }
    }
}

impl FromStr for VoltageUnit {
    type Err = AecgError;

    fn from_str(unit: &str) -> Result<Self> {
        match unit.trim() {
            "nV" => Ok(VoltageUnit::Nanovolt),
            "uV" | "\u{b5}V" | "\u{3bc}V" => Ok(VoltageUnit::Microvolt),
            "mV" => Ok(VoltageUnit::Millivolt),
            "V" => Ok(VoltageUnit::Volt),
            other => Err(AecgError::UnknownUnit {
                unit: other.to_string(),
                quantity: "voltage",
            }),
        }
    }
}

/// Time units accepted for sample increments and RELATIVE annotation values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Microsecond,
    Millisecond,
    Second,
}

impl TimeUnit {
    /// Multiplier that converts a value in this unit to milliseconds.
    pub fn millisecond_factor(self) -> f64 {
        match self {
            TimeUnit::Microsecond => 1e-3,
            TimeUnit::Millisecond => 1.0,
            TimeUnit::Second => 1e3,
        }
    }
}

impl FromStr for TimeUnit {
    type Err = AecgError;

    fn from_str(unit: &str) -> Result<Self> {
        match unit.trim() {
            "us" | "\u{b5}s" | "\u{3bc}s" => Ok(TimeUnit::Microsecond),
            "ms" => Ok(TimeUnit::Millisecond),
            "s" => Ok(TimeUnit::Second),
            other => Err(AecgError::UnknownUnit {
                unit: other.to_string(),
                quantity: "time",
            }),
        }
    }
}

/// Convert a raw digit to millivolts: `raw_digit * scale + origin`, both in mV.
pub fn to_millivolts(
    raw_digit: f64,
    origin: f64,
    origin_unit: &str,
    scale: f64,
    scale_unit: &str,
) -> Result<f64> {
    let origin_mv = origin * origin_unit.parse::<VoltageUnit>()?.millivolt_factor();
    let scale_mv = scale * scale_unit.parse::<VoltageUnit>()?.millivolt_factor();
    Ok(raw_digit * scale_mv + origin_mv)
}

pub fn to_milliseconds(value: f64, unit: &str) -> Result<f64> {
    Ok(value * unit.parse::<TimeUnit>()?.millisecond_factor())
}

/// Parse an HL7 timestamp of variable precision (`YYYY[MM[DD[HH[MM[SS[.fff]]]]]]`).
///
/// Absent trailing components default to the start of the enclosing period,
/// so `"2002"` is midnight on January 1st. Characters after the seconds field
/// (typically a timezone offset) are ignored, as is a `.`-separated token that
/// carries no fraction digits.
pub fn parse_hl7_datetime(text: &str) -> Result<NaiveDateTime> {
    let trimmed = text.trim();
    let (stamp, tail) = match trimmed.split_once('.') {
        Some((stamp, tail)) => (stamp, Some(tail)),
        None => (trimmed, None),
    };
    if !stamp.is_ascii() {
        return Err(AecgError::datetime(text, "non-ASCII characters"));
    }
    let year = match stamp.get(0..4) {
        Some(digits) if digits.bytes().all(|b| b.is_ascii_digit()) => digits
            .parse::<i32>()
            .map_err(|e| AecgError::datetime(text, e.to_string()))?,
        _ => {
            return Err(AecgError::datetime(
                text,
                "leading four characters must be the year",
            ))
        }
    };

    let component = |start: usize, name: &str| -> Result<Option<u32>> {
        if stamp.len() <= start {
            return Ok(None);
        }
        let digits = stamp
            .get(start..start + 2)
            .filter(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| AecgError::datetime(text, format!("malformed {}", name)))?;
        digits
            .parse::<u32>()
            .map(Some)
            .map_err(|e| AecgError::datetime(text, e.to_string()))
    };

    let month = component(4, "month")?.unwrap_or(1);
    let day = component(6, "day")?.unwrap_or(1);
    let hour = component(8, "hour")?.unwrap_or(0);
    let minute = component(10, "minute")?.unwrap_or(0);
    let second = component(12, "second")?;
    let millis = match (second, tail) {
        (Some(_), Some(tail)) => fraction_millis(tail),
        _ => 0,
    };

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_milli_opt(hour, minute, second.unwrap_or(0), millis))
        .ok_or_else(|| AecgError::datetime(text, "component out of calendar range"))
}

fn fraction_millis(tail: &str) -> u32 {
    let digits: String = tail
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .take(3)
        .collect();
    if digits.is_empty() {
        return 0;
    }
    let padded = format!("{:0<3}", digits);
    padded.parse().unwrap_or(0)
}

/// Milliseconds elapsed from `start` to the HL7 timestamp in `text`.
pub fn hl7_offset_ms(text: &str, start: &NaiveDateTime) -> Result<f64> {
    let instant = parse_hl7_datetime(text)?;
    Ok(instant.signed_duration_since(*start).num_milliseconds() as f64)
}

/// Shift `start` by a (possibly fractional) number of milliseconds.
///
/// Fails when the shift is not finite or leaves the representable calendar.
pub fn add_milliseconds(start: &NaiveDateTime, ms: f64) -> Result<NaiveDateTime> {
    let out_of_range = || {
        AecgError::datetime(&format_hl7_datetime(start), format!("cannot add {} ms", ms))
    };
    let micros = (ms * 1e3).round();
    if !micros.is_finite() || micros.abs() >= i64::MAX as f64 {
        return Err(out_of_range());
    }
    start
        .checked_add_signed(Duration::microseconds(micros as i64))
        .ok_or_else(out_of_range)
}

/// Render a timestamp in the full-precision HL7 form (`YYYYMMDDHHMMSS.ffffff`).
pub fn format_hl7_datetime(instant: &NaiveDateTime) -> String {
    instant.format("%Y%m%d%H%M%S%.6f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn microvolts_scale_down() {
        let mv = to_millivolts(2.5, 0.0, "uV", 1.0, "uV").unwrap();
        assert!((mv - 2.5e-3).abs() < 1e-12);
        let mv = to_millivolts(2.5, 0.0, "\u{b5}V", 1.0, "\u{b5}V").unwrap();
        assert!((mv - 2.5e-3).abs() < 1e-12);
    }

    #[test]
    fn origin_and_scale_combine() {
        // 10 digits * 5 uV + 1 mV origin
        let mv = to_millivolts(10.0, 1.0, "mV", 5.0, "uV").unwrap();
        assert!((mv - 1.05).abs() < 1e-12);
        let mv = to_millivolts(1.0, 0.0, "V", 2.0, "nV").unwrap();
        assert!((mv - 2e-6).abs() < 1e-15);
        let mv = to_millivolts(3.0, 0.001, "V", 1.0, "mV").unwrap();
        assert!((mv - 4.0).abs() < 1e-12);
    }

    #[test]
    fn unknown_voltage_unit_is_rejected() {
        let err = to_millivolts(1.0, 0.0, "furlongs", 1.0, "mV").unwrap_err();
        assert!(matches!(err, AecgError::UnknownUnit { ref unit, .. } if unit == "furlongs"));
        assert!(to_millivolts(1.0, 0.0, "mV", 1.0, "kV").is_err());
    }

    #[test]
    fn time_units_convert_to_milliseconds() {
        assert_eq!(to_milliseconds(1500.0, "us").unwrap(), 1.5);
        assert_eq!(to_milliseconds(2.0, "s").unwrap(), 2000.0);
        assert_eq!(to_milliseconds(4.0, "ms").unwrap(), 4.0);
        assert!(matches!(
            to_milliseconds(1.0, "min"),
            Err(AecgError::UnknownUnit { quantity: "time", .. })
        ));
    }

    #[test]
    fn datetime_precision_is_bounded_by_input() {
        let dt = parse_hl7_datetime("200211220910").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2002, 11, 22));
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (9, 10, 0));

        let dt = parse_hl7_datetime("2002").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2002, 1, 1));
        assert_eq!(dt.hour(), 0);

        let dt = parse_hl7_datetime("200211").unwrap();
        assert_eq!((dt.month(), dt.day()), (11, 1));
    }

    #[test]
    fn datetime_fraction_and_timezone() {
        let dt = parse_hl7_datetime("20021122091000.250+0100").unwrap();
        assert_eq!(dt.nanosecond(), 250_000_000);
        let dt = parse_hl7_datetime("20021122091000.5").unwrap();
        assert_eq!(dt.nanosecond(), 500_000_000);
        let dt = parse_hl7_datetime("20021122091000+0100").unwrap();
        assert_eq!(dt.second(), 0);
        let dt = parse_hl7_datetime("20021122091000.+0100").unwrap();
        assert_eq!(dt.nanosecond(), 0);
    }

    #[test]
    fn malformed_datetimes_fail() {
        for bad in ["", "150", "12.5", "abcd1122", "20021", "20021322", "20020230", "2002112225"] {
            assert!(
                matches!(parse_hl7_datetime(bad), Err(AecgError::DateTimeFormat { .. })),
                "{} should not parse",
                bad
            );
        }
    }

    #[test]
    fn offsets_and_formatting() {
        let start = parse_hl7_datetime("20021122091000").unwrap();
        assert_eq!(hl7_offset_ms("20021122091001.500", &start).unwrap(), 1500.0);
        assert_eq!(hl7_offset_ms("20021122090959", &start).unwrap(), -1000.0);
        let stop = add_milliseconds(&start, 10_000.0).unwrap();
        assert_eq!(format_hl7_datetime(&stop), "20021122091010.000000");
    }

    #[test]
    fn shifts_past_the_calendar_are_errors() {
        let start = parse_hl7_datetime("20021122091000").unwrap();
        for ms in [1e18, -1e18, f64::INFINITY, f64::NAN] {
            assert!(matches!(
                add_milliseconds(&start, ms),
                Err(AecgError::DateTimeFormat { .. })
            ));
        }
    }
}
