// Conversions between ISO-8601 wire timestamps and broker epoch milliseconds.
use std::time::{SystemTime, UNIX_EPOCH};

use time::OffsetDateTime;
use time::format_description::well_known::{Iso8601, Rfc3339};

use crate::core::error::{Error, ErrorKind};

const NANOS_PER_MILLI: i128 = 1_000_000;

/// Parses an ISO-8601 timestamp carrying a zone offset into epoch milliseconds.
pub fn parse_millis(value: &str) -> Result<i64, Error> {
    let parsed = OffsetDateTime::parse(value, &Rfc3339)
        .or_else(|_| OffsetDateTime::parse(value, &Iso8601::DEFAULT))
        .map_err(|err| {
            Error::new(ErrorKind::InvalidTimestamp)
                .with_message(format!("invalid timestamp: {value}"))
                .with_hint("Use ISO-8601 with a zone offset, e.g. 2024-01-15T10:30:00Z.")
                .with_source(err)
        })?;
    let millis = parsed.unix_timestamp_nanos().div_euclid(NANOS_PER_MILLI);
    i64::try_from(millis).map_err(|err| {
        Error::new(ErrorKind::InvalidTimestamp)
            .with_message(format!("timestamp out of range: {value}"))
            .with_source(err)
    })
}

pub fn parse_optional_millis(value: Option<&str>) -> Result<Option<i64>, Error> {
    value.map(parse_millis).transpose()
}

/// Renders epoch milliseconds as RFC 3339 in UTC.
///
/// Years outside 0000..=9999 use the signed ISO-8601 expanded form, e.g.
/// `+10000-01-01T00:00:00Z`. Values past the supported calendar range render as the
/// decimal millisecond count.
pub fn format_millis(millis: i64) -> String {
    let Ok(ts) = OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * NANOS_PER_MILLI)
    else {
        return millis.to_string();
    };
    ts.format(&Rfc3339).unwrap_or_else(|_| format_expanded_year(ts))
}

fn format_expanded_year(ts: OffsetDateTime) -> String {
    let year = ts.year();
    let sign = if year < 0 { '-' } else { '+' };
    let mut out = format!(
        "{sign}{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
        year.unsigned_abs(),
        u8::from(ts.month()),
        ts.day(),
        ts.hour(),
        ts.minute(),
        ts.second()
    );
    let fraction = ts.millisecond();
    if fraction != 0 {
        out.push('.');
        out.push_str(format!("{fraction:03}").trim_end_matches('0'));
    }
    out.push('Z');
    out
}

pub fn now_millis() -> Result<i64, Error> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("time went backwards")
                .with_source(err)
        })?;
    Ok(duration.as_millis() as i64)
}

#[cfg(test)]
mod tests {
    use super::{format_millis, parse_millis, parse_optional_millis};
    use crate::core::error::ErrorKind;

    #[test]
    fn parses_utc_and_offset_forms() {
        assert_eq!(parse_millis("2024-01-15T10:30:00Z").expect("utc"), 1_705_314_600_000);
        assert_eq!(
            parse_millis("2024-01-15T12:30:00+02:00").expect("offset"),
            1_705_314_600_000
        );
        assert_eq!(
            parse_millis("2024-01-15T10:30:00.250Z").expect("fraction"),
            1_705_314_600_250
        );
    }

    #[test]
    fn rejects_timestamp_without_zone() {
        let err = parse_millis("2024-01-15T10:30:00").expect_err("no zone");
        assert_eq!(err.kind(), ErrorKind::InvalidTimestamp);
        let err = parse_millis("yesterday").expect_err("garbage");
        assert_eq!(err.kind(), ErrorKind::InvalidTimestamp);
    }

    #[test]
    fn optional_passes_none_through() {
        assert_eq!(parse_optional_millis(None).expect("none"), None);
    }

    #[test]
    fn formats_in_utc() {
        assert_eq!(format_millis(1_705_314_600_000), "2024-01-15T10:30:00Z");
        assert_eq!(format_millis(1_705_314_600_250), "2024-01-15T10:30:00.25Z");
    }

    #[test]
    fn formats_years_outside_four_digits() {
        assert_eq!(format_millis(253_402_300_800_000), "+10000-01-01T00:00:00Z");
        assert_eq!(format_millis(253_402_300_800_500), "+10000-01-01T00:00:00.5Z");
        assert_eq!(format_millis(-62_167_305_600_000), "-0001-12-31T00:00:00Z");
        assert_eq!(format_millis(-62_167_219_200_000), "0000-01-01T00:00:00Z");
    }

    #[test]
    fn formats_every_millisecond_value() {
        assert_eq!(format_millis(i64::MAX), i64::MAX.to_string());
        assert_eq!(format_millis(i64::MIN), i64::MIN.to_string());
    }
}
