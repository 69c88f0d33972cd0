//! Date and date-time values with FHIR precision rules.
//!
//! FHIR allows dates to be partial (`2022`, `2022-08`) and date-times to be either partial dates
//! or full instants with a zone offset. The precision the value was written with is part of the
//! value, so these types keep it and format back to exactly the same precision.

use crate::{PrimitiveError, PrimitiveResult};
use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, SubsecRound, Timelike,
    Utc,
};
use std::fmt;

/// A calendar date with year, year-month or full precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FhirDate {
    Year(i32),
    YearMonth(i32, u32),
    Full(NaiveDate),
}

impl FhirDate {
    /// Parses `YYYY`, `YYYY-MM` or `YYYY-MM-DD`.
    pub fn parse(raw: &str) -> PrimitiveResult<Self> {
        let err = || PrimitiveError::Parse {
            kind: "date",
            raw: raw.to_owned(),
        };

        let parts: Vec<&str> = raw.split('-').collect();
        let year = parts
            .first()
            .filter(|y| y.len() == 4 && y.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|y| y.parse::<i32>().ok())
            .ok_or_else(err)?;

        match parts.len() {
            1 => Ok(FhirDate::Year(year)),
            2 => {
                let month = two_digits(parts[1]).filter(|m| (1..=12).contains(m));
                month.map(|m| FhirDate::YearMonth(year, m)).ok_or_else(err)
            }
            3 => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .filter(|_| parts[1].len() == 2 && parts[2].len() == 2)
                .map(FhirDate::Full)
                .ok_or_else(err),
            _ => Err(err()),
        }
    }
}

fn two_digits(part: &str) -> Option<u32> {
    if part.len() == 2 && part.bytes().all(|b| b.is_ascii_digit()) {
        part.parse().ok()
    } else {
        None
    }
}

impl fmt::Display for FhirDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FhirDate::Year(y) => write!(f, "{:04}", y),
            FhirDate::YearMonth(y, m) => write!(f, "{:04}-{:02}", y, m),
            FhirDate::Full(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

/// A date-time: either a partial date or a full timestamp.
///
/// A full timestamp normally carries a zone offset. Timestamps written without an offset are kept
/// as local values and formatted back without one. Both keep the number of fractional-second
/// digits they were written with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FhirDateTime {
    Date(FhirDate),
    Zoned {
        value: DateTime<FixedOffset>,
        fraction_digits: u8,
    },
    Local {
        value: NaiveDateTime,
        fraction_digits: u8,
    },
}

const DATE_TIME_PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Most fractional-second digits a nanosecond value can hold.
const MAX_FRACTION_DIGITS: usize = 9;

impl FhirDateTime {
    /// The current UTC time truncated to whole seconds.
    pub fn now() -> Self {
        let now = Utc::now().trunc_subsecs(0);
        FhirDateTime::Zoned {
            value: now.with_timezone(&Utc.fix()),
            fraction_digits: 0,
        }
    }

    /// Parses a partial date or a full `YYYY-MM-DDThh:mm:ss[.f][Z|±hh:mm]` timestamp.
    pub fn parse(raw: &str) -> PrimitiveResult<Self> {
        let err = || PrimitiveError::Parse {
            kind: "dateTime",
            raw: raw.to_owned(),
        };
        if !raw.contains('T') {
            return FhirDate::parse(raw).map(FhirDateTime::Date).map_err(|_| err());
        }
        let fraction_digits = fraction_digits(raw).ok_or_else(err)?;

        if let Ok(value) = DateTime::parse_from_rfc3339(raw) {
            return Ok(FhirDateTime::Zoned {
                value,
                fraction_digits,
            });
        }

        NaiveDateTime::parse_from_str(raw, DATE_TIME_PARSE_FORMAT)
            .map(|value| FhirDateTime::Local {
                value,
                fraction_digits,
            })
            .map_err(|_| err())
    }
}

impl fmt::Display for FhirDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FhirDateTime::Date(d) => write!(f, "{}", d),
            FhirDateTime::Zoned {
                value,
                fraction_digits,
            } => {
                write!(f, "{}", value.format(DATE_TIME_FORMAT))?;
                write_fraction(f, value.nanosecond(), *fraction_digits)?;
                if value.offset().local_minus_utc() == 0 {
                    f.write_str("Z")
                } else {
                    write!(f, "{}", value.format("%:z"))
                }
            }
            FhirDateTime::Local {
                value,
                fraction_digits,
            } => {
                write!(f, "{}", value.format(DATE_TIME_FORMAT))?;
                write_fraction(f, value.nanosecond(), *fraction_digits)
            }
        }
    }
}

/// A time of day (`hh:mm:ss[.f]`) that keeps its fractional-second digits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FhirTime {
    value: NaiveTime,
    fraction_digits: u8,
}

impl FhirTime {
    pub fn parse(raw: &str) -> PrimitiveResult<Self> {
        let err = || PrimitiveError::Parse {
            kind: "time",
            raw: raw.to_owned(),
        };
        let fraction_digits = fraction_digits(raw).ok_or_else(err)?;
        NaiveTime::parse_from_str(raw, "%H:%M:%S%.f")
            .map(|value| FhirTime {
                value,
                fraction_digits,
            })
            .map_err(|_| err())
    }

    pub fn value(&self) -> NaiveTime {
        self.value
    }
}

impl fmt::Display for FhirTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value.format("%H:%M:%S"))?;
        write_fraction(f, self.value.nanosecond(), self.fraction_digits)
    }
}

/// Number of digits after the seconds' decimal point, `None` if there are more than fit.
fn fraction_digits(raw: &str) -> Option<u8> {
    let Some((_, fraction)) = raw.split_once('.') else {
        return Some(0);
    };
    let digits = fraction.bytes().take_while(u8::is_ascii_digit).count();
    if digits > MAX_FRACTION_DIGITS {
        return None;
    }
    u8::try_from(digits).ok()
}

fn write_fraction(f: &mut fmt::Formatter<'_>, nanos: u32, digits: u8) -> fmt::Result {
    if digits == 0 {
        return Ok(());
    }
    let padded = format!("{:09}", nanos % 1_000_000_000);
    let end = usize::from(digits).min(MAX_FRACTION_DIGITS);
    write!(f, ".{}", &padded[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_keeps_precision() {
        for raw in ["2022", "2022-08", "2022-08-09"] {
            let date = FhirDate::parse(raw).expect("valid date");
            assert_eq!(date.to_string(), raw);
        }
    }

    #[test]
    fn date_rejects_bad_values() {
        for raw in ["22", "2022-13", "2022-02-30", "2022-8-9", "2022-08-09-01", ""] {
            assert!(FhirDate::parse(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn date_time_formats_utc_with_z() {
        let value = FhirDateTime::parse("2022-08-09T12:45:56Z").expect("valid");
        assert_eq!(value.to_string(), "2022-08-09T12:45:56Z");
    }

    #[test]
    fn date_time_keeps_offset_and_fraction() {
        let value = FhirDateTime::parse("2023-05-13T11:48:07.250+02:00").expect("valid");
        assert_eq!(value.to_string(), "2023-05-13T11:48:07.250+02:00");
    }

    #[test]
    fn date_time_accepts_partial_dates() {
        let value = FhirDateTime::parse("2023-05").expect("valid");
        assert_eq!(value, FhirDateTime::Date(FhirDate::YearMonth(2023, 5)));
        assert_eq!(value.to_string(), "2023-05");
    }

    #[test]
    fn date_time_without_offset_is_local() {
        let value = FhirDateTime::parse("2023-05-13T11:48:07").expect("valid");
        assert!(matches!(value, FhirDateTime::Local { .. }));
        assert_eq!(value.to_string(), "2023-05-13T11:48:07");
    }

    #[test]
    fn date_time_rejects_garbage() {
        assert!(FhirDateTime::parse("2023-05-13Tnoon").is_err());
        assert!(FhirDateTime::parse("yesterday").is_err());
    }

    #[test]
    fn now_has_second_precision() {
        let rendered = FhirDateTime::now().to_string();
        assert_eq!(rendered.len(), "2023-05-13T11:48:07Z".len());
        assert!(rendered.ends_with('Z'));
    }

    #[test]
    fn time_round_trips() {
        let time = FhirTime::parse("08:30:00").expect("valid");
        assert_eq!(time.to_string(), "08:30:00");
        assert!(FhirTime::parse("8:30").is_err());
    }

    #[test]
    fn fractional_seconds_keep_their_width() {
        for raw in ["12:00:00", "12:00:00.5", "12:00:00.500", "12:00:00.123456"] {
            assert_eq!(FhirTime::parse(raw).expect(raw).to_string(), raw);
        }
        for raw in [
            "2023-05-13T12:00:00+01:00",
            "2023-05-13T12:00:00.5+01:00",
            "2023-05-13T12:00:00.123456Z",
            "2023-05-13T12:00:00.5",
        ] {
            assert_eq!(FhirDateTime::parse(raw).expect(raw).to_string(), raw);
        }
        assert!(FhirTime::parse("12:00:00.1234567890").is_err());
    }
}
