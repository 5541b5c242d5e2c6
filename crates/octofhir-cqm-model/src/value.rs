//! Scalar values: date-time intervals, quantities and instants

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Text format used for instants everywhere they are rendered as strings
/// (SQL literals, relational projection, reports).
pub const INSTANT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A date-time interval with independently open or closed bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interval {
    /// Low bound
    pub low: NaiveDateTime,
    /// High bound
    pub high: NaiveDateTime,
    /// Whether the low bound is inclusive
    #[serde(default = "default_closed")]
    pub low_closed: bool,
    /// Whether the high bound is inclusive
    #[serde(default = "default_closed")]
    pub high_closed: bool,
}

fn default_closed() -> bool {
    true
}

impl Interval {
    pub fn new(low: NaiveDateTime, high: NaiveDateTime, low_closed: bool, high_closed: bool) -> Self {
        Self {
            low,
            high,
            low_closed,
            high_closed,
        }
    }

    /// `[low, high]`
    pub fn closed(low: NaiveDateTime, high: NaiveDateTime) -> Self {
        Self::new(low, high, true, true)
    }

    /// `[low, high)`
    pub fn half_open(low: NaiveDateTime, high: NaiveDateTime) -> Self {
        Self::new(low, high, true, false)
    }

    /// Value of the low bound (`start of`)
    pub fn start(&self) -> NaiveDateTime {
        self.low
    }

    /// Value of the high bound (`end of`)
    pub fn end(&self) -> NaiveDateTime {
        self.high
    }

    /// Whether the period `[start, end]` lies within this interval.
    ///
    /// The period start must be after the low bound (or equal, when the low
    /// bound is closed) and the period end before the high bound (or equal,
    /// when the high bound is closed). A period with a missing start or end
    /// never qualifies. An instant is the period `[t, t]`.
    pub fn includes(&self, start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> bool {
        let (Some(start), Some(end)) = (start, end) else {
            return false;
        };
        let after_low = if self.low_closed {
            start >= self.low
        } else {
            start > self.low
        };
        let before_high = if self.high_closed {
            end <= self.high
        } else {
            end < self.high
        };
        after_low && before_high
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Interval{}{}, {}{}",
            if self.low_closed { '[' } else { '(' },
            self.low.format(INSTANT_FORMAT),
            self.high.format(INSTANT_FORMAT),
            if self.high_closed { ']' } else { ')' },
        )
    }
}

/// Significant digits kept when quantity values are compared. Relational
/// backends store values as IEEE doubles, which hold this many decimal digits
/// exactly, so both execution paths order values the same way.
pub const COMPARABLE_DIGITS: u32 = 15;

/// `value` rounded to [`COMPARABLE_DIGITS`] significant digits, trailing
/// zeros removed
pub fn comparable_decimal(value: &Decimal) -> Decimal {
    value.round_sf(COMPARABLE_DIGITS).unwrap_or(*value).normalize()
}

/// A decimal value with an optional unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quantity {
    pub value: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Quantity {
    pub fn new(value: Decimal, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: Some(unit.into()),
        }
    }

    pub fn unitless(value: Decimal) -> Self {
        Self { value, unit: None }
    }

    /// The value in the domain used for comparisons
    pub fn comparable(&self) -> Decimal {
        comparable_decimal(&self.value)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.unit {
            Some(unit) => write!(f, "{} '{}'", self.value, unit),
            None => write!(f, "{}", self.value),
        }
    }
}

/// Non-population value a define or parameter can hold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScalarValue {
    Interval(Interval),
    Quantity(Quantity),
    DateTime(NaiveDateTime),
}

impl ScalarValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ScalarValue::Interval(_) => "Interval",
            ScalarValue::Quantity(_) => "Quantity",
            ScalarValue::DateTime(_) => "DateTime",
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Interval(interval) => write!(f, "{interval}"),
            ScalarValue::Quantity(quantity) => write!(f, "{quantity}"),
            ScalarValue::DateTime(instant) => write!(f, "@{}", instant.format(INSTANT_FORMAT)),
        }
    }
}

/// Parse `YYYY-MM-DD`, `YYYY-MM-DDThh:mm[:ss[.fff]]` into an instant.
///
/// Date-only text is promoted to midnight. A trailing `Z` is accepted and
/// ignored; all instants are compared as local date-times.
pub fn parse_instant(text: &str) -> Option<NaiveDateTime> {
    let text = text.strip_suffix('Z').unwrap_or(text);
    let text = text.strip_suffix('T').unwrap_or(text);
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
}
