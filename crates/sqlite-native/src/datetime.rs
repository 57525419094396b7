//! Storage formats for date/time values.
//!
//! SQLite has no date/time storage class. A connection picks one encoding and
//! every date/time bind goes through it, so values written by one statement
//! compare and sort consistently with values written by another.

use serde::{Deserialize, Serialize};
use time::macros::{datetime, format_description};
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime, Time};

/// Ticks (100ns units) per second.
const TICKS_PER_SECOND: i64 = 10_000_000;

/// Julian day number of the Unix epoch.
const UNIX_EPOCH_JULIAN_DAY: f64 = 2_440_587.5;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// How date/time values are encoded when bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateTimeFormat {
   /// `YYYY-MM-DD HH:MM:SS[.fffffff]` text.
   #[default]
   Iso8601,
   /// 100ns ticks since 0001-01-01 00:00:00, stored as INTEGER.
   Ticks,
   /// Whole seconds since 1970-01-01 00:00:00 UTC, stored as INTEGER.
   UnixEpoch,
   /// Fractional Julian day number, stored as REAL.
   JulianDay,
}

/// A date/time value encoded into one of SQLite's storage classes.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredDateTime {
   Text(String),
   Integer(i64),
   Real(f64),
}

impl DateTimeFormat {
   /// Encode `value` for storage.
   ///
   /// Date/times are treated as UTC for the epoch-based encodings.
   pub fn encode(&self, value: PrimitiveDateTime) -> StoredDateTime {
      match self {
         DateTimeFormat::Iso8601 => StoredDateTime::Text(format_iso8601(value)),
         DateTimeFormat::Ticks => StoredDateTime::Integer(to_ticks(value)),
         DateTimeFormat::UnixEpoch => StoredDateTime::Integer(value.assume_utc().unix_timestamp()),
         DateTimeFormat::JulianDay => {
            let nanos = value.assume_utc().unix_timestamp_nanos() as f64;
            StoredDateTime::Real(nanos / 1e9 / SECONDS_PER_DAY + UNIX_EPOCH_JULIAN_DAY)
         }
      }
   }

   /// Parse text written in this format back into a date/time.
   ///
   /// ISO-8601 text is accepted under every format so that literal dates in
   /// application code always work.
   pub fn parse(&self, text: &str) -> Option<PrimitiveDateTime> {
      let text = text.trim();
      let native = match self {
         DateTimeFormat::Iso8601 => None,
         DateTimeFormat::Ticks => text.parse::<i64>().ok().and_then(from_ticks),
         DateTimeFormat::UnixEpoch => text
            .parse::<i64>()
            .ok()
            .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
            .map(|odt| PrimitiveDateTime::new(odt.date(), odt.time())),
         DateTimeFormat::JulianDay => text.parse::<f64>().ok().and_then(from_julian_day),
      };

      native.or_else(|| parse_iso8601(text))
   }
}

/// Format as `YYYY-MM-DD HH:MM:SS`, adding up to seven fractional digits with
/// trailing zeros trimmed.
pub fn format_iso8601(value: PrimitiveDateTime) -> String {
   let mut out = format!(
      "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
      value.year(),
      u8::from(value.month()),
      value.day(),
      value.hour(),
      value.minute(),
      value.second()
   );

   let ticks = value.nanosecond() / 100;
   if ticks != 0 {
      let fraction = format!("{:07}", ticks);
      out.push('.');
      out.push_str(fraction.trim_end_matches('0'));
   }

   out
}

fn parse_iso8601(text: &str) -> Option<PrimitiveDateTime> {
   let text = text.strip_suffix('Z').unwrap_or(text);
   let normalized = if text.len() > 10 && text.as_bytes()[10] == b'T' {
      format!("{} {}", &text[..10], &text[11..])
   } else {
      text.to_string()
   };

   let layouts = [
      format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
      format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
      format_description!("[year]-[month]-[day] [hour]:[minute]"),
   ];
   for layout in layouts {
      if let Ok(dt) = PrimitiveDateTime::parse(&normalized, layout) {
         return Some(dt);
      }
   }

   Date::parse(&normalized, format_description!("[year]-[month]-[day]"))
      .ok()
      .map(|date| PrimitiveDateTime::new(date, Time::MIDNIGHT))
}

fn ticks_epoch() -> PrimitiveDateTime {
   datetime!(0001-01-01 0:00)
}

fn to_ticks(value: PrimitiveDateTime) -> i64 {
   let elapsed = value - ticks_epoch();
   (elapsed.whole_nanoseconds() / 100) as i64
}

fn from_ticks(ticks: i64) -> Option<PrimitiveDateTime> {
   let seconds = ticks.div_euclid(TICKS_PER_SECOND);
   let nanos = (ticks.rem_euclid(TICKS_PER_SECOND) * 100) as i32;
   ticks_epoch().checked_add(Duration::new(seconds, nanos))
}

fn from_julian_day(day: f64) -> Option<PrimitiveDateTime> {
   if !day.is_finite() {
      return None;
   }
   let nanos = ((day - UNIX_EPOCH_JULIAN_DAY) * SECONDS_PER_DAY * 1e9).round() as i128;
   OffsetDateTime::from_unix_timestamp_nanos(nanos)
      .ok()
      .map(|odt| PrimitiveDateTime::new(odt.date(), odt.time()))
}
