//! Change-history timestamp encodings.
//!
//! A backing store declares how it spells created/modified columns; the
//! mapper moves between that spelling and `OffsetDateTime` on the entity.

use thiserror::Error;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Iso8601;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::domain::FieldValue;

const NAIVE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Wire spelling of a change-history column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampEncoding {
    /// Integer seconds since the Unix epoch.
    EpochSeconds,
    /// ISO 8601 calendar string with offset.
    Iso8601,
    /// Wall-clock `YYYY-MM-DD hh:mm:ss` without a zone, read as UTC.
    NaiveDateTime,
}

/// A timestamp column that does not parse under its declared encoding.
///
/// Whether this is a configuration defect (trusted storage) or a validation
/// failure (caller input) is decided by the mapper at the call site.
#[derive(Debug, Clone, Error)]
#[error("malformed {encoding:?} timestamp: {detail}")]
pub struct TimestampError {
    pub encoding: TimestampEncoding,
    pub detail: String,
}

impl TimestampEncoding {
    fn error(self, detail: impl Into<String>) -> TimestampError {
        TimestampError {
            encoding: self,
            detail: detail.into(),
        }
    }

    /// Render an instant in this encoding. Sub-second precision is dropped;
    /// every encoding here is second-granular.
    pub fn encode(self, ts: OffsetDateTime) -> Result<FieldValue, TimestampError> {
        match self {
            Self::EpochSeconds => Ok(FieldValue::Int(ts.unix_timestamp())),
            Self::Iso8601 => {
                let truncated = ts.replace_nanosecond(0).map_err(|e| self.error(e.to_string()))?;
                let rendered = truncated
                    .format(&Iso8601::DEFAULT)
                    .map_err(|e| self.error(e.to_string()))?;
                Ok(FieldValue::Text(rendered))
            }
            Self::NaiveDateTime => {
                let utc = ts.to_offset(time::UtcOffset::UTC);
                let naive = PrimitiveDateTime::new(utc.date(), utc.time());
                let rendered = naive
                    .format(&NAIVE_FORMAT)
                    .map_err(|e| self.error(e.to_string()))?;
                Ok(FieldValue::Text(rendered))
            }
        }
    }

    /// Parse a column value in this encoding.
    pub fn decode(self, value: &FieldValue) -> Result<OffsetDateTime, TimestampError> {
        match self {
            Self::EpochSeconds => {
                let seconds = match value {
                    FieldValue::Int(i) => *i,
                    FieldValue::Text(s) => s
                        .trim()
                        .parse::<i64>()
                        .map_err(|e| self.error(format!("{s:?}: {e}")))?,
                    other => return Err(self.error(format!("expected integer, got {other:?}"))),
                };
                OffsetDateTime::from_unix_timestamp(seconds)
                    .map_err(|e| self.error(e.to_string()))
            }
            Self::Iso8601 => {
                let text = self.expect_text(value)?;
                OffsetDateTime::parse(text, &Iso8601::DEFAULT)
                    .map_err(|e| self.error(format!("{text:?}: {e}")))
            }
            Self::NaiveDateTime => {
                let text = self.expect_text(value)?;
                PrimitiveDateTime::parse(text, &NAIVE_FORMAT)
                    .map(PrimitiveDateTime::assume_utc)
                    .map_err(|e| self.error(format!("{text:?}: {e}")))
            }
        }
    }

    fn expect_text(self, value: &FieldValue) -> Result<&str, TimestampError> {
        match value {
            FieldValue::Text(s) => Ok(s),
            other => Err(self.error(format!("expected text, got {other:?}"))),
        }
    }
}
