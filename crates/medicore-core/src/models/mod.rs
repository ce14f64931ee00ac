//! Domain models for the medicore system.

mod appointment;
mod audit;
mod bill;
mod doctor;
mod page;
mod patient;
mod stats;

pub use appointment::*;
pub use audit::*;
pub use bill::*;
pub use doctor::*;
pub use page::*;
pub use patient::*;
pub use stats::*;

use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire format for appointment dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Wire format for appointment times (24-hour).
pub const TIME_FORMAT: &str = "%H:%M";

/// Minimum zero-padded width of the numeric part of an identifier.
pub const ID_MIN_WIDTH: usize = 4;

/// A field value that could not be interpreted.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid {field}: {value:?}")]
pub struct InvalidValue {
    pub field: &'static str,
    pub value: String,
}

impl InvalidValue {
    pub fn new(field: &'static str, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }
}

/// The record types that carry sequential human-readable identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Patient,
    Doctor,
    Appointment,
    Bill,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Patient,
        EntityKind::Doctor,
        EntityKind::Appointment,
        EntityKind::Bill,
    ];

    /// Identifier prefix letter.
    pub fn prefix(&self) -> char {
        match self {
            EntityKind::Patient => 'P',
            EntityKind::Doctor => 'D',
            EntityKind::Appointment => 'A',
            EntityKind::Bill => 'B',
        }
    }

    /// Backing table name.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Patient => "patients",
            EntityKind::Doctor => "doctors",
            EntityKind::Appointment => "appointments",
            EntityKind::Bill => "bills",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Patient => "patient",
            EntityKind::Doctor => "doctor",
            EntityKind::Appointment => "appointment",
            EntityKind::Bill => "bill",
        }
    }

    /// Format the identifier for sequence number `n`.
    ///
    /// The numeric part is padded to [`ID_MIN_WIDTH`] digits and grows past
    /// it instead of wrapping, so `P9999` is followed by `P10000`.
    pub fn format_id(&self, n: u64) -> String {
        format!("{}{:0width$}", self.prefix(), n, width = ID_MIN_WIDTH)
    }

    /// Parse the sequence number out of an identifier of this kind.
    pub fn parse_id(&self, id: &str) -> Option<u64> {
        let digits = id.strip_prefix(self.prefix())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(EntityKind::Patient),
            "doctor" => Ok(EntityKind::Doctor),
            "appointment" => Ok(EntityKind::Appointment),
            "bill" => Ok(EntityKind::Bill),
            _ => Err(InvalidValue::new("entity type", s)),
        }
    }
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate, InvalidValue> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map_err(|_| InvalidValue::new("date", s))
}

/// Parse an `HH:MM` time.
pub fn parse_time(s: &str) -> Result<NaiveTime, InvalidValue> {
    NaiveTime::parse_from_str(s.trim(), TIME_FORMAT).map_err(|_| InvalidValue::new("time", s))
}

/// Round to currency precision (two places, midpoint away from zero).
pub fn round_money(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

/// Serde adapter for `HH:MM` times.
pub mod time_hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIME_FORMAT;

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format(TIME_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_time(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for optional `HH:MM` times.
pub mod option_time_hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIME_FORMAT;

    pub fn serialize<S: Serializer>(
        time: &Option<NaiveTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match time {
            Some(t) => serializer.collect_str(&t.format(TIME_FORMAT)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveTime>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|s| super::parse_time(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
