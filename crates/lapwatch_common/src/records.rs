//! Upstream timing records.
//!
//! Every optional or nullable key is a [`Field`], so a record that omits a
//! key is distinguishable from one that sends it as `null`.

use serde::{Deserialize, Deserializer};
use std::fmt;

/// Driver number used when a record carries no `driver_number`.
pub const DEFAULT_DRIVER_NUMBER: &str = "16";

/// Presence state of a single JSON key.
#[derive(Debug, Clone, PartialEq)]
pub enum Field<T> {
    /// Key not sent at all
    Absent,
    /// Key sent with `null`
    Null,
    /// Key sent with a value
    Present(T),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Absent
    }
}

impl<T> Field<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Field::Absent)
    }

    pub fn is_present_key(&self) -> bool {
        !self.is_absent()
    }

    pub fn as_option(&self) -> Option<&T> {
        match self {
            Field::Present(value) => Some(value),
            _ => None,
        }
    }
}

impl Field<f64> {
    /// Value with null and absent normalized to `0.0`
    pub fn or_zero(&self) -> f64 {
        self.as_option().copied().unwrap_or(0.0)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => Field::Present(value),
            None => Field::Null,
        })
    }
}

/// Driver number normalized to its decimal string form.
///
/// Upstream sends integers; the mapping file keys are strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DriverNumber(String);

impl DriverNumber {
    pub fn new(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DriverNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for DriverNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(u64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Int(n) => DriverNumber(n.to_string()),
            Raw::Text(s) => DriverNumber(s.trim().to_string()),
        })
    }
}

/// Resolve the driver number a record refers to, applying the default.
pub fn driver_number_or_default(field: &Field<DriverNumber>) -> DriverNumber {
    match field {
        Field::Present(number) => number.clone(),
        Field::Absent | Field::Null => DriverNumber::new(DEFAULT_DRIVER_NUMBER),
    }
}

/// Required key whose value may be `null`.
fn required_nullable<'de, D, T>(deserializer: D) -> Result<Field<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Field::deserialize(deserializer)
}

/// Timing delta that may arrive as a number, a numeric string, or a
/// marker such as `"+1 LAP"`. Markers become `Null`.
fn lenient_seconds<'de, D>(deserializer: D) -> Result<Field<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => Field::Null,
        Some(Raw::Number(n)) => Field::Present(n),
        Some(Raw::Text(s)) => match s.trim().trim_start_matches('+').parse::<f64>() {
            Ok(n) => Field::Present(n),
            Err(_) => Field::Null,
        },
    })
}

/// One lap for one driver.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LapRecord {
    #[serde(default)]
    pub driver_number: Field<DriverNumber>,
    #[serde(deserialize_with = "required_nullable")]
    pub lap_number: Field<f64>,
    #[serde(deserialize_with = "required_nullable")]
    pub duration_sector_1: Field<f64>,
    #[serde(deserialize_with = "required_nullable")]
    pub duration_sector_2: Field<f64>,
    #[serde(deserialize_with = "required_nullable")]
    pub duration_sector_3: Field<f64>,
    #[serde(default)]
    pub lap_duration: Field<f64>,
    #[serde(default)]
    pub speed_trap: Field<f64>,
    #[serde(deserialize_with = "required_nullable")]
    pub is_pit_out_lap: Field<bool>,
}

impl LapRecord {
    pub fn is_pit_out(&self) -> bool {
        matches!(self.is_pit_out_lap, Field::Present(true))
    }
}

/// Race timing deltas for one driver.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IntervalRecord {
    #[serde(default)]
    pub driver_number: Field<DriverNumber>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub gap_to_leader: Field<f64>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub interval: Field<f64>,
}

/// Running order entry for one driver.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PositionRecord {
    #[serde(default)]
    pub driver_number: Field<DriverNumber>,
    #[serde(default)]
    pub position: Field<f64>,
}

/// Kind of session currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionType {
    Practice,
    Qualifying,
    Race,
    Sprint,
    Unknown,
}

impl SessionType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "Practice" => SessionType::Practice,
            "Qualifying" => SessionType::Qualifying,
            "Race" => SessionType::Race,
            "Sprint" => SessionType::Sprint,
            _ => SessionType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Practice => "Practice",
            SessionType::Qualifying => "Qualifying",
            SessionType::Race => "Race",
            SessionType::Sprint => "Sprint",
            SessionType::Unknown => "Unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        *self != SessionType::Unknown
    }

    /// Race and sprint sessions carry intervals and positions
    pub fn is_race_like(&self) -> bool {
        matches!(self, SessionType::Race | SessionType::Sprint)
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry of the `sessions` collection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionDescriptor {
    #[serde(default)]
    pub session_type: Option<String>,
}

impl SessionDescriptor {
    pub fn kind(&self) -> SessionType {
        self.session_type
            .as_deref()
            .map(SessionType::parse)
            .unwrap_or(SessionType::Unknown)
    }
}
