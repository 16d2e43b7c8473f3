//! Record to gauge mapping.
//!
//! Transforms are pure: they turn one poll's records into a list of
//! `GaugeUpdate`s, or fail as a whole. Nothing is written until `apply`.
//!
//! Rules shared by both modes:
//! - the driver code is resolved first; a record without a driver number
//!   uses `DEFAULT_DRIVER_NUMBER`, and an unknown number fails the transform
//! - pit-out laps produce no updates
//! - null values are written as `0.0`

use crate::metrics::{GaugeSink, Metric};
use lapwatch_common::records::driver_number_or_default;
use lapwatch_common::{
    DriverDirectory, DriverNumber, Field, IntervalRecord, LapRecord, PositionRecord,
};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransformError {
    #[error("Driver number {0} is not in the driver directory")]
    UnknownDriver(String),
}

impl TransformError {
    /// Label used when counting aborted cycles
    pub fn kind(&self) -> &'static str {
        match self {
            TransformError::UnknownDriver(_) => "unknown_driver",
        }
    }
}

/// One gauge write
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeUpdate {
    pub metric: Metric,
    pub driver: String,
    pub value: f64,
}

impl GaugeUpdate {
    fn new(metric: Metric, driver: &str, value: f64) -> Self {
        Self {
            metric,
            driver: driver.to_string(),
            value,
        }
    }
}

fn resolve_code<'a>(
    directory: &'a DriverDirectory,
    number: &Field<DriverNumber>,
) -> Result<&'a str, TransformError> {
    let number = driver_number_or_default(number);
    directory
        .lookup(number.as_str())
        .ok_or_else(|| TransformError::UnknownDriver(number.to_string()))
}

/// lap_count and the three sector gauges, shared by both modes
fn push_lap_core(updates: &mut Vec<GaugeUpdate>, driver: &str, lap: &LapRecord) {
    updates.push(GaugeUpdate::new(Metric::LapCount, driver, lap.lap_number.or_zero()));
    updates.push(GaugeUpdate::new(
        Metric::Sector1Time,
        driver,
        lap.duration_sector_1.or_zero(),
    ));
    updates.push(GaugeUpdate::new(
        Metric::Sector2Time,
        driver,
        lap.duration_sector_2.or_zero(),
    ));
    updates.push(GaugeUpdate::new(
        Metric::Sector3Time,
        driver,
        lap.duration_sector_3.or_zero(),
    ));
}

/// Qualifying: lap gauges, plus lap_time and speed_trap when their keys are
/// present (a `null` value still writes `0.0`).
pub fn lap_updates(
    laps: &[LapRecord],
    directory: &DriverDirectory,
) -> Result<Vec<GaugeUpdate>, TransformError> {
    let mut updates = Vec::with_capacity(laps.len() * 6);

    for lap in laps {
        let driver = resolve_code(directory, &lap.driver_number)?;
        if lap.is_pit_out() {
            continue;
        }

        push_lap_core(&mut updates, driver, lap);

        if lap.lap_duration.is_present_key() {
            updates.push(GaugeUpdate::new(Metric::LapTime, driver, lap.lap_duration.or_zero()));
        }
        if lap.speed_trap.is_present_key() {
            updates.push(GaugeUpdate::new(Metric::SpeedTrap, driver, lap.speed_trap.or_zero()));
        }
    }

    Ok(updates)
}

/// Race and sprint: three independent passes. A missing collection skips
/// its pass. lap_time and speed_trap are never written in this mode.
pub fn race_updates(
    laps: Option<&[LapRecord]>,
    intervals: Option<&[IntervalRecord]>,
    positions: Option<&[PositionRecord]>,
    directory: &DriverDirectory,
) -> Result<Vec<GaugeUpdate>, TransformError> {
    let mut updates = Vec::new();

    for lap in laps.unwrap_or_default() {
        let driver = resolve_code(directory, &lap.driver_number)?;
        if lap.is_pit_out() {
            continue;
        }
        push_lap_core(&mut updates, driver, lap);
    }

    for record in intervals.unwrap_or_default() {
        let driver = resolve_code(directory, &record.driver_number)?;
        updates.push(GaugeUpdate::new(
            Metric::GapToLeader,
            driver,
            record.gap_to_leader.or_zero(),
        ));
        updates.push(GaugeUpdate::new(Metric::Interval, driver, record.interval.or_zero()));
    }

    for record in positions.unwrap_or_default() {
        let driver = resolve_code(directory, &record.driver_number)?;
        updates.push(GaugeUpdate::new(Metric::Position, driver, record.position.or_zero()));
    }

    Ok(updates)
}

/// Write updates in order; later writes for the same series win.
pub fn apply(updates: &[GaugeUpdate], sink: &dyn GaugeSink) {
    for update in updates {
        sink.set(update.metric, &update.driver, update.value);
    }
}
