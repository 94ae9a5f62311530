//! Lap Record Normalizer
//!
//! Converts a raw lap table into canonical [`LapRecord`]s: reconciles column
//! names, converts lap times to seconds and drops rows that cannot take part
//! in pairing or labeling.

use polars::prelude::*;
use tracing::{debug, info};

use crate::data::columns::{CanonicalColumn, ColumnMapping};
use crate::data::csv_loader::LapTable;
use crate::data::lap_time::parse_pace;
use crate::error::Result;
use crate::models::{Compound, LapRecord};

/// Normalizer output
#[derive(Debug, Clone)]
pub struct NormalizedLaps {
    pub records: Vec<LapRecord>,
    /// Rows dropped for missing or invalid required values
    pub dropped: usize,
}

/// Lap record normalization
pub struct LapRecordNormalizer;

impl LapRecordNormalizer {
    /// Normalize a raw lap table
    pub fn normalize(table: &LapTable) -> Result<NormalizedLaps> {
        let mapping = ColumnMapping::reconcile(&table.headers())?;
        Self::normalize_frame(table.frame(), &mapping)
    }

    fn normalize_frame(df: &DataFrame, mapping: &ColumnMapping) -> Result<NormalizedLaps> {
        let sessions = text_values(df, mapping.source(CanonicalColumn::Session))?;
        let competitors = text_values(df, mapping.source(CanonicalColumn::Competitor))?;
        let intervals = numeric_values(df, mapping.source(CanonicalColumn::Interval))?;
        let standings = numeric_values(df, mapping.source(CanonicalColumn::Standing))?;
        let paces = pace_values(df, mapping.source(CanonicalColumn::Pace))?;
        let tire_ages = numeric_values(df, mapping.source(CanonicalColumn::TireAge))?;
        let compounds = text_values(df, mapping.source(CanonicalColumn::Compound))?;

        let mut records = Vec::with_capacity(df.height());
        let mut dropped = 0usize;

        for i in 0..df.height() {
            let record = match (
                &sessions[i],
                &competitors[i],
                intervals[i].and_then(to_count),
                standings[i].and_then(to_count).filter(|&s| s >= 1),
                paces[i],
                tire_ages[i].and_then(to_count),
                &compounds[i],
            ) {
                (
                    Some(session),
                    Some(competitor),
                    Some(interval),
                    Some(standing),
                    Some(pace),
                    Some(tire_age),
                    Some(compound),
                ) => LapRecord {
                    session: session.clone(),
                    competitor: competitor.clone(),
                    interval,
                    standing,
                    pace,
                    tire_age,
                    compound: Compound::parse(compound),
                },
                _ => {
                    dropped += 1;
                    continue;
                }
            };
            records.push(record);
        }

        if dropped > 0 {
            debug!("Dropped {} rows with missing required values", dropped);
        }
        info!(
            "Normalized {} lap records ({} dropped)",
            records.len(),
            dropped
        );

        Ok(NormalizedLaps { records, dropped })
    }
}

/// Non-negative whole number from a float cell (exports often write `3.0`)
fn to_count(value: f64) -> Option<u32> {
    if value.is_finite() && value >= 0.0 && value <= u32::MAX as f64 {
        Some(value.round() as u32)
    } else {
        None
    }
}

fn text_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let series = df.column(name)?;
    let as_text = match series.dtype() {
        DataType::String => series.clone(),
        dtype if dtype.is_float() => series.cast(&DataType::Int64)?.cast(&DataType::String)?,
        _ => series.cast(&DataType::String)?,
    };

    Ok(as_text
        .str()?
        .into_iter()
        .map(|v| v.map(str::trim).filter(|s| !s.is_empty()).map(String::from))
        .collect())
}

fn numeric_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = df.column(name)?.cast(&DataType::Float64)?;
    Ok(series
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect())
}

/// Lap times in seconds from string, duration or numeric columns
fn pace_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = df.column(name)?;

    let values: Vec<Option<f64>> = match series.dtype() {
        DataType::String => series
            .str()?
            .into_iter()
            .map(|v| v.and_then(parse_pace))
            .collect(),
        DataType::Duration(unit) => {
            let per_second = match unit {
                TimeUnit::Nanoseconds => 1e9,
                TimeUnit::Microseconds => 1e6,
                TimeUnit::Milliseconds => 1e3,
            };
            series
                .cast(&DataType::Int64)?
                .i64()?
                .into_iter()
                .map(|v| v.map(|ticks| ticks as f64 / per_second))
                .collect()
        }
        _ => numeric_values(df, name)?,
    };

    Ok(values
        .into_iter()
        .map(|v| v.filter(|&secs| secs > 0.0))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> DataFrame {
        df!(
            "Year" => &[2023i64, 2023, 2023, 2023],
            "Driver" => &["VER", "LEC", "HAM", "NOR"],
            "LapNumber" => &[1.0, 1.0, 1.0, 1.0],
            "LapTime" => &[
                "0 days 00:01:24.500000",
                "0 days 00:01:25.100000",
                "NaT",
                "0 days 00:01:26.000000",
            ],
            "Position" => &[Some(1.0), Some(2.0), Some(3.0), None],
            "TyreLife" => &[3.0, 5.0, 2.0, 4.0],
            "Compound" => &["MEDIUM", "soft", "HARD", "HARD"]
        )
        .unwrap()
    }

    #[test]
    fn test_normalize_string_pace() {
        let table = LapTable::from_frame(sample_frame());
        let laps = LapRecordNormalizer::normalize(&table).unwrap();

        // HAM has no lap time, NOR has no position
        assert_eq!(laps.records.len(), 2);
        assert_eq!(laps.dropped, 2);

        let ver = &laps.records[0];
        assert_eq!(ver.session, "2023");
        assert_eq!(ver.competitor, "VER");
        assert_eq!(ver.interval, 1);
        assert_eq!(ver.standing, 1);
        assert!((ver.pace - 84.5).abs() < 1e-9);
        assert_eq!(ver.tire_age, 3);
        assert_eq!(ver.compound, Compound::Medium);

        assert_eq!(laps.records[1].compound, Compound::Soft);
    }

    #[test]
    fn test_normalize_numeric_pace_and_aliases() {
        let df = df!(
            "GP_Name" => &["Monza", "Monza"],
            "Abbreviation" => &["VER", "LEC"],
            "Lap" => &[7i64, 7],
            "LapTime_Sec" => &[84.25, 85.0],
            "Standing" => &[1i64, 2],
            "TireAge" => &[10i64, 12],
            "Tyre" => &["HARD", "C5"]
        )
        .unwrap();

        let laps = LapRecordNormalizer::normalize(&LapTable::from_frame(df)).unwrap();
        assert_eq!(laps.records.len(), 2);
        assert_eq!(laps.records[0].session, "Monza");
        assert_eq!(laps.records[0].interval, 7);
        assert!((laps.records[0].pace - 84.25).abs() < 1e-9);
        assert_eq!(laps.records[1].compound, Compound::Unknown);
    }

    #[test]
    fn test_normalize_duration_pace() {
        let mut df = df!(
            "Year" => &[2023i64, 2023, 2023, 2023],
            "Driver" => &["VER", "LEC", "HAM", "NOR"],
            "LapNumber" => &[4i64, 4, 4, 4],
            "LapTime" => &[84_500i64, 85_100, 0, -2_000],
            "Position" => &[1i64, 2, 3, 4],
            "TyreLife" => &[8i64, 9, 10, 11],
            "Compound" => &["SOFT", "SOFT", "HARD", "HARD"]
        )
        .unwrap();
        let durations = df
            .column("LapTime")
            .unwrap()
            .cast(&DataType::Duration(TimeUnit::Milliseconds))
            .unwrap();
        df.with_column(durations).unwrap();

        let laps = LapRecordNormalizer::normalize(&LapTable::from_frame(df)).unwrap();

        // Zero and negative durations are missing pace
        assert_eq!(laps.records.len(), 2);
        assert_eq!(laps.dropped, 2);
        assert!((laps.records[0].pace - 84.5).abs() < 1e-9);
        assert!((laps.records[1].pace - 85.1).abs() < 1e-9);
    }

    #[test]
    fn test_missing_compound_dropped() {
        let df = df!(
            "Year" => &[2022i64, 2022],
            "Driver" => &["VER", "LEC"],
            "LapNumber" => &[1i64, 1],
            "LapTime" => &[84.0, 85.0],
            "Position" => &[1i64, 2],
            "TyreLife" => &[1i64, 1],
            "Compound" => &[Some("SOFT"), None]
        )
        .unwrap();

        let laps = LapRecordNormalizer::normalize(&LapTable::from_frame(df)).unwrap();
        assert_eq!(laps.records.len(), 1);
        assert_eq!(laps.dropped, 1);
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let df = df!(
            "Year" => &[2022i64],
            "Driver" => &["VER"],
            "LapNumber" => &[1i64],
            "LapTime" => &[84.0],
            "TyreLife" => &[1i64],
            "Compound" => &["SOFT"]
        )
        .unwrap();

        assert!(LapRecordNormalizer::normalize(&LapTable::from_frame(df)).is_err());
    }

    #[test]
    fn test_to_count() {
        assert_eq!(to_count(3.0), Some(3));
        assert_eq!(to_count(2.6), Some(3));
        assert_eq!(to_count(-1.0), None);
        assert_eq!(to_count(f64::NAN), None);
    }
}
