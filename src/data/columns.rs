//! Column reconciliation for heterogeneous lap exports
//!
//! Timing exports name the same field differently depending on the tool and
//! season that produced them. Each canonical column carries an ordered list of
//! accepted header names; the first one present in the file wins.

use std::collections::HashMap;
use std::fmt;
use tracing::info;

use crate::error::{PipelineError, Result};

/// Canonical lap record columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalColumn {
    Session,
    Competitor,
    Interval,
    Standing,
    Pace,
    TireAge,
    Compound,
}

impl CanonicalColumn {
    pub const ALL: [CanonicalColumn; 7] = [
        CanonicalColumn::Session,
        CanonicalColumn::Competitor,
        CanonicalColumn::Interval,
        CanonicalColumn::Standing,
        CanonicalColumn::Pace,
        CanonicalColumn::TireAge,
        CanonicalColumn::Compound,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CanonicalColumn::Session => "session",
            CanonicalColumn::Competitor => "competitor",
            CanonicalColumn::Interval => "interval",
            CanonicalColumn::Standing => "standing",
            CanonicalColumn::Pace => "pace",
            CanonicalColumn::TireAge => "tire_age",
            CanonicalColumn::Compound => "compound",
        }
    }

    /// Accepted source headers, in priority order
    pub fn synonyms(self) -> &'static [&'static str] {
        match self {
            CanonicalColumn::Session => &["Year", "Session", "SessionId", "GP_Name", "Race"],
            CanonicalColumn::Competitor => &["Driver", "DriverCode", "Abbreviation", "Competitor"],
            CanonicalColumn::Interval => &["LapNumber", "Lap", "Interval"],
            CanonicalColumn::Standing => &["Position", "Standing"],
            CanonicalColumn::Pace => &["LapTime", "LapTime_Sec", "LapTimeSeconds", "Pace"],
            CanonicalColumn::TireAge => &["TyreLife", "TireLife", "TireAge"],
            CanonicalColumn::Compound => &["Compound", "Compound_lap", "Tyre"],
        }
    }
}

impl fmt::Display for CanonicalColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved mapping from canonical column to source header
#[derive(Debug, Clone)]
pub struct ColumnMapping {
    resolved: HashMap<CanonicalColumn, String>,
}

impl ColumnMapping {
    /// Resolve every canonical column against the given headers
    ///
    /// Header comparison ignores ASCII case. A canonical column with no
    /// matching header is a fatal schema error.
    pub fn reconcile(headers: &[String]) -> Result<Self> {
        let mut resolved = HashMap::with_capacity(CanonicalColumn::ALL.len());

        for column in CanonicalColumn::ALL {
            let found = column.synonyms().iter().find_map(|synonym| {
                headers
                    .iter()
                    .find(|header| header.trim().eq_ignore_ascii_case(synonym))
            });

            match found {
                Some(header) => {
                    if !header.trim().eq_ignore_ascii_case(column.synonyms()[0]) {
                        info!("Column '{}' read from alias '{}'", column, header);
                    }
                    resolved.insert(column, header.clone());
                }
                None => {
                    return Err(PipelineError::MissingColumn {
                        column: column.name(),
                        available: headers.to_vec(),
                    })
                }
            }
        }

        Ok(Self { resolved })
    }

    /// Source header for a canonical column
    pub fn source(&self, column: CanonicalColumn) -> &str {
        // reconcile() guarantees every canonical column is present
        self.resolved
            .get(&column)
            .map(String::as_str)
            .unwrap_or_else(|| column.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_reconcile_primary_names() {
        let mapping = ColumnMapping::reconcile(&headers(&[
            "Driver", "LapNumber", "LapTime", "Position", "TyreLife", "Compound", "Year",
        ]))
        .unwrap();

        assert_eq!(mapping.source(CanonicalColumn::Session), "Year");
        assert_eq!(mapping.source(CanonicalColumn::Pace), "LapTime");
        assert_eq!(mapping.source(CanonicalColumn::TireAge), "TyreLife");
    }

    #[test]
    fn test_reconcile_aliases() {
        let mapping = ColumnMapping::reconcile(&headers(&[
            "GP_Name",
            "driver",
            "Lap",
            "LapTime_Sec",
            "Position",
            "TireAge",
            "Compound_lap",
        ]))
        .unwrap();

        assert_eq!(mapping.source(CanonicalColumn::Session), "GP_Name");
        assert_eq!(mapping.source(CanonicalColumn::Competitor), "driver");
        assert_eq!(mapping.source(CanonicalColumn::Interval), "Lap");
        assert_eq!(mapping.source(CanonicalColumn::Compound), "Compound_lap");
    }

    #[test]
    fn test_first_synonym_wins() {
        // Both Year and GP_Name present: Year has priority
        let mapping = ColumnMapping::reconcile(&headers(&[
            "GP_Name", "Year", "Driver", "LapNumber", "LapTime", "Position", "TyreLife",
            "Compound",
        ]))
        .unwrap();
        assert_eq!(mapping.source(CanonicalColumn::Session), "Year");
    }

    #[test]
    fn test_missing_required_column() {
        let err = ColumnMapping::reconcile(&headers(&[
            "Year", "Driver", "LapNumber", "LapTime", "TyreLife", "Compound",
        ]))
        .unwrap_err();

        match err {
            PipelineError::MissingColumn { column, .. } => assert_eq!(column, "standing"),
            other => panic!("unexpected error: {}", other),
        }
    }
}
