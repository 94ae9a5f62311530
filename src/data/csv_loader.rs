//! CSV loading for lap-by-lap telemetry exports

use polars::prelude::*;
use std::path::Path;
use tracing::info;

use crate::error::{PipelineError, Result};

/// Raw lap table as exported by the telemetry provider
///
/// One row per competitor per interval; column names and types are whatever
/// the export produced. [`crate::data::LapRecordNormalizer`] turns it into
/// canonical records.
pub struct LapTable {
    df: DataFrame,
}

impl LapTable {
    /// Load a lap export from CSV
    pub fn load<P: AsRef<Path>>(csv_path: P) -> Result<Self> {
        let path = csv_path.as_ref();
        if !path.exists() {
            return Err(PipelineError::MissingInput {
                path: path.to_path_buf(),
            });
        }

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?;

        info!(
            "Loaded {} lap rows x {} columns from {:?}",
            df.height(),
            df.width(),
            path
        );

        Ok(Self { df })
    }

    /// Wrap an already materialised frame
    pub fn from_frame(df: DataFrame) -> Self {
        Self { df }
    }

    pub fn frame(&self) -> &DataFrame {
        &self.df
    }

    /// Column headers in file order
    pub fn headers(&self) -> Vec<String> {
        self.df
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.df.height()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_csv() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "Driver,LapNumber,LapTime,Position,TyreLife,Compound,Year").unwrap();
        writeln!(file, "VER,1,0 days 00:01:24.500000,1.0,1.0,MEDIUM,2023").unwrap();
        writeln!(file, "LEC,1,0 days 00:01:25.100000,2.0,1.0,SOFT,2023").unwrap();
        file.flush().unwrap();

        let table = LapTable::load(file.path()).unwrap();
        assert_eq!(table.len(), 2);
        assert!(!table.is_empty());
        assert!(table.headers().contains(&"TyreLife".to_string()));
    }

    #[test]
    fn test_load_missing_file() {
        let err = LapTable::load("no/such/laps.csv").err().unwrap();
        assert!(matches!(err, PipelineError::MissingInput { .. }));
    }
}
