//! Lap data ingestion and normalization modules

pub mod columns;
pub mod csv_loader;
pub mod lap_time;
pub mod normalizer;

// Re-export commonly used types
pub use columns::{CanonicalColumn, ColumnMapping};
pub use csv_loader::LapTable;
pub use lap_time::parse_pace;
pub use normalizer::{LapRecordNormalizer, NormalizedLaps};
