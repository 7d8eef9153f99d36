//! Export bridge and the default CSV exporter.
use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::{CaptureError, CaptureResult};
use crate::results::ResultSet;

/// How an export ended, when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// Results were written to this location.
    Saved(PathBuf),
    /// The operator declined to pick a destination; nothing was written.
    Cancelled,
}

/// Persists a finalized result table.
pub trait Exporter {
    /// Writes `results`, keeping their order.
    fn export(&mut self, results: &ResultSet) -> anyhow::Result<ExportOutcome>;
}

/// Hands finalized results to an [`Exporter`] and reports what happened.
pub struct ExportBridge {
    exporter: Box<dyn Exporter>,
}

impl ExportBridge {
    /// Bridge to `exporter`.
    pub fn new(exporter: Box<dyn Exporter>) -> Self {
        Self { exporter }
    }

    /// Exports `results`. Exporter failures come back as
    /// [`CaptureError::Exporter`] with the original error inside.
    pub fn export(&mut self, results: &ResultSet) -> CaptureResult<ExportOutcome> {
        let outcome = self
            .exporter
            .export(results)
            .map_err(CaptureError::Exporter)?;
        match &outcome {
            ExportOutcome::Saved(path) => {
                info!(rows = results.len(), path = %path.display(), "results exported")
            }
            ExportOutcome::Cancelled => warn!("No file selected. Results were not saved."),
        }
        Ok(outcome)
    }
}

impl std::fmt::Debug for ExportBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportBridge").finish_non_exhaustive()
    }
}

// ============================================================================
// CSV Exporter
// ============================================================================

#[cfg(feature = "storage_csv")]
mod csv_enabled {
    use super::*;
    use anyhow::Context;
    use std::path::Path;

    /// Writes a two-column `LPS,Score` table.
    ///
    /// With no destination the export is treated as cancelled, matching an
    /// operator closing the save dialog.
    #[derive(Debug, Clone, Default)]
    pub struct CsvExporter {
        path: Option<PathBuf>,
    }

    impl CsvExporter {
        /// Exporter writing to `path`, or cancelling when `None`.
        pub fn new(path: Option<PathBuf>) -> Self {
            Self { path }
        }

        fn write(path: &Path, results: &ResultSet) -> anyhow::Result<()> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create export directory at {:?}", parent)
                })?;
            }
            let mut writer = csv::Writer::from_path(path)
                .with_context(|| format!("Failed to create CSV file at {:?}", path))?;
            if results.is_empty() {
                writer
                    .write_record(["LPS", "Score"])
                    .context("Failed to write CSV header")?;
            }
            for record in results.records() {
                writer
                    .serialize(record)
                    .context("Failed to write score to CSV file")?;
            }
            writer.flush().context("Failed to flush CSV writer")?;
            Ok(())
        }
    }

    impl Exporter for CsvExporter {
        fn export(&mut self, results: &ResultSet) -> anyhow::Result<ExportOutcome> {
            let Some(path) = self.path.clone() else {
                return Ok(ExportOutcome::Cancelled);
            };
            Self::write(&path, results)?;
            // Score vs LPS series, in acceptance order, for whoever plots it.
            info!(series = ?results.pairs(), "Image Score vs LPS");
            Ok(ExportOutcome::Saved(path))
        }
    }
}

#[cfg(not(feature = "storage_csv"))]
mod csv_disabled {
    use super::*;

    /// Placeholder when CSV support is compiled out.
    #[derive(Debug, Clone, Default)]
    pub struct CsvExporter;

    impl CsvExporter {
        /// Always fails on export.
        pub fn new(_path: Option<PathBuf>) -> Self {
            Self
        }
    }

    impl Exporter for CsvExporter {
        fn export(&mut self, _results: &ResultSet) -> anyhow::Result<ExportOutcome> {
            Err(CaptureError::FeatureNotEnabled("storage_csv".to_string()).into())
        }
    }
}

#[cfg(feature = "storage_csv")]
pub use csv_enabled::CsvExporter;
#[cfg(not(feature = "storage_csv"))]
pub use csv_disabled::CsvExporter;
