//! Hand-off of chart payloads to a renderer
//!
//! Rendering, layout and image export belong to the consumer; this crate
//! only writes the computed series.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{AnalysisError, Result};
use crate::series::ChartPayload;

/// Destination for computed charts
pub trait ChartSink {
    /// Store a chart under a name relative to the sink's root.
    ///
    /// Returns where the chart ended up, for reporting.
    fn write_chart(&self, name: &Path, chart: &ChartPayload) -> Result<PathBuf>;
}

/// Writes each chart as pretty-printed JSON below a root directory
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    root: PathBuf,
}

impl JsonFileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ChartSink for JsonFileSink {
    fn write_chart(&self, name: &Path, chart: &ChartPayload) -> Result<PathBuf> {
        let path = self.root.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| AnalysisError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(chart)
            .map_err(|e| AnalysisError::sink("serialize chart payload", e))?;
        fs::write(&path, json).map_err(|e| AnalysisError::io(&path, e))?;
        info!("{:?} chart saved to {}", chart.view, path.display());
        Ok(path)
    }
}
