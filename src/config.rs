use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// Everything a report run needs to know, passed explicitly to each component.
///
/// Loaded from an optional JSON file; CLI flags override individual fields.
/// ```json
/// {
///   "data_dir": "data/univ",
///   "enrollment_term": "2021A",
///   "min_instructor_grades": 100
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub data_dir: PathBuf,
    pub enrollment_term: String,
    pub min_instructor_grades: usize,
    pub ranking_limit: usize,
    pub histogram_edges: Vec<f64>,
    pub strict_integrity: bool,
    pub preview_rows: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/univ"),
            enrollment_term: "2021A".to_string(),
            min_instructor_grades: 100,
            ranking_limit: 10,
            histogram_edges: default_histogram_edges(),
            strict_integrity: false,
            preview_rows: 10,
        }
    }
}

/// 0.00 to 4.00 in quarter steps: 17 edges, 16 buckets.
pub fn default_histogram_edges() -> Vec<f64> {
    (0..=16).map(|step| step as f64 * 0.25).collect()
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: AnalysisConfig = serde_json::from_str(&content)
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_edges(&self.histogram_edges)
    }
}

pub fn validate_edges(edges: &[f64]) -> Result<()> {
    let increasing = edges.windows(2).all(|pair| pair[0] < pair[1]);
    if edges.len() < 2 || !increasing || edges.iter().any(|e| !e.is_finite()) {
        return Err(AnalysisError::InvalidBinEdges);
    }
    Ok(())
}
