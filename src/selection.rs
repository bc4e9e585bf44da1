//! Selection of reportable rows
//!
//! Three independent gates, applied in order:
//!
//! 1. both pair members were measured and the model emitted one of them
//! 2. the passed-over member was a real competitor:
//!    `alt_prob >= min_ratio * chosen_prob`
//! 3. the emission itself was surprising: `surprisal > threshold`
//!
//! The probability view uses gates 1–2, the surprisal view 1–3. An empty
//! selection is a valid outcome.

use crate::error::{AnalysisError, Result};
use crate::metrics::AnalyzedRow;

/// Default competitor ratio: the alternative must reach a third of the choice
pub const DEFAULT_MIN_RATIO: f64 = 1.0 / 3.0;

/// Default surprisal gate, in bits
pub const DEFAULT_SURPRISAL_THRESHOLD: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionFilter {
    require_both_sides: bool,
    min_ratio: Option<f64>,
    surprisal_threshold: Option<f64>,
}

impl Default for SelectionFilter {
    fn default() -> Self {
        Self {
            require_both_sides: true,
            min_ratio: Some(DEFAULT_MIN_RATIO),
            surprisal_threshold: None,
        }
    }
}

impl SelectionFilter {
    /// A filter that keeps every row
    pub fn pass_through() -> Self {
        Self {
            require_both_sides: false,
            min_ratio: None,
            surprisal_threshold: None,
        }
    }

    pub fn require_both_sides(mut self, enabled: bool) -> Self {
        self.require_both_sides = enabled;
        self
    }

    pub fn min_ratio(mut self, min_ratio: Option<f64>) -> Self {
        self.min_ratio = min_ratio;
        self
    }

    pub fn surprisal_threshold(mut self, threshold: Option<f64>) -> Self {
        self.surprisal_threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(ratio) = self.min_ratio {
            if !ratio.is_finite() || ratio < 0.0 {
                return Err(AnalysisError::configuration(format!(
                    "min_ratio must be a finite value >= 0, got {ratio}"
                )));
            }
        }
        if let Some(threshold) = self.surprisal_threshold {
            if threshold.is_nan() {
                return Err(AnalysisError::configuration(
                    "surprisal_threshold must be a number, got NaN",
                ));
            }
        }
        Ok(())
    }

    /// Whether a single row passes every enabled gate
    pub fn passes(&self, row: &AnalyzedRow) -> bool {
        let side = row.chosen_side();

        if self.require_both_sides && !(row.row.has_both_sides() && side.is_pair_member()) {
            return false;
        }

        if let Some(min_ratio) = self.min_ratio {
            let (Some(chosen), Some(alt)) = (row.chosen_prob(), row.alt_prob()) else {
                return false;
            };
            if alt < min_ratio * chosen {
                return false;
            }
        }

        if let Some(threshold) = self.surprisal_threshold {
            // +inf surprisal always clears a finite threshold
            match row.surprisal {
                Some(s) if s > threshold => {}
                _ => return false,
            }
        }

        true
    }

    /// Keep the rows that pass, in their original order
    pub fn apply(&self, rows: &[AnalyzedRow]) -> Result<Vec<AnalyzedRow>> {
        self.validate()?;
        Ok(rows.iter().filter(|r| self.passes(r)).cloned().collect())
    }
}

/// Select reportable rows with gates 1–2, plus gate 3 when a threshold is given
pub fn select(
    rows: &[AnalyzedRow],
    min_ratio: f64,
    surprisal_threshold: Option<f64>,
) -> Result<Vec<AnalyzedRow>> {
    SelectionFilter::default()
        .min_ratio(Some(min_ratio))
        .surprisal_threshold(surprisal_threshold)
        .apply(rows)
}
