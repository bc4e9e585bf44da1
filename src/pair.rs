//! Pair extraction: find every decoding step where a token pair competed
//!
//! A step produces a [`ComparisonRow`] for a pair when either member
//! appears among the step's top-k alternatives, or when the model emitted
//! one of them. A member missing from the top-k has no logprob; the emitted
//! token's own logprob is only used when neither member is a candidate.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use crate::record::{DecodingStepRecord, MarkerStripper, SurfaceNormalizer};

/// Number of preceding words kept as display context
pub const DEFAULT_CONTEXT_WINDOW: usize = 20;

/// Two surface forms under comparison; the order only fixes the labels
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenPair {
    pub key: String,
    pub value: String,
}

impl TokenPair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Reject pairs that can never produce a meaningful comparison
    pub fn validate(&self) -> Result<()> {
        if self.key.is_empty() || self.value.is_empty() {
            return Err(AnalysisError::configuration(format!(
                "token pair has an empty member: {self}"
            )));
        }
        if self.key == self.value {
            return Err(AnalysisError::configuration(format!(
                "token pair compares a token with itself: {self}"
            )));
        }
        Ok(())
    }

    /// Surface form of the given side; `Neither` has none
    pub fn token(&self, side: ChosenSide) -> Option<&str> {
        match side {
            ChosenSide::Key => Some(&self.key),
            ChosenSide::Value => Some(&self.value),
            ChosenSide::Neither => None,
        }
    }
}

impl fmt::Display for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.key, self.value)
    }
}

/// Which pair member the model actually emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChosenSide {
    Key,
    Value,
    /// Something outside the pair was emitted
    #[serde(rename = "none")]
    Neither,
}

impl ChosenSide {
    /// The other member of the pair
    pub fn other(self) -> Self {
        match self {
            Self::Key => Self::Value,
            Self::Value => Self::Key,
            Self::Neither => Self::Neither,
        }
    }

    pub fn is_pair_member(self) -> bool {
        !matches!(self, Self::Neither)
    }
}

/// One step where a pair competed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub step: usize,
    pub pair_key: String,
    pub pair_value: String,
    /// Normalized surface form of the emitted token
    pub chosen_token: String,
    /// None when the key was absent from the top-k (unknown, not zero)
    pub key_logprob: Option<f64>,
    pub value_logprob: Option<f64>,
    pub chosen_logprob: f64,
    pub recent_context: String,
    pub chosen_side: ChosenSide,
}

impl ComparisonRow {
    /// Logprob of one side of the pair, if it was observed
    pub fn side_logprob(&self, side: ChosenSide) -> Option<f64> {
        match side {
            ChosenSide::Key => self.key_logprob,
            ChosenSide::Value => self.value_logprob,
            ChosenSide::Neither => None,
        }
    }

    /// Both sides carry a measured logprob
    pub fn has_both_sides(&self) -> bool {
        self.key_logprob.is_some() && self.value_logprob.is_some()
    }
}

/// Scans decoding records for pair appearances
///
/// ```
/// use pair_lens::{PairExtractor, TokenPair};
///
/// let extractor = PairExtractor::new(vec![TokenPair::new("elle", "il")])
///     .top_k_limit(Some(5))
///     .context_window(10);
/// assert!(extractor.extract(&[]).is_empty());
/// ```
#[derive(Clone)]
pub struct PairExtractor {
    pairs: Vec<TokenPair>,
    top_k_limit: Option<usize>,
    context_window: usize,
    normalizer: Arc<dyn SurfaceNormalizer>,
}

impl fmt::Debug for PairExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairExtractor")
            .field("pairs", &self.pairs)
            .field("top_k_limit", &self.top_k_limit)
            .field("context_window", &self.context_window)
            .finish_non_exhaustive()
    }
}

impl PairExtractor {
    pub fn new(pairs: Vec<TokenPair>) -> Self {
        Self {
            pairs,
            top_k_limit: None,
            context_window: DEFAULT_CONTEXT_WINDOW,
            normalizer: Arc::new(MarkerStripper::default()),
        }
    }

    /// Only consider the `k` most likely alternatives at each step
    pub fn top_k_limit(mut self, limit: Option<usize>) -> Self {
        self.top_k_limit = limit;
        self
    }

    pub fn context_window(mut self, window: usize) -> Self {
        self.context_window = window;
        self
    }

    pub fn normalizer(mut self, normalizer: Arc<dyn SurfaceNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn pairs(&self) -> &[TokenPair] {
        &self.pairs
    }

    /// Extract rows from one source, in step order
    pub fn extract(&self, records: &[DecodingStepRecord]) -> Vec<ComparisonRow> {
        let mut rows = Vec::new();
        for record in records {
            self.extract_record(record, &mut rows);
        }
        rows
    }

    /// Normalized alternatives, one per surface form, limited to `top_k_limit`.
    ///
    /// A repeated surface form takes the logprob of its last occurrence but
    /// keeps the rank of its first. Truncation happens after merging, so the
    /// limit counts distinct surface forms; the sort is stable.
    fn candidates<'r>(&self, record: &'r DecodingStepRecord) -> Vec<(Cow<'r, str>, f64)> {
        let mut candidates: Vec<(Cow<'r, str>, f64)> =
            Vec::with_capacity(record.alternatives.len());
        for alt in &record.alternatives {
            let surface = self.normalizer.normalize(&alt.token);
            match candidates.iter().position(|(token, _)| *token == surface) {
                Some(i) => candidates[i].1 = alt.logprob,
                None => candidates.push((surface, alt.logprob)),
            }
        }
        if let Some(k) = self.top_k_limit {
            candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
            candidates.truncate(k);
        }
        candidates
    }

    fn extract_record(&self, record: &DecodingStepRecord, rows: &mut Vec<ComparisonRow>) {
        let chosen = self.normalizer.normalize(&record.token);
        let candidates = self.candidates(record);
        let lookup = |surface: &str| {
            candidates
                .iter()
                .find(|(token, _)| token.as_ref() == surface)
                .map(|(_, lp)| *lp)
        };

        let mut recent_context: Option<String> = None;
        for pair in &self.pairs {
            let chosen_side = if chosen.as_ref() == pair.key {
                ChosenSide::Key
            } else if chosen.as_ref() == pair.value {
                ChosenSide::Value
            } else {
                ChosenSide::Neither
            };

            let mut key_logprob = lookup(&pair.key);
            let mut value_logprob = lookup(&pair.value);

            // An emitted member with no candidate on either side is still a
            // measured step: its own logprob is the only one available
            if key_logprob.is_none() && value_logprob.is_none() && record.logprob.is_finite() {
                match chosen_side {
                    ChosenSide::Key => key_logprob = Some(record.logprob),
                    ChosenSide::Value => value_logprob = Some(record.logprob),
                    ChosenSide::Neither => {}
                }
            }

            if key_logprob.is_none() && value_logprob.is_none() {
                continue;
            }

            let context = recent_context
                .get_or_insert_with(|| record.recent_context(self.context_window))
                .clone();

            rows.push(ComparisonRow {
                step: record.step,
                pair_key: pair.key.clone(),
                pair_value: pair.value.clone(),
                chosen_token: chosen.to_string(),
                key_logprob,
                value_logprob,
                chosen_logprob: record.logprob,
                recent_context: context,
                chosen_side,
            });
        }
    }
}

/// Extract comparison rows using the default marker-stripping normalizer
pub fn extract_pair_data(
    records: &[DecodingStepRecord],
    pairs: &[TokenPair],
    top_k_limit: Option<usize>,
    context_window: usize,
) -> Vec<ComparisonRow> {
    PairExtractor::new(pairs.to_vec())
        .top_k_limit(top_k_limit)
        .context_window(context_window)
        .extract(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Alternative, Verbatim};

    fn record(step: usize, token: &str, logprob: f64, alts: &[(&str, f64)]) -> DecodingStepRecord {
        DecodingStepRecord {
            step,
            token: token.to_string(),
            logprob,
            alternatives: alts
                .iter()
                .map(|(t, lp)| Alternative {
                    token: (*t).to_string(),
                    logprob: *lp,
                })
                .collect(),
            context: "il était une fois".to_string(),
        }
    }

    fn elle_il() -> Vec<TokenPair> {
        vec![TokenPair::new("elle", "il")]
    }

    #[test]
    fn test_scenario_row() {
        let records = vec![record(0, "elle", -0.105, &[("elle", -0.105), ("il", -2.303)])];
        let rows = extract_pair_data(&records, &elle_il(), None, 20);

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.chosen_side, ChosenSide::Key);
        assert_eq!(row.key_logprob, Some(-0.105));
        assert_eq!(row.value_logprob, Some(-2.303));
        assert_eq!(row.chosen_logprob, -0.105);
        assert_eq!(row.recent_context, "il était une fois");
    }

    #[test]
    fn test_markers_stripped_before_comparison() {
        let records = vec![record(0, "Ġil", -0.3, &[("Ġil", -0.3), ("▁elle", -1.5)])];
        let rows = extract_pair_data(&records, &elle_il(), None, 20);

        assert_eq!(rows[0].chosen_token, "il");
        assert_eq!(rows[0].chosen_side, ChosenSide::Value);
        assert_eq!(rows[0].key_logprob, Some(-1.5));
    }

    #[test]
    fn test_verbatim_normalizer_keeps_markers() {
        let records = vec![record(0, "Ġil", -0.3, &[("Ġil", -0.3)])];
        let rows = PairExtractor::new(elle_il())
            .normalizer(Arc::new(Verbatim))
            .extract(&records);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_no_member_present_yields_no_row() {
        let records = vec![record(0, "le", -0.1, &[("le", -0.1), ("la", -2.0)])];
        assert!(extract_pair_data(&records, &elle_il(), None, 20).is_empty());
    }

    #[test]
    fn test_chosen_outside_pair() {
        let records = vec![record(3, "on", -0.2, &[("on", -0.2), ("il", -1.9)])];
        let rows = extract_pair_data(&records, &elle_il(), None, 20);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].chosen_side, ChosenSide::Neither);
        assert_eq!(rows[0].key_logprob, None);
        assert_eq!(rows[0].value_logprob, Some(-1.9));
    }

    #[test]
    fn test_emitted_member_outside_top_k_is_kept() {
        let records = vec![record(0, "il", -6.0, &[("on", -0.1), ("le", -0.9)])];
        let rows = extract_pair_data(&records, &elle_il(), None, 20);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].chosen_side, ChosenSide::Value);
        assert_eq!(rows[0].value_logprob, Some(-6.0));
        assert_eq!(rows[0].key_logprob, None);
    }

    #[test]
    fn test_top_k_limit_applied_before_membership() {
        let records = vec![record(
            0,
            "on",
            -0.1,
            &[("on", -0.1), ("le", -1.0), ("il", -3.0)],
        )];
        assert_eq!(extract_pair_data(&records, &elle_il(), None, 20).len(), 1);
        assert!(extract_pair_data(&records, &elle_il(), Some(2), 20).is_empty());
    }

    #[test]
    fn test_rows_follow_record_order_and_pairs() {
        let pairs = vec![TokenPair::new("elle", "il"), TokenPair::new("il", "on")];
        let records = vec![
            record(0, "il", -0.2, &[("il", -0.2), ("elle", -1.8), ("on", -2.5)]),
            record(1, "dort", -0.1, &[("dort", -0.1)]),
            record(2, "elle", -0.4, &[("elle", -0.4)]),
        ];
        let rows = extract_pair_data(&records, &pairs, None, 20);
        let summary: Vec<(usize, &str, ChosenSide)> = rows
            .iter()
            .map(|r| (r.step, r.pair_key.as_str(), r.chosen_side))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, "elle", ChosenSide::Value),
                (0, "il", ChosenSide::Key),
                (2, "elle", ChosenSide::Key),
            ]
        );
    }

    #[test]
    fn test_duplicate_surface_last_wins() {
        let records = vec![record(0, "x", -0.1, &[("Ġil", -1.0), ("il", -2.0)])];
        let rows = extract_pair_data(&records, &elle_il(), None, 20);
        assert_eq!(rows[0].value_logprob, Some(-2.0));
    }

    #[test]
    fn test_top_k_limit_counts_surface_forms() {
        let records = vec![record(
            0,
            "le",
            -0.1,
            &[("Ġle", -0.1), ("le", -0.2), ("il", -0.5)],
        )];
        let rows = extract_pair_data(&records, &elle_il(), Some(2), 20);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value_logprob, Some(-0.5));
    }

    #[test]
    fn test_top_k_truncation_is_stable() {
        let records = vec![record(0, "a", -1.0, &[("elle", -1.0), ("y", -0.5), ("il", -1.0)])];
        let rows = extract_pair_data(&records, &elle_il(), Some(2), 20);
        assert_eq!(rows[0].key_logprob, Some(-1.0));
        assert_eq!(rows[0].value_logprob, None);
    }

    #[test]
    fn test_truncated_emitted_member_stays_unmeasured() {
        let records = vec![record(0, "elle", -1.2, &[("il", -0.4), ("elle", -1.2)])];
        let rows = extract_pair_data(&records, &elle_il(), Some(1), 20);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].chosen_side, ChosenSide::Key);
        assert_eq!(rows[0].key_logprob, None);
        assert_eq!(rows[0].value_logprob, Some(-0.4));

        let analyzed = crate::metrics::augment_with_metrics(&rows);
        assert!(crate::selection::select(&analyzed, 0.0, None).unwrap().is_empty());
    }

    #[test]
    fn test_emitted_member_alongside_other_candidate_is_not_filled() {
        let records = vec![record(0, "il", -6.0, &[("on", -0.1), ("elle", -0.9)])];
        let rows = extract_pair_data(&records, &elle_il(), None, 20);
        assert_eq!(rows[0].key_logprob, Some(-0.9));
        assert_eq!(rows[0].value_logprob, None);
    }

    #[test]
    fn test_pair_validation() {
        assert!(TokenPair::new("elle", "il").validate().is_ok());
        assert!(TokenPair::new("il", "il").validate().is_err());
        assert!(TokenPair::new("", "il").validate().is_err());
    }

    #[test]
    fn test_chosen_side_serialization() {
        assert_eq!(serde_json::to_string(&ChosenSide::Neither).unwrap(), "\"none\"");
        assert_eq!(serde_json::to_string(&ChosenSide::Key).unwrap(), "\"key\"");
        assert_eq!(ChosenSide::Key.other(), ChosenSide::Value);
    }
}
