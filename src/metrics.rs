//! Derived metrics for comparison rows
//!
//! Probabilities, 2-outcome confidence, odds ratio and surprisal.
//! Degenerate cases resolve to `f64::INFINITY`, never NaN.

use serde::Serialize;

use crate::pair::{ChosenSide, ComparisonRow};

/// `exp(logprob)`, or 0 for a logprob that was not observed.
///
/// The 0 is a convenience default: an absent logprob is below the top-k
/// floor, not impossible. Use the optional fields on the row when the
/// distinction matters.
pub fn logprob_to_prob(logprob: Option<f64>) -> f64 {
    logprob.map_or(0.0, f64::exp)
}

/// Negative log2 probability in bits; +inf for a zero probability
pub fn prob_to_surprisal(prob: f64) -> f64 {
    if prob > 0.0 {
        -prob.log2()
    } else {
        f64::INFINITY
    }
}

/// A comparison row with its derived metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzedRow {
    #[serde(flatten)]
    pub row: ComparisonRow,
    pub key_prob: f64,
    pub value_prob: f64,
    /// Chosen side's share of `key_prob + value_prob`
    pub confidence: Option<f64>,
    /// Chosen probability over alternative probability
    pub ratio_score: Option<f64>,
    /// Bits of surprise of the emitted token itself
    pub surprisal: Option<f64>,
}

impl AnalyzedRow {
    pub fn chosen_side(&self) -> ChosenSide {
        self.row.chosen_side
    }

    pub fn side_prob(&self, side: ChosenSide) -> Option<f64> {
        match side {
            ChosenSide::Key => Some(self.key_prob),
            ChosenSide::Value => Some(self.value_prob),
            ChosenSide::Neither => None,
        }
    }

    /// Probability of the side the model emitted
    pub fn chosen_prob(&self) -> Option<f64> {
        self.side_prob(self.row.chosen_side)
    }

    /// Probability of the side the model passed over
    pub fn alt_prob(&self) -> Option<f64> {
        self.side_prob(self.row.chosen_side.other())
    }
}

/// Compute the metrics for a single row
pub fn analyze_row(row: &ComparisonRow) -> AnalyzedRow {
    let key_prob = logprob_to_prob(row.key_logprob);
    let value_prob = logprob_to_prob(row.value_logprob);

    let (chosen_prob, alt_prob) = match row.chosen_side {
        ChosenSide::Key => (key_prob, value_prob),
        ChosenSide::Value => (value_prob, key_prob),
        ChosenSide::Neither => {
            return AnalyzedRow {
                row: row.clone(),
                key_prob,
                value_prob,
                confidence: None,
                ratio_score: None,
                surprisal: None,
            };
        }
    };

    let total = key_prob + value_prob;
    let confidence = if total <= 0.0 {
        0.0
    } else {
        chosen_prob / total
    };

    let ratio_score = if alt_prob <= 0.0 {
        f64::INFINITY
    } else {
        chosen_prob / alt_prob
    };

    // Absolute surprise of the emission, independent of the pair framing
    let surprisal = prob_to_surprisal(row.chosen_logprob.exp());

    AnalyzedRow {
        row: row.clone(),
        key_prob,
        value_prob,
        confidence: Some(confidence),
        ratio_score: Some(ratio_score),
        surprisal: Some(surprisal),
    }
}

/// Augment every row with its metrics, preserving order
pub fn augment_with_metrics(rows: &[ComparisonRow]) -> Vec<AnalyzedRow> {
    rows.iter().map(analyze_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(side: ChosenSide, key: Option<f64>, value: Option<f64>, chosen: f64) -> ComparisonRow {
        ComparisonRow {
            step: 0,
            pair_key: "elle".to_string(),
            pair_value: "il".to_string(),
            chosen_token: match side {
                ChosenSide::Key => "elle".to_string(),
                ChosenSide::Value => "il".to_string(),
                ChosenSide::Neither => "on".to_string(),
            },
            key_logprob: key,
            value_logprob: value,
            chosen_logprob: chosen,
            recent_context: String::new(),
            chosen_side: side,
        }
    }

    #[test]
    fn test_scenario_metrics() {
        let analyzed = analyze_row(&row(ChosenSide::Key, Some(-0.105), Some(-2.303), -0.105));

        assert!((analyzed.key_prob - 0.9003).abs() < 1e-4);
        assert!((analyzed.value_prob - 0.1000).abs() < 1e-4);
        assert!((analyzed.confidence.unwrap() - 0.9000).abs() < 1e-3);
        assert!((analyzed.ratio_score.unwrap() - 9.0).abs() < 1e-2);
        assert!((analyzed.surprisal.unwrap() - 0.152).abs() < 1e-3);
    }

    #[test]
    fn test_neither_side_has_no_metrics() {
        let analyzed = analyze_row(&row(ChosenSide::Neither, None, Some(-1.0), -0.2));
        assert_eq!(analyzed.key_prob, 0.0);
        assert!((analyzed.value_prob - (-1.0f64).exp()).abs() < 1e-12);
        assert!(analyzed.confidence.is_none());
        assert!(analyzed.ratio_score.is_none());
        assert!(analyzed.surprisal.is_none());
    }

    #[test]
    fn test_absent_alternative_gives_infinite_ratio() {
        let analyzed = analyze_row(&row(ChosenSide::Value, None, Some(-0.5), -0.5));
        assert_eq!(analyzed.ratio_score, Some(f64::INFINITY));
        assert_eq!(analyzed.confidence, Some(1.0));
    }

    #[test]
    fn test_zero_total_confidence() {
        // exp(-800) underflows to 0
        let analyzed = analyze_row(&row(ChosenSide::Key, Some(-800.0), None, -800.0));
        assert_eq!(analyzed.confidence, Some(0.0));
        assert_eq!(analyzed.ratio_score, Some(f64::INFINITY));
        assert_eq!(analyzed.surprisal, Some(f64::INFINITY));
    }

    #[test]
    fn test_surprisal_uses_emission_logprob() {
        // Renormalized the choice is near certain, the emission itself is not
        let analyzed = analyze_row(&row(ChosenSide::Key, Some(-3.0), Some(-9.0), -3.0));
        assert!(analyzed.confidence.unwrap() > 0.99);
        let expected = 3.0 / std::f64::consts::LN_2;
        assert!((analyzed.surprisal.unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_surprisal_of_certain_token_is_zero() {
        assert_eq!(prob_to_surprisal(1.0), 0.0);
        assert_eq!(prob_to_surprisal(0.0), f64::INFINITY);
        assert!((prob_to_surprisal(0.25) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_augment_preserves_order() {
        let rows = vec![
            row(ChosenSide::Key, Some(-0.1), Some(-2.0), -0.1),
            row(ChosenSide::Neither, Some(-3.0), None, -0.05),
        ];
        let analyzed = augment_with_metrics(&rows);
        assert_eq!(analyzed.len(), 2);
        assert_eq!(analyzed[0].row, rows[0]);
        assert_eq!(analyzed[1].row, rows[1]);
        assert_eq!(analyzed[0].alt_prob(), Some(analyzed[0].value_prob));
    }
}
