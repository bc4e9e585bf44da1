//! Per-model series for a visualization sink
//!
//! Every model yields exactly two series, one per pair member, so legends
//! stay consistent across panels even when a side has no qualifying rows.

use serde::Serialize;

use crate::labels::{Labels, Lang};
use crate::metrics::AnalyzedRow;
use crate::pair::{ChosenSide, TokenPair};

pub const KEY_COLOR: &str = "#E69F00";
pub const VALUE_COLOR: &str = "#56B4E9";

/// Hover context is wrapped to this many columns
const CONTEXT_WRAP_WIDTH: usize = 70;

/// Which quantity a series plots on its y axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesView {
    /// Chosen side's probability, with the alternative's as bars
    Probability,
    /// Chosen side's probability renormalized over the pair
    Confidence,
    /// Bits of surprise of the emission
    Surprisal,
}

impl SeriesView {
    pub fn y_label(self, labels: &Labels) -> &'static str {
        match self {
            Self::Probability => labels.probability,
            Self::Confidence => labels.confidence,
            Self::Surprisal => labels.surprisal,
        }
    }

    /// Fixed y range for bounded views
    pub fn y_range(self) -> Option<[f64; 2]> {
        match self {
            Self::Probability | Self::Confidence => Some([0.0, 1.0]),
            Self::Surprisal => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub step: usize,
    /// Infinite values serialize as `null`
    pub value: f64,
    /// Competing member's value, for the bar overlay
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_value: Option<f64>,
    /// Preceding words, wrapped with `<br>` for hover text
    pub context: String,
}

/// Steps where one pair member was chosen
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub side: ChosenSide,
    pub token: String,
    pub alt_token: String,
    /// Legend entry for the chosen points
    pub name: String,
    /// Legend entry for the alternative bars
    pub alt_name: String,
    pub color: &'static str,
    pub alt_color: &'static str,
    pub points: Vec<SeriesPoint>,
}

impl Series {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
}

/// Both series of one model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSeries {
    pub model: String,
    pub pair: TokenPair,
    pub key: Series,
    pub value: Series,
}

impl ModelSeries {
    pub fn series(&self, side: ChosenSide) -> Option<&Series> {
        match side {
            ChosenSide::Key => Some(&self.key),
            ChosenSide::Value => Some(&self.value),
            ChosenSide::Neither => None,
        }
    }

    pub fn total_points(&self) -> usize {
        self.key.len() + self.value.len()
    }
}

/// Everything a chart renderer needs for one figure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPayload {
    pub view: SeriesView,
    pub lang: Lang,
    pub title: String,
    /// The renderer should flag the title (e.g. unset top-k)
    pub title_warning: bool,
    pub x_label: String,
    pub y_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y_range: Option<[f64; 2]>,
    pub panels: Vec<ModelSeries>,
}

impl ChartPayload {
    pub fn is_empty(&self) -> bool {
        self.panels.iter().all(|p| p.total_points() == 0)
    }
}

/// Turns filtered rows into plot-ready series
#[derive(Debug, Clone, Copy)]
pub struct SeriesBuilder {
    view: SeriesView,
    lang: Lang,
}

impl SeriesBuilder {
    pub fn new(view: SeriesView, lang: Lang) -> Self {
        Self { view, lang }
    }

    /// Build both series for one model.
    ///
    /// Rows for other pairs, or where neither member was chosen, are
    /// ignored. Points are ordered by step; rows from several sources
    /// sharing a step keep their input order.
    pub fn model_series(
        &self,
        model: &str,
        pair: &TokenPair,
        rows: &[AnalyzedRow],
    ) -> ModelSeries {
        ModelSeries {
            model: model.to_string(),
            pair: pair.clone(),
            key: self.side_series(ChosenSide::Key, pair, rows),
            value: self.side_series(ChosenSide::Value, pair, rows),
        }
    }

    fn side_series(&self, side: ChosenSide, pair: &TokenPair, rows: &[AnalyzedRow]) -> Series {
        let labels = self.lang.labels();
        let (token, alt_token, color, alt_color) = match side {
            ChosenSide::Value => (&pair.value, &pair.key, VALUE_COLOR, KEY_COLOR),
            _ => (&pair.key, &pair.value, KEY_COLOR, VALUE_COLOR),
        };

        let mut points: Vec<SeriesPoint> = rows
            .iter()
            .filter(|r| r.row.pair_key == pair.key && r.row.pair_value == pair.value)
            .filter(|r| r.chosen_side() == side)
            .filter_map(|r| self.point(r))
            .collect();
        points.sort_by_key(|p| p.step);

        Series {
            side,
            token: token.clone(),
            alt_token: alt_token.clone(),
            name: format!("{} {}", labels.chosen_label, token),
            alt_name: format!("{} {}", labels.alt_label, alt_token),
            color,
            alt_color,
            points,
        }
    }

    fn point(&self, row: &AnalyzedRow) -> Option<SeriesPoint> {
        let (value, alt_value) = match self.view {
            SeriesView::Probability => (row.chosen_prob()?, row.alt_prob()),
            SeriesView::Confidence => {
                let confidence = row.confidence?;
                (confidence, Some(1.0 - confidence))
            }
            SeriesView::Surprisal => (row.surprisal?, None),
        };
        Some(SeriesPoint {
            step: row.row.step,
            value,
            alt_value,
            context: wrap_context(&row.row.recent_context, CONTEXT_WRAP_WIDTH),
        })
    }

    /// Assemble the payload for all models
    pub fn chart(
        &self,
        title: String,
        title_warning: bool,
        panels: Vec<ModelSeries>,
    ) -> ChartPayload {
        let labels = self.lang.labels();
        ChartPayload {
            view: self.view,
            lang: self.lang,
            title,
            title_warning,
            x_label: labels.tokens_generated.to_string(),
            y_label: self.view.y_label(labels).to_string(),
            y_range: self.view.y_range(),
            panels,
        }
    }
}

/// Title of the probability figure; the top-k limit is called out when unset
pub fn probability_title(
    lang: Lang,
    pair: &TokenPair,
    top_k_limit: Option<usize>,
    min_ratio: f64,
) -> String {
    let labels = lang.labels();
    let top_k = top_k_limit.map_or_else(|| "MISSING TOPK".to_string(), |k| k.to_string());
    format!(
        "{} {}, top_k {}, {} {}",
        labels.selection_prob,
        labels.pair(&pair.key, &pair.value),
        top_k,
        labels.threshold,
        round_label(min_ratio, 4)
    )
}

pub fn confidence_title(lang: Lang, pair: &TokenPair, min_ratio: f64) -> String {
    let labels = lang.labels();
    format!(
        "{} {}, {} {}",
        labels.confidence,
        labels.pair(&pair.key, &pair.value),
        labels.threshold,
        round_label(min_ratio, 4)
    )
}

pub fn surprisal_title(lang: Lang, pair: &TokenPair, threshold: f64) -> String {
    let labels = lang.labels();
    format!(
        "{} {}, {} {}",
        labels.surprisal_title,
        labels.pair(&pair.key, &pair.value),
        labels.threshold,
        round_label(threshold, 2)
    )
}

/// `0.3333`, `4.0`: rounded and always showing a decimal part
pub fn round_label(value: f64, digits: i32) -> String {
    let scale = 10f64.powi(digits);
    format!("{:?}", (value * scale).round() / scale)
}

/// Greedy word wrap joined with `<br>`
fn wrap_context(text: &str, width: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let fits = current.is_empty()
            || current.chars().count() + 1 + word.chars().count() <= width;
        if !fits {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines.join("<br>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::analyze_row;
    use crate::pair::ComparisonRow;

    fn pair() -> TokenPair {
        TokenPair::new("elle", "il")
    }

    fn analyzed(step: usize, side: ChosenSide, key: f64, value: f64) -> AnalyzedRow {
        let chosen_logprob = if side == ChosenSide::Key { key } else { value };
        analyze_row(&ComparisonRow {
            step,
            pair_key: "elle".to_string(),
            pair_value: "il".to_string(),
            chosen_token: String::new(),
            key_logprob: Some(key),
            value_logprob: Some(value),
            chosen_logprob,
            recent_context: "la petite fille dit que".to_string(),
            chosen_side: side,
        })
    }

    #[test]
    fn test_both_sides_always_present() {
        let rows = vec![analyzed(4, ChosenSide::Key, -0.5, -1.0)];
        let series = SeriesBuilder::new(SeriesView::Probability, Lang::En)
            .model_series("m", &pair(), &rows);

        assert_eq!(series.key.len(), 1);
        assert!(series.value.is_empty());
        assert_eq!(series.value.token, "il");
        assert_eq!(series.value.color, VALUE_COLOR);
        assert_eq!(series.value.name, "Chosen: il");
        assert_eq!(series.value.alt_name, "Alt: elle");
        assert_eq!(series.series(ChosenSide::Key), Some(&series.key));
        assert!(series.series(ChosenSide::Neither).is_none());
    }

    #[test]
    fn test_points_sorted_by_step() {
        let rows = vec![
            analyzed(9, ChosenSide::Value, -1.0, -0.5),
            analyzed(2, ChosenSide::Value, -1.2, -0.4),
            analyzed(5, ChosenSide::Key, -0.3, -0.9),
        ];
        let series = SeriesBuilder::new(SeriesView::Probability, Lang::Fr)
            .model_series("m", &pair(), &rows);
        let steps: Vec<usize> = series.value.points.iter().map(|p| p.step).collect();
        assert_eq!(steps, vec![2, 9]);
        assert_eq!(series.key.points[0].step, 5);
    }

    #[test]
    fn test_view_values() {
        let rows = vec![analyzed(0, ChosenSide::Key, 0.6f64.ln(), 0.2f64.ln())];

        let probs = SeriesBuilder::new(SeriesView::Probability, Lang::En)
            .model_series("m", &pair(), &rows);
        let point = &probs.key.points[0];
        assert!((point.value - 0.6).abs() < 1e-12);
        assert!((point.alt_value.unwrap() - 0.2).abs() < 1e-12);

        let conf = SeriesBuilder::new(SeriesView::Confidence, Lang::En)
            .model_series("m", &pair(), &rows);
        assert!((conf.key.points[0].value - 0.75).abs() < 1e-12);

        let surprisal = SeriesBuilder::new(SeriesView::Surprisal, Lang::En)
            .model_series("m", &pair(), &rows);
        let expected = -(0.6f64).log2();
        assert!((surprisal.key.points[0].value - expected).abs() < 1e-9);
        assert!(surprisal.key.points[0].alt_value.is_none());
    }

    #[test]
    fn test_other_pairs_ignored() {
        let mut row = analyzed(0, ChosenSide::Key, -0.5, -1.0);
        row.row.pair_key = "on".to_string();
        let series = SeriesBuilder::new(SeriesView::Surprisal, Lang::En)
            .model_series("m", &pair(), &[row]);
        assert_eq!(series.total_points(), 0);
    }

    #[test]
    fn test_titles() {
        assert_eq!(
            probability_title(Lang::Fr, &pair(), None, 1.0 / 3.0),
            "Probabilité de sélection : « elle » et « il », top_k MISSING TOPK, seuil 0.3333"
        );
        assert_eq!(
            surprisal_title(Lang::En, &pair(), 4.0),
            "Token selection surprisal \"elle\" and \"il\", threshold 4.0"
        );
    }

    #[test]
    fn test_wrap_context() {
        assert_eq!(wrap_context("a bb ccc", 4), "a bb<br>ccc");
        assert_eq!(wrap_context("", 70), "");
        assert_eq!(wrap_context("one two", 70), "one two");
    }

    #[test]
    fn test_chart_payload_labels() {
        let builder = SeriesBuilder::new(SeriesView::Surprisal, Lang::Fr);
        let chart = builder.chart("t".to_string(), false, vec![]);
        assert_eq!(chart.y_label, "Surprise");
        assert_eq!(chart.x_label, "Tokens générés");
        assert!(chart.y_range.is_none());
        assert!(chart.is_empty());
    }
}
