//! Analysis runner
//!
//! Coordinates log discovery, per-source extraction, metric computation
//! and chart assembly for every configured model.

use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{AnalysisError, Result};
use crate::labels::Lang;
use crate::metrics::{augment_with_metrics, AnalyzedRow};
use crate::pair::{ComparisonRow, PairExtractor, TokenPair, DEFAULT_CONTEXT_WINDOW};
use crate::record::{load_records, SurfaceNormalizer};
use crate::selection::{SelectionFilter, DEFAULT_MIN_RATIO, DEFAULT_SURPRISAL_THRESHOLD};
use crate::series::{
    confidence_title, probability_title, round_label, surprisal_title, ChartPayload,
    SeriesBuilder, SeriesView,
};
use crate::sink::ChartSink;
use crate::sources::{default_models, discover_sources, LogSelection, LogSource, ModelSpec};

/// Configuration for an analysis run
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Root of the `<model>/<level>/<text_type>/<gen_type>/logits` tree
    pub results_dir: PathBuf,
    pub models: Vec<ModelSpec>,
    pub selection: LogSelection,
    pub pairs: Vec<TokenPair>,
    /// Restrict alternatives to the k most likely (None = all logged)
    pub top_k_limit: Option<usize>,
    /// Words of preceding text kept for hover context
    pub context_window: usize,
    pub min_ratio: f64,
    /// Surprisal gate for the surprisal view, in bits
    pub surprisal_threshold: f64,
    pub lang: Lang,
    /// Charts produced per pair
    pub views: Vec<SeriesView>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
            models: default_models(),
            selection: LogSelection::default(),
            pairs: vec![],
            top_k_limit: None,
            context_window: DEFAULT_CONTEXT_WINDOW,
            min_ratio: DEFAULT_MIN_RATIO,
            surprisal_threshold: DEFAULT_SURPRISAL_THRESHOLD,
            lang: Lang::default(),
            views: vec![SeriesView::Probability, SeriesView::Surprisal],
        }
    }
}

impl AnalysisConfig {
    /// Check every setting before any log is read
    pub fn validate(&self) -> Result<()> {
        if self.pairs.is_empty() {
            return Err(AnalysisError::configuration("at least one token pair is required"));
        }
        for pair in &self.pairs {
            pair.validate()?;
        }
        if self.models.is_empty() {
            return Err(AnalysisError::configuration("at least one model is required"));
        }
        if self.top_k_limit == Some(0) {
            return Err(AnalysisError::configuration("top_k_limit must be at least 1"));
        }
        self.filter_for(SeriesView::Surprisal).validate()?;
        Ok(())
    }

    /// The selection gates used for a view
    pub fn filter_for(&self, view: SeriesView) -> SelectionFilter {
        let filter = SelectionFilter::default().min_ratio(Some(self.min_ratio));
        match view {
            SeriesView::Surprisal => filter.surprisal_threshold(Some(self.surprisal_threshold)),
            SeriesView::Probability | SeriesView::Confidence => filter,
        }
    }
}

/// Extraction results for one log file
#[derive(Debug, Clone)]
pub struct SourceSummary {
    pub source: LogSource,
    pub records: usize,
    pub rows: usize,
}

/// All analyzed rows for one model, in source order then step order
#[derive(Debug, Clone)]
pub struct ModelAnalysis {
    pub model: ModelSpec,
    pub sources: Vec<SourceSummary>,
    pub rows: Vec<AnalyzedRow>,
}

/// Results of a full analysis run
#[derive(Debug, Clone)]
pub struct AnalysisResults {
    pub pairs: Vec<TokenPair>,
    pub models: Vec<ModelAnalysis>,
}

impl AnalysisResults {
    pub fn total_rows(&self) -> usize {
        self.models.iter().map(|m| m.rows.len()).sum()
    }

    pub fn total_records(&self) -> usize {
        self.models
            .iter()
            .flat_map(|m| &m.sources)
            .map(|s| s.records)
            .sum()
    }

    /// Pairs that never appeared in any log. Not an error: the caller
    /// decides whether "no data" is acceptable.
    pub fn uncovered_pairs(&self) -> Vec<&TokenPair> {
        self.pairs
            .iter()
            .filter(|pair| {
                !self.models.iter().flat_map(|m| &m.rows).any(|r| {
                    r.row.pair_key == pair.key && r.row.pair_value == pair.value
                })
            })
            .collect()
    }
}

/// A chart together with the name it should be stored under
#[derive(Debug, Clone)]
pub struct NamedChart {
    pub name: PathBuf,
    pub chart: ChartPayload,
}

/// Main analysis runner
pub struct Analysis {
    config: AnalysisConfig,
    extractor: PairExtractor,
}

impl Analysis {
    /// Create a new analysis
    pub fn new(config: AnalysisConfig) -> Self {
        let extractor = PairExtractor::new(config.pairs.clone())
            .top_k_limit(config.top_k_limit)
            .context_window(config.context_window);
        Self { config, extractor }
    }

    /// Replace the default `Ġ`/`▁` marker stripping
    pub fn with_normalizer(mut self, normalizer: Arc<dyn SurfaceNormalizer>) -> Self {
        self.extractor = self.extractor.normalizer(normalizer);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Run extraction and metrics for every model
    pub fn run(&self) -> Result<AnalysisResults> {
        self.config.validate()?;
        info!("Starting pair analysis");
        info!("Config: {:?}", self.config);

        let mut models = Vec::with_capacity(self.config.models.len());
        for model in &self.config.models {
            models.push(self.analyze_model(model)?);
        }

        let results = AnalysisResults {
            pairs: self.config.pairs.clone(),
            models,
        };
        info!(
            "Analyzed {} records, {} comparison rows",
            results.total_records(),
            results.total_rows()
        );
        for pair in results.uncovered_pairs() {
            warn!("Pair {} does not appear in any log", pair);
        }
        Ok(results)
    }

    /// Analyze one model's logs
    pub fn analyze_model(&self, model: &ModelSpec) -> Result<ModelAnalysis> {
        let sources = discover_sources(&self.config.results_dir, model, &self.config.selection)?;
        info!("Model {}: {} log files", model.name, sources.len());

        // Sources are independent; collect keeps them in discovery order
        let extracted: Vec<(SourceSummary, Vec<ComparisonRow>)> = sources
            .into_par_iter()
            .map(|source| -> Result<(SourceSummary, Vec<ComparisonRow>)> {
                let records = load_records(&source.path)?;
                let rows = self.extractor.extract(&records);
                debug!(
                    "{}: {} records, {} rows",
                    source.path.display(),
                    records.len(),
                    rows.len()
                );
                let summary = SourceSummary {
                    source,
                    records: records.len(),
                    rows: rows.len(),
                };
                Ok((summary, rows))
            })
            .collect::<Result<_>>()?;

        let mut summaries = Vec::with_capacity(extracted.len());
        let mut rows = Vec::new();
        for (summary, source_rows) in extracted {
            summaries.push(summary);
            rows.extend(source_rows);
        }

        Ok(ModelAnalysis {
            model: model.clone(),
            sources: summaries,
            rows: augment_with_metrics(&rows),
        })
    }

    /// Build every configured chart for every pair
    pub fn charts(&self, results: &AnalysisResults) -> Result<Vec<NamedChart>> {
        let mut charts = Vec::new();
        for pair in &self.config.pairs {
            for &view in &self.config.views {
                charts.push(self.chart(results, pair, view)?);
            }
        }
        Ok(charts)
    }

    /// Build one chart: one panel per model
    pub fn chart(
        &self,
        results: &AnalysisResults,
        pair: &TokenPair,
        view: SeriesView,
    ) -> Result<NamedChart> {
        let filter = self.config.filter_for(view);
        let builder = SeriesBuilder::new(view, self.config.lang);

        let mut panels = Vec::with_capacity(results.models.len());
        for model in &results.models {
            let selected = filter.apply(&model.rows)?;
            let panel = builder.model_series(&model.model.name, pair, &selected);
            if panel.total_points() == 0 {
                info!("{}: no qualifying rows for {} ({:?})", model.model.name, pair, view);
            }
            panels.push(panel);
        }

        let lang = self.config.lang;
        let (title, warning) = match view {
            SeriesView::Probability => (
                probability_title(lang, pair, self.config.top_k_limit, self.config.min_ratio),
                self.config.top_k_limit.is_none(),
            ),
            SeriesView::Confidence => (confidence_title(lang, pair, self.config.min_ratio), false),
            SeriesView::Surprisal => (
                surprisal_title(lang, pair, self.config.surprisal_threshold),
                false,
            ),
        };

        Ok(NamedChart {
            name: self.chart_name(pair, view),
            chart: builder.chart(title, warning, panels),
        })
    }

    fn chart_name(&self, pair: &TokenPair, view: SeriesView) -> PathBuf {
        let pair_tag = format!("{}_{}", sanitize(&pair.key), sanitize(&pair.value));
        match view {
            SeriesView::Probability => {
                let k = self
                    .config
                    .top_k_limit
                    .map_or_else(|| "none".to_string(), |k| k.to_string());
                PathBuf::from("probs").join(format!("k{k}")).join(format!(
                    "probs_{pair_tag}_{}.json",
                    round_label(self.config.min_ratio, 4)
                ))
            }
            SeriesView::Confidence => PathBuf::from("confidence").join(format!(
                "confidence_{pair_tag}_{}.json",
                round_label(self.config.min_ratio, 4)
            )),
            SeriesView::Surprisal => PathBuf::from("surprisal").join(format!(
                "surprisal_{pair_tag}_{}.json",
                round_label(self.config.surprisal_threshold, 2)
            )),
        }
    }

    /// Build all charts and hand them to a sink
    pub fn export(&self, results: &AnalysisResults, sink: &dyn ChartSink) -> Result<Vec<PathBuf>> {
        self.charts(results)?
            .iter()
            .map(|named| sink.write_chart(&named.name, &named.chart))
            .collect()
    }
}

/// Keep token text usable in a file name
fn sanitize(token: &str) -> String {
    token
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
