// Pedantic clippy configuration for numerical analysis code
#![allow(clippy::cast_precision_loss)] // usize→f64 intentional in statistics
#![allow(clippy::similar_names)] // related variables like `key_prob`/`key_probs`
#![allow(clippy::module_name_repetitions)] // PairExtractor in pair.rs is fine
// Documentation pedantic - acceptable for research code:
#![allow(clippy::doc_markdown)] // backticks for every technical term is excessive
#![allow(clippy::missing_errors_doc)] // # Errors section for every Result fn
#![allow(clippy::missing_panics_doc)] // # Panics section for every panic
// Method style pedantic:
#![allow(clippy::must_use_candidate)] // #[must_use] on every pure fn is excessive
#![allow(clippy::return_self_not_must_use)] // #[must_use] on Self returns
#![allow(clippy::float_cmp)] // exact comparisons against 0 and infinity are intended

//! pair-lens: token-pair probability analysis over decoding logs
//!
//! Compares how a causal language model weighs two competing tokens
//! (e.g. `elle` vs `il`) at every decoding step where either was a
//! candidate, across many generated texts and several models.
//!
//! ## Architecture
//!
//! - `record`: Decoding-step records loaded from JSONL logs
//! - `pair`: Pair extraction into comparison rows
//! - `metrics`: Probabilities, confidence, odds ratio and surprisal
//! - `selection`: Threshold gates deciding which rows are reportable
//! - `series`: Per-model series and chart payloads for a renderer
//! - `labels`: Output-language strings (fr/en)
//! - `sink`: Chart hand-off (JSON files)
//! - `sources`: Log discovery in the results tree
//! - `experiment`: Analysis runner coordinating the full pipeline
//! - `error`: Error taxonomy

pub mod error;
pub mod experiment;
pub mod labels;
pub mod metrics;
pub mod pair;
pub mod record;
pub mod selection;
pub mod series;
pub mod sink;
pub mod sources;

pub use error::{AnalysisError, Result};
pub use experiment::{
    Analysis, AnalysisConfig, AnalysisResults, ModelAnalysis, NamedChart, SourceSummary,
};
pub use labels::{Labels, Lang};
pub use metrics::{
    analyze_row, augment_with_metrics, logprob_to_prob, prob_to_surprisal, AnalyzedRow,
};
pub use pair::{
    extract_pair_data, ChosenSide, ComparisonRow, PairExtractor, TokenPair,
    DEFAULT_CONTEXT_WINDOW,
};
pub use record::{
    load_records, parse_record_line, read_records, Alternative, DecodingStepRecord,
    MarkerStripper, SurfaceNormalizer, Verbatim,
};
pub use selection::{
    select, SelectionFilter, DEFAULT_MIN_RATIO, DEFAULT_SURPRISAL_THRESHOLD,
};
pub use series::{
    ChartPayload, ModelSeries, Series, SeriesBuilder, SeriesPoint, SeriesView, KEY_COLOR,
    VALUE_COLOR,
};
pub use sink::{ChartSink, JsonFileSink};
pub use sources::{
    default_models, discover_sources, GenType, Level, LogLabel, LogSelection, LogSource,
    ModelSpec, TextType,
};
