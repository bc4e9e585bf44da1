//! Decoding-step records loaded from newline-delimited JSON logs
//!
//! Each line of a log is one emitted token together with the top-k
//! candidates the model considered at that step:
//!
//! ```text
//! {"step": 0, "token": "Ġelle", "logprob": -0.105,
//!  "top_k": [{"token": "elle", "logprob": -0.105}, {"token": "il", "logprob": -2.303}],
//!  "context": ""}
//! ```
//!
//! Loading is all-or-nothing per source: a single malformed line fails
//! the whole file, since a dropped step would break step continuity for
//! every series built downstream.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::{AnalysisError, Result};

/// Positive logprobs up to this value are rounding noise from the producer
/// and are clamped to 0.
pub const LOGPROB_TOLERANCE: f64 = 1e-4;

/// One candidate token considered at a decoding step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alternative {
    pub token: String,
    pub logprob: f64,
}

/// One emitted token during a generation run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodingStepRecord {
    /// 0-based, strictly increasing within a run
    pub step: usize,
    /// Raw surface form as written by the tokenizer
    pub token: String,
    /// Natural-log probability of `token`; may be -inf
    pub logprob: f64,
    /// Top-k candidates, highest logprob first, never -inf
    pub alternatives: Vec<Alternative>,
    /// Decoded text emitted before this step
    pub context: String,
}

impl DecodingStepRecord {
    /// The last `window` whitespace-delimited words of the context
    pub fn recent_context(&self, window: usize) -> String {
        let words: Vec<&str> = self.context.split_whitespace().collect();
        let start = words.len().saturating_sub(window);
        words[start..].join(" ")
    }
}

/// Maps raw tokenizer output to the surface form used for comparisons.
///
/// Subword tokenizers mark word boundaries differently (`Ġ` for byte-level
/// BPE, `▁` for SentencePiece), so the mapping is supplied by the caller.
pub trait SurfaceNormalizer: Send + Sync {
    fn normalize<'a>(&self, token: &'a str) -> Cow<'a, str>;
}

/// Strips word-boundary marker characters from both ends of a token
#[derive(Debug, Clone)]
pub struct MarkerStripper {
    markers: Vec<char>,
}

impl MarkerStripper {
    pub fn new(markers: impl IntoIterator<Item = char>) -> Self {
        Self {
            markers: markers.into_iter().collect(),
        }
    }
}

impl Default for MarkerStripper {
    fn default() -> Self {
        Self::new(['Ġ', '▁'])
    }
}

impl SurfaceNormalizer for MarkerStripper {
    fn normalize<'a>(&self, token: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(token.trim_matches(|c| self.markers.contains(&c)))
    }
}

/// Leaves tokens untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct Verbatim;

impl SurfaceNormalizer for Verbatim {
    fn normalize<'a>(&self, token: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(token)
    }
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    step: usize,
    token: String,
    #[serde(deserialize_with = "logprob_or_neg_infinity")]
    logprob: f64,
    top_k: Vec<RawAlternative>,
    #[serde(default)]
    context: String,
}

#[derive(Debug, Deserialize)]
struct RawAlternative {
    token: String,
    logprob: Option<f64>,
}

/// `null` (and a producer's bare `-Infinity`, rewritten to `null`) means -inf.
/// The field itself stays required.
fn logprob_or_neg_infinity<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NEG_INFINITY))
}

/// Rewrite bare `-Infinity` literals outside string values to `null`.
///
/// Python's `json.dumps` emits them for masked logits; they are not JSON.
fn rewrite_negative_infinity(line: &str) -> Cow<'_, str> {
    const LITERAL: &str = "-Infinity";
    if !line.contains(LITERAL) {
        return Cow::Borrowed(line);
    }

    let mut out = String::with_capacity(line.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut rest = line;
    while let Some(c) = rest.chars().next() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        } else if rest.starts_with(LITERAL) {
            out.push_str("null");
            rest = &rest[LITERAL.len()..];
            continue;
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    Cow::Owned(out)
}

fn checked_logprob(
    value: f64,
    what: &str,
    source_name: &str,
    line_no: usize,
) -> Result<f64> {
    if value.is_nan() || value > LOGPROB_TOLERANCE {
        return Err(AnalysisError::malformed(
            source_name,
            line_no,
            format!("{what} logprob must be <= 0, got {value}"),
        ));
    }
    Ok(value.min(0.0))
}

/// Parse a single log line.
///
/// `line_no` is 1-based and only used for error reporting.
pub fn parse_record_line(
    line: &str,
    source_name: &str,
    line_no: usize,
) -> Result<DecodingStepRecord> {
    let raw: RawRecord = serde_json::from_str(&rewrite_negative_infinity(line))
        .map_err(|e| AnalysisError::malformed(source_name, line_no, e))?;

    let logprob = checked_logprob(raw.logprob, "token", source_name, line_no)?;

    let mut alternatives = Vec::with_capacity(raw.top_k.len());
    for alt in raw.top_k {
        // -inf carries no information about the candidate
        let Some(lp) = alt.logprob.filter(|lp| *lp != f64::NEG_INFINITY) else {
            continue;
        };
        let lp = checked_logprob(lp, "alternative", source_name, line_no)?;
        alternatives.push(Alternative {
            token: alt.token,
            logprob: lp,
        });
    }

    Ok(DecodingStepRecord {
        step: raw.step,
        token: raw.token,
        logprob,
        alternatives,
        context: raw.context,
    })
}

/// Read every record from a JSONL stream.
///
/// Whitespace-only lines are ignored. Steps must be strictly increasing.
pub fn read_records<R: BufRead>(reader: R, source_name: &str) -> Result<Vec<DecodingStepRecord>> {
    let mut records: Vec<DecodingStepRecord> = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|e| AnalysisError::malformed(source_name, line_no, e))?;
        if line.trim().is_empty() {
            continue;
        }

        let record = parse_record_line(&line, source_name, line_no)?;
        if let Some(prev) = records.last() {
            if record.step <= prev.step {
                return Err(AnalysisError::malformed(
                    source_name,
                    line_no,
                    format!("step {} does not follow step {}", record.step, prev.step),
                ));
            }
        }
        records.push(record);
    }

    debug!("Read {} records from {}", records.len(), source_name);
    Ok(records)
}

/// Load every record from a JSONL file
pub fn load_records(path: &Path) -> Result<Vec<DecodingStepRecord>> {
    let file = File::open(path).map_err(|e| AnalysisError::io(path, e))?;
    read_records(BufReader::new(file), &path.display().to_string())
}
