//! Discovery of decoding logs on disk
//!
//! Logs are laid out one directory per model and generation configuration:
//!
//! ```text
//! <results>/<model>/<level>/<text_type>/<gen_type>/logits/*.jsonl
//! ```
//!
//! Each file is one (model, corpus item, configuration) run and is loaded
//! on its own.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{AnalysisError, Result};

/// A closed set of directory labels
pub trait LogLabel: Sized + Copy + 'static {
    /// Name of the dimension, used in error messages
    const DIMENSION: &'static str;
    const VARIANTS: &'static [Self];

    fn as_str(self) -> &'static str;

    fn parse_label(s: &str) -> Result<Self> {
        Self::VARIANTS
            .iter()
            .copied()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| {
                let allowed: Vec<&str> = Self::VARIANTS.iter().map(|v| v.as_str()).collect();
                AnalysisError::configuration(format!(
                    "{} must be one of {:?}, got {s}",
                    Self::DIMENSION,
                    allowed
                ))
            })
    }
}

macro_rules! log_label {
    ($name:ident, $dimension:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl LogLabel for $name {
            const DIMENSION: &'static str = $dimension;
            const VARIANTS: &'static [Self] = &[$(Self::$variant),+];

            fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = AnalysisError;

            fn from_str(s: &str) -> Result<Self> {
                Self::parse_label(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

log_label!(Level, "level", { Ce1 => "ce1", Cm1 => "cm1" });
log_label!(TextType, "text_type", { Literature => "literature", Scientific => "scientific" });
log_label!(GenType, "gen_type", { Continuation => "continuation", Generation => "generation" });

/// Parse a label that may also be the wildcard `all`
pub fn parse_selector<T: LogLabel>(s: &str) -> Result<Option<T>> {
    if s == "all" {
        Ok(None)
    } else {
        T::parse_label(s).map(Some)
    }
}

/// Which generation configurations to analyze; `None` matches everything
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogSelection {
    pub level: Option<Level>,
    pub text_type: Option<TextType>,
    pub gen_type: Option<GenType>,
}

impl LogSelection {
    /// Build a selection from CLI-style labels (`all` is a wildcard)
    pub fn parse(level: &str, text_type: &str, gen_type: &str) -> Result<Self> {
        Ok(Self {
            level: parse_selector(level)?,
            text_type: parse_selector(text_type)?,
            gen_type: parse_selector(gen_type)?,
        })
    }

    fn matches(&self, level: &str, text_type: &str, gen_type: &str) -> bool {
        fn accepts<T: LogLabel>(selector: Option<T>, component: &str) -> bool {
            selector.map_or(true, |s| s.as_str() == component)
        }
        accepts(self.level, level)
            && accepts(self.text_type, text_type)
            && accepts(self.gen_type, gen_type)
    }
}

/// A model whose logs live under `<results>/<dir_name>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Short handle, e.g. `llama`
    pub key: String,
    /// Directory and display name, e.g. `Llama-3.2-3B`
    pub name: String,
}

impl ModelSpec {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
        }
    }
}

impl FromStr for ModelSpec {
    type Err = AnalysisError;

    /// `key=Name`, or a bare name used for both
    fn from_str(s: &str) -> Result<Self> {
        let (key, name) = s.split_once('=').unwrap_or((s, s));
        if key.is_empty() || name.is_empty() {
            return Err(AnalysisError::configuration(format!(
                "model must be `key=Name` or `Name`, got {s:?}"
            )));
        }
        Ok(Self::new(key, name))
    }
}

/// The three models compared by default
pub fn default_models() -> Vec<ModelSpec> {
    vec![
        ModelSpec::new("llama", "Llama-3.2-3B"),
        ModelSpec::new("mistral", "Mistral-7B-Instruct-v0.3"),
        ModelSpec::new("qwen", "Qwen2.5-7B-Instruct"),
    ]
}

/// One decoding log on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogSource {
    pub model: String,
    pub level: String,
    pub text_type: String,
    pub gen_type: String,
    pub path: PathBuf,
}

/// List a model's logs matching the selection, sorted by path.
///
/// A model without a results directory has no sources.
pub fn discover_sources(
    results_dir: &Path,
    model: &ModelSpec,
    selection: &LogSelection,
) -> Result<Vec<LogSource>> {
    let root = results_dir.join(&model.name);
    if !root.is_dir() {
        warn!("No results directory for {} at {}", model.name, root.display());
        return Ok(Vec::new());
    }

    let mut sources = Vec::new();
    let walker = WalkDir::new(&root)
        .min_depth(5)
        .max_depth(5)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(|e| AnalysisError::io(&root, io::Error::from(e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            continue;
        }

        let Ok(relative) = path.strip_prefix(&root) else {
            continue;
        };
        let parts: Vec<&str> = relative
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .collect();
        let [level, text_type, gen_type, "logits", _file] = parts.as_slice() else {
            continue;
        };
        if !selection.matches(level, text_type, gen_type) {
            continue;
        }

        sources.push(LogSource {
            model: model.name.clone(),
            level: (*level).to_string(),
            text_type: (*text_type).to_string(),
            gen_type: (*gen_type).to_string(),
            path: path.to_path_buf(),
        });
    }

    debug!("Found {} log files for {}", sources.len(), model.name);
    Ok(sources)
}
