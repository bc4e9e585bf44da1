//! Output-language labels for chart payloads
//!
//! The language is an explicit value handed to the series builder.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    #[default]
    Fr,
    En,
}

impl Lang {
    pub fn labels(self) -> &'static Labels {
        match self {
            Self::Fr => &FR,
            Self::En => &EN,
        }
    }
}

impl FromStr for Lang {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fr" => Ok(Self::Fr),
            "en" => Ok(Self::En),
            other => Err(AnalysisError::configuration(format!(
                "lang must be one of ['fr', 'en'], got {other}"
            ))),
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fr => "fr",
            Self::En => "en",
        })
    }
}

/// Translated strings used in titles, legends and axes
#[derive(Debug)]
pub struct Labels {
    pub lquote: &'static str,
    pub rquote: &'static str,
    pub surprisal_title: &'static str,
    pub tokens_generated: &'static str,
    pub surprisal: &'static str,
    pub context: &'static str,
    pub chosen_label: &'static str,
    pub alt_label: &'static str,
    pub selection_prob: &'static str,
    pub probability: &'static str,
    pub confidence: &'static str,
    pub threshold: &'static str,
    pub and: &'static str,
}

static FR: Labels = Labels {
    lquote: "« ",
    rquote: " »",
    surprisal_title: "Surprise associée à la sélection des tokens",
    tokens_generated: "Tokens générés",
    surprisal: "Surprise",
    context: "Contexte",
    chosen_label: "Choisi :",
    alt_label: "Alt. :",
    selection_prob: "Probabilité de sélection :",
    probability: "Probabilité",
    confidence: "Confiance",
    threshold: "seuil",
    and: "et",
};

static EN: Labels = Labels {
    lquote: "\"",
    rquote: "\"",
    surprisal_title: "Token selection surprisal",
    tokens_generated: "Step",
    surprisal: "Surprisal",
    context: "Context",
    chosen_label: "Chosen:",
    alt_label: "Alt:",
    selection_prob: "Selection probability:",
    probability: "Probability",
    confidence: "Confidence",
    threshold: "threshold",
    and: "and",
};

impl Labels {
    pub fn quoted(&self, token: &str) -> String {
        format!("{}{}{}", self.lquote, token, self.rquote)
    }

    /// `« elle » et « il »`
    pub fn pair(&self, key: &str, value: &str) -> String {
        format!("{} {} {}", self.quoted(key), self.and, self.quoted(value))
    }
}
