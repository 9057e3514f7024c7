//! Data model for model runs, response sets and variation summaries
//!
//! These types are the typed boundary for every JSON document the clients
//! receive. Shapes that do not fit fail deserialization instead of leaking
//! half-formed data into the views.

use crate::display::RepresentationType;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from parsing identifiers or response sets
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Unknown prompt variation: {0}")]
    UnknownVariation(String),

    #[error("Invalid run {key}: {source}")]
    InvalidRun {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// The multimodal models a run can come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelId {
    Gpt,
    Claude,
    Gemini,
    /// Legacy model, present only in older example bundles
    Llava,
}

impl ModelId {
    pub const ALL: [ModelId; 4] = [ModelId::Gpt, ModelId::Claude, ModelId::Gemini, ModelId::Llava];

    /// Models selected by default in generation forms
    pub fn defaults() -> Vec<ModelId> {
        vec![ModelId::Gpt, ModelId::Claude, ModelId::Gemini]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::Gpt => "gpt",
            ModelId::Claude => "claude",
            ModelId::Gemini => "gemini",
            ModelId::Llava => "llava",
        }
    }

    /// Short name used in table cells
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelId::Gpt => "GPT",
            ModelId::Claude => "Claude",
            ModelId::Gemini => "Gemini",
            ModelId::Llava => "LLaVA",
        }
    }

    /// Product name used in model pickers
    pub fn full_name(&self) -> &'static str {
        match self {
            ModelId::Gpt => "GPT-4o",
            ModelId::Claude => "Claude 3.7 Sonnet",
            ModelId::Gemini => "Gemini 1.5 Pro",
            ModelId::Llava => "LLaVA",
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelId::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ModelError::UnknownModel(s.to_string()))
    }
}

/// How prompts vary across trials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptVariation {
    /// The same prompt for every trial
    #[default]
    Original,
    /// Trial 1 uses the prompt, later trials use paraphrases
    Paraphrased,
    /// Each trial asks from a different persona
    Persona,
}

impl PromptVariation {
    pub const ALL: [PromptVariation; 3] = [
        PromptVariation::Original,
        PromptVariation::Paraphrased,
        PromptVariation::Persona,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptVariation::Original => "original",
            PromptVariation::Paraphrased => "paraphrased",
            PromptVariation::Persona => "persona",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PromptVariation::Original => "Original prompt only",
            PromptVariation::Paraphrased => "Paraphrased prompts",
            PromptVariation::Persona => "Persona prompts",
        }
    }
}

impl fmt::Display for PromptVariation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptVariation {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PromptVariation::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ModelError::UnknownVariation(s.to_string()))
    }
}

/// Where the `image` field of a generation request points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    /// A remote http(s) URL the pipeline downloads itself
    Url,
    /// A self-contained `data:image/...;base64,` payload
    Base64,
}

impl ImageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSource::Url => "url",
            ImageSource::Base64 => "base64",
        }
    }
}

/// A model option advertised by the generation service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOption {
    pub id: ModelId,
    pub name: String,
}

/// A prompt variation option advertised by the generation service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariationOption {
    pub id: PromptVariation,
    pub name: String,
}

/// One model's output for one trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRun {
    /// 1-indexed trial ordinal, unique only within `model`
    pub id: u32,
    pub model: ModelId,
    /// The exact prompt sent for this trial
    #[serde(default)]
    pub prompt: String,
    /// Markdown output
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptive_sentences: Option<Vec<String>>,
    /// Sentence index to the atomic facts extracted from it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atomic_facts: Option<BTreeMap<usize, Vec<String>>>,
}

impl ModelRun {
    pub fn new(id: u32, model: ModelId, prompt: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id,
            model,
            prompt: prompt.into(),
            description: description.into(),
            descriptive_sentences: None,
            atomic_facts: None,
        }
    }

    /// Sentences of the description
    ///
    /// Uses the pipeline's sentence breakdown when present, otherwise splits
    /// the description after `.`, `!` or `?` followed by whitespace.
    pub fn sentences(&self) -> Vec<String> {
        if let Some(sentences) = &self.descriptive_sentences {
            return sentences.clone();
        }

        let mut sentences = Vec::new();
        let mut current = String::new();
        let mut chars = self.description.chars().peekable();
        while let Some(c) = chars.next() {
            current.push(c);
            let at_boundary = matches!(c, '.' | '!' | '?')
                && chars.peek().map_or(true, |next| next.is_whitespace());
            if at_boundary || c == '\n' {
                let trimmed = current.trim();
                if !trimmed.is_empty() {
                    sentences.push(trimmed.to_string());
                }
                current.clear();
            }
        }
        let trimmed = current.trim();
        if !trimmed.is_empty() {
            sentences.push(trimmed.to_string());
        }
        sentences
    }

    /// Atomic facts for a sentence index, empty when none were extracted
    pub fn facts_for(&self, sentence: usize) -> &[String] {
        self.atomic_facts
            .as_ref()
            .and_then(|facts| facts.get(&sentence))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// All runs for one image and prompt context, keyed by an opaque string
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, serde_json::Value>",
    into = "BTreeMap<String, ModelRun>"
)]
pub struct ResponseSet {
    runs: BTreeMap<String, ModelRun>,
}

impl TryFrom<BTreeMap<String, serde_json::Value>> for ResponseSet {
    type Error = ModelError;

    fn try_from(raw: BTreeMap<String, serde_json::Value>) -> Result<Self, Self::Error> {
        let mut runs = BTreeMap::new();
        for (key, value) in raw {
            // Some pipeline outputs carry the base prompt alongside the runs
            if key == "prompt" && value.is_string() {
                continue;
            }
            let run: ModelRun = serde_json::from_value(value)
                .map_err(|source| ModelError::InvalidRun { key: key.clone(), source })?;
            runs.insert(key, run);
        }
        Ok(Self { runs })
    }
}

impl From<ResponseSet> for BTreeMap<String, ModelRun> {
    fn from(set: ResponseSet) -> Self {
        set.runs
    }
}

impl FromIterator<(String, ModelRun)> for ResponseSet {
    fn from_iter<I: IntoIterator<Item = (String, ModelRun)>>(iter: I) -> Self {
        Self {
            runs: iter.into_iter().collect(),
        }
    }
}

impl ResponseSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn insert(&mut self, key: impl Into<String>, run: ModelRun) {
        self.runs.insert(key.into(), run);
    }

    pub fn get(&self, key: &str) -> Option<&ModelRun> {
        self.runs.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelRun)> {
        self.runs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Models that have at least one run, in model order
    pub fn models(&self) -> BTreeSet<ModelId> {
        self.runs.values().map(|r| r.model).collect()
    }

    /// Distinct prompts in key order of first appearance
    pub fn prompts(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.runs
            .values()
            .filter(|r| seen.insert(r.prompt.as_str()))
            .map(|r| r.prompt.as_str())
            .collect()
    }
}

/// Cross-model agreement analysis and the variation-aware renderings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariationSummary {
    /// Points of agreement across models
    #[serde(default, deserialize_with = "markdown_text", skip_serializing_if = "Option::is_none")]
    pub similarity: Option<String>,

    /// Points of conflict
    #[serde(default, deserialize_with = "markdown_text", skip_serializing_if = "Option::is_none")]
    pub disagreement: Option<String>,

    /// Model-exclusive claims
    #[serde(default, deserialize_with = "markdown_text", skip_serializing_if = "Option::is_none")]
    pub uniqueness: Option<String>,

    /// Variation markers only, attributions removed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var_only: Option<String>,

    /// Per-claim model attribution, e.g. `(2 of 3 GPT, 1 of 3 Claude)`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_diff: Option<String>,

    /// Per-claim support percentage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<String>,

    /// Per-claim natural-language confidence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nl: Option<String>,
}

impl VariationSummary {
    /// The variation-aware description for a representation type
    pub fn rendering(&self, representation: RepresentationType) -> Option<&str> {
        match representation {
            RepresentationType::Model => self.model_diff.as_deref(),
            RepresentationType::None => self.var_only.as_deref(),
            RepresentationType::Percentage => self.percentage.as_deref(),
            RepresentationType::Natural => self.nl.as_deref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Derive any missing rendering from `model_diff`
    pub fn fill_renderings(&mut self, num_trials: u32, num_models: usize) {
        let Some(model_diff) = self.model_diff.as_deref() else {
            return;
        };
        if self.var_only.is_none() {
            self.var_only = Some(crate::variation::strip_attributions(model_diff));
        }
        if self.percentage.is_none() {
            self.percentage = Some(crate::variation::to_percentages(
                model_diff, num_trials, num_models,
            ));
        }
        if self.nl.is_none() {
            let percentage = self.percentage.as_deref().unwrap_or(model_diff);
            self.nl = Some(crate::variation::to_natural_language(percentage));
        }
    }
}

/// Accepts a markdown string or a list of points rendered as bullets
fn markdown_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Text {
        Plain(String),
        Points(Vec<String>),
    }

    Ok(Option::<Text>::deserialize(deserializer)?.map(|text| match text {
        Text::Plain(s) => s,
        Text::Points(points) => points
            .iter()
            .map(|p| format!("- {}", p))
            .collect::<Vec<_>>()
            .join("\n"),
    }))
}

/// Context stored next to an example bundle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExampleMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_trials: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_models: Option<Vec<ModelId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_variation: Option<PromptVariation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ImageSource>,
    /// Free-text usage scenario shown with the example
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
}
