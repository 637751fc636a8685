//! Core domain model for Packwise packaging recommendations.
//!
//! This crate defines the fundamental types used throughout the system:
//! - `RawRequest` / `RequestInput`: a product description before and after normalization
//! - `EcoPreference`: biodegradable-only, non-biodegradable-only, or unfiltered
//! - `Encoded`: an integer category code tagged with its encoding confidence
//! - `MaterialAggregate`: raw per-material aggregate, possibly incomplete
//! - `MaterialCandidate` / `ScoredCandidate`: a packaging material under consideration
//! - `RecommendationResult`: the ranked answer to one request
//! - `FeatureMatrix`: row-major model input

use serde::{Deserialize, Serialize};

/// Number of model features per candidate.
pub const FEATURE_COUNT: usize = 6;

/// Filter applied to the biodegradability class of ranked materials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EcoPreference {
    /// Biodegradable materials only
    Yes,
    /// Non-biodegradable materials only
    No,
    /// No filtering
    Both,
}

impl Default for EcoPreference {
    fn default() -> Self {
        Self::Both
    }
}

impl From<&str> for EcoPreference {
    /// Only the exact strings `yes` and `no` select a filter.
    fn from(s: &str) -> Self {
        match s {
            "yes" => Self::Yes,
            "no" => Self::No,
            _ => Self::Both,
        }
    }
}

/// Product weight as it arrives on the wire: a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WeightInput {
    Number(f64),
    Text(String),
}

impl From<f64> for WeightInput {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for WeightInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// A recommendation request before normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRequest {
    /// Product category, free text
    pub category: String,

    /// Product sub-category, free text
    pub sub_category: String,

    /// Product weight in kilograms
    pub weight: WeightInput,

    /// "yes" marks the product fragile; anything else does not
    #[serde(default)]
    pub is_fragile: String,

    /// "yes", "no" or absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eco_preference: Option<String>,
}

impl RawRequest {
    pub fn new(
        category: impl Into<String>,
        sub_category: impl Into<String>,
        weight: impl Into<WeightInput>,
    ) -> Self {
        Self {
            category: category.into(),
            sub_category: sub_category.into(),
            weight: weight.into(),
            is_fragile: "no".to_string(),
            eco_preference: None,
        }
    }

    pub fn with_fragile(mut self, is_fragile: impl Into<String>) -> Self {
        self.is_fragile = is_fragile.into();
        self
    }

    pub fn with_eco_preference(mut self, eco_preference: impl Into<String>) -> Self {
        self.eco_preference = Some(eco_preference.into());
        self
    }
}

/// A normalized recommendation request.
///
/// `category` and `sub_category` are trimmed and title-cased; this is the
/// key space of the encoders and the reference dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestInput {
    pub category: String,
    pub sub_category: String,
    /// Strictly positive, finite
    pub weight: f64,
    pub is_fragile: bool,
    pub eco_preference: EcoPreference,
}

/// How a categorical value was resolved by its encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingConfidence {
    /// Value was present in the fitted lookup table
    Exact,
    /// Value was unknown; code 0 was substituted
    Fallback,
}

/// An encoded categorical value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encoded {
    pub code: i64,
    pub confidence: EncodingConfidence,
}

impl Encoded {
    pub fn exact(code: i64) -> Self {
        Self {
            code,
            confidence: EncodingConfidence::Exact,
        }
    }

    pub fn fallback() -> Self {
        Self {
            code: 0,
            confidence: EncodingConfidence::Fallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.confidence == EncodingConfidence::Fallback
    }
}

/// Encoded category and sub-category of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryEncoding {
    pub category: Encoded,
    pub sub_category: Encoded,
}

impl CategoryEncoding {
    /// True when either field fell back to code 0.
    pub fn is_degraded(&self) -> bool {
        self.category.is_fallback() || self.sub_category.is_fallback()
    }
}

/// Which slice of the reference dataset the candidates were drawn from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "category", rename_all = "snake_case")]
pub enum CatalogScope {
    /// Rows whose category matched the request
    Category(String),
    /// No row matched; every row was used
    FullDataset,
}

/// Per-material aggregate over a catalog scope.
///
/// A field is `None` when every row of the group was missing that column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialAggregate {
    pub material_name: String,
    pub material_code: Option<i64>,
    pub strength_code: Option<i64>,
    pub strength_label: Option<String>,
    pub mean_biodegradability_score: Option<f64>,
    pub mean_recyclability_pct: Option<f64>,
}

/// One packaging material aggregated from the reference dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialCandidate {
    /// Material name, unique within a ranking run
    pub material_name: String,

    /// Pre-encoded material code
    pub material_code: i64,

    /// Encoded strength (higher = stronger)
    pub strength_code: i64,

    /// Strength label (e.g., "Low", "High")
    pub strength_label: String,

    /// Mean biodegradability score in [0, 1]
    pub mean_biodegradability_score: f64,

    /// Mean recyclability in percent
    pub mean_recyclability_pct: f64,
}

/// A candidate with model predictions and its composite score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    #[serde(flatten)]
    pub material: MaterialCandidate,

    /// Predicted packaging cost
    pub predicted_cost: f64,

    /// Predicted CO2 emissions
    pub predicted_co2: f64,

    /// Composite ranking score (lower = better)
    pub env_score: f64,

    /// Biodegradability class
    pub is_biodegradable: bool,

    /// Penalty already included in `env_score` (0.0 when none applied)
    #[serde(default)]
    pub fragility_penalty: f64,
}

impl ScoredCandidate {
    pub fn material_name(&self) -> &str {
        &self.material.material_name
    }

    /// Score before the fragility penalty.
    pub fn base_score(&self) -> f64 {
        self.env_score - self.fragility_penalty
    }

    pub fn is_penalized(&self) -> bool {
        self.fragility_penalty > 0.0
    }
}

/// The ranked answer to one recommendation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    /// The normalized request
    pub request: RequestInput,

    /// Encoder output, including fallback signals
    pub encoding: CategoryEncoding,

    /// Slice of the reference dataset that was ranked
    pub scope: CatalogScope,

    /// At most top-k candidates, ascending by `env_score`
    pub candidates: Vec<ScoredCandidate>,
}

impl RecommendationResult {
    /// The best-ranked candidate, if any survived filtering.
    pub fn top(&self) -> Option<&ScoredCandidate> {
        self.candidates.first()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }
}

/// Row-major matrix of model inputs or scaled inputs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureMatrix {
    ncols: usize,
    data: Vec<f64>,
}

impl FeatureMatrix {
    /// Build a matrix from equally sized rows.
    ///
    /// Returns `None` when the rows disagree on width.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Option<Self> {
        let ncols = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        let mut data = Vec::with_capacity(ncols * rows.len());
        for row in rows {
            let row = row.as_ref();
            if row.len() != ncols {
                return None;
            }
            data.extend_from_slice(row);
        }
        Some(Self { ncols, data })
    }

    pub fn nrows(&self) -> usize {
        if self.ncols == 0 {
            0
        } else {
            self.data.len() / self.ncols
        }
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn row(&self, index: usize) -> &[f64] {
        &self.data[index * self.ncols..(index + 1) * self.ncols]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        // chunks_exact panics on zero; an empty matrix has no rows anyway
        self.data.chunks_exact(self.ncols.max(1))
    }
}
