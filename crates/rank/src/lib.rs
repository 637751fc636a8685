//! Ranking of packaging materials.
//!
//! Combines catalog aggregates with model predictions into a composite
//! environmental/cost score, applies the fragility penalty, classifies
//! biodegradability, filters by eco-preference and keeps the best few.
//! `Engine` runs the whole pipeline for one request over shared,
//! read-only artifacts.

use std::sync::Arc;

use packwise_catalog::{build_catalog, Catalog, ReferenceDataset};
use packwise_features::{
    assemble_features, normalize_request, title_case, CategoryEncoders, FeatureAssemblyError,
    InputError,
};
use packwise_model::{
    EcoPreference, MaterialCandidate, RawRequest, RecommendationResult, RequestInput,
    ScoredCandidate,
};
use packwise_predict::{InferenceError, Prediction, PredictionModels};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration for scoring and selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankConfig {
    /// Weight of predicted CO2 in the composite score
    pub co2_weight: f64,
    /// Weight of predicted cost in the composite score
    pub cost_weight: f64,
    /// Added to weak materials when the product is fragile
    pub fragility_penalty: f64,
    /// Materials with a strength code below this are weak
    pub min_strength_code: i64,
    /// Mean biodegradability strictly above this is biodegradable
    pub biodegradable_threshold: f64,
    /// Maximum number of results
    pub top_k: usize,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            co2_weight: 0.7,
            cost_weight: 0.3,
            fragility_penalty: 10.0,
            min_strength_code: 3,
            biodegradable_threshold: 0.5,
            top_k: 5,
        }
    }
}

/// Request-fatal failures of the recommendation pipeline.
#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] InputError),

    #[error("Feature assembly failed: {0}")]
    FeatureAssembly(#[from] FeatureAssemblyError),

    #[error("Model inference failed: {0}")]
    ModelInference(#[from] InferenceError),
}

/// Composite score before any penalty. Lower is better.
pub fn env_score(cost: f64, co2: f64, config: &RankConfig) -> f64 {
    config.co2_weight * co2 + config.cost_weight * cost
}

/// Score every candidate against its prediction.
///
/// `candidates` and `predictions` are row-aligned.
pub fn score_candidates(
    candidates: Vec<MaterialCandidate>,
    predictions: &[Prediction],
    is_fragile: bool,
    config: &RankConfig,
) -> Vec<ScoredCandidate> {
    candidates
        .into_iter()
        .zip(predictions)
        .map(|(material, prediction)| {
            let penalty = if is_fragile && material.strength_code < config.min_strength_code {
                config.fragility_penalty
            } else {
                0.0
            };
            let is_biodegradable =
                material.mean_biodegradability_score > config.biodegradable_threshold;

            ScoredCandidate {
                env_score: env_score(prediction.cost, prediction.co2, config) + penalty,
                predicted_cost: prediction.cost,
                predicted_co2: prediction.co2,
                is_biodegradable,
                fragility_penalty: penalty,
                material,
            }
        })
        .collect()
}

/// Keep only the candidates matching the eco-preference.
pub fn apply_eco_preference(
    scored: Vec<ScoredCandidate>,
    preference: EcoPreference,
) -> Vec<ScoredCandidate> {
    match preference {
        EcoPreference::Yes => scored.into_iter().filter(|c| c.is_biodegradable).collect(),
        EcoPreference::No => scored.into_iter().filter(|c| !c.is_biodegradable).collect(),
        EcoPreference::Both => scored,
    }
}

/// Sort ascending by score, ties by material name, and keep `top_k`.
pub fn select_top(mut scored: Vec<ScoredCandidate>, top_k: usize) -> Vec<ScoredCandidate> {
    scored.sort_by(|a, b| {
        a.env_score
            .total_cmp(&b.env_score)
            .then_with(|| a.material_name().cmp(b.material_name()))
    });
    scored.truncate(top_k);
    scored
}

/// Score, filter and select for one normalized request.
pub fn rank(
    candidates: Vec<MaterialCandidate>,
    predictions: &[Prediction],
    request: &RequestInput,
    config: &RankConfig,
) -> Vec<ScoredCandidate> {
    let scored = score_candidates(candidates, predictions, request.is_fragile, config);
    let filtered = apply_eco_preference(scored, request.eco_preference);
    select_top(filtered, config.top_k)
}

/// The recommendation pipeline over artifacts loaded once at startup.
///
/// Holds no per-request state; one engine serves any number of concurrent
/// callers.
#[derive(Debug, Clone)]
pub struct Engine {
    dataset: Arc<ReferenceDataset>,
    encoders: Arc<CategoryEncoders>,
    models: PredictionModels,
    config: RankConfig,
}

impl Engine {
    pub fn new(
        dataset: Arc<ReferenceDataset>,
        encoders: Arc<CategoryEncoders>,
        models: PredictionModels,
        config: RankConfig,
    ) -> Self {
        Self {
            dataset,
            encoders,
            models,
            config,
        }
    }

    pub fn config(&self) -> &RankConfig {
        &self.config
    }

    /// Normalize a raw request and recommend for it.
    pub fn recommend(&self, raw: &RawRequest) -> Result<RecommendationResult, RecommendError> {
        let request = normalize_request(raw)?;
        self.recommend_normalized(request)
    }

    /// Recommend for an already normalized request.
    pub fn recommend_normalized(
        &self,
        request: RequestInput,
    ) -> Result<RecommendationResult, RecommendError> {
        let encoding = self.encoders.encode(&request);
        let Catalog { scope, materials } = build_catalog(&self.dataset, &request.category);

        let assembled = assemble_features(&request, encoding.category.code, &materials)?;
        let predictions = self.models.predict(&assembled.matrix)?;
        let candidates = rank(assembled.candidates, &predictions, &request, &self.config);

        tracing::info!(
            category = %request.category,
            sub_category = %request.sub_category,
            scored = predictions.len(),
            returned = candidates.len(),
            degraded = encoding.is_degraded(),
            "Recommendation complete"
        );

        Ok(RecommendationResult {
            request,
            encoding,
            scope,
            candidates,
        })
    }

    /// The candidate catalog a request for `category` would rank.
    pub fn catalog(&self, category: &str) -> Catalog {
        build_catalog(&self.dataset, &title_case(category.trim()))
    }
}
