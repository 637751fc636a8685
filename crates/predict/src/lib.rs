//! Prediction models for packaging cost and CO2.
//!
//! The scaler and the two regressors are fitted elsewhere and consumed as
//! opaque artifacts. This crate provides:
//! - `Scaler` / `Regressor`: the contract the ranking engine depends on
//! - JSON artifact formats (standard scaler, linear model, tree ensemble)
//! - `PredictionModels`: the scale-then-predict step with contract checks

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use packwise_model::{FeatureMatrix, FEATURE_COUNT};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A prediction artifact violated its input/output contract.
#[derive(Debug, Error, PartialEq)]
pub enum InferenceError {
    #[error("{model} expects {expected} features, got {actual}")]
    WidthMismatch {
        model: String,
        expected: usize,
        actual: usize,
    },

    #[error("{model} returned {actual} rows for {expected} inputs")]
    LengthMismatch {
        model: String,
        expected: usize,
        actual: usize,
    },

    #[error("{model} produced a non-finite value at row {row}")]
    NonFinite { model: String, row: usize },
}

/// Errors from loading an artifact file.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Failed to read artifact {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse artifact {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("Invalid artifact {path}: {reason}")]
    Invalid { path: String, reason: String },
}

/// Feature-scaling transform applied before both regressors.
pub trait Scaler: Send + Sync {
    fn transform(&self, features: &FeatureMatrix) -> Result<FeatureMatrix, InferenceError>;

    /// Name for logging and error messages.
    fn name(&self) -> &str;
}

/// A fitted regressor producing one scalar per input row.
pub trait Regressor: Send + Sync {
    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>, InferenceError>;

    /// Name for logging and error messages.
    fn name(&self) -> &str;
}

/// Scaler artifact as exported to JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScalerArtifact {
    /// (x - mean) / scale, per column
    Standard(StandardScaler),
    /// Pass-through
    Identity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl ScalerArtifact {
    fn validate(&self) -> Result<(), String> {
        match self {
            Self::Identity => Ok(()),
            Self::Standard(s) => {
                if s.mean.len() != s.scale.len() {
                    return Err(format!(
                        "mean has {} columns, scale has {}",
                        s.mean.len(),
                        s.scale.len()
                    ));
                }
                if s.scale.iter().any(|v| !v.is_finite() || *v == 0.0) {
                    return Err("scale values must be finite and non-zero".to_string());
                }
                if s.mean.iter().any(|v| !v.is_finite()) {
                    return Err("mean values must be finite".to_string());
                }
                Ok(())
            }
        }
    }
}

impl Scaler for ScalerArtifact {
    fn transform(&self, features: &FeatureMatrix) -> Result<FeatureMatrix, InferenceError> {
        match self {
            Self::Identity => Ok(features.clone()),
            Self::Standard(s) => {
                check_width(self.name(), s.mean.len(), features)?;
                let rows: Vec<Vec<f64>> = features
                    .rows()
                    .map(|row| {
                        row.iter()
                            .zip(s.mean.iter().zip(&s.scale))
                            .map(|(x, (mean, scale))| (x - mean) / scale)
                            .collect()
                    })
                    .collect();
                Ok(FeatureMatrix::from_rows(&rows).unwrap_or_default())
            }
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Standard(_) => "standard_scaler",
            Self::Identity => "identity_scaler",
        }
    }
}

/// Regressor artifact as exported to JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegressorArtifact {
    Linear(LinearRegressor),
    TreeEnsemble(TreeEnsemble),
}

/// intercept + coefficients · x
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegressor {
    pub coefficients: Vec<f64>,
    #[serde(default)]
    pub intercept: f64,
}

/// A forest of regression trees.
///
/// Random forests average their trees (`mean`); gradient-boosted ensembles
/// add their trees to `base_score` (`sum`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub n_features: usize,
    pub aggregation: Aggregation,
    #[serde(default)]
    pub base_score: f64,
    #[serde(default)]
    pub split: SplitRule,
    pub trees: Vec<Tree>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Mean,
    Sum,
}

/// Comparison that sends a row to the left child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitRule {
    /// x <= threshold (scikit-learn)
    #[default]
    LessOrEqual,
    /// x < threshold (XGBoost)
    Less,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    /// Node 0 is the root; children always have a larger index than their parent.
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

impl Tree {
    fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split {
                feature,
                left,
                right,
                ..
            } = node
            {
                if *feature >= n_features {
                    return Err(format!("node {i} splits on feature {feature}"));
                }
                for child in [*left, *right] {
                    if child <= i || child >= self.nodes.len() {
                        return Err(format!("node {i} has invalid child {child}"));
                    }
                }
            }
        }
        Ok(())
    }

    fn evaluate(&self, row: &[f64], rule: SplitRule) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let x = row[*feature];
                    let go_left = match rule {
                        SplitRule::LessOrEqual => x <= *threshold,
                        SplitRule::Less => x < *threshold,
                    };
                    index = if go_left { *left } else { *right };
                }
            }
        }
    }
}

impl RegressorArtifact {
    fn validate(&self) -> Result<(), String> {
        match self {
            Self::Linear(linear) => {
                if linear.coefficients.is_empty() {
                    return Err("linear model has no coefficients".to_string());
                }
                Ok(())
            }
            Self::TreeEnsemble(ensemble) => {
                if ensemble.trees.is_empty() {
                    return Err("ensemble has no trees".to_string());
                }
                ensemble
                    .trees
                    .iter()
                    .try_for_each(|tree| tree.validate(ensemble.n_features))
            }
        }
    }

    fn width(&self) -> usize {
        match self {
            Self::Linear(linear) => linear.coefficients.len(),
            Self::TreeEnsemble(ensemble) => ensemble.n_features,
        }
    }
}

impl Regressor for RegressorArtifact {
    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>, InferenceError> {
        check_width(self.name(), self.width(), features)?;

        let predictions = match self {
            Self::Linear(linear) => features
                .rows()
                .map(|row| {
                    linear.intercept
                        + row
                            .iter()
                            .zip(&linear.coefficients)
                            .map(|(x, w)| x * w)
                            .sum::<f64>()
                })
                .collect(),
            Self::TreeEnsemble(ensemble) => features
                .rows()
                .map(|row| {
                    let total: f64 = ensemble
                        .trees
                        .iter()
                        .map(|tree| tree.evaluate(row, ensemble.split))
                        .sum();
                    match ensemble.aggregation {
                        Aggregation::Mean => total / ensemble.trees.len() as f64,
                        Aggregation::Sum => ensemble.base_score + total,
                    }
                })
                .collect(),
        };

        Ok(predictions)
    }

    fn name(&self) -> &str {
        match self {
            Self::Linear(_) => "linear_regressor",
            Self::TreeEnsemble(_) => "tree_ensemble",
        }
    }
}

fn check_width(model: &str, expected: usize, features: &FeatureMatrix) -> Result<(), InferenceError> {
    if features.nrows() > 0 && features.ncols() != expected {
        return Err(InferenceError::WidthMismatch {
            model: model.to_string(),
            expected,
            actual: features.ncols(),
        });
    }
    Ok(())
}

fn read_artifact<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let display = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|source| ArtifactError::Io {
        path: display.clone(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ArtifactError::Parse {
        path: display,
        source,
    })
}

/// Load and validate a scaler artifact.
pub fn load_scaler(path: impl AsRef<Path>) -> Result<ScalerArtifact, ArtifactError> {
    let path = path.as_ref();
    let scaler: ScalerArtifact = read_artifact(path)?;
    scaler.validate().map_err(|reason| ArtifactError::Invalid {
        path: path.display().to_string(),
        reason,
    })?;
    Ok(scaler)
}

/// Load and validate a regressor artifact.
pub fn load_regressor(path: impl AsRef<Path>) -> Result<RegressorArtifact, ArtifactError> {
    let path = path.as_ref();
    let regressor: RegressorArtifact = read_artifact(path)?;
    regressor.validate().map_err(|reason| ArtifactError::Invalid {
        path: path.display().to_string(),
        reason,
    })?;
    Ok(regressor)
}

/// Predicted metrics for one candidate row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub cost: f64,
    pub co2: f64,
}

/// The scaler and both regressors, shared read-only across requests.
#[derive(Clone)]
pub struct PredictionModels {
    scaler: Arc<dyn Scaler>,
    cost: Arc<dyn Regressor>,
    co2: Arc<dyn Regressor>,
}

impl fmt::Debug for PredictionModels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredictionModels")
            .field("scaler", &self.scaler.name())
            .field("cost", &self.cost.name())
            .field("co2", &self.co2.name())
            .finish()
    }
}

impl PredictionModels {
    pub fn new(scaler: Arc<dyn Scaler>, cost: Arc<dyn Regressor>, co2: Arc<dyn Regressor>) -> Self {
        Self { scaler, cost, co2 }
    }

    /// Load the three artifacts from JSON files.
    pub fn load(
        scaler_path: impl AsRef<Path>,
        cost_path: impl AsRef<Path>,
        co2_path: impl AsRef<Path>,
    ) -> Result<Self, ArtifactError> {
        Ok(Self::new(
            Arc::new(load_scaler(scaler_path)?),
            Arc::new(load_regressor(cost_path)?),
            Arc::new(load_regressor(co2_path)?),
        ))
    }

    /// Scale the features and predict cost and CO2 for every row.
    pub fn predict(&self, features: &FeatureMatrix) -> Result<Vec<Prediction>, InferenceError> {
        let rows = features.nrows();
        if rows == 0 {
            return Ok(Vec::new());
        }
        if features.ncols() != FEATURE_COUNT {
            return Err(InferenceError::WidthMismatch {
                model: "feature assembler".to_string(),
                expected: FEATURE_COUNT,
                actual: features.ncols(),
            });
        }

        let scaled = self.scaler.transform(features)?;
        if scaled.nrows() != rows {
            return Err(InferenceError::LengthMismatch {
                model: self.scaler.name().to_string(),
                expected: rows,
                actual: scaled.nrows(),
            });
        }

        let cost = checked_predict(self.cost.as_ref(), &scaled, rows)?;
        let co2 = checked_predict(self.co2.as_ref(), &scaled, rows)?;

        tracing::debug!(rows, "Predicted cost and CO2");

        Ok(cost
            .into_iter()
            .zip(co2)
            .map(|(cost, co2)| Prediction { cost, co2 })
            .collect())
    }
}

fn checked_predict(
    model: &dyn Regressor,
    features: &FeatureMatrix,
    rows: usize,
) -> Result<Vec<f64>, InferenceError> {
    let predictions = model.predict(features)?;
    if predictions.len() != rows {
        return Err(InferenceError::LengthMismatch {
            model: model.name().to_string(),
            expected: rows,
            actual: predictions.len(),
        });
    }
    if let Some(row) = predictions.iter().position(|v| !v.is_finite()) {
        return Err(InferenceError::NonFinite {
            model: model.name().to_string(),
            row,
        });
    }
    Ok(predictions)
}
