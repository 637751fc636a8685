//! Artifact locations and engine construction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use packwise_catalog::ReferenceDataset;
use packwise_features::{CategoryEncoders, LabelEncoder};
use packwise_predict::PredictionModels;
use packwise_rank::{Engine, RankConfig};

/// Paths of everything the engine loads at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPaths {
    pub reference: PathBuf,
    pub scaler: PathBuf,
    pub cost_model: PathBuf,
    pub co2_model: PathBuf,
    pub category_encoder: PathBuf,
    pub sub_category_encoder: PathBuf,
}

impl ArtifactPaths {
    /// Conventional file names inside one directory.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            reference: dir.join("reference.csv"),
            scaler: dir.join("scaler.json"),
            cost_model: dir.join("cost_model.json"),
            co2_model: dir.join("co2_model.json"),
            category_encoder: dir.join("category_encoder.json"),
            sub_category_encoder: dir.join("sub_category_encoder.json"),
        }
    }
}

/// Load a ranking configuration, or the defaults when no file is given.
pub fn load_rank_config(path: Option<&Path>) -> Result<RankConfig> {
    let Some(path) = path else {
        return Ok(RankConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading rank config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing rank config {}", path.display()))
}

/// Load every artifact once and build a shareable engine.
pub fn load_engine(paths: &ArtifactPaths, config: RankConfig) -> Result<Engine> {
    let dataset = ReferenceDataset::from_csv_path(&paths.reference)?;
    let encoders = CategoryEncoders::new(
        LabelEncoder::from_json_path(&paths.category_encoder)?,
        LabelEncoder::from_json_path(&paths.sub_category_encoder)?,
    );
    let models = PredictionModels::load(&paths.scaler, &paths.cost_model, &paths.co2_model)?;

    tracing::info!(
        rows = dataset.len(),
        categories = dataset.categories().len(),
        models = ?models,
        "Loaded artifacts"
    );

    Ok(Engine::new(Arc::new(dataset), Arc::new(encoders), models, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conventional_names() {
        let paths = ArtifactPaths::from_dir("/srv/packwise");
        assert_eq!(paths.reference, PathBuf::from("/srv/packwise/reference.csv"));
        assert_eq!(paths.co2_model, PathBuf::from("/srv/packwise/co2_model.json"));
    }

    #[test]
    fn test_default_rank_config_without_file() {
        assert_eq!(load_rank_config(None).unwrap(), RankConfig::default());
    }

    #[test]
    fn test_sample_artifacts_load() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../data/sample");
        let engine = load_engine(&ArtifactPaths::from_dir(dir), RankConfig::default()).unwrap();
        let result = engine
            .recommend(&packwise_model::RawRequest::new("Electronics", "Cables", 0.5).with_fragile("yes"))
            .unwrap();
        assert!(!result.is_empty());
        assert!(result.len() <= 5);
    }
}
