//! Feature preparation for packaging recommendations.
//!
//! Provides the pure steps between a raw request and the model input:
//! - Input normalization (trimming, title case, weight and flag parsing)
//! - Category encoding against pre-fitted lookup tables
//! - Feature assembly, one row per candidate material

use std::collections::HashMap;
use std::path::Path;

use packwise_model::{
    CategoryEncoding, EcoPreference, Encoded, FeatureMatrix, MaterialAggregate, MaterialCandidate,
    RawRequest, RequestInput, WeightInput, FEATURE_COUNT,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Malformed request fields.
#[derive(Debug, Error, PartialEq)]
pub enum InputError {
    #[error("Weight is not a number: {0:?}")]
    UnparseableWeight(String),
    #[error("Weight must be a positive finite number, got {0}")]
    NonPositiveWeight(f64),
}

/// Reference data could not be turned into a feature row.
#[derive(Debug, Error, PartialEq)]
pub enum FeatureAssemblyError {
    #[error("Material {material:?} has no value for {field}")]
    MissingAggregate {
        material: String,
        field: &'static str,
    },
}

/// Failure to load an encoder artifact.
#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("Failed to read encoder {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse encoder {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Normalize a raw request into the canonical key space.
pub fn normalize_request(raw: &RawRequest) -> Result<RequestInput, InputError> {
    Ok(RequestInput {
        category: title_case(raw.category.trim()),
        sub_category: title_case(raw.sub_category.trim()),
        weight: parse_weight(&raw.weight)?,
        is_fragile: parse_fragile(&raw.is_fragile),
        eco_preference: raw
            .eco_preference
            .as_deref()
            .map(EcoPreference::from)
            .unwrap_or_default(),
    })
}

/// Upper-case the first letter of every word, lower-case the rest.
///
/// A letter starts a word when the previous character is not a letter,
/// so "home & kitchen" becomes "Home & Kitchen" and "3d printers"
/// becomes "3D Printers".
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;

    for c in text.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }

    out
}

/// Parse a weight into a strictly positive, finite number.
pub fn parse_weight(weight: &WeightInput) -> Result<f64, InputError> {
    let value = match weight {
        WeightInput::Number(n) => *n,
        WeightInput::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| InputError::UnparseableWeight(s.clone()))?,
    };

    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(InputError::NonPositiveWeight(value))
    }
}

/// Only a case-insensitive "yes" marks a product fragile.
pub fn parse_fragile(value: &str) -> bool {
    value.eq_ignore_ascii_case("yes")
}

/// A pre-fitted label encoder: the code of a value is its position in the class list.
#[derive(Debug, Clone, Default)]
pub struct LabelEncoder {
    classes: Vec<String>,
    index: HashMap<String, i64>,
}

impl LabelEncoder {
    pub fn new(classes: Vec<String>) -> Self {
        let index = classes
            .iter()
            .enumerate()
            .map(|(i, class)| (class.clone(), i as i64))
            .collect();
        Self { classes, index }
    }

    /// Load an encoder exported as a JSON array of class strings.
    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, EncoderError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| EncoderError::Io {
            path: display.clone(),
            source,
        })?;
        let artifact: EncoderArtifact =
            serde_json::from_str(&text).map_err(|source| EncoderError::Parse {
                path: display,
                source,
            })?;
        Ok(Self::new(artifact.into_classes()))
    }

    /// Encode a value, falling back to code 0 when it was never fitted.
    pub fn encode(&self, value: &str) -> Encoded {
        self.index
            .get(value)
            .map(|&code| Encoded::exact(code))
            .unwrap_or_else(Encoded::fallback)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

/// Accepted on-disk shapes of an encoder artifact.
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
enum EncoderArtifact {
    Plain(Vec<String>),
    Wrapped { classes: Vec<String> },
}

impl EncoderArtifact {
    fn into_classes(self) -> Vec<String> {
        match self {
            Self::Plain(classes) | Self::Wrapped { classes } => classes,
        }
    }
}

/// The two independent encoders used by a request.
#[derive(Debug, Clone, Default)]
pub struct CategoryEncoders {
    pub category: LabelEncoder,
    pub sub_category: LabelEncoder,
}

impl CategoryEncoders {
    pub fn new(category: LabelEncoder, sub_category: LabelEncoder) -> Self {
        Self {
            category,
            sub_category,
        }
    }

    /// Encode both fields; each falls back on its own.
    pub fn encode(&self, request: &RequestInput) -> CategoryEncoding {
        let encoding = CategoryEncoding {
            category: self.category.encode(&request.category),
            sub_category: self.sub_category.encode(&request.sub_category),
        };

        if encoding.category.is_fallback() {
            tracing::warn!(category = %request.category, "Unknown category, using fallback code 0");
        }
        if encoding.sub_category.is_fallback() {
            tracing::warn!(sub_category = %request.sub_category, "Unknown sub-category, using fallback code 0");
        }

        encoding
    }
}

/// Complete candidates and their model input, row-aligned.
#[derive(Debug, Clone)]
pub struct AssembledFeatures {
    pub candidates: Vec<MaterialCandidate>,
    pub matrix: FeatureMatrix,
}

/// Build one feature row per material.
///
/// Row layout: category code, material code, strength code, mean
/// biodegradability, mean recyclability, weight.
pub fn assemble_features(
    request: &RequestInput,
    category_code: i64,
    materials: &[MaterialAggregate],
) -> Result<AssembledFeatures, FeatureAssemblyError> {
    let mut candidates = Vec::with_capacity(materials.len());
    let mut rows: Vec<[f64; FEATURE_COUNT]> = Vec::with_capacity(materials.len());

    for aggregate in materials {
        let candidate = complete_candidate(aggregate)?;
        rows.push([
            category_code as f64,
            candidate.material_code as f64,
            candidate.strength_code as f64,
            candidate.mean_biodegradability_score,
            candidate.mean_recyclability_pct,
            request.weight,
        ]);
        candidates.push(candidate);
    }

    // Every row is FEATURE_COUNT wide, so from_rows cannot reject it
    let matrix = FeatureMatrix::from_rows(&rows).unwrap_or_default();

    Ok(AssembledFeatures { candidates, matrix })
}

fn complete_candidate(aggregate: &MaterialAggregate) -> Result<MaterialCandidate, FeatureAssemblyError> {
    let missing = |field: &'static str| FeatureAssemblyError::MissingAggregate {
        material: aggregate.material_name.clone(),
        field,
    };

    Ok(MaterialCandidate {
        material_name: aggregate.material_name.clone(),
        material_code: aggregate.material_code.ok_or_else(|| missing("material_code"))?,
        strength_code: aggregate.strength_code.ok_or_else(|| missing("strength_code"))?,
        strength_label: aggregate
            .strength_label
            .clone()
            .ok_or_else(|| missing("strength_label"))?,
        mean_biodegradability_score: aggregate
            .mean_biodegradability_score
            .ok_or_else(|| missing("biodegradability_score"))?,
        mean_recyclability_pct: aggregate
            .mean_recyclability_pct
            .ok_or_else(|| missing("recyclability_pct"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use packwise_model::EncodingConfidence;
    use pretty_assertions::assert_eq;

    fn aggregate(name: &str, strength: Option<i64>) -> MaterialAggregate {
        MaterialAggregate {
            material_name: name.to_string(),
            material_code: Some(4),
            strength_code: strength,
            strength_label: Some("High".to_string()),
            mean_biodegradability_score: Some(0.75),
            mean_recyclability_pct: Some(60.0),
        }
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("electronics"), "Electronics");
        assert_eq!(title_case("HOME & KITCHEN"), "Home & Kitchen");
        assert_eq!(title_case("usb-c cables"), "Usb-C Cables");
        assert_eq!(title_case("3d printers"), "3D Printers");
    }

    #[test]
    fn test_normalize_request() {
        let raw = RawRequest::new("  electronics ", "cables", "0.5")
            .with_fragile("YES")
            .with_eco_preference("both");
        let input = normalize_request(&raw).unwrap();

        assert_eq!(
            input,
            RequestInput {
                category: "Electronics".into(),
                sub_category: "Cables".into(),
                weight: 0.5,
                is_fragile: true,
                eco_preference: EcoPreference::Both,
            }
        );
    }

    #[test]
    fn test_fragile_flag() {
        assert!(parse_fragile("yes"));
        assert!(parse_fragile("Yes"));
        assert!(!parse_fragile("no"));
        assert!(!parse_fragile("true"));
        assert!(!parse_fragile(""));
    }

    #[test]
    fn test_padded_fragile_flag_is_not_fragile() {
        assert!(!parse_fragile(" yes "));
        assert!(!parse_fragile("yes\n"));
    }

    #[test]
    fn test_weight_rejects_malformed_values() {
        assert_eq!(parse_weight(&WeightInput::Text(" 2.5 ".into())), Ok(2.5));
        assert_eq!(parse_weight(&WeightInput::Number(1.0)), Ok(1.0));
        assert!(matches!(
            parse_weight(&WeightInput::Text("heavy".into())),
            Err(InputError::UnparseableWeight(_))
        ));
        assert!(matches!(
            parse_weight(&WeightInput::Number(0.0)),
            Err(InputError::NonPositiveWeight(_))
        ));
        assert!(matches!(
            parse_weight(&WeightInput::Text("-3".into())),
            Err(InputError::NonPositiveWeight(_))
        ));
        assert!(parse_weight(&WeightInput::Text("NaN".into())).is_err());
        assert!(parse_weight(&WeightInput::Text("inf".into())).is_err());
    }

    #[test]
    fn test_label_encoder_fallback() {
        let encoder = LabelEncoder::new(vec!["Books".into(), "Electronics".into(), "Toys".into()]);
        assert_eq!(encoder.encode("Electronics"), Encoded::exact(1));
        let unknown = encoder.encode("Spaceships");
        assert_eq!(unknown.code, 0);
        assert_eq!(unknown.confidence, EncodingConfidence::Fallback);
    }

    #[test]
    fn test_encoders_fall_back_independently() {
        let encoders = CategoryEncoders::new(
            LabelEncoder::new(vec!["Electronics".into()]),
            LabelEncoder::new(vec!["Cables".into(), "Phones".into()]),
        );
        let request = normalize_request(&RawRequest::new("gadgets", "phones", 1.0)).unwrap();
        let encoding = encoders.encode(&request);

        assert!(encoding.category.is_fallback());
        assert_eq!(encoding.sub_category, Encoded::exact(1));
        assert!(encoding.is_degraded());
    }

    #[test]
    fn test_encoder_artifact_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plain.json");
        std::fs::write(&plain, r#"["A", "B"]"#).unwrap();
        let wrapped = dir.path().join("wrapped.json");
        std::fs::write(&wrapped, r#"{"classes": ["X", "Y", "Z"]}"#).unwrap();

        assert_eq!(LabelEncoder::from_json_path(&plain).unwrap().classes().len(), 2);
        assert_eq!(LabelEncoder::from_json_path(&wrapped).unwrap().encode("Z").code, 2);
        assert!(LabelEncoder::from_json_path(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_assemble_feature_order() {
        let request = normalize_request(&RawRequest::new("Toys", "Puzzles", 2.0)).unwrap();
        let assembled =
            assemble_features(&request, 7, &[aggregate("Paper", Some(3)), aggregate("Foam", Some(1))])
                .unwrap();

        assert_eq!(assembled.candidates.len(), 2);
        assert_eq!(assembled.matrix.nrows(), 2);
        assert_eq!(assembled.matrix.row(0), &[7.0, 4.0, 3.0, 0.75, 60.0, 2.0]);
        assert_eq!(assembled.matrix.row(1)[2], 1.0);
        assert_eq!(assembled.matrix.row(1)[0], 7.0);
        assert_eq!(assembled.matrix.row(1)[5], 2.0);
    }

    #[test]
    fn test_assemble_rejects_missing_aggregate() {
        let request = normalize_request(&RawRequest::new("Toys", "Puzzles", 2.0)).unwrap();
        let err = assemble_features(&request, 0, &[aggregate("Paper", Some(3)), aggregate("Foam", None)])
            .unwrap_err();

        assert_eq!(
            err,
            FeatureAssemblyError::MissingAggregate {
                material: "Foam".into(),
                field: "strength_code",
            }
        );
    }
}
