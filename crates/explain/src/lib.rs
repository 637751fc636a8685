//! Explanation generation for packaging recommendations.
//!
//! Converts a ranked candidate and the signals carried on a result into
//! human-readable explanations suitable for CLI or web display.

use packwise_model::{CatalogScope, RecommendationResult, ScoredCandidate};
use serde::{Deserialize, Serialize};

/// A structured explanation for one aspect of a ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    /// Short summary (1 line)
    pub summary: String,

    /// Detailed explanation (1-2 sentences)
    pub detail: String,

    /// Evidence items supporting this explanation
    pub evidence: Vec<EvidenceItem>,
}

/// A piece of evidence supporting an explanation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Type of evidence
    pub kind: String,

    /// The specific value
    pub value: String,

    /// Optional context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl EvidenceItem {
    fn new(kind: &str, value: impl ToString) -> Self {
        Self {
            kind: kind.to_string(),
            value: value.to_string(),
            context: None,
        }
    }
}

/// Explain how a candidate earned its score.
pub fn explain_candidate(candidate: &ScoredCandidate) -> Vec<Explanation> {
    let material = &candidate.material;
    let mut explanations = vec![Explanation {
        summary: format!("Score {:.2}", candidate.env_score),
        detail: format!(
            "'{}' is predicted to cost {:.2} and emit {:.2} kg CO2, for a base score of {:.2}.",
            material.material_name,
            candidate.predicted_cost,
            candidate.predicted_co2,
            candidate.base_score()
        ),
        evidence: vec![
            EvidenceItem::new("predicted_cost", format!("{:.2}", candidate.predicted_cost)),
            EvidenceItem::new("predicted_co2", format!("{:.2}", candidate.predicted_co2)),
        ],
    }];

    if candidate.is_penalized() {
        explanations.push(Explanation {
            summary: format!("Fragility penalty +{:.1}", candidate.fragility_penalty),
            detail: format!(
                "The product is fragile and '{}' has {} strength, so it is ranked below stronger materials.",
                material.material_name,
                material.strength_label.to_lowercase()
            ),
            evidence: vec![EvidenceItem {
                kind: "strength_code".to_string(),
                value: material.strength_code.to_string(),
                context: Some(material.strength_label.clone()),
            }],
        });
    }

    let (summary, detail) = if candidate.is_biodegradable {
        (
            "Biodegradable",
            format!(
                "Mean biodegradability score of {:.2} is above the threshold.",
                material.mean_biodegradability_score
            ),
        )
    } else {
        (
            "Not biodegradable",
            format!(
                "Mean biodegradability score of {:.2} does not exceed the threshold.",
                material.mean_biodegradability_score
            ),
        )
    };
    explanations.push(Explanation {
        summary: summary.to_string(),
        detail,
        evidence: vec![EvidenceItem::new(
            "biodegradability_score",
            format!("{:.2}", material.mean_biodegradability_score),
        )],
    });

    explanations.push(Explanation {
        summary: format!("{:.0}% recyclable", material.mean_recyclability_pct),
        detail: format!(
            "On average {:.0}% of '{}' packaging is recycled.",
            material.mean_recyclability_pct, material.material_name
        ),
        evidence: vec![EvidenceItem::new(
            "recyclability_pct",
            format!("{:.1}", material.mean_recyclability_pct),
        )],
    });

    explanations
}

/// Caveats that apply to every candidate of a result.
pub fn explain_caveats(result: &RecommendationResult) -> Vec<Explanation> {
    let mut caveats = Vec::new();

    for (field, value, encoded) in [
        ("category", &result.request.category, result.encoding.category),
        ("sub-category", &result.request.sub_category, result.encoding.sub_category),
    ] {
        if encoded.is_fallback() {
            caveats.push(Explanation {
                summary: format!("Unknown {}", field),
                detail: format!(
                    "The {} '{}' was not seen when the models were fitted. \
                     Predictions use a placeholder code and may be less reliable.",
                    field, value
                ),
                evidence: vec![EvidenceItem::new("fallback_code", encoded.code)],
            });
        }
    }

    if result.scope == CatalogScope::FullDataset {
        caveats.push(Explanation {
            summary: "Materials from all categories".to_string(),
            detail: format!(
                "No reference data exists for '{}', so materials used by every category were ranked.",
                result.request.category
            ),
            evidence: vec![],
        });
    }

    caveats
}

/// One-line summary of a candidate.
pub fn summarize_candidate(candidate: &ScoredCandidate) -> String {
    let eco = if candidate.is_biodegradable {
        "BIODEGRADABLE"
    } else {
        "NON-BIODEGRADABLE"
    };
    let mut summary = format!(
        "{}: {} strength, score {:.2}",
        eco, candidate.material.strength_label, candidate.env_score
    );
    if candidate.is_penalized() {
        summary.push_str(&format!(" (includes +{:.1} fragility penalty)", candidate.fragility_penalty));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use packwise_model::{
        CategoryEncoding, EcoPreference, Encoded, MaterialCandidate, RequestInput,
    };

    fn candidate(penalty: f64, biodegradability: f64) -> ScoredCandidate {
        ScoredCandidate {
            material: MaterialCandidate {
                material_name: "Bubble Wrap".to_string(),
                material_code: 0,
                strength_code: 1,
                strength_label: "Low".to_string(),
                mean_biodegradability_score: biodegradability,
                mean_recyclability_pct: 20.0,
            },
            predicted_cost: 5.0,
            predicted_co2: 2.0,
            env_score: 2.9 + penalty,
            is_biodegradable: biodegradability > 0.5,
            fragility_penalty: penalty,
        }
    }

    fn result(encoding: CategoryEncoding, scope: CatalogScope) -> RecommendationResult {
        RecommendationResult {
            request: RequestInput {
                category: "Spaceships".to_string(),
                sub_category: "Rockets".to_string(),
                weight: 1.0,
                is_fragile: false,
                eco_preference: EcoPreference::Both,
            },
            encoding,
            scope,
            candidates: vec![],
        }
    }

    #[test]
    fn test_explain_penalized_candidate() {
        let explanations = explain_candidate(&candidate(10.0, 0.1));
        assert_eq!(explanations.len(), 4);
        assert!(explanations[1].summary.contains("Fragility penalty +10.0"));
        assert!(explanations[1].detail.contains("low strength"));
        assert_eq!(explanations[2].summary, "Not biodegradable");
    }

    #[test]
    fn test_explain_unpenalized_candidate() {
        let explanations = explain_candidate(&candidate(0.0, 0.9));
        assert_eq!(explanations.len(), 3);
        assert!(explanations[0].detail.contains("base score of 2.90"));
        assert_eq!(explanations[1].summary, "Biodegradable");
    }

    #[test]
    fn test_caveats_for_fallback_and_full_dataset() {
        let degraded = result(
            CategoryEncoding {
                category: Encoded::fallback(),
                sub_category: Encoded::exact(3),
            },
            CatalogScope::FullDataset,
        );
        let caveats = explain_caveats(&degraded);
        assert_eq!(caveats.len(), 2);
        assert_eq!(caveats[0].summary, "Unknown category");
        assert!(caveats[1].detail.contains("Spaceships"));

        let clean = result(
            CategoryEncoding {
                category: Encoded::exact(1),
                sub_category: Encoded::exact(3),
            },
            CatalogScope::Category("Spaceships".to_string()),
        );
        assert!(explain_caveats(&clean).is_empty());
    }

    #[test]
    fn test_summary() {
        assert_eq!(
            summarize_candidate(&candidate(10.0, 0.1)),
            "NON-BIODEGRADABLE: Low strength, score 12.90 (includes +10.0 fragility penalty)"
        );
        assert_eq!(
            summarize_candidate(&candidate(0.0, 0.9)),
            "BIODEGRADABLE: Low strength, score 2.90"
        );
    }
}
