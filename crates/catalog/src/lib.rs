//! Reference dataset and candidate catalog.
//!
//! The reference dataset is the engineered table of (category, material)
//! observations. It is loaded once and shared read-only; every request
//! derives its own catalog from it by scoping to the request category and
//! aggregating one entry per material.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use packwise_model::{CatalogScope, MaterialAggregate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading the reference dataset.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to open reference dataset {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Malformed reference dataset: {0}")]
    Csv(#[from] csv::Error),

    #[error("Reference dataset has no rows")]
    Empty,
}

/// One row of the reference dataset.
///
/// Column names follow the engineered CSV export. Empty cells load as `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRow {
    #[serde(rename = "Product Category")]
    pub category: String,

    #[serde(rename = "Packaging material")]
    pub material_name: String,

    #[serde(rename = "Packaging_Material_Encoded", default)]
    pub material_code: Option<i64>,

    #[serde(rename = "Strength_Encoded", default)]
    pub strength_code: Option<i64>,

    #[serde(rename = "Strength", default)]
    pub strength_label: Option<String>,

    #[serde(rename = "Biodegradability score", default)]
    pub biodegradability_score: Option<f64>,

    #[serde(rename = "Recyclability %", default)]
    pub recyclability_pct: Option<f64>,
}

/// Immutable reference dataset.
#[derive(Debug, Clone)]
pub struct ReferenceDataset {
    rows: Vec<ReferenceRow>,
}

impl ReferenceDataset {
    /// Wrap already-parsed rows. An empty table is rejected.
    pub fn from_rows(rows: Vec<ReferenceRow>) -> Result<Self, CatalogError> {
        if rows.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(Self { rows })
    }

    /// Parse CSV with a header row. Unknown columns are ignored.
    ///
    /// Header names are trimmed, cell values are kept verbatim.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, CatalogError> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::Headers).from_reader(reader);
        let rows = csv_reader
            .deserialize::<ReferenceRow>()
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(rows = rows.len(), "Parsed reference dataset");

        Self::from_rows(rows)
    }

    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn rows(&self) -> &[ReferenceRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct categories, sorted.
    pub fn categories(&self) -> Vec<&str> {
        let mut categories: Vec<&str> = self.rows.iter().map(|r| r.category.as_str()).collect();
        categories.sort_unstable();
        categories.dedup();
        categories
    }
}

/// Candidate materials for one request.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub scope: CatalogScope,
    pub materials: Vec<MaterialAggregate>,
}

/// Scope the dataset to `category` and aggregate one entry per material.
///
/// When no row carries the category, the whole dataset is used instead so
/// that the ranking always has candidates. Material order is by name and
/// carries no meaning.
pub fn build_catalog(dataset: &ReferenceDataset, category: &str) -> Catalog {
    let scoped: Vec<&ReferenceRow> = dataset
        .rows
        .iter()
        .filter(|row| row.category == category)
        .collect();

    let (scope, rows) = if scoped.is_empty() {
        tracing::warn!(category, "No reference rows for category, using full dataset");
        (CatalogScope::FullDataset, dataset.rows.iter().collect())
    } else {
        (CatalogScope::Category(category.to_string()), scoped)
    };

    let materials = aggregate_materials(&rows);

    tracing::debug!(
        rows = rows.len(),
        materials = materials.len(),
        scope = ?scope,
        "Built candidate catalog"
    );

    Catalog { scope, materials }
}

#[derive(Default)]
struct Accumulator {
    material_code: Option<i64>,
    strength_code: Option<i64>,
    strength_label: Option<String>,
    biodegradability: Mean,
    recyclability: Mean,
}

/// Running mean over the non-missing values.
#[derive(Default)]
struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    fn push(&mut self, value: Option<f64>) {
        if let Some(value) = value.filter(|v| !v.is_nan()) {
            self.sum += value;
            self.count += 1;
        }
    }

    fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

fn aggregate_materials(rows: &[&ReferenceRow]) -> Vec<MaterialAggregate> {
    let mut groups: BTreeMap<&str, Accumulator> = BTreeMap::new();

    // Rows without a material name never form a candidate
    for row in rows.iter().filter(|row| !row.material_name.is_empty()) {
        let acc = groups.entry(row.material_name.as_str()).or_default();
        // "first" keeps the first non-missing value of the group
        acc.material_code = acc.material_code.or(row.material_code);
        acc.strength_code = acc.strength_code.or(row.strength_code);
        if acc.strength_label.is_none() {
            acc.strength_label = row.strength_label.clone().filter(|s| !s.is_empty());
        }
        acc.biodegradability.push(row.biodegradability_score);
        acc.recyclability.push(row.recyclability_pct);
    }

    groups
        .into_iter()
        .map(|(name, acc)| MaterialAggregate {
            material_name: name.to_string(),
            material_code: acc.material_code,
            strength_code: acc.strength_code,
            strength_label: acc.strength_label,
            mean_biodegradability_score: acc.biodegradability.value(),
            mean_recyclability_pct: acc.recyclability.value(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = "\
Product Category,Packaging material,Packaging_Material_Encoded,Strength_Encoded,Strength,Biodegradability score,Recyclability %
Electronics,Cardboard,1,3,Medium,0.8,70
Electronics,Cardboard,1,3,Medium,0.6,90
Electronics,Bubble Wrap,0,1,Low,0.1,20
Kitchenware,Glass,2,4,High,0.0,100
Kitchenware,Cardboard,1,3,Medium,0.9,80
";

    fn dataset() -> ReferenceDataset {
        ReferenceDataset::from_reader(SAMPLE.as_bytes()).unwrap()
    }

    fn find<'a>(catalog: &'a Catalog, name: &str) -> &'a MaterialAggregate {
        catalog
            .materials
            .iter()
            .find(|m| m.material_name == name)
            .unwrap()
    }

    #[test]
    fn test_load_csv() {
        let data = dataset();
        assert_eq!(data.len(), 5);
        assert_eq!(data.categories(), vec!["Electronics", "Kitchenware"]);
        assert_eq!(data.rows()[2].strength_label.as_deref(), Some("Low"));
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let header = SAMPLE.lines().next().unwrap();
        assert!(matches!(
            ReferenceDataset::from_reader(header.as_bytes()),
            Err(CatalogError::Empty)
        ));
    }

    #[test]
    fn test_scoped_catalog_aggregates_per_material() {
        let catalog = build_catalog(&dataset(), "Electronics");

        assert_eq!(catalog.scope, CatalogScope::Category("Electronics".into()));
        assert_eq!(catalog.materials.len(), 2);

        let cardboard = find(&catalog, "Cardboard");
        assert_eq!(cardboard.material_code, Some(1));
        assert_eq!(cardboard.strength_label.as_deref(), Some("Medium"));
        assert!((cardboard.mean_biodegradability_score.unwrap() - 0.7).abs() < 1e-12);
        assert!((cardboard.mean_recyclability_pct.unwrap() - 80.0).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_category_falls_back_to_full_dataset() {
        let catalog = build_catalog(&dataset(), "Spaceships");

        assert_eq!(catalog.scope, CatalogScope::FullDataset);
        assert_eq!(catalog.materials.len(), 3);

        // Cardboard appears in both categories and is averaged across them
        let cardboard = find(&catalog, "Cardboard");
        assert!((cardboard.mean_biodegradability_score.unwrap() - (0.8 + 0.6 + 0.9) / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_category_match_is_exact() {
        let catalog = build_catalog(&dataset(), "electronics");
        assert_eq!(catalog.scope, CatalogScope::FullDataset);
    }

    #[test]
    fn test_missing_cells_are_skipped() {
        let csv = "\
Product Category,Packaging material,Packaging_Material_Encoded,Strength_Encoded,Strength,Biodegradability score,Recyclability %
Toys,Foam,,,,,
Toys,Foam,5,,Low,0.2,
";
        let data = ReferenceDataset::from_reader(csv.as_bytes()).unwrap();
        let catalog = build_catalog(&data, "Toys");
        let foam = find(&catalog, "Foam");

        assert_eq!(foam.material_code, Some(5));
        assert_eq!(foam.strength_code, None);
        assert_eq!(foam.strength_label.as_deref(), Some("Low"));
        assert_eq!(foam.mean_biodegradability_score, Some(0.2));
        assert_eq!(foam.mean_recyclability_pct, None);
    }

    #[test]
    fn test_blank_material_name_is_not_a_candidate() {
        let csv = "\
Product Category,Packaging material,Packaging_Material_Encoded,Strength_Encoded,Strength,Biodegradability score,Recyclability %
Toys,,9,2,Low,0.5,50
Toys,Paper,4,2,Low,0.9,95
";
        let data = ReferenceDataset::from_reader(csv.as_bytes()).unwrap();
        let catalog = build_catalog(&data, "Toys");

        let names: Vec<_> = catalog.materials.iter().map(|m| m.material_name.as_str()).collect();
        assert_eq!(names, vec!["Paper"]);
    }

    #[test]
    fn test_padded_category_cell_does_not_match() {
        let csv = "\
Product Category,Packaging material,Packaging_Material_Encoded,Strength_Encoded,Strength,Biodegradability score,Recyclability %
 Electronics,Cardboard,1,3,Medium,0.8,70
Toys,Paper,4,2,Low,0.9,95
";
        let data = ReferenceDataset::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(data.categories(), vec![" Electronics", "Toys"]);

        let catalog = build_catalog(&data, "Electronics");
        assert_eq!(catalog.scope, CatalogScope::FullDataset);
        assert_eq!(catalog.materials.len(), 2);
    }
}
