//! Versioned test framework: category weights, grade table, penalty exponent.
//!
//! A framework version is data, not code. Historical runs are re-scored by
//! loading the framework file they were graded against.

use crate::error::FrameworkError;
use crate::grade::GradeTable;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Exponent applied to the normalized badness fraction.
pub const DEFAULT_PENALTY_EXPONENT: f64 = 1.5;

/// A class of adversarial test and its severity multiplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCategory {
    pub id: String,
    pub label: String,
    pub weight: f64,
}

impl TestCategory {
    pub fn new(id: impl Into<String>, label: impl Into<String>, weight: f64) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            weight,
        }
    }
}

/// On-disk shape of a framework file before validation.
#[derive(Debug, Clone, Deserialize)]
struct FrameworkFile {
    version: String,
    #[serde(default = "default_penalty_exponent")]
    penalty_exponent: f64,
    categories: Vec<TestCategory>,
    #[serde(default)]
    grade_table: GradeTable,
}

fn default_penalty_exponent() -> f64 {
    DEFAULT_PENALTY_EXPONENT
}

/// A validated framework version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Framework {
    version: String,
    penalty_exponent: f64,
    categories: Vec<TestCategory>,
    grade_table: GradeTable,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Framework {
    /// Build a framework with the default grade table and penalty exponent.
    pub fn new(
        version: impl Into<String>,
        categories: Vec<TestCategory>,
    ) -> Result<Self, FrameworkError> {
        Self::with_tables(
            version,
            categories,
            GradeTable::default(),
            DEFAULT_PENALTY_EXPONENT,
        )
    }

    pub fn with_tables(
        version: impl Into<String>,
        categories: Vec<TestCategory>,
        grade_table: GradeTable,
        penalty_exponent: f64,
    ) -> Result<Self, FrameworkError> {
        if categories.is_empty() {
            return Err(FrameworkError::NoCategories);
        }
        if !penalty_exponent.is_finite() || penalty_exponent < 1.0 {
            return Err(FrameworkError::InvalidPenaltyExponent(penalty_exponent));
        }

        let mut index = HashMap::with_capacity(categories.len());
        for (i, category) in categories.iter().enumerate() {
            if category.id.trim().is_empty() {
                return Err(FrameworkError::EmptyCategoryId);
            }
            if !category.weight.is_finite() || category.weight <= 0.0 {
                return Err(FrameworkError::InvalidWeight {
                    category: category.id.clone(),
                    weight: category.weight,
                });
            }
            if index.insert(category.id.clone(), i).is_some() {
                return Err(FrameworkError::DuplicateCategory(category.id.clone()));
            }
        }

        Ok(Self {
            version: version.into(),
            penalty_exponent,
            categories,
            grade_table,
            index,
        })
    }

    /// Parse and validate a framework from TOML.
    pub fn from_toml_str(source: &str) -> Result<Self, FrameworkError> {
        let file: FrameworkFile = toml::from_str(source)?;
        Self::with_tables(
            file.version,
            file.categories,
            file.grade_table,
            file.penalty_exponent,
        )
    }

    /// Load a framework file from disk.
    pub fn load(path: &Path) -> Result<Self, crate::SafegradeError> {
        let source = std::fs::read_to_string(path)?;
        let framework = Self::from_toml_str(&source)?;
        tracing::debug!(
            path = %path.display(),
            version = %framework.version,
            categories = framework.categories.len(),
            "Loaded framework"
        );
        Ok(framework)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn penalty_exponent(&self) -> f64 {
        self.penalty_exponent
    }

    pub fn categories(&self) -> &[TestCategory] {
        &self.categories
    }

    pub fn grade_table(&self) -> &GradeTable {
        &self.grade_table
    }

    pub fn category(&self, id: &str) -> Option<&TestCategory> {
        self.index.get(id).map(|&i| &self.categories[i])
    }

    pub fn weight(&self, id: &str) -> Option<f64> {
        self.category(id).map(|c| c.weight)
    }

    pub fn has_category(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }
}
