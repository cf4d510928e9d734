//! Error types for the grading core.

use thiserror::Error;

/// Top-level Safegrade error.
#[derive(Debug, Error)]
pub enum SafegradeError {
    #[error("framework error: {0}")]
    Framework(#[from] FrameworkError),
    #[error("grading error: {0}")]
    Grading(#[from] GradingError),
    #[error("override error: {0}")]
    Predicate(#[from] PredicateError),
    #[error("capability diff error: {0}")]
    Diff(#[from] DiffError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors raised while loading or validating a framework version
/// (category weights, grade table, penalty exponent).
#[derive(Debug, Error)]
pub enum FrameworkError {
    #[error("framework defines no test categories")]
    NoCategories,
    #[error("test category id must not be empty")]
    EmptyCategoryId,
    #[error("duplicate test category '{0}'")]
    DuplicateCategory(String),
    #[error("category '{category}' has invalid weight {weight} (must be finite and > 0)")]
    InvalidWeight { category: String, weight: f64 },
    #[error("penalty exponent {0} is invalid (must be finite and >= 1)")]
    InvalidPenaltyExponent(f64),
    #[error("grade table is empty")]
    EmptyGradeTable,
    #[error("grade band '{grade}' has minimum {min_score} outside 0..=100")]
    BandOutOfRange { grade: String, min_score: f64 },
    #[error("grade band '{grade}' is not strictly below the previous band")]
    BandNotDescending { grade: String },
    #[error("grade band '{grade}' is out of rank order")]
    BandOutOfOrder { grade: String },
    #[error("grade table does not reach 0 (lowest band starts at {0})")]
    NotExhaustive(f64),
    #[error("framework parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors from scoring a single profile.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GradingError {
    #[error("test '{test_id}' references unknown category '{category_id}'")]
    UnknownCategory {
        test_id: String,
        category_id: String,
    },
    #[error("test '{test_id}' has score {score}, outside 0..=4")]
    ScoreOutOfRange { test_id: String, score: u8 },
}

/// Errors from evaluating a critical failure override trigger.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredicateError {
    #[error("trigger references unknown category '{0}'")]
    UnknownCategory(String),
    #[error("trigger compares against score {0}, outside 0..=4")]
    ScoreOutOfRange(u8),
    #[error("'{0}' combinator has no rules")]
    EmptyCombinator(&'static str),
    #[error("trigger nesting exceeds depth {0}")]
    DepthExceeded(usize),
    #[error("duplicate override id '{0}'")]
    DuplicateOverride(String),
    #[error("override registry parse error: {0}")]
    Parse(String),
}

/// Which side of a capability diff an input came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffSide {
    Findings,
    Registry,
}

impl std::fmt::Display for DiffSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffSide::Findings => write!(f, "findings"),
            DiffSide::Registry => write!(f, "registry"),
        }
    }
}

/// Errors from the capability diff engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DiffError {
    #[error("duplicate rule category '{key}' in {side}")]
    DuplicateKey { side: DiffSide, key: String },
    #[error("finding '{key}' has confidence {confidence} outside 0..=1")]
    InvalidConfidence { key: String, confidence: f64 },
}

/// Errors from loading runner configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("no framework file configured")]
    MissingFramework,
    #[error("failed to read '{path}': {source}")]
    Read {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}
