//! Safegrade Core: grading and aggregation for streaming-platform parental
//! control research.
//!
//! The crate turns per-profile adversarial test outcomes into letter grades:
//!
//! - **Grading engine:** weighted, penalized 0-100 safety score per profile
//!   and a grade table lookup
//! - **Critical failure overrides:** declarative trigger rules that cap a
//!   profile's grade regardless of its score
//! - **Platform aggregation:** worst-of-profiles platform grade with the
//!   union of triggered overrides
//! - **Cross-profile alignment:** side-by-side comparison of the same
//!   logical test across profiles
//! - **Capability diff:** research findings vs. the canonical capability
//!   registry

pub mod aggregate;
pub mod aligner;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod framework;
pub mod grade;
pub mod model;
pub mod overrides;

// Re-exports for convenience
pub use aggregate::{CriticalFailure, Evaluator, GradeOutcome, PlatformResult, ProfileGrade};
pub use aligner::{ComparisonView, build_comparison};
pub use config::{SafegradeConfig, load_config};
pub use diff::{CapabilityFinding, RegistryCapability, RegistryDiff, diff_capabilities};
pub use engine::{GradingEngine, ProfileScore, ScoreOutcome};
pub use error::{
    ConfigError, DiffError, FrameworkError, GradingError, PredicateError, SafegradeError,
};
pub use framework::{Framework, TestCategory};
pub use grade::{GradeBand, GradeTable, LetterGrade};
pub use model::{Diagnostic, DiagnosticKind, PlatformRun, ProfileResult, Score, TestResult};
pub use overrides::{CriticalFailureOverride, OverrideRegistry, OverrideResolver, Trigger};
