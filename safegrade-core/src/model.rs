//! Input records produced by the research automation, and the diagnostics
//! attached to graded output.

use crate::error::GradingError;
use serde::{Deserialize, Serialize};

/// Highest (worst) score a single test can record.
pub const MAX_SCORE: u8 = 4;

/// A recorded test outcome on the 0 (perfect) … 4 (worst) scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Score(u8);

impl Score {
    pub const MIN: Score = Score(0);
    pub const MAX: Score = Score(MAX_SCORE);

    pub fn new(value: u8) -> Option<Self> {
        (value <= MAX_SCORE).then_some(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Score {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Score::new(value).ok_or_else(|| format!("score {value} is outside 0..={MAX_SCORE}"))
    }
}

impl From<Score> for u8 {
    fn from(score: Score) -> Self {
        score.0
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of one adversarial test against one profile.
///
/// `score: None` means the test was not executed or not applicable. It is
/// excluded from scoring entirely, never treated as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub test_id: String,
    pub category_id: String,
    pub score: Option<Score>,
    #[serde(default)]
    pub evidence_refs: Vec<String>,
}

impl TestResult {
    /// Build a test result. A score outside 0..=4 is an error, never
    /// coerced to "not executed".
    pub fn new(
        test_id: impl Into<String>,
        category_id: impl Into<String>,
        score: Option<u8>,
    ) -> Result<Self, GradingError> {
        let test_id = test_id.into();
        let score = match score {
            Some(value) => Some(
                Score::new(value).ok_or_else(|| GradingError::ScoreOutOfRange {
                    test_id: test_id.clone(),
                    score: value,
                })?,
            ),
            None => None,
        };
        Ok(Self {
            test_id,
            category_id: category_id.into(),
            score,
            evidence_refs: Vec::new(),
        })
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence_refs.push(evidence.into());
        self
    }

    pub fn is_scored(&self) -> bool {
        self.score.is_some()
    }
}

/// All test outcomes recorded for one account profile in one platform run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResult {
    pub profile_id: String,
    pub profile_type: String,
    #[serde(default)]
    pub maturity_setting: Option<String>,
    #[serde(default)]
    pub tests: Vec<TestResult>,
}

impl ProfileResult {
    pub fn new(profile_id: impl Into<String>, profile_type: impl Into<String>) -> Self {
        Self {
            profile_id: profile_id.into(),
            profile_type: profile_type.into(),
            maturity_setting: None,
            tests: Vec::new(),
        }
    }

    pub fn with_maturity(mut self, setting: impl Into<String>) -> Self {
        self.maturity_setting = Some(setting.into());
        self
    }

    pub fn with_test(mut self, test: TestResult) -> Self {
        self.tests.push(test);
        self
    }

    /// Tests with a recorded score.
    pub fn scored_tests(&self) -> impl Iterator<Item = (&TestResult, Score)> {
        self.tests
            .iter()
            .filter_map(|test| test.score.map(|score| (test, score)))
    }

    pub fn has_scored_tests(&self) -> bool {
        self.tests.iter().any(TestResult::is_scored)
    }
}

/// The structured bundle handed over for one completed platform run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformRun {
    pub platform_id: String,
    #[serde(default)]
    pub profiles: Vec<ProfileResult>,
}

/// Kind of a recoverable problem surfaced alongside graded output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiagnosticKind {
    /// A profile had no scored tests and was left ungraded.
    UngradedProfile,
    /// A profile could not be scored (e.g. unknown category).
    ProfileFailed,
    /// An override trigger could not be evaluated and was skipped.
    OverrideEvaluationFailed,
    /// A cross-profile alignment matched more than one candidate test.
    AmbiguousAlignment,
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticKind::UngradedProfile => write!(f, "ungraded profile"),
            DiagnosticKind::ProfileFailed => write!(f, "profile failed"),
            DiagnosticKind::OverrideEvaluationFailed => write!(f, "override evaluation failed"),
            DiagnosticKind::AmbiguousAlignment => write!(f, "ambiguous alignment"),
        }
    }
}

/// A recoverable problem reported in the output envelope instead of aborting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// What the diagnostic is about (profile id, override id, row key).
    pub subject: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        kind: DiagnosticKind,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            subject: subject.into(),
            message: message.into(),
        }
    }
}
