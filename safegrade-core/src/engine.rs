//! Grading engine: weighted, penalized 0–100 safety score per profile.
//!
//! Scores run from 0 (perfect) to 4 (worst). The weighted average over
//! scored tests is normalized to a badness fraction, raised to the framework's
//! penalty exponent, and mapped onto a 0–100 safety score where 100 is safest.

use crate::error::GradingError;
use crate::framework::Framework;
use crate::grade::LetterGrade;
use crate::model::{MAX_SCORE, ProfileResult};
use serde::{Deserialize, Serialize};

/// Uncapped score for a profile with at least one scored test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileScore {
    /// Weighted average of scored tests, 0 (perfect) … 4 (worst).
    pub weighted_score: f64,
    /// Safety score after the exponential penalty, 0 … 100 (safest).
    pub penalized_score: f64,
    /// Grade looked up from `penalized_score`, before any override cap.
    pub grade: LetterGrade,
    /// Number of tests that contributed.
    pub scored_tests: usize,
}

/// Result of scoring one profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreOutcome {
    Scored(ProfileScore),
    /// No test in the profile carried a score.
    Ungraded,
}

impl ScoreOutcome {
    pub fn score(&self) -> Option<&ProfileScore> {
        match self {
            ScoreOutcome::Scored(score) => Some(score),
            ScoreOutcome::Ungraded => None,
        }
    }
}

/// Normalize a 0–4 weighted score and apply the penalty exponent, returning
/// the 0–100 safety score.
pub fn penalized_score(weighted_score: f64, exponent: f64) -> f64 {
    let badness = (weighted_score / f64::from(MAX_SCORE)).clamp(0.0, 1.0);
    let penalty = badness.powf(exponent);
    100.0 * (1.0 - penalty)
}

/// Scores profiles against one framework version.
#[derive(Debug, Clone, Copy)]
pub struct GradingEngine<'a> {
    framework: &'a Framework,
}

impl<'a> GradingEngine<'a> {
    pub fn new(framework: &'a Framework) -> Self {
        Self { framework }
    }

    pub fn framework(&self) -> &'a Framework {
        self.framework
    }

    /// Score a profile.
    ///
    /// Every test must reference a category of the framework, scored or not.
    /// Tests without a score are excluded from both numerator and
    /// denominator; a profile with none scored is [`ScoreOutcome::Ungraded`].
    pub fn score(&self, profile: &ProfileResult) -> Result<ScoreOutcome, GradingError> {
        if let Some(test) = profile
            .tests
            .iter()
            .find(|t| !self.framework.has_category(&t.category_id))
        {
            return Err(GradingError::UnknownCategory {
                test_id: test.test_id.clone(),
                category_id: test.category_id.clone(),
            });
        }

        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        let mut scored_tests = 0;

        for (test, score) in profile.scored_tests() {
            let weight = self.framework.weight(&test.category_id).unwrap_or_default();
            weighted_sum += f64::from(score.value()) * weight;
            weight_total += weight;
            scored_tests += 1;
        }

        if scored_tests == 0 || weight_total <= 0.0 {
            tracing::debug!(profile = %profile.profile_id, "No scored tests, profile ungraded");
            return Ok(ScoreOutcome::Ungraded);
        }

        let weighted_score = weighted_sum / weight_total;
        let penalized_score = penalized_score(weighted_score, self.framework.penalty_exponent());
        let grade = self.framework.grade_table().lookup(penalized_score);

        tracing::debug!(
            profile = %profile.profile_id,
            weighted_score,
            penalized_score,
            %grade,
            scored_tests,
            "Scored profile"
        );

        Ok(ScoreOutcome::Scored(ProfileScore {
            weighted_score,
            penalized_score,
            grade,
            scored_tests,
        }))
    }
}
