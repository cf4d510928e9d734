//! Per-profile grading with overrides, and worst-of-profiles platform
//! aggregation.
//!
//! A platform is only as protective as its weakest graded profile, so the
//! platform grade is the worst profile grade, never an average.

use crate::engine::{GradingEngine, ScoreOutcome};
use crate::framework::Framework;
use crate::grade::LetterGrade;
use crate::model::{Diagnostic, DiagnosticKind, PlatformRun, ProfileResult};
use crate::overrides::{OverrideRegistry, OverrideResolver, TriggeredOverride};
use serde::{Deserialize, Serialize};

/// Grading outcome for one profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum GradeOutcome {
    Graded {
        weighted_score: f64,
        penalized_score: f64,
        uncapped_grade: LetterGrade,
        /// Final grade: the worse of `uncapped_grade` and any override cap.
        grade: LetterGrade,
    },
    /// No scored tests; deliberately carries no grade.
    Ungraded,
    /// The profile's data could not be scored.
    Failed { reason: String },
}

/// A profile with its computed grade fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileGrade {
    pub profile_id: String,
    pub profile_type: String,
    pub maturity_setting: Option<String>,
    pub outcome: GradeOutcome,
    pub grade_cap: Option<LetterGrade>,
    pub grade_cap_reasons: Vec<String>,
    pub triggered_overrides: Vec<TriggeredOverride>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ProfileGrade {
    /// Final grade, if the profile was graded.
    pub fn grade(&self) -> Option<LetterGrade> {
        match self.outcome {
            GradeOutcome::Graded { grade, .. } => Some(grade),
            _ => None,
        }
    }

    pub fn is_graded(&self) -> bool {
        matches!(self.outcome, GradeOutcome::Graded { .. })
    }
}

/// An override that fired on at least one profile of a platform run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalFailure {
    pub cfo_id: String,
    pub cap_grade: LetterGrade,
    pub affected_profile_ids: Vec<String>,
}

/// Graded platform run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformResult {
    pub platform_id: String,
    pub framework_version: String,
    pub registry_version: String,
    pub profiles: Vec<ProfileGrade>,
    /// Worst grade among graded profiles; absent when none could be graded.
    pub overall_grade: Option<LetterGrade>,
    pub critical_failures: Vec<CriticalFailure>,
    /// Profiles left out of `overall_grade` (ungraded or failed).
    pub incomplete_profiles: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Worst grade among graded profiles.
pub fn overall_grade(profiles: &[ProfileGrade]) -> Option<LetterGrade> {
    profiles.iter().filter_map(ProfileGrade::grade).max()
}

/// Union of triggered overrides across profiles, in registry order.
pub fn collect_critical_failures(
    registry: &OverrideRegistry,
    profiles: &[ProfileGrade],
) -> Vec<CriticalFailure> {
    registry
        .overrides
        .iter()
        .filter_map(|cfo| {
            let affected: Vec<String> = profiles
                .iter()
                .filter(|p| p.triggered_overrides.iter().any(|t| t.cfo_id == cfo.id))
                .map(|p| p.profile_id.clone())
                .collect();
            (!affected.is_empty()).then(|| CriticalFailure {
                cfo_id: cfo.id.clone(),
                cap_grade: cfo.cap_grade,
                affected_profile_ids: affected,
            })
        })
        .collect()
}

/// Grades profiles and platform runs against one framework version and one
/// override registry.
#[derive(Debug, Clone)]
pub struct Evaluator {
    framework: Framework,
    registry: OverrideRegistry,
}

impl Evaluator {
    pub fn new(framework: Framework, registry: OverrideRegistry) -> Self {
        Self {
            framework,
            registry,
        }
    }

    pub fn framework(&self) -> &Framework {
        &self.framework
    }

    pub fn registry(&self) -> &OverrideRegistry {
        &self.registry
    }

    /// Score a profile, resolve overrides against it, and apply the cap.
    pub fn grade_profile(&self, profile: &ProfileResult) -> ProfileGrade {
        let resolution = OverrideResolver::new(&self.registry, &self.framework).resolve(profile);
        let mut diagnostics = resolution.diagnostics.clone();

        let outcome = match GradingEngine::new(&self.framework).score(profile) {
            Ok(ScoreOutcome::Scored(score)) => GradeOutcome::Graded {
                weighted_score: score.weighted_score,
                penalized_score: score.penalized_score,
                uncapped_grade: score.grade,
                grade: resolution.apply(score.grade),
            },
            Ok(ScoreOutcome::Ungraded) => {
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::UngradedProfile,
                    profile.profile_id.clone(),
                    "profile has no scored tests",
                ));
                GradeOutcome::Ungraded
            }
            Err(e) => {
                tracing::warn!(profile = %profile.profile_id, "Profile could not be graded: {}", e);
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::ProfileFailed,
                    profile.profile_id.clone(),
                    e.to_string(),
                ));
                GradeOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        ProfileGrade {
            profile_id: profile.profile_id.clone(),
            profile_type: profile.profile_type.clone(),
            maturity_setting: profile.maturity_setting.clone(),
            outcome,
            grade_cap: resolution.grade_cap,
            grade_cap_reasons: resolution.reasons(),
            triggered_overrides: resolution.triggered,
            diagnostics,
        }
    }

    /// Grade every profile of a run and aggregate the platform grade.
    pub fn grade_platform(&self, run: &PlatformRun) -> PlatformResult {
        let profiles: Vec<ProfileGrade> =
            run.profiles.iter().map(|p| self.grade_profile(p)).collect();

        let overall_grade = overall_grade(&profiles);
        let critical_failures = collect_critical_failures(&self.registry, &profiles);
        let incomplete_profiles: Vec<String> = profiles
            .iter()
            .filter(|p| !p.is_graded())
            .map(|p| p.profile_id.clone())
            .collect();
        let diagnostics: Vec<Diagnostic> = profiles
            .iter()
            .flat_map(|p| p.diagnostics.iter().cloned())
            .collect();

        tracing::info!(
            platform = %run.platform_id,
            profiles = profiles.len(),
            overall = overall_grade.map_or("ungraded", LetterGrade::as_str),
            critical_failures = critical_failures.len(),
            incomplete = incomplete_profiles.len(),
            "Graded platform run"
        );

        PlatformResult {
            platform_id: run.platform_id.clone(),
            framework_version: self.framework.version().to_string(),
            registry_version: self.registry.version.clone(),
            profiles,
            overall_grade,
            critical_failures,
            incomplete_profiles,
            diagnostics,
        }
    }

    /// Grade runs one after another, preserving input order.
    pub fn grade_batch(&self, runs: &[PlatformRun]) -> Vec<PlatformResult> {
        runs.iter().map(|run| self.grade_platform(run)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::TestCategory;
    use crate::model::TestResult;
    use crate::overrides::{CriticalFailureOverride, ScoreComparison, Trigger};

    fn evaluator(overrides: Vec<CriticalFailureOverride>) -> Evaluator {
        let framework = Framework::new(
            "2024.2",
            vec![
                TestCategory::new("SD", "Sensitive content discovery", 3.0),
                TestCategory::new("PC", "Purchase controls", 1.0),
            ],
        )
        .unwrap();
        Evaluator::new(framework, OverrideRegistry::new("r7", overrides))
    }

    fn profile(id: &str, sd: Option<u8>, pc: Option<u8>) -> ProfileResult {
        ProfileResult::new(id, "kids")
            .with_test(TestResult::new("SD-01", "SD", sd).unwrap())
            .with_test(TestResult::new("PC-01", "PC", pc).unwrap())
    }

    fn sd_fail_cap(cap: LetterGrade) -> CriticalFailureOverride {
        CriticalFailureOverride::new(
            "CFO-SD",
            "Explicit content reachable",
            cap,
            Trigger::CategoryScore {
                category: "SD".into(),
                op: ScoreComparison::AtLeast,
                score: 3,
            },
        )
    }

    #[test]
    fn test_grade_profile_uncapped() {
        let result = evaluator(Vec::new()).grade_profile(&profile("kids-1", Some(0), Some(4)));
        match result.outcome {
            GradeOutcome::Graded {
                uncapped_grade,
                grade,
                ..
            } => {
                assert_eq!(uncapped_grade, LetterGrade::A);
                assert_eq!(grade, LetterGrade::A);
            }
            other => panic!("expected graded outcome, got {other:?}"),
        }
        assert_eq!(result.grade_cap, None);
        assert!(result.grade_cap_reasons.is_empty());
    }

    #[test]
    fn test_grade_profile_capped() {
        let ev = evaluator(vec![sd_fail_cap(LetterGrade::F)]);
        let result = ev.grade_profile(&profile("kids-1", Some(3), Some(0)));
        assert_eq!(result.grade(), Some(LetterGrade::F));
        assert_eq!(result.grade_cap, Some(LetterGrade::F));
        assert_eq!(result.grade_cap_reasons.len(), 1);
    }

    #[test]
    fn test_cap_never_improves_grade() {
        let ev = evaluator(vec![sd_fail_cap(LetterGrade::BPlus)]);
        let result = ev.grade_profile(&profile("kids-1", Some(4), Some(4)));
        assert_eq!(result.grade(), Some(LetterGrade::F));
    }

    #[test]
    fn test_failed_profile_is_reported_not_graded() {
        let ev = evaluator(Vec::new());
        let bad = ProfileResult::new("kids-2", "kids")
            .with_test(TestResult::new("ZZ-01", "ZZ", Some(1)).unwrap());
        let result = ev.grade_profile(&bad);
        assert!(matches!(result.outcome, GradeOutcome::Failed { .. }));
        assert_eq!(result.diagnostics[0].kind, DiagnosticKind::ProfileFailed);
    }

    #[test]
    fn test_platform_worst_of_profiles_and_incomplete() {
        let ev = evaluator(vec![sd_fail_cap(LetterGrade::D)]);
        let run = PlatformRun {
            platform_id: "streamco".into(),
            profiles: vec![
                profile("kids-1", Some(0), Some(0)),
                profile("kids-2", Some(3), Some(0)),
                profile("teen-1", None, None),
                ProfileResult::new("teen-2", "teen")
                    .with_test(TestResult::new("XX-1", "XX", Some(0)).unwrap()),
            ],
        };
        let result = ev.grade_platform(&run);

        assert_eq!(result.overall_grade, Some(LetterGrade::D));
        assert_eq!(result.incomplete_profiles, vec!["teen-1", "teen-2"]);
        assert_eq!(result.framework_version, "2024.2");
        assert_eq!(result.registry_version, "r7");
        assert_eq!(
            result.critical_failures,
            vec![CriticalFailure {
                cfo_id: "CFO-SD".into(),
                cap_grade: LetterGrade::D,
                affected_profile_ids: vec!["kids-2".into()],
            }]
        );
        let kinds: Vec<DiagnosticKind> = result.diagnostics.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![DiagnosticKind::UngradedProfile, DiagnosticKind::ProfileFailed]
        );
    }

    #[test]
    fn test_platform_with_no_graded_profiles_has_no_grade() {
        let ev = evaluator(Vec::new());
        let run = PlatformRun {
            platform_id: "empty".into(),
            profiles: vec![profile("kids-1", None, None)],
        };
        let result = ev.grade_platform(&run);
        assert_eq!(result.overall_grade, None);
        assert_eq!(result.incomplete_profiles, vec!["kids-1"]);
    }

    #[test]
    fn test_ungraded_profile_still_reports_triggered_override() {
        let kids_only = CriticalFailureOverride::new(
            "CFO-KIDS",
            "Kids profile lacks any purchase lock",
            LetterGrade::C,
            Trigger::ProfileType(vec!["kids".into()]),
        );
        let ev = evaluator(vec![kids_only]);
        let run = PlatformRun {
            platform_id: "streamco".into(),
            profiles: vec![profile("kids-1", None, None)],
        };
        let result = ev.grade_platform(&run);
        assert_eq!(result.overall_grade, None);
        assert_eq!(result.profiles[0].outcome, GradeOutcome::Ungraded);
        assert_eq!(result.critical_failures[0].affected_profile_ids, vec!["kids-1"]);
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = GradeOutcome::Graded {
            weighted_score: 1.0,
            penalized_score: 87.5,
            uncapped_grade: LetterGrade::A,
            grade: LetterGrade::D,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "status": "graded",
                "weightedScore": 1.0,
                "penalizedScore": 87.5,
                "uncappedGrade": "A",
                "grade": "D"
            })
        );
    }

    #[test]
    fn test_batch_preserves_order() {
        let ev = evaluator(Vec::new());
        let runs: Vec<PlatformRun> = ["a", "b", "c"]
            .iter()
            .map(|id| PlatformRun {
                platform_id: (*id).into(),
                profiles: vec![profile("p", Some(1), Some(1))],
            })
            .collect();
        let ids: Vec<String> = ev
            .grade_batch(&runs)
            .into_iter()
            .map(|r| r.platform_id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
