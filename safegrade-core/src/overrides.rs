//! Critical failure overrides: declarative rules that cap a profile's grade.
//!
//! Each override pairs a trigger (a small boolean rule tree evaluated over a
//! profile's tests) with a cap grade. One generic resolver loop evaluates the
//! whole registry against every profile; adding an override never needs new
//! code. A trigger that cannot be evaluated is skipped and reported, it never
//! aborts grading.

use crate::error::PredicateError;
use crate::framework::Framework;
use crate::grade::LetterGrade;
use crate::model::{Diagnostic, DiagnosticKind, MAX_SCORE, ProfileResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Maximum nesting of combinators in a trigger.
pub const MAX_TRIGGER_DEPTH: usize = 16;

/// How a category score is compared against the rule's threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreComparison {
    #[default]
    Eq,
    AtLeast,
    AtMost,
}

impl ScoreComparison {
    fn matches(self, actual: u8, expected: u8) -> bool {
        match self {
            ScoreComparison::Eq => actual == expected,
            ScoreComparison::AtLeast => actual >= expected,
            ScoreComparison::AtMost => actual <= expected,
        }
    }
}

/// Declarative trigger predicate over a profile's tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Any scored test in `category` whose score satisfies `op score`.
    CategoryScore {
        category: String,
        #[serde(default)]
        op: ScoreComparison,
        score: u8,
    },
    /// At least `count` scored tests with a score of `min_score` or worse.
    FailuresAtLeast { min_score: u8, count: usize },
    /// Profile type is one of the listed values (case-insensitive).
    ProfileType(Vec<String>),
    /// Maturity setting is one of the listed values (case-insensitive).
    MaturitySetting(Vec<String>),
    AllOf(Vec<Trigger>),
    AnyOf(Vec<Trigger>),
    Not(Box<Trigger>),
}

/// Outcome of evaluating a trigger: whether it fired and which tests matched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerMatch {
    pub triggered: bool,
    pub matched_tests: Vec<String>,
}

impl TriggerMatch {
    fn fired(matched_tests: Vec<String>) -> Self {
        Self {
            triggered: true,
            matched_tests,
        }
    }

    fn from_bool(triggered: bool) -> Self {
        Self {
            triggered,
            matched_tests: Vec::new(),
        }
    }
}

impl Trigger {
    /// Evaluate this trigger against a profile.
    pub fn evaluate(
        &self,
        profile: &ProfileResult,
        framework: &Framework,
    ) -> Result<TriggerMatch, PredicateError> {
        self.evaluate_at(profile, framework, 0)
    }

    fn evaluate_at(
        &self,
        profile: &ProfileResult,
        framework: &Framework,
        depth: usize,
    ) -> Result<TriggerMatch, PredicateError> {
        if depth > MAX_TRIGGER_DEPTH {
            return Err(PredicateError::DepthExceeded(MAX_TRIGGER_DEPTH));
        }

        // Combinators never short-circuit: a malformed branch must surface
        // regardless of where it sits in the tree.
        match self {
            Trigger::CategoryScore {
                category,
                op,
                score,
            } => {
                if !framework.has_category(category) {
                    return Err(PredicateError::UnknownCategory(category.clone()));
                }
                check_score(*score)?;
                let matched: Vec<String> = profile
                    .scored_tests()
                    .filter(|(t, s)| &t.category_id == category && op.matches(s.value(), *score))
                    .map(|(t, _)| t.test_id.clone())
                    .collect();
                Ok(if matched.is_empty() {
                    TriggerMatch::default()
                } else {
                    TriggerMatch::fired(matched)
                })
            }
            Trigger::FailuresAtLeast { min_score, count } => {
                check_score(*min_score)?;
                let matched: Vec<String> = profile
                    .scored_tests()
                    .filter(|(_, s)| s.value() >= *min_score)
                    .map(|(t, _)| t.test_id.clone())
                    .collect();
                Ok(if *count > 0 && matched.len() >= *count {
                    TriggerMatch::fired(matched)
                } else {
                    TriggerMatch::default()
                })
            }
            Trigger::ProfileType(types) => Ok(TriggerMatch::from_bool(
                types
                    .iter()
                    .any(|t| t.trim().eq_ignore_ascii_case(profile.profile_type.trim())),
            )),
            Trigger::MaturitySetting(settings) => {
                let hit = profile.maturity_setting.as_deref().is_some_and(|m| {
                    settings
                        .iter()
                        .any(|s| s.trim().eq_ignore_ascii_case(m.trim()))
                });
                Ok(TriggerMatch::from_bool(hit))
            }
            Trigger::AllOf(rules) => {
                if rules.is_empty() {
                    return Err(PredicateError::EmptyCombinator("all_of"));
                }
                let mut matched = Vec::new();
                let mut all = true;
                for rule in rules {
                    let result = rule.evaluate_at(profile, framework, depth + 1)?;
                    if result.triggered {
                        merge_tests(&mut matched, result.matched_tests);
                    } else {
                        all = false;
                    }
                }
                Ok(if all {
                    TriggerMatch::fired(matched)
                } else {
                    TriggerMatch::default()
                })
            }
            Trigger::AnyOf(rules) => {
                if rules.is_empty() {
                    return Err(PredicateError::EmptyCombinator("any_of"));
                }
                let mut matched = Vec::new();
                let mut triggered = false;
                for rule in rules {
                    let result = rule.evaluate_at(profile, framework, depth + 1)?;
                    if result.triggered {
                        triggered = true;
                        merge_tests(&mut matched, result.matched_tests);
                    }
                }
                Ok(TriggerMatch {
                    triggered,
                    matched_tests: matched,
                })
            }
            Trigger::Not(rule) => {
                let result = rule.evaluate_at(profile, framework, depth + 1)?;
                Ok(TriggerMatch::from_bool(!result.triggered))
            }
        }
    }
}

fn check_score(score: u8) -> Result<(), PredicateError> {
    if score > MAX_SCORE {
        Err(PredicateError::ScoreOutOfRange(score))
    } else {
        Ok(())
    }
}

fn merge_tests(into: &mut Vec<String>, from: Vec<String>) {
    for test in from {
        if !into.contains(&test) {
            into.push(test);
        }
    }
}

/// A critical failure override: when `trigger` fires, the profile's grade is
/// capped at `cap_grade`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalFailureOverride {
    pub id: String,
    pub description: String,
    pub cap_grade: LetterGrade,
    pub trigger: Trigger,
}

impl CriticalFailureOverride {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        cap_grade: LetterGrade,
        trigger: Trigger,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            cap_grade,
            trigger,
        }
    }

    fn reason(&self, matched_tests: &[String]) -> String {
        if matched_tests.is_empty() {
            format!("{}: {} (cap {})", self.id, self.description, self.cap_grade)
        } else {
            format!(
                "{}: {} (cap {}; tests: {})",
                self.id,
                self.description,
                self.cap_grade,
                matched_tests.join(", ")
            )
        }
    }
}

/// A versioned set of overrides evaluated against every profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverrideRegistry {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub overrides: Vec<CriticalFailureOverride>,
}

impl OverrideRegistry {
    pub fn new(version: impl Into<String>, overrides: Vec<CriticalFailureOverride>) -> Self {
        Self {
            version: version.into(),
            overrides,
        }
    }

    /// Parse a registry from TOML, rejecting duplicate override ids.
    pub fn from_toml_str(source: &str) -> Result<Self, PredicateError> {
        let registry: Self =
            toml::from_str(source).map_err(|e| PredicateError::Parse(e.to_string()))?;
        let mut seen = HashSet::new();
        for cfo in &registry.overrides {
            if !seen.insert(cfo.id.as_str()) {
                return Err(PredicateError::DuplicateOverride(cfo.id.clone()));
            }
        }
        Ok(registry)
    }

    pub fn load(path: &Path) -> Result<Self, crate::SafegradeError> {
        let source = std::fs::read_to_string(path)?;
        let registry = Self::from_toml_str(&source)?;
        tracing::debug!(
            path = %path.display(),
            version = %registry.version,
            overrides = registry.overrides.len(),
            "Loaded override registry"
        );
        Ok(registry)
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

/// An override that fired for a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggeredOverride {
    pub cfo_id: String,
    pub cap_grade: LetterGrade,
    pub reason: String,
}

/// Result of resolving the registry against one profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideResolution {
    /// Worst cap among triggered overrides, if any fired.
    pub grade_cap: Option<LetterGrade>,
    /// Every triggered override, in registry order.
    pub triggered: Vec<TriggeredOverride>,
    /// Overrides that could not be evaluated.
    pub diagnostics: Vec<Diagnostic>,
}

impl OverrideResolution {
    /// Human-readable reasons for all triggered overrides, not just the worst.
    pub fn reasons(&self) -> Vec<String> {
        self.triggered.iter().map(|t| t.reason.clone()).collect()
    }

    /// Apply the cap to an uncapped grade. Capping only ever degrades.
    pub fn apply(&self, grade: LetterGrade) -> LetterGrade {
        apply_cap(grade, self.grade_cap)
    }
}

/// The worse of `grade` and `cap`, compared by rank.
pub fn apply_cap(grade: LetterGrade, cap: Option<LetterGrade>) -> LetterGrade {
    cap.map_or(grade, |cap| grade.worse_of(cap))
}

/// Evaluates an override registry against profiles.
#[derive(Debug, Clone, Copy)]
pub struct OverrideResolver<'a> {
    registry: &'a OverrideRegistry,
    framework: &'a Framework,
}

impl<'a> OverrideResolver<'a> {
    pub fn new(registry: &'a OverrideRegistry, framework: &'a Framework) -> Self {
        Self {
            registry,
            framework,
        }
    }

    pub fn resolve(&self, profile: &ProfileResult) -> OverrideResolution {
        let mut resolution = OverrideResolution::default();

        for cfo in &self.registry.overrides {
            match cfo.trigger.evaluate(profile, self.framework) {
                Ok(result) if result.triggered => {
                    tracing::debug!(
                        profile = %profile.profile_id,
                        cfo = %cfo.id,
                        cap = %cfo.cap_grade,
                        "Critical failure override triggered"
                    );
                    resolution.grade_cap = Some(apply_cap(cfo.cap_grade, resolution.grade_cap));
                    resolution.triggered.push(TriggeredOverride {
                        cfo_id: cfo.id.clone(),
                        cap_grade: cfo.cap_grade,
                        reason: cfo.reason(&result.matched_tests),
                    });
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        profile = %profile.profile_id,
                        cfo = %cfo.id,
                        "Override evaluation failed: {}",
                        e
                    );
                    resolution.diagnostics.push(Diagnostic::new(
                        DiagnosticKind::OverrideEvaluationFailed,
                        cfo.id.clone(),
                        format!(
                            "override evaluation failed for profile '{}': {e}",
                            profile.profile_id
                        ),
                    ));
                }
            }
        }

        resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::TestCategory;
    use crate::model::TestResult;

    fn framework() -> Framework {
        Framework::new(
            "test",
            vec![
                TestCategory::new("SD", "Sensitive content discovery", 3.0),
                TestCategory::new("PC", "Purchase controls", 1.0),
                TestCategory::new("AU", "Authentication gate", 2.0),
            ],
        )
        .unwrap()
    }

    fn kids_profile() -> ProfileResult {
        ProfileResult::new("kids-1", "Kids")
            .with_maturity("TV-Y7")
            .with_test(TestResult::new("SD-01", "SD", Some(4)).unwrap())
            .with_test(TestResult::new("PC-01", "PC", Some(1)).unwrap())
            .with_test(TestResult::new("AU-01", "AU", Some(3)).unwrap())
    }

    fn explicit_content_on_kids() -> CriticalFailureOverride {
        CriticalFailureOverride::new(
            "CFO-1",
            "Restricted profile reached explicit content",
            LetterGrade::D,
            Trigger::AllOf(vec![
                Trigger::CategoryScore {
                    category: "SD".into(),
                    op: ScoreComparison::Eq,
                    score: 4,
                },
                Trigger::ProfileType(vec!["kids".into()]),
            ]),
        )
    }

    #[test]
    fn test_category_score_reports_matched_tests() {
        let fw = framework();
        let trigger = Trigger::CategoryScore {
            category: "SD".into(),
            op: ScoreComparison::AtLeast,
            score: 3,
        };
        let result = trigger.evaluate(&kids_profile(), &fw).unwrap();
        assert!(result.triggered);
        assert_eq!(result.matched_tests, vec!["SD-01".to_string()]);
    }

    #[test]
    fn test_null_scores_never_match() {
        let fw = framework();
        let profile = ProfileResult::new("kids-1", "kids")
            .with_test(TestResult::new("SD-01", "SD", None).unwrap());
        let trigger = Trigger::CategoryScore {
            category: "SD".into(),
            op: ScoreComparison::AtMost,
            score: 4,
        };
        assert!(!trigger.evaluate(&profile, &fw).unwrap().triggered);
    }

    #[test]
    fn test_failures_at_least() {
        let fw = framework();
        let trigger = Trigger::FailuresAtLeast {
            min_score: 3,
            count: 2,
        };
        let result = trigger.evaluate(&kids_profile(), &fw).unwrap();
        assert!(result.triggered);
        assert_eq!(result.matched_tests, vec!["SD-01".to_string(), "AU-01".to_string()]);

        let stricter = Trigger::FailuresAtLeast {
            min_score: 3,
            count: 3,
        };
        assert!(!stricter.evaluate(&kids_profile(), &fw).unwrap().triggered);
    }

    #[test]
    fn test_combinators() {
        let fw = framework();
        let profile = kids_profile();
        let teen = Trigger::ProfileType(vec!["teen".into()]);
        let kids = Trigger::ProfileType(vec!["KIDS".into()]);

        assert!(Trigger::AnyOf(vec![teen.clone(), kids.clone()])
            .evaluate(&profile, &fw)
            .unwrap()
            .triggered);
        assert!(!Trigger::AllOf(vec![teen.clone(), kids.clone()])
            .evaluate(&profile, &fw)
            .unwrap()
            .triggered);
        assert!(Trigger::Not(Box::new(teen)).evaluate(&profile, &fw).unwrap().triggered);
        assert!(Trigger::MaturitySetting(vec!["tv-y7".into()])
            .evaluate(&profile, &fw)
            .unwrap()
            .triggered);
    }

    #[test]
    fn test_malformed_triggers_are_errors() {
        let fw = framework();
        let profile = kids_profile();

        let unknown = Trigger::CategoryScore {
            category: "ZZ".into(),
            op: ScoreComparison::Eq,
            score: 4,
        };
        assert_eq!(
            unknown.evaluate(&profile, &fw),
            Err(PredicateError::UnknownCategory("ZZ".into()))
        );

        let out_of_range = Trigger::FailuresAtLeast {
            min_score: 9,
            count: 1,
        };
        assert_eq!(
            out_of_range.evaluate(&profile, &fw),
            Err(PredicateError::ScoreOutOfRange(9))
        );

        assert_eq!(
            Trigger::AnyOf(Vec::new()).evaluate(&profile, &fw),
            Err(PredicateError::EmptyCombinator("any_of"))
        );
    }

    #[test]
    fn test_runaway_nesting_is_bounded() {
        let fw = framework();
        let mut trigger = Trigger::ProfileType(vec!["kids".into()]);
        for _ in 0..(MAX_TRIGGER_DEPTH + 4) {
            trigger = Trigger::Not(Box::new(trigger));
        }
        assert_eq!(
            trigger.evaluate(&kids_profile(), &fw),
            Err(PredicateError::DepthExceeded(MAX_TRIGGER_DEPTH))
        );
    }

    #[test]
    fn test_resolver_keeps_worst_cap_and_all_reasons() {
        let fw = framework();
        let registry = OverrideRegistry::new(
            "r1",
            vec![
                CriticalFailureOverride::new(
                    "CFO-2",
                    "Purchases possible without approval",
                    LetterGrade::C,
                    Trigger::CategoryScore {
                        category: "PC".into(),
                        op: ScoreComparison::AtLeast,
                        score: 1,
                    },
                ),
                explicit_content_on_kids(),
            ],
        );
        let resolution = OverrideResolver::new(&registry, &fw).resolve(&kids_profile());

        assert_eq!(resolution.grade_cap, Some(LetterGrade::D));
        assert_eq!(resolution.triggered.len(), 2);
        let reasons = resolution.reasons();
        assert!(reasons[0].starts_with("CFO-2"));
        assert!(reasons[1].contains("SD-01"));
        assert!(resolution.diagnostics.is_empty());
    }

    #[test]
    fn test_failing_override_is_skipped_and_reported() {
        let fw = framework();
        let registry = OverrideRegistry::new(
            "r1",
            vec![
                CriticalFailureOverride::new(
                    "CFO-BROKEN",
                    "References a retired category",
                    LetterGrade::F,
                    Trigger::CategoryScore {
                        category: "LEGACY".into(),
                        op: ScoreComparison::Eq,
                        score: 4,
                    },
                ),
                explicit_content_on_kids(),
            ],
        );
        let resolution = OverrideResolver::new(&registry, &fw).resolve(&kids_profile());

        assert_eq!(resolution.grade_cap, Some(LetterGrade::D));
        assert_eq!(resolution.triggered.len(), 1);
        assert_eq!(resolution.diagnostics.len(), 1);
        assert_eq!(
            resolution.diagnostics[0].kind,
            DiagnosticKind::OverrideEvaluationFailed
        );
        assert_eq!(resolution.diagnostics[0].subject, "CFO-BROKEN");
    }

    #[test]
    fn test_cap_only_degrades() {
        assert_eq!(apply_cap(LetterGrade::A, Some(LetterGrade::D)), LetterGrade::D);
        assert_eq!(apply_cap(LetterGrade::F, Some(LetterGrade::D)), LetterGrade::F);
        assert_eq!(apply_cap(LetterGrade::B, None), LetterGrade::B);
    }

    #[test]
    fn test_registry_from_toml() {
        let source = r#"
version = "2024-11"

[[overrides]]
id = "CFO-1"
description = "Restricted profile reached explicit content without a PIN prompt"
cap_grade = "D"

[overrides.trigger]
all_of = [
    { category_score = { category = "SD", op = "eq", score = 4 } },
    { category_score = { category = "AU", op = "at_least", score = 3 } },
    { profile_type = ["kids", "child"] },
]

[[overrides]]
id = "CFO-2"
description = "Several moderate failures"
cap_grade = "C-"
trigger = { failures_at_least = { min_score = 2, count = 3 } }
"#;
        let registry = OverrideRegistry::from_toml_str(source).unwrap();
        assert_eq!(registry.version, "2024-11");
        assert_eq!(registry.overrides.len(), 2);
        assert_eq!(registry.overrides[1].cap_grade, LetterGrade::CMinus);

        let fw = framework();
        let resolution = OverrideResolver::new(&registry, &fw).resolve(&kids_profile());
        assert_eq!(resolution.grade_cap, Some(LetterGrade::D));
        assert_eq!(resolution.triggered[0].cfo_id, "CFO-1");
    }

    #[test]
    fn test_registry_rejects_duplicate_ids() {
        let source = r#"
[[overrides]]
id = "CFO-1"
description = "a"
cap_grade = "D"
trigger = { profile_type = ["kids"] }

[[overrides]]
id = "CFO-1"
description = "b"
cap_grade = "F"
trigger = { profile_type = ["teen"] }
"#;
        assert_eq!(
            OverrideRegistry::from_toml_str(source),
            Err(PredicateError::DuplicateOverride("CFO-1".into()))
        );
    }
}
