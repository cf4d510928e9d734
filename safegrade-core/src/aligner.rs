//! Cross-profile score alignment.
//!
//! Profiles in one platform run label the same logical test differently
//! (`SD-01` on the kids profile, `SD-02` on the teen profile). Alignment tries
//! an exact test id first, then compares ids with any trailing `-<number>`
//! suffix removed.
//!
//! Known limitation: this assumes at most one test per category per profile.
//! When several tests share a prefix the first one wins and the others are
//! reported as ambiguous candidates.

use crate::model::{Diagnostic, DiagnosticKind, ProfileResult, Score, TestResult};
use serde::{Deserialize, Serialize};

/// Strip one trailing `-<digits>` suffix from a test identifier.
pub fn category_prefix(id: &str) -> &str {
    match id.rsplit_once('-') {
        Some((prefix, suffix))
            if !prefix.is_empty()
                && !suffix.is_empty()
                && suffix.bytes().all(|b| b.is_ascii_digit()) =>
        {
            prefix
        }
        _ => id,
    }
}

/// How a test was matched to the requested key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchKind {
    Exact,
    Prefix,
}

/// A test matched for a `(profile, key)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment<'a> {
    pub test: &'a TestResult,
    pub kind: MatchKind,
    /// Other tests that matched equally well and were passed over.
    pub ambiguous_with: Vec<&'a str>,
}

impl Alignment<'_> {
    pub fn is_ambiguous(&self) -> bool {
        !self.ambiguous_with.is_empty()
    }
}

/// Find the test in `profile` that corresponds to `key`.
pub fn align<'a>(profile: &'a ProfileResult, key: &str) -> Option<Alignment<'a>> {
    let exact: Vec<&TestResult> = profile.tests.iter().filter(|t| t.test_id == key).collect();
    if let Some((first, rest)) = exact.split_first() {
        return Some(Alignment {
            test: *first,
            kind: MatchKind::Exact,
            ambiguous_with: rest.iter().map(|t| t.test_id.as_str()).collect(),
        });
    }

    let wanted = category_prefix(key);
    let candidates: Vec<&TestResult> = profile
        .tests
        .iter()
        .filter(|t| category_prefix(&t.test_id) == wanted)
        .collect();
    let (first, rest) = candidates.split_first()?;
    Some(Alignment {
        test: *first,
        kind: MatchKind::Prefix,
        ambiguous_with: rest.iter().map(|t| t.test_id.as_str()).collect(),
    })
}

/// One profile's value in a comparison row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AlignedCell {
    Scored {
        test_id: String,
        score: Score,
        match_kind: MatchKind,
    },
    /// A test was matched but carries no score.
    NotScored { test_id: String },
    NoData,
}

impl AlignedCell {
    pub fn score(&self) -> Option<Score> {
        match self {
            AlignedCell::Scored { score, .. } => Some(*score),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileCell {
    pub profile_id: String,
    #[serde(flatten)]
    pub cell: AlignedCell,
}

/// Side-by-side view of one logical test across profiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonRow {
    pub key: String,
    pub cells: Vec<ProfileCell>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonView {
    pub rows: Vec<ComparisonRow>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Build one row per distinct test-id prefix (first-appearance order) with a
/// cell for every profile.
pub fn build_comparison(profiles: &[ProfileResult]) -> ComparisonView {
    let mut keys: Vec<&str> = Vec::new();
    for test in profiles.iter().flat_map(|p| &p.tests) {
        let key = category_prefix(&test.test_id);
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    let mut view = ComparisonView::default();
    for key in keys {
        let mut cells = Vec::with_capacity(profiles.len());
        for profile in profiles {
            let cell = match align(profile, key) {
                Some(alignment) => {
                    if alignment.is_ambiguous() {
                        tracing::warn!(
                            profile = %profile.profile_id,
                            key,
                            chosen = %alignment.test.test_id,
                            "Ambiguous cross-profile alignment"
                        );
                        view.diagnostics.push(Diagnostic::new(
                            DiagnosticKind::AmbiguousAlignment,
                            key,
                            format!(
                                "profile '{}': chose '{}' over {}",
                                profile.profile_id,
                                alignment.test.test_id,
                                alignment.ambiguous_with.join(", ")
                            ),
                        ));
                    }
                    match alignment.test.score {
                        Some(score) => AlignedCell::Scored {
                            test_id: alignment.test.test_id.clone(),
                            score,
                            match_kind: alignment.kind,
                        },
                        None => AlignedCell::NotScored {
                            test_id: alignment.test.test_id.clone(),
                        },
                    }
                }
                None => AlignedCell::NoData,
            };
            cells.push(ProfileCell {
                profile_id: profile.profile_id.clone(),
                cell,
            });
        }
        view.rows.push(ComparisonRow {
            key: key.to_string(),
            cells,
        });
    }
    view
}
