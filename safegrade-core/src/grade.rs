//! Letter grades and the score → grade lookup table.
//!
//! Grades are ordered from best (`A+`) to worst (`F`), so `Ord` compares by
//! rank and `max` picks the worse of two grades.

use crate::error::FrameworkError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One of the twelve ordered letter grades (A+ best … F worst).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LetterGrade {
    #[serde(rename = "A+")]
    APlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A-")]
    AMinus,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "B-")]
    BMinus,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C-")]
    CMinus,
    #[serde(rename = "D+")]
    DPlus,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "F")]
    F,
}

impl LetterGrade {
    /// Every grade, best first.
    pub const ALL: [LetterGrade; 12] = [
        LetterGrade::APlus,
        LetterGrade::A,
        LetterGrade::AMinus,
        LetterGrade::BPlus,
        LetterGrade::B,
        LetterGrade::BMinus,
        LetterGrade::CPlus,
        LetterGrade::C,
        LetterGrade::CMinus,
        LetterGrade::DPlus,
        LetterGrade::D,
        LetterGrade::F,
    ];

    /// Rank position: 0 for `A+` up to 11 for `F`.
    pub fn rank(self) -> usize {
        self as usize
    }

    /// True when `self` ranks strictly below `other`.
    pub fn is_worse_than(self, other: LetterGrade) -> bool {
        self > other
    }

    /// The worse of two grades.
    pub fn worse_of(self, other: LetterGrade) -> LetterGrade {
        self.max(other)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LetterGrade::APlus => "A+",
            LetterGrade::A => "A",
            LetterGrade::AMinus => "A-",
            LetterGrade::BPlus => "B+",
            LetterGrade::B => "B",
            LetterGrade::BMinus => "B-",
            LetterGrade::CPlus => "C+",
            LetterGrade::C => "C",
            LetterGrade::CMinus => "C-",
            LetterGrade::DPlus => "D+",
            LetterGrade::D => "D",
            LetterGrade::F => "F",
        }
    }
}

impl std::fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LetterGrade {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        LetterGrade::ALL
            .iter()
            .copied()
            .find(|g| g.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| format!("unknown letter grade '{s}'"))
    }
}

/// A band of the grade table: scores at or above `min_score` (and below the
/// previous band's minimum) map to `grade`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradeBand {
    pub grade: LetterGrade,
    pub min_score: f64,
}

impl GradeBand {
    pub const fn new(grade: LetterGrade, min_score: f64) -> Self {
        Self { grade, min_score }
    }
}

/// Ordered, validated mapping from a 0–100 safety score to a letter grade.
///
/// Bands are stored best first with strictly descending minima and the
/// lowest band starting at 0, so the ranges are contiguous and exhaustive
/// over [0, 100] and the lookup is monotonic in the score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<GradeBand>", into = "Vec<GradeBand>")]
pub struct GradeTable {
    bands: Vec<GradeBand>,
}

impl GradeTable {
    /// Build a table from bands ordered best first.
    pub fn new(bands: Vec<GradeBand>) -> Result<Self, FrameworkError> {
        let Some(last) = bands.last() else {
            return Err(FrameworkError::EmptyGradeTable);
        };

        for band in &bands {
            if !band.min_score.is_finite() || !(0.0..=100.0).contains(&band.min_score) {
                return Err(FrameworkError::BandOutOfRange {
                    grade: band.grade.to_string(),
                    min_score: band.min_score,
                });
            }
        }

        for pair in bands.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            if next.min_score >= prev.min_score {
                return Err(FrameworkError::BandNotDescending {
                    grade: next.grade.to_string(),
                });
            }
            if !next.grade.is_worse_than(prev.grade) {
                return Err(FrameworkError::BandOutOfOrder {
                    grade: next.grade.to_string(),
                });
            }
        }

        if last.min_score != 0.0 {
            return Err(FrameworkError::NotExhaustive(last.min_score));
        }

        Ok(Self { bands })
    }

    pub fn bands(&self) -> &[GradeBand] {
        &self.bands
    }

    /// Look up the grade for a 0–100 safety score. Out-of-range scores are
    /// clamped; a NaN score maps to the lowest band.
    pub fn lookup(&self, score: f64) -> LetterGrade {
        let lowest = self.lowest_grade();
        if score.is_nan() {
            return lowest;
        }
        let score = score.clamp(0.0, 100.0);
        let idx = self.bands.partition_point(|band| band.min_score > score);
        self.bands.get(idx).map_or(lowest, |band| band.grade)
    }

    fn lowest_grade(&self) -> LetterGrade {
        self.bands.last().map_or(LetterGrade::F, |band| band.grade)
    }
}

impl Default for GradeTable {
    fn default() -> Self {
        Self {
            bands: vec![
                GradeBand::new(LetterGrade::APlus, 95.0),
                GradeBand::new(LetterGrade::A, 85.0),
                GradeBand::new(LetterGrade::AMinus, 80.0),
                GradeBand::new(LetterGrade::BPlus, 75.0),
                GradeBand::new(LetterGrade::B, 70.0),
                GradeBand::new(LetterGrade::BMinus, 65.0),
                GradeBand::new(LetterGrade::CPlus, 60.0),
                GradeBand::new(LetterGrade::C, 55.0),
                GradeBand::new(LetterGrade::CMinus, 50.0),
                GradeBand::new(LetterGrade::DPlus, 40.0),
                GradeBand::new(LetterGrade::D, 30.0),
                GradeBand::new(LetterGrade::F, 0.0),
            ],
        }
    }
}

impl TryFrom<Vec<GradeBand>> for GradeTable {
    type Error = FrameworkError;

    fn try_from(bands: Vec<GradeBand>) -> Result<Self, Self::Error> {
        Self::new(bands)
    }
}

impl From<GradeTable> for Vec<GradeBand> {
    fn from(table: GradeTable) -> Self {
        table.bands
    }
}
