//! Capability registry diff: classify research findings against the
//! canonical registry as new, removed, changed, or unchanged.
//!
//! Both sides are keyed by `rule_category` and must have unique keys.
//! Descriptions are compared after trimming and case-folding.

use crate::error::{DiffError, DiffSide};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A capability discovered by a research run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityFinding {
    pub rule_category: String,
    pub description: String,
    pub confidence: f64,
    #[serde(default)]
    pub location: String,
}

impl CapabilityFinding {
    pub fn new(rule_category: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            rule_category: rule_category.into(),
            description: description.into(),
            confidence: 1.0,
            location: String::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }
}

/// A previously recorded, canonical capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryCapability {
    pub rule_category: String,
    pub description: String,
}

impl RegistryCapability {
    pub fn new(rule_category: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            rule_category: rule_category.into(),
            description: description.into(),
        }
    }
}

/// A capability present on both sides with differing descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedCapability {
    pub rule_category: String,
    pub research_description: String,
    pub current_description: String,
}

/// Counts per partition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryDiffSummary {
    pub new_count: usize,
    pub removed_count: usize,
    pub changed_count: usize,
    pub unchanged_count: usize,
    pub total_changes: usize,
}

/// Result of one diff computation. Every input key lands in exactly one
/// partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryDiff {
    pub new_capabilities: Vec<CapabilityFinding>,
    pub removed_capabilities: Vec<String>,
    pub changed_capabilities: Vec<ChangedCapability>,
    pub unchanged: Vec<String>,
    pub summary: RegistryDiffSummary,
}

impl RegistryDiff {
    pub fn has_changes(&self) -> bool {
        self.summary.total_changes > 0
    }
}

fn normalize(description: &str) -> String {
    description.trim().to_lowercase()
}

/// Compare this run's findings against the registry.
///
/// New, changed, and unchanged entries follow the findings' input order;
/// removed entries follow the registry's order.
pub fn diff_capabilities(
    findings: &[CapabilityFinding],
    registry: &[RegistryCapability],
) -> Result<RegistryDiff, DiffError> {
    let mut finding_keys: HashMap<&str, &CapabilityFinding> =
        HashMap::with_capacity(findings.len());
    for finding in findings {
        if !finding.confidence.is_finite() || !(0.0..=1.0).contains(&finding.confidence) {
            return Err(DiffError::InvalidConfidence {
                key: finding.rule_category.clone(),
                confidence: finding.confidence,
            });
        }
        if finding_keys
            .insert(finding.rule_category.as_str(), finding)
            .is_some()
        {
            return Err(DiffError::DuplicateKey {
                side: DiffSide::Findings,
                key: finding.rule_category.clone(),
            });
        }
    }

    let mut registry_map: HashMap<&str, &RegistryCapability> =
        HashMap::with_capacity(registry.len());
    for capability in registry {
        if registry_map
            .insert(capability.rule_category.as_str(), capability)
            .is_some()
        {
            return Err(DiffError::DuplicateKey {
                side: DiffSide::Registry,
                key: capability.rule_category.clone(),
            });
        }
    }

    let mut new_capabilities = Vec::new();
    let mut changed_capabilities = Vec::new();
    let mut unchanged = Vec::new();

    for finding in findings {
        match registry_map.get(finding.rule_category.as_str()) {
            Some(current) => {
                if normalize(&finding.description) == normalize(&current.description) {
                    unchanged.push(finding.rule_category.clone());
                } else {
                    changed_capabilities.push(ChangedCapability {
                        rule_category: finding.rule_category.clone(),
                        research_description: finding.description.clone(),
                        current_description: current.description.clone(),
                    });
                }
            }
            None => new_capabilities.push(finding.clone()),
        }
    }

    let removed_capabilities: Vec<String> = registry
        .iter()
        .filter(|c| !finding_keys.contains_key(c.rule_category.as_str()))
        .map(|c| c.rule_category.clone())
        .collect();

    let summary = RegistryDiffSummary {
        new_count: new_capabilities.len(),
        removed_count: removed_capabilities.len(),
        changed_count: changed_capabilities.len(),
        unchanged_count: unchanged.len(),
        total_changes: new_capabilities.len()
            + removed_capabilities.len()
            + changed_capabilities.len(),
    };

    tracing::debug!(
        new = summary.new_count,
        removed = summary.removed_count,
        changed = summary.changed_count,
        unchanged = summary.unchanged_count,
        "Computed capability diff"
    );

    Ok(RegistryDiff {
        new_capabilities,
        removed_capabilities,
        changed_capabilities,
        unchanged,
        summary,
    })
}
