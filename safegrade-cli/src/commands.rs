//! CLI subcommand handlers.

use crate::Commands;
use anyhow::Context;
use safegrade_core::aggregate::{Evaluator, PlatformResult};
use safegrade_core::diff::{CapabilityFinding, RegistryCapability, RegistryDiff};
use safegrade_core::{ComparisonView, PlatformRun, SafegradeConfig};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, config: &SafegradeConfig) -> anyhow::Result<()> {
    let pretty = config.output.pretty;
    match command {
        Commands::Grade { bundles, .. } => {
            let evaluator = Arc::new(config.evaluator()?);
            let outcomes = grade_bundles(evaluator, bundles).await;
            println!("{}", render(&outcomes, pretty)?);

            let failed = outcomes.iter().filter(|o| o.is_failed()).count();
            if failed > 0 {
                anyhow::bail!("{} of {} bundles could not be graded", failed, outcomes.len());
            }
        }
        Commands::Compare { bundle } => {
            let view = compare_bundle(&bundle)?;
            println!("{}", render(&view, pretty)?);
        }
        Commands::Diff { findings, registry } => {
            let diff = diff_files(&findings, &registry)?;
            if diff.has_changes() {
                tracing::info!(
                    total_changes = diff.summary.total_changes,
                    "Registry update needed"
                );
            }
            println!("{}", render(&diff, pretty)?);
        }
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn render<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<String> {
    Ok(if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    })
}

/// Result of grading one bundle file.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
enum BundleOutcome {
    Graded(PlatformResult),
    Failed { path: String, error: String },
}

impl BundleOutcome {
    fn failed(path: &Path, error: impl std::fmt::Display) -> Self {
        BundleOutcome::Failed {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }

    fn is_failed(&self) -> bool {
        matches!(self, BundleOutcome::Failed { .. })
    }
}

fn grade_bundle(evaluator: &Evaluator, path: &Path) -> anyhow::Result<PlatformResult> {
    let run: PlatformRun = read_json(path)?;
    tracing::debug!(
        path = %path.display(),
        platform = %run.platform_id,
        "Grading bundle"
    );
    Ok(evaluator.grade_platform(&run))
}

/// Grade each bundle on the blocking pool. A bundle that cannot be read or
/// parsed becomes a `Failed` entry; outcomes keep the input order.
async fn grade_bundles(evaluator: Arc<Evaluator>, bundles: Vec<PathBuf>) -> Vec<BundleOutcome> {
    let handles: Vec<_> = bundles
        .into_iter()
        .map(|path| {
            let evaluator = Arc::clone(&evaluator);
            let task_path = path.clone();
            let handle = tokio::task::spawn_blocking(move || {
                match grade_bundle(&evaluator, &task_path) {
                    Ok(result) => BundleOutcome::Graded(result),
                    Err(e) => {
                        tracing::warn!(
                            path = %task_path.display(),
                            "Bundle could not be graded: {:#}",
                            e
                        );
                        BundleOutcome::failed(&task_path, format!("{e:#}"))
                    }
                }
            });
            (path, handle)
        })
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for (path, handle) in handles {
        outcomes.push(match handle.await {
            Ok(outcome) => outcome,
            Err(e) => BundleOutcome::failed(&path, e),
        });
    }
    outcomes
}

fn compare_bundle(path: &Path) -> anyhow::Result<ComparisonView> {
    let run: PlatformRun = read_json(path)?;
    Ok(safegrade_core::build_comparison(&run.profiles))
}

fn diff_files(findings: &Path, registry: &Path) -> anyhow::Result<RegistryDiff> {
    let findings: Vec<CapabilityFinding> = read_json(findings)?;
    let registry: Vec<RegistryCapability> = read_json(registry)?;
    Ok(safegrade_core::diff_capabilities(&findings, &registry)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use safegrade_core::{Framework, LetterGrade, OverrideRegistry, TestCategory};

    fn evaluator() -> Arc<Evaluator> {
        let framework = Framework::new(
            "v1",
            vec![
                TestCategory::new("SD", "Sensitive content discovery", 3.0),
                TestCategory::new("PC", "Purchase controls", 1.0),
            ],
        )
        .unwrap();
        Arc::new(Evaluator::new(framework, OverrideRegistry::default()))
    }

    fn write_bundle(dir: &Path, name: &str, platform: &str, sd: u8) -> PathBuf {
        let path = dir.join(name);
        let bundle = serde_json::json!({
            "platformId": platform,
            "profiles": [{
                "profileId": "kids-1",
                "profileType": "kids",
                "tests": [
                    {"testId": "SD-01", "categoryId": "SD", "score": sd},
                    {"testId": "PC-01", "categoryId": "PC", "score": 4}
                ]
            }]
        });
        std::fs::write(&path, bundle.to_string()).unwrap();
        path
    }

    fn graded(outcome: &BundleOutcome) -> &PlatformResult {
        match outcome {
            BundleOutcome::Graded(result) => result,
            BundleOutcome::Failed { path, error } => panic!("{path} failed: {error}"),
        }
    }

    #[tokio::test]
    async fn test_grade_bundles_keeps_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![
            write_bundle(dir.path(), "b.json", "beta", 4),
            write_bundle(dir.path(), "a.json", "alpha", 0),
        ];

        let outcomes = grade_bundles(evaluator(), paths).await;
        let ids: Vec<&str> = outcomes
            .iter()
            .map(|o| graded(o).platform_id.as_str())
            .collect();
        assert_eq!(ids, vec!["beta", "alpha"]);
        assert_eq!(graded(&outcomes[0]).overall_grade, Some(LetterGrade::F));
        assert_eq!(graded(&outcomes[1]).overall_grade, Some(LetterGrade::A));
    }

    #[tokio::test]
    async fn test_bad_bundle_does_not_block_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_bundle(dir.path(), "good.json", "alpha", 0);
        let bad = write_bundle(dir.path(), "bad.json", "beta", 5);
        let missing = dir.path().join("missing.json");

        let outcomes = grade_bundles(evaluator(), vec![good, bad, missing]).await;
        assert_eq!(outcomes.len(), 3);
        assert_eq!(graded(&outcomes[0]).platform_id, "alpha");

        match &outcomes[1] {
            BundleOutcome::Failed { path, error } => {
                assert!(path.ends_with("bad.json"));
                assert!(error.contains("Invalid JSON"));
                assert!(error.contains("outside 0..=4"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(outcomes[2].is_failed());
    }

    #[test]
    fn test_bundle_outcome_serialization() {
        let outcome = BundleOutcome::failed(Path::new("runs/bad.json"), "Invalid JSON");
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({
                "status": "failed",
                "path": "runs/bad.json",
                "error": "Invalid JSON"
            })
        );
    }

    #[test]
    fn test_compare_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_bundle(dir.path(), "run.json", "alpha", 2);
        let view = compare_bundle(&path).unwrap();
        let keys: Vec<&str> = view.rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["SD", "PC"]);
    }

    #[test]
    fn test_diff_files_duplicate_key_fails() {
        let dir = tempfile::tempdir().unwrap();
        let findings = dir.path().join("findings.json");
        let registry = dir.path().join("registry.json");
        std::fs::write(
            &findings,
            r#"[{"ruleCategory": "a", "description": "x", "confidence": 1.0},
                {"ruleCategory": "a", "description": "y", "confidence": 0.5}]"#,
        )
        .unwrap();
        std::fs::write(&registry, "[]").unwrap();

        let err = diff_files(&findings, &registry).unwrap_err();
        assert!(err.to_string().contains("duplicate rule category 'a' in findings"));
    }

    #[test]
    fn test_render_compact_and_pretty() {
        let value = serde_json::json!({"grade": "A+"});
        assert_eq!(render(&value, false).unwrap(), r#"{"grade":"A+"}"#);
        assert!(render(&value, true).unwrap().contains('\n'));
    }
}
