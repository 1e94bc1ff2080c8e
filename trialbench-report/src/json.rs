//! JSON Output and Loading

use crate::report::{ExperimentReport, SCHEMA_VERSION};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use trialbench_stats::EffectLabel;

/// Errors from reading a persisted report
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to read report {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed report: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unsupported report schema version {found} (expected {expected})")]
    UnsupportedSchema { found: u32, expected: u32 },

    #[error("baseline '{0}' has no entry in variants")]
    MissingBaseline(String),

    #[error("variant '{0}' is listed in metadata but has no results")]
    MissingVariant(String),

    #[error("variant '{0}' has results but is not listed in metadata")]
    UnlistedVariant(String),

    #[error("analysis '{key}' does not match variant '{variant}' against baseline '{baseline}'")]
    MismatchedAnalysis {
        key: String,
        variant: String,
        baseline: String,
    },

    #[error("analysis '{key}' has unknown effect label '{label}'")]
    UnknownEffectLabel { key: String, label: String },
}

/// Generate a prettified JSON report.
pub fn generate_json_report(report: &ExperimentReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

/// Parse and validate a report.
///
/// Required fields must be present and the document must be internally
/// consistent; nothing is defaulted.
pub fn load_report(json: &str) -> Result<ExperimentReport, ReportError> {
    let report: ExperimentReport = serde_json::from_str(json)?;
    validate(&report)?;
    Ok(report)
}

/// Read a report from disk, see [`load_report`]
pub fn load_report_file(path: &Path) -> Result<ExperimentReport, ReportError> {
    let json = std::fs::read_to_string(path).map_err(|source| ReportError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_report(&json)
}

fn validate(report: &ExperimentReport) -> Result<(), ReportError> {
    if report.schema_version != SCHEMA_VERSION {
        return Err(ReportError::UnsupportedSchema {
            found: report.schema_version,
            expected: SCHEMA_VERSION,
        });
    }

    let meta = &report.metadata;
    if !report.variants.contains_key(&meta.baseline) {
        return Err(ReportError::MissingBaseline(meta.baseline.clone()));
    }
    for name in &meta.variants {
        if !report.variants.contains_key(name) {
            return Err(ReportError::MissingVariant(name.clone()));
        }
    }
    for name in report.variants.keys() {
        if !meta.variants.contains(name) {
            return Err(ReportError::UnlistedVariant(name.clone()));
        }
    }

    for (key, analysis) in &report.analysis {
        let consistent = analysis.baseline == meta.baseline
            && report.variants.contains_key(&analysis.variant)
            && *key == ExperimentReport::analysis_key(&analysis.variant, &analysis.baseline);
        if !consistent {
            return Err(ReportError::MismatchedAnalysis {
                key: key.clone(),
                variant: analysis.variant.clone(),
                baseline: analysis.baseline.clone(),
            });
        }

        for section in analysis.durations.values() {
            let Some(duration) = section.available() else {
                continue;
            };
            if EffectLabel::from_str(&duration.effect_label).is_err() {
                return Err(ReportError::UnknownEffectLabel {
                    key: key.clone(),
                    label: duration.effect_label.clone(),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{
        DurationAnalysis, DurationSummary, ReportMetadata, RunConfig, Section, TrialAccounting,
        VariantAnalysis, VariantReport,
    };
    use chrono::Utc;
    use std::collections::BTreeMap;
    use trialbench_stats::{compare, summarize};

    fn sample_report() -> ExperimentReport {
        let full = [10.0, 11.0, 12.0, 10.5, 11.5];
        let minimal = [8.0, 8.5, 9.0, 8.2, 8.8];

        let mut variants = BTreeMap::new();
        for (name, sample) in [("full", &full), ("minimal", &minimal)] {
            let summary = summarize(&sample[..]).unwrap();
            let mut durations = BTreeMap::new();
            durations.insert(
                "setup".to_string(),
                Section::Available(DurationSummary::from(&summary)),
            );
            variants.insert(
                name.to_string(),
                VariantReport {
                    capabilities: Vec::new(),
                    durations,
                    trials: TrialAccounting::new(5, 5, 0, 0),
                },
            );
        }

        let comparison = compare(&minimal, &full).unwrap();
        let mut durations = BTreeMap::new();
        durations.insert(
            "setup".to_string(),
            Section::Available(DurationAnalysis::new(&comparison, Some(-22.0))),
        );
        let mut analysis = BTreeMap::new();
        analysis.insert(
            "minimal_vs_full".to_string(),
            VariantAnalysis {
                variant: "minimal".to_string(),
                baseline: "full".to_string(),
                durations,
            },
        );

        ExperimentReport {
            schema_version: SCHEMA_VERSION,
            variants,
            analysis,
            metadata: ReportMetadata {
                variants: vec!["full".to_string(), "minimal".to_string()],
                baseline: "full".to_string(),
                trial_count: 5,
                warmup_count: 1,
                timestamp: Utc::now(),
                version: "0.1.0".to_string(),
                provisioning_skips: BTreeMap::new(),
                config: RunConfig {
                    jobs: 1,
                    timeout_ms: None,
                    bootstrap_iterations: 0,
                    confidence_method: "student_t".to_string(),
                    operations: vec!["setup".to_string()],
                },
            },
        }
    }

    #[test]
    fn test_json_report_loads_back() {
        let report = sample_report();
        let json = generate_json_report(&report).unwrap();
        let loaded = load_report(&json).unwrap();

        assert_eq!(loaded.metadata.variants, report.metadata.variants);
        assert_eq!(loaded.metadata.timestamp, report.metadata.timestamp);
        assert_eq!(
            loaded.analysis.keys().collect::<Vec<_>>(),
            vec!["minimal_vs_full"]
        );
        let setup = loaded.variants["minimal"].durations["setup"]
            .available()
            .unwrap();
        assert_eq!(setup.count, 5);
    }

    #[test]
    fn test_json_top_level_fields() {
        let json = generate_json_report(&sample_report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert!(value["variants"]["full"]["durations"]["setup"]["mean_ms"].is_number());
        let entry = &value["analysis"]["minimal_vs_full"]["durations"]["setup"];
        assert_eq!(entry["status"], "available");
        assert_eq!(entry["effect_label"], "large");
        assert_eq!(value["metadata"]["trial_count"], 5);
        assert!(value["metadata"]["timestamp"].is_string());
    }

    #[test]
    fn test_rejects_missing_required_field() {
        let mut value = serde_json::to_value(sample_report()).unwrap();
        value["metadata"]
            .as_object_mut()
            .unwrap()
            .remove("trial_count");
        let err = load_report(&value.to_string()).unwrap_err();
        assert!(matches!(err, ReportError::Parse(_)));
    }

    #[test]
    fn test_rejects_missing_nullable_field() {
        let full = serde_json::to_value(sample_report()).unwrap();
        assert!(full["metadata"]["config"]["timeout_ms"].is_null());
        assert!(load_report(&full.to_string()).is_ok());

        let setup = "/analysis/minimal_vs_full/durations/setup";
        for (parent, key) in [
            (setup.to_string(), "relative_percent"),
            (setup.to_string(), "bootstrap"),
            (format!("{}/significance", setup), "p_value"),
            (format!("{}/significance", setup), "significant"),
            ("/metadata/config".to_string(), "timeout_ms"),
        ] {
            let mut value = full.clone();
            value
                .pointer_mut(&parent)
                .and_then(serde_json::Value::as_object_mut)
                .unwrap()
                .remove(key)
                .unwrap();
            let err = load_report(&value.to_string()).unwrap_err();
            assert!(matches!(err, ReportError::Parse(_)), "{} accepted", key);
        }
    }

    #[test]
    fn test_rejects_unknown_schema() {
        let mut report = sample_report();
        report.schema_version = 99;
        let json = generate_json_report(&report).unwrap();
        assert!(matches!(
            load_report(&json),
            Err(ReportError::UnsupportedSchema { found: 99, .. })
        ));
    }

    #[test]
    fn test_rejects_inconsistent_reports() {
        let mut report = sample_report();
        report.metadata.baseline = "ghost".to_string();
        let json = generate_json_report(&report).unwrap();
        assert!(matches!(
            load_report(&json),
            Err(ReportError::MissingBaseline(_))
        ));

        let mut report = sample_report();
        let entry = report.analysis.remove("minimal_vs_full").unwrap();
        report.analysis.insert("other_vs_full".to_string(), entry);
        let json = generate_json_report(&report).unwrap();
        assert!(matches!(
            load_report(&json),
            Err(ReportError::MismatchedAnalysis { .. })
        ));

        let mut report = sample_report();
        report.metadata.variants.push("extra".to_string());
        let json = generate_json_report(&report).unwrap();
        assert!(matches!(
            load_report(&json),
            Err(ReportError::MissingVariant(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_effect_label() {
        let mut value = serde_json::to_value(sample_report()).unwrap();
        value["analysis"]["minimal_vs_full"]["durations"]["setup"]["effect_label"] =
            serde_json::Value::from("enormous");
        assert!(matches!(
            load_report(&value.to_string()),
            Err(ReportError::UnknownEffectLabel { .. })
        ));
    }
}
