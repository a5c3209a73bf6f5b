//! Plain-text rendering of command results.

use std::fmt::Write;

use ak_core::models::graph::GraphDiff;
use ak_core::models::{OutputEntry, OutputValue};
use ak_core::services::aws::PushOutcome;
use ak_core::services::deployer::{DeploymentReport, StepOutcome};
use ak_core::services::secrets::SecretBundle;

/// Two-column label/value table.
pub fn output_table(entries: &[OutputEntry]) -> String {
    let width = entries.iter().map(|e| e.label.len()).max().unwrap_or(0) + 2;
    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(out, "{:<width$}{}", entry.label, entry.value);
    }
    out
}

pub fn outputs_json(entries: &[OutputEntry]) -> serde_json::Result<String> {
    let map: serde_json::Map<String, serde_json::Value> = entries
        .iter()
        .map(|e| {
            let value = match e.value.known() {
                Some(v) => serde_json::Value::String(v.to_string()),
                None => serde_json::Value::String(OutputValue::PENDING.to_string()),
            };
            (e.label.clone(), value)
        })
        .collect();
    serde_json::to_string_pretty(&map)
}

/// Bundle names and the keys each one carries. Values are masked.
pub fn secret_plan(bundles: &[SecretBundle]) -> String {
    if bundles.is_empty() {
        return "No classified secrets found\n".to_string();
    }
    let mut out = String::new();
    for bundle in bundles {
        let keys: Vec<&str> = bundle.values.keys().map(String::as_str).collect();
        let _ = writeln!(out, "{}: {}", bundle.name, keys.join(", "));
        let _ = writeln!(out, "  {}", bundle.masked());
    }
    out
}

pub fn push_results(results: &[(String, PushOutcome)]) -> String {
    let mut out = String::new();
    for (name, outcome) in results {
        let verb = match outcome {
            PushOutcome::Created => "created",
            PushOutcome::Updated => "updated",
        };
        let _ = writeln!(out, "{name}: {verb}");
    }
    out
}

pub fn graph_diff(diff: &GraphDiff) -> String {
    if diff.is_empty() {
        return "No changes\n".to_string();
    }
    let mut out = String::new();
    for id in &diff.added {
        let _ = writeln!(out, "+ {id}");
    }
    for id in &diff.changed {
        let _ = writeln!(out, "~ {id}");
    }
    for id in &diff.removed {
        let _ = writeln!(out, "- {id}");
    }
    out
}

/// Step summary of a deployment. Timestamps are left out so the text is
/// stable across runs.
pub fn deployment_report(report: &DeploymentReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Stack: {} ({})", report.stack_name, report.region);
    if report.dry_run {
        let _ = writeln!(out, "Mode: dry run, no changes made");
    }
    for step in &report.steps {
        let (tag, detail) = match &step.outcome {
            StepOutcome::Completed(d) => ("done", d),
            StepOutcome::Skipped(d) => ("skipped", d),
            StepOutcome::IgnoredFailure(d) => ("failed, ignored", d),
            StepOutcome::Planned(d) => ("planned", d),
        };
        let _ = writeln!(out, "[{tag}] {}: {detail}", step.step);
    }
    for secret in &report.secrets {
        let _ = writeln!(out, "  {} {}", secret.name, secret.masked);
    }
    out
}
