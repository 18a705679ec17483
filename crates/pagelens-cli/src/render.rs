//! Output rendering for analysis results and pipeline definitions.

use std::fmt::Write as _;

use serde_json::{json, Value};

use pagelens_pipeline::{Pipeline, RunReport, Stage};
use pagelens_types::{Field, Result};

fn label(field: Field) -> Option<&'static str> {
    match field {
        Field::Url | Field::ScrapedContent => None,
        Field::Classification => Some("Classification"),
        Field::Summary => Some("Summary"),
        Field::Tags => Some("Tags"),
        Field::RelatedTopics => Some("Related Topics"),
        Field::Sentiment => Some("Sentiment Analysis"),
        Field::KeyPhrases => Some("Key Phrases"),
        Field::Readability => Some("Readability Analysis"),
        Field::FactsToVerify => Some("Facts to Verify"),
        Field::Structure => Some("Content Structure"),
    }
}

/// Labelled sections for every produced field, then any stage failures and
/// the abort cause, if the run ended early.
pub fn text(url: &str, result: &Result<RunReport>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== {url} ===");

    let report = match result {
        Ok(report) => report,
        Err(err) => {
            let _ = writeln!(out, "\nError: {err}\n");
            return out;
        }
    };

    for field in report.state.fields() {
        let Some(heading) = label(field) else { continue };
        if let Some(items) = report.state.list(field) {
            let _ = writeln!(out, "\n{heading}:");
            for item in items {
                let _ = writeln!(out, "- {item}");
            }
        } else if let Some(value) = report.state.text(field) {
            let _ = writeln!(out, "\n{heading}: {value}");
        }
    }

    if !report.failures.is_empty() {
        let _ = writeln!(out, "\nIncomplete ({} stage(s) produced nothing):", report.failures.len());
        for failure in &report.failures {
            let _ = writeln!(out, "- {failure}");
        }
    }
    if let Some(ref aborted) = report.aborted {
        let _ = writeln!(out, "\nAborted at stage '{}': {}", aborted.stage, aborted.message);
    }
    out.push('\n');
    out
}

/// One JSON object per URL: produced fields, the failure ledger and the abort
/// cause (`null` for a finished run), or the fatal error. The scraped text is left out; it lives in the artifact.
pub fn json(url: &str, result: &Result<RunReport>) -> serde_json::Result<String> {
    let value = match result {
        Ok(report) => {
            let mut fields = serde_json::to_value(&report.state)?;
            if let Value::Object(ref mut map) = fields {
                map.remove(Field::ScrapedContent.as_str());
            }
            json!({
                "url": url,
                "run_id": report.run_id,
                "started_at": report.started_at,
                "finished_at": report.finished_at,
                "fields": fields,
                "completed_stages": report.completed_stages,
                "failures": report.failures,
                "aborted": report.aborted,
            })
        }
        Err(err) => json!({
            "url": url,
            "error": err.to_string(),
        }),
    };
    serde_json::to_string(&value)
}

/// Name, inputs and outputs of each stage, in execution order.
pub fn stage_table(pipeline: &Pipeline) -> String {
    let join = |fields: &std::collections::BTreeSet<Field>| {
        fields
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut out = String::new();
    let _ = writeln!(out, "{:<16} {:<30} {}", "STAGE", "REQUIRES", "PRODUCES");
    for stage in pipeline.stages() {
        let _ = writeln!(
            out,
            "{:<16} {:<30} {}",
            stage.name(),
            join(stage.requires()),
            join(stage.produces())
        );
    }
    out
}
