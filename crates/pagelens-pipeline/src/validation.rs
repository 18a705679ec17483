//! Static checks on a stage sequence.
//!
//! [`validate`] runs every rule and returns advisory diagnostics;
//! [`validate_or_raise`] fails on any `Error`-severity diagnostic. Pipelines
//! call the latter at build time so a malformed sequence never reaches a run.

use std::collections::{BTreeSet, HashMap};

use pagelens_types::{Field, PagelensError};

use crate::stage::Stage;

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    pub stage: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Diagnostic {
    fn error(rule: &str, stage: &dyn Stage, message: String) -> Self {
        Self {
            rule: rule.into(),
            severity: Severity::Error,
            message,
            stage: Some(stage.name().to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// LintRule trait
// ---------------------------------------------------------------------------

pub trait LintRule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, stages: &[Box<dyn Stage>]) -> Vec<Diagnostic>;
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

struct EmptyPipelineRule;
impl LintRule for EmptyPipelineRule {
    fn name(&self) -> &str { "empty_pipeline" }
    fn apply(&self, stages: &[Box<dyn Stage>]) -> Vec<Diagnostic> {
        if stages.is_empty() {
            vec![Diagnostic {
                rule: self.name().into(),
                severity: Severity::Warning,
                message: "Pipeline has no stages; runs will only echo the base fields".into(),
                stage: None,
            }]
        } else {
            vec![]
        }
    }
}

struct UniqueNamesRule;
impl LintRule for UniqueNamesRule {
    fn name(&self) -> &str { "unique_names" }
    fn apply(&self, stages: &[Box<dyn Stage>]) -> Vec<Diagnostic> {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        let mut diags = Vec::new();
        for (idx, stage) in stages.iter().enumerate() {
            if let Some(first) = seen.insert(stage.name(), idx) {
                diags.push(Diagnostic::error(
                    self.name(),
                    stage.as_ref(),
                    format!(
                        "Stage name '{}' is used at positions {} and {}",
                        stage.name(),
                        first,
                        idx
                    ),
                ));
            }
        }
        diags
    }
}

struct ProducesNonEmptyRule;
impl LintRule for ProducesNonEmptyRule {
    fn name(&self) -> &str { "produces_non_empty" }
    fn apply(&self, stages: &[Box<dyn Stage>]) -> Vec<Diagnostic> {
        stages
            .iter()
            .filter(|s| s.produces().is_empty())
            .map(|s| {
                Diagnostic::error(
                    self.name(),
                    s.as_ref(),
                    format!("Stage '{}' declares no output fields", s.name()),
                )
            })
            .collect()
    }
}

/// Every required field must be a base field or produced by an earlier stage.
struct DependenciesSatisfiedRule;
impl LintRule for DependenciesSatisfiedRule {
    fn name(&self) -> &str { "dependencies_satisfied" }
    fn apply(&self, stages: &[Box<dyn Stage>]) -> Vec<Diagnostic> {
        let mut available: BTreeSet<Field> = Field::BASE.into_iter().collect();
        let mut diags = Vec::new();
        for stage in stages {
            for field in stage.requires() {
                if !available.contains(field) {
                    diags.push(Diagnostic::error(
                        self.name(),
                        stage.as_ref(),
                        format!(
                            "Stage '{}' requires '{}', which no earlier stage produces",
                            stage.name(),
                            field
                        ),
                    ));
                }
            }
            available.extend(stage.produces().iter().copied());
        }
        diags
    }
}

/// Each field has at most one writer, and base fields have none.
struct SingleOwnerRule;
impl LintRule for SingleOwnerRule {
    fn name(&self) -> &str { "single_owner" }
    fn apply(&self, stages: &[Box<dyn Stage>]) -> Vec<Diagnostic> {
        let mut owners: HashMap<Field, &str> = HashMap::new();
        let mut diags = Vec::new();
        for stage in stages {
            for field in stage.produces() {
                if field.is_base() {
                    diags.push(Diagnostic::error(
                        self.name(),
                        stage.as_ref(),
                        format!("Stage '{}' writes base field '{}'", stage.name(), field),
                    ));
                } else if let Some(owner) = owners.insert(*field, stage.name()) {
                    diags.push(Diagnostic::error(
                        self.name(),
                        stage.as_ref(),
                        format!(
                            "Field '{}' is produced by both '{}' and '{}'",
                            field,
                            owner,
                            stage.name()
                        ),
                    ));
                }
            }
        }
        diags
    }
}

/// Template placeholders must name known fields listed in `requires`.
struct TemplatePlaceholdersRule;
impl LintRule for TemplatePlaceholdersRule {
    fn name(&self) -> &str { "template_placeholders" }
    fn apply(&self, stages: &[Box<dyn Stage>]) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for stage in stages {
            for name in stage.placeholders() {
                let message = match name.parse::<Field>() {
                    Err(_) => format!(
                        "Stage '{}' prompt references unknown field '{{{}}}'",
                        stage.name(),
                        name
                    ),
                    Ok(field) if !stage.requires().contains(&field) => format!(
                        "Stage '{}' prompt reads '{}' without requiring it",
                        stage.name(),
                        field
                    ),
                    Ok(_) => continue,
                };
                diags.push(Diagnostic::error(self.name(), stage.as_ref(), message));
            }
        }
        diags
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run all lint rules against a stage sequence.
pub fn validate(stages: &[Box<dyn Stage>]) -> Vec<Diagnostic> {
    let rules: Vec<Box<dyn LintRule>> = vec![
        Box::new(EmptyPipelineRule),
        Box::new(UniqueNamesRule),
        Box::new(ProducesNonEmptyRule),
        Box::new(DependenciesSatisfiedRule),
        Box::new(SingleOwnerRule),
        Box::new(TemplatePlaceholdersRule),
    ];

    let mut diagnostics = Vec::new();
    for rule in &rules {
        diagnostics.extend(rule.apply(stages));
    }
    diagnostics
}

/// Run all lint rules; return `Err` if any `Error`-severity diagnostic found.
pub fn validate_or_raise(stages: &[Box<dyn Stage>]) -> pagelens_types::Result<Vec<Diagnostic>> {
    let diagnostics = validate(stages);
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .map(|d| d.message.clone())
        .collect();
    if !errors.is_empty() {
        return Err(PagelensError::PipelineDefinition(errors.join("; ")));
    }
    Ok(diagnostics)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
