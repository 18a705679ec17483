//! The stage contract and the prompt-template/parse-rule stage built on it.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use pagelens_types::{Field, PagelensError, PartialUpdate, Result, SharedState};

// ---------------------------------------------------------------------------
// Stage trait
// ---------------------------------------------------------------------------

/// One field-producing unit of a pipeline.
///
/// `render` and `parse` are pure; the executor performs the only effectful
/// step (the generation call) between them.
pub trait Stage: Send + Sync {
    /// Stable identifier, unique within a pipeline.
    fn name(&self) -> &str;

    /// Fields that must be present and non-empty before this stage runs.
    fn requires(&self) -> &BTreeSet<Field>;

    /// Fields this stage owns. It may write exactly these and nothing else.
    fn produces(&self) -> &BTreeSet<Field>;

    /// Build the prompt from required fields only.
    fn render(&self, state: &SharedState) -> Result<String>;

    /// Map generated text onto the produced fields. Must not panic on any input.
    fn parse(&self, text: &str) -> Result<PartialUpdate>;

    /// Placeholder names referenced by the stage's prompt template, if any.
    fn placeholders(&self) -> Vec<String> {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// PromptTemplate
// ---------------------------------------------------------------------------

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("Invalid placeholder regex"));

/// Prompt text with `{field_name}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Placeholder names in order of first appearance.
    pub fn placeholders(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for m in PLACEHOLDER.find_iter(&self.text) {
            let name = strip_braces(m.as_str());
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        names
    }

    /// Substitute every placeholder with the rendered value of its field.
    ///
    /// Only fields in `allowed` may be read; anything else is a definition bug.
    pub fn render(&self, allowed: &BTreeSet<Field>, state: &SharedState) -> Result<String> {
        let mut out = String::with_capacity(self.text.len());
        let mut last = 0;

        for m in PLACEHOLDER.find_iter(&self.text) {
            let name = strip_braces(m.as_str());
            let field: Field = name.parse().map_err(|_| {
                PagelensError::PipelineDefinition(format!("unknown placeholder '{{{name}}}'"))
            })?;
            if !allowed.contains(&field) {
                return Err(PagelensError::PipelineDefinition(format!(
                    "placeholder '{{{name}}}' reads a field the stage does not require"
                )));
            }
            let value = state.render_field(field).ok_or_else(|| {
                PagelensError::Other(format!("field '{field}' is not present in the state"))
            })?;
            out.push_str(&self.text[last..m.start()]);
            out.push_str(&value);
            last = m.end();
        }

        out.push_str(&self.text[last..]);
        Ok(out)
    }
}

fn strip_braces(placeholder: &str) -> &str {
    placeholder.trim_start_matches('{').trim_end_matches('}')
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// How generated text maps onto a stage's single output field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseRule {
    /// Trimmed text, stored verbatim.
    Scalar(Field),
    /// `", "`-delimited items on a single line.
    CommaList(Field),
    /// One item per non-blank line.
    LineList(Field),
}

impl ParseRule {
    pub fn field(&self) -> Field {
        match self {
            ParseRule::Scalar(f) | ParseRule::CommaList(f) | ParseRule::LineList(f) => *f,
        }
    }

    pub fn apply(&self, stage: &str, text: &str) -> Result<PartialUpdate> {
        match self {
            ParseRule::Scalar(field) => Ok(PartialUpdate::text(*field, text.trim())),
            ParseRule::CommaList(field) => parse_comma_list(text)
                .map(|items| PartialUpdate::list(*field, items))
                .map_err(|message| PagelensError::ParseError {
                    stage: stage.to_string(),
                    message,
                }),
            ParseRule::LineList(field) => Ok(PartialUpdate::list(*field, parse_lines(text))),
        }
    }
}

/// Split a comma-separated list. Empty text yields an empty list.
///
/// Text spread over several lines (a numbered or bulleted list, a preamble
/// followed by items) is rejected rather than guessed at.
pub fn parse_comma_list(text: &str) -> std::result::Result<Vec<String>, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let lines = trimmed.lines().filter(|l| !l.trim().is_empty()).count();
    if lines > 1 {
        return Err(format!(
            "expected a single-line comma-separated list, got {lines} lines"
        ));
    }

    Ok(trimmed
        .split(", ")
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect())
}

/// Split text into trimmed, non-blank lines.
pub fn parse_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

// ---------------------------------------------------------------------------
// PromptStage
// ---------------------------------------------------------------------------

/// A stage built from a prompt template and a parse rule.
#[derive(Debug, Clone)]
pub struct PromptStage {
    name: String,
    requires: BTreeSet<Field>,
    produces: BTreeSet<Field>,
    template: PromptTemplate,
    rule: ParseRule,
}

impl PromptStage {
    pub fn new(
        name: impl Into<String>,
        requires: impl IntoIterator<Item = Field>,
        template: impl Into<String>,
        rule: ParseRule,
    ) -> Self {
        Self {
            name: name.into(),
            requires: requires.into_iter().collect(),
            produces: BTreeSet::from([rule.field()]),
            template: PromptTemplate::new(template),
            rule,
        }
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    pub fn rule(&self) -> ParseRule {
        self.rule
    }
}

impl Stage for PromptStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> &BTreeSet<Field> {
        &self.requires
    }

    fn produces(&self) -> &BTreeSet<Field> {
        &self.produces
    }

    fn render(&self, state: &SharedState) -> Result<String> {
        self.template.render(&self.requires, state)
    }

    fn parse(&self, text: &str) -> Result<PartialUpdate> {
        self.rule.apply(&self.name, text)
    }

    fn placeholders(&self) -> Vec<String> {
        self.template.placeholders()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
