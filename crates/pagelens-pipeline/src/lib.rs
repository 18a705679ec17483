//! Staged analysis pipeline for a single scraped page.
//!
//! This crate implements the pagelens pipeline: the `Stage` contract, the nine
//! built-in analysis stages, pipeline definitions with a static dependency
//! check at build time, and the sequential executor with its failure policy.

pub mod engine;
pub mod events;
pub mod pipeline;
pub mod stage;
pub mod stages;
pub mod validation;

pub use engine::{FailurePolicy, PipelineConfig, PipelineExecutor, RunReport};
pub use events::{EventEmitter, PipelineEvent};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use stage::{parse_comma_list, parse_lines, ParseRule, PromptStage, PromptTemplate, Stage};
pub use validation::{validate, validate_or_raise, Diagnostic, LintRule, Severity};
