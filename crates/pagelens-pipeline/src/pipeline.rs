//! Validated, immutable stage sequences.

use std::collections::BTreeSet;

use pagelens_types::{Field, Result};

use crate::stage::Stage;
use crate::stages;
use crate::validation::{validate_or_raise, Severity};

/// An ordered stage sequence that passed static validation.
///
/// Besides the stages themselves, each position records whether any later
/// stage reads one of its outputs. Such a stage is a dependency root: if it
/// fails, its dependents cannot run.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    dependency_roots: Vec<bool>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// All nine analysis stages.
    pub fn standard() -> Result<Self> {
        stages::standard()
            .into_iter()
            .fold(Self::builder(), |b, s| b.stage(s))
            .build()
    }

    /// Classification, summary, tags and related topics only.
    pub fn minimal() -> Result<Self> {
        stages::minimal()
            .into_iter()
            .fold(Self::builder(), |b, s| b.stage(s))
            .build()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stages(&self) -> impl Iterator<Item = &dyn Stage> {
        self.stages.iter().map(|s| s.as_ref())
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// `true` if a later stage requires one of this stage's outputs.
    pub fn is_dependency_root(&self, index: usize) -> bool {
        self.dependency_roots.get(index).copied().unwrap_or(false)
    }

    /// Every field some stage in this pipeline writes.
    pub fn produced_fields(&self) -> BTreeSet<Field> {
        self.stages
            .iter()
            .flat_map(|s| s.produces().iter().copied())
            .collect()
    }
}

#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<Box<dyn Stage>>,
}

impl PipelineBuilder {
    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn boxed(mut self, stage: Box<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Validate the sequence and freeze it.
    ///
    /// Fails with `PipelineDefinition` if any stage requires a field that is
    /// neither a base field nor produced by an earlier stage, among other
    /// structural errors.
    pub fn build(self) -> Result<Pipeline> {
        let diagnostics = validate_or_raise(&self.stages)?;
        for d in diagnostics.iter().filter(|d| d.severity == Severity::Warning) {
            tracing::warn!(rule = %d.rule, "{}", d.message);
        }

        let dependency_roots = self
            .stages
            .iter()
            .enumerate()
            .map(|(idx, stage)| {
                self.stages[idx + 1..]
                    .iter()
                    .any(|later| !later.requires().is_disjoint(stage.produces()))
            })
            .collect();

        Ok(Pipeline {
            stages: self.stages,
            dependency_roots,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{EXTRACT_TAGS, SUGGEST_TOPICS};
    use pagelens_types::PagelensError;

    #[test]
    fn standard_has_nine_stages() {
        let p = Pipeline::standard().unwrap();
        assert_eq!(p.len(), 9);
        assert_eq!(p.stage_names()[3], SUGGEST_TOPICS);
        assert_eq!(p.produced_fields().len(), 9);
    }

    #[test]
    fn minimal_has_four_stages() {
        let p = Pipeline::minimal().unwrap();
        assert_eq!(
            p.stage_names(),
            vec!["classify", "summarize", EXTRACT_TAGS, SUGGEST_TOPICS]
        );
    }

    #[test]
    fn only_extract_tags_is_a_dependency_root() {
        let p = Pipeline::standard().unwrap();
        let roots: Vec<&str> = (0..p.len())
            .filter(|i| p.is_dependency_root(*i))
            .map(|i| p.stage_names()[i])
            .collect();
        assert_eq!(roots, vec![EXTRACT_TAGS]);
        assert!(!p.is_dependency_root(99));
    }

    #[test]
    fn misordered_sequence_fails_at_build() {
        let err = Pipeline::builder()
            .stage(stages::classify())
            .stage(stages::suggest_topics())
            .stage(stages::extract_tags())
            .build()
            .unwrap_err();
        match err {
            PagelensError::PipelineDefinition(msg) => {
                assert!(msg.contains("suggest_topics"), "{msg}")
            }
            other => panic!("expected PipelineDefinition, got {other:?}"),
        }
    }

    #[test]
    fn empty_pipeline_builds() {
        let p = Pipeline::builder().build().unwrap();
        assert!(p.is_empty());
    }
}
