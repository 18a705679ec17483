//! Pipeline execution engine: runs a validated stage sequence over one page.
//!
//! Stages run one at a time in declaration order. Each run owns a fresh
//! [`SharedState`] and failure ledger; the executor itself holds no mutable
//! state, so a single executor can serve concurrent runs.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pagelens_llm::TextGenerator;
use pagelens_types::{
    Field, PagelensError, PartialUpdate, Result, SharedState, StageFailure,
};

use crate::events::{EventEmitter, PipelineEvent};
use crate::pipeline::Pipeline;
use crate::stage::Stage;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// What the executor does when a stage cannot contribute its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Abort on the first skipped or failed stage.
    FailFast,
    /// Record every failure and keep going.
    FailSoft,
    /// Keep going past independent stages; abort when a stage whose outputs
    /// a later stage requires fails.
    #[default]
    DependencyAware,
}

impl FailurePolicy {
    /// Whether a generation or parse failure of a stage ends the run.
    pub fn aborts_on_failure(&self, dependency_root: bool) -> bool {
        match self {
            FailurePolicy::FailFast => true,
            FailurePolicy::FailSoft => false,
            FailurePolicy::DependencyAware => dependency_root,
        }
    }

    /// Whether a skipped stage ends the run.
    pub fn aborts_on_skip(&self) -> bool {
        matches!(self, FailurePolicy::FailFast)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::FailFast => "fail-fast",
            FailurePolicy::FailSoft => "fail-soft",
            FailurePolicy::DependencyAware => "dependency-aware",
        }
    }
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "fail-fast" => Ok(FailurePolicy::FailFast),
            "fail-soft" => Ok(FailurePolicy::FailSoft),
            "dependency-aware" => Ok(FailurePolicy::DependencyAware),
            other => Err(format!(
                "unknown failure policy '{other}' (expected fail-fast, fail-soft or dependency-aware)"
            )),
        }
    }
}

/// Configuration for pipeline runs.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub policy: FailurePolicy,
}

/// The outcome of one run.
///
/// `state` holds every field that was produced; `failures` lists the stages
/// that contributed nothing, in execution order. An aborted run keeps both,
/// with the stage that ended it in `aborted`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub state: SharedState,
    pub failures: Vec<StageFailure>,
    pub completed_stages: Vec<String>,
    pub aborted: Option<StageFailure>,
}

impl RunReport {
    /// `true` if every stage contributed its fields.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.aborted.is_none()
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    pub fn url(&self) -> &str {
        self.state.url()
    }
}

/// Per-run bookkeeping; never shared between runs.
#[derive(Debug, Default)]
struct RunLedger {
    failures: Vec<StageFailure>,
    completed: Vec<String>,
}

/// The core pipeline executor.
pub struct PipelineExecutor {
    pipeline: Pipeline,
    config: PipelineConfig,
    generator: Arc<dyn TextGenerator>,
    events: Option<EventEmitter>,
}

// ---------------------------------------------------------------------------
// PipelineExecutor
// ---------------------------------------------------------------------------

impl PipelineExecutor {
    pub fn new(pipeline: Pipeline, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            pipeline,
            config: PipelineConfig::default(),
            generator,
            events: None,
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Build the initial state from fetched text and run every stage over it.
    ///
    /// Blank text fails with an `EmptyContent` fetch error before any stage
    /// runs.
    pub async fn run_page(&self, url: &str, scraped_content: &str) -> Result<RunReport> {
        let state = SharedState::new(url, scraped_content)?;
        Ok(self.run(state).await)
    }

    /// Run every stage over `state`, in order.
    ///
    /// A run ends early on a fail-fast stop, a failed dependency root under
    /// `DependencyAware`, or a contract violation (under any policy). The
    /// report then carries the cause in `aborted`, alongside every field and
    /// ledger entry recorded before it.
    pub async fn run(&self, mut state: SharedState) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();

        tracing::info!(
            %run_id,
            url = state.url(),
            stages = self.pipeline.len(),
            policy = %self.config.policy,
            "Pipeline run started"
        );
        self.emit(PipelineEvent::RunStarted {
            run_id: run_id.to_string(),
            url: state.url().to_string(),
            stage_count: self.pipeline.len(),
        });

        let mut ledger = RunLedger::default();
        let aborted = self.execute(run_id, &mut state, &mut ledger).await.err();
        let duration_ms = clock.elapsed().as_millis() as u64;

        match aborted {
            Some(ref cause) => {
                tracing::error!(
                    %run_id,
                    stage = %cause.stage,
                    completed = ledger.completed.len(),
                    error = %cause.message,
                    "Pipeline run aborted"
                );
                self.emit(PipelineEvent::RunAborted {
                    run_id: run_id.to_string(),
                    stage: cause.stage.clone(),
                    error: cause.message.clone(),
                });
            }
            None => {
                tracing::info!(
                    %run_id,
                    completed = ledger.completed.len(),
                    failures = ledger.failures.len(),
                    duration_ms,
                    "Pipeline run finished"
                );
                self.emit(PipelineEvent::RunCompleted {
                    run_id: run_id.to_string(),
                    completed_stages: ledger.completed.clone(),
                    failures: ledger.failures.len(),
                    duration_ms,
                });
            }
        }

        RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            state,
            failures: ledger.failures,
            completed_stages: ledger.completed,
            aborted,
        }
    }

    /// Runs stages until the end or the first aborting failure, which is
    /// returned as `Err`.
    async fn execute(
        &self,
        run_id: Uuid,
        state: &mut SharedState,
        ledger: &mut RunLedger,
    ) -> std::result::Result<(), StageFailure> {
        for (index, stage) in self.pipeline.stages().enumerate() {
            let name = stage.name();

            if let Some(missing) = first_unsatisfied(stage, state) {
                let failure = StageFailure::skipped(name, missing);
                tracing::warn!(%run_id, stage = name, field = %missing, "Stage skipped");
                self.emit(PipelineEvent::StageSkipped {
                    run_id: run_id.to_string(),
                    stage: name.to_string(),
                    missing_field: missing,
                });
                if self.config.policy.aborts_on_skip() {
                    return Err(failure);
                }
                ledger.failures.push(failure);
                continue;
            }

            // A render failure means the stage reads something it never
            // declared; it aborts like an ownership violation.
            let prompt = match stage.render(state) {
                Ok(prompt) => prompt,
                Err(err) => return Err(self.stage_failed(run_id, name, err)),
            };

            tracing::debug!(%run_id, stage = name, prompt_chars = prompt.len(), "Stage started");
            self.emit(PipelineEvent::StageStarted {
                run_id: run_id.to_string(),
                stage: name.to_string(),
            });
            let stage_clock = Instant::now();

            match self.generate_and_parse(stage, &prompt).await {
                Ok(update) => {
                    let fields: Vec<Field> = update.fields().collect();
                    if let Err(err) = state.merge(name, stage.produces(), update) {
                        return Err(self.stage_failed(run_id, name, err));
                    }
                    let duration_ms = stage_clock.elapsed().as_millis() as u64;
                    tracing::info!(%run_id, stage = name, duration_ms, "Stage completed");
                    self.emit(PipelineEvent::StageCompleted {
                        run_id: run_id.to_string(),
                        stage: name.to_string(),
                        fields,
                        duration_ms,
                    });
                    ledger.completed.push(name.to_string());
                }
                Err(err) => {
                    if self
                        .config
                        .policy
                        .aborts_on_failure(self.pipeline.is_dependency_root(index))
                    {
                        return Err(self.stage_failed(run_id, name, err));
                    }
                    self.emit(PipelineEvent::StageFailed {
                        run_id: run_id.to_string(),
                        stage: name.to_string(),
                        error: err.to_string(),
                    });
                    tracing::warn!(%run_id, stage = name, error = %err, "Stage failed, continuing");
                    ledger.failures.push(StageFailure::from_error(name, &err));
                }
            }
        }

        Ok(())
    }

    /// Announce a stage failure that ends the run.
    fn stage_failed(&self, run_id: Uuid, stage: &str, err: PagelensError) -> StageFailure {
        self.emit(PipelineEvent::StageFailed {
            run_id: run_id.to_string(),
            stage: stage.to_string(),
            error: err.to_string(),
        });
        StageFailure::aborted(stage, err)
    }

    /// The only effectful step of a stage: one generation call, then parse.
    async fn generate_and_parse(&self, stage: &dyn Stage, prompt: &str) -> Result<PartialUpdate> {
        let text = self.generator.generate(prompt).await?;
        let update = stage.parse(&text)?;

        // A stage's fields are written whole or not at all.
        if let Some(field) = stage.produces().iter().find(|f| update.get(**f).is_none()) {
            return Err(PagelensError::ParseError {
                stage: stage.name().to_string(),
                message: format!("parsed output is missing field '{field}'"),
            });
        }
        Ok(update)
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(ref events) = self.events {
            events.emit(event);
        }
    }
}

fn first_unsatisfied(stage: &dyn Stage, state: &SharedState) -> Option<Field> {
    stage
        .requires()
        .iter()
        .copied()
        .find(|f| !state.is_satisfied(*f))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
