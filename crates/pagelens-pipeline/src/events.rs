//! Run events for observers.
//!
//! The executor publishes [`PipelineEvent`]s on a [`tokio::sync::broadcast`]
//! channel. Observers subscribe without touching executor internals; events
//! with no subscribers are dropped.

use serde::{Deserialize, Serialize};

use pagelens_types::Field;

/// Events emitted while a pipeline runs over one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    RunStarted {
        run_id: String,
        url: String,
        stage_count: usize,
    },
    StageStarted {
        run_id: String,
        stage: String,
    },
    StageCompleted {
        run_id: String,
        stage: String,
        fields: Vec<Field>,
        duration_ms: u64,
    },
    StageSkipped {
        run_id: String,
        stage: String,
        missing_field: Field,
    },
    StageFailed {
        run_id: String,
        stage: String,
        error: String,
    },
    RunCompleted {
        run_id: String,
        completed_stages: Vec<String>,
        failures: usize,
        duration_ms: u64,
    },
    RunAborted {
        run_id: String,
        stage: String,
        error: String,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<PipelineEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
