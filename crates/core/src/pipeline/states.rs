use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::decision::StrategistDecision;
use crate::domain::execution::ExecutionResult;
use crate::domain::report::AnalystReport;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Analyze,
    Strategize,
    Execute,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::Strategize => "strategize",
            Self::Execute => "execute",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Analyze,
    Strategize,
    Execute,
    Completed,
    Aborted,
}

impl PipelineState {
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            Self::Analyze => Some(StageKind::Analyze),
            Self::Strategize => Some(StageKind::Strategize),
            Self::Execute => Some(StageKind::Execute),
            Self::Completed | Self::Aborted => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineEvent {
    ReportProduced,
    DecisionsRecorded,
    ExecutionFinished,
    StageFailed,
}

/// Raw text a stage produced, handed to the next stage as context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTranscript {
    pub stage: StageKind,
    pub output: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineContext {
    pub run_id: Uuid,
    pub state: PipelineState,
    pub report: Option<AnalystReport>,
    pub decisions: Option<Vec<StrategistDecision>>,
    pub result: Option<ExecutionResult>,
    pub transcripts: Vec<StageTranscript>,
    pub failure: Option<String>,
}

impl PipelineContext {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            state: PipelineState::Analyze,
            report: None,
            decisions: None,
            result: None,
            transcripts: Vec::new(),
            failure: None,
        }
    }

    pub fn transcript(&self, stage: StageKind) -> Option<&str> {
        self.transcripts
            .iter()
            .rev()
            .find(|transcript| transcript.stage == stage)
            .map(|transcript| transcript.output.as_str())
    }

    pub fn record_transcript(&mut self, stage: StageKind, output: impl Into<String>) {
        self.transcripts.push(StageTranscript { stage, output: output.into() });
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: PipelineState,
    pub to: PipelineState,
    pub event: PipelineEvent,
}
