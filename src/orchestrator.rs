//! Workflow orchestrator: drives the ordered step list to completion.
//!
//! The orchestrator is the sole mutator of workflow status, the current
//! step index, and the execution logs. It runs exactly one step at a time
//! and pauses after every step — completed or failed — for human
//! confirmation. There is no automatic advance: `continue_from` is always
//! an explicit call, so a user can edit low-quality output before it feeds
//! the next step. That gate is a hard invariant of the engine, not a UI
//! nicety.
//!
//! State machine per run: idle → running → paused → running → … →
//! completed, with a failed-log branch at the step level that routes back
//! to paused (allowing `retry`) rather than aborting the run.

use crate::agent::{AgentRoster, StoryAgent};
use crate::artifact::ArtifactStore;
use crate::errors::WorkflowError;
use crate::events::{EventSink, WorkflowEvent};
use crate::executor::StepExecutor;
use crate::gateway::LlmGateway;
use crate::session::{StepStatus, WorkflowSession, WorkflowStatus};
use crate::step::{StepValidation, WorkflowStep};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Result of driving one step (or finishing the workflow).
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The step completed; the workflow is paused for confirmation.
    StepCompleted { index: usize },
    /// The step failed; the workflow is paused for an explicit retry.
    StepFailed { index: usize, error: String },
    /// The last step had already completed; the workflow is done.
    WorkflowCompleted,
}

/// Direction for adjacent-swap reordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

impl std::fmt::Display for MoveDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MoveDirection::Up => write!(f, "up"),
            MoveDirection::Down => write!(f, "down"),
        }
    }
}

/// Field-by-field step edit. `None` leaves a field untouched; the
/// double-`Option` fields distinguish "leave alone" from "clear".
#[derive(Debug, Clone, Default)]
pub struct StepEdit {
    pub name: Option<String>,
    pub agent_id: Option<String>,
    pub instruction: Option<String>,
    pub validation: Option<Option<StepValidation>>,
    pub artifact_kind: Option<Option<crate::step::ArtifactKind>>,
}

/// The workflow engine: session state, step list, personas, and the
/// executor, behind explicit operations.
pub struct Orchestrator {
    session: WorkflowSession,
    steps: Vec<WorkflowStep>,
    roster: AgentRoster,
    executor: StepExecutor,
    gateway: Arc<dyn LlmGateway>,
    artifacts: ArtifactStore,
    sink: Option<Arc<dyn EventSink>>,
    /// Long-lived token a host cancels to stop the whole engine (ctrl-c).
    shutdown: CancellationToken,
    /// Child of `shutdown`, replaced at each step run so a cancelled step
    /// can still be retried.
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(gateway: Arc<dyn LlmGateway>, roster: AgentRoster, steps: Vec<WorkflowStep>) -> Self {
        let shutdown = CancellationToken::new();
        Self {
            executor: StepExecutor::new(gateway.clone()),
            gateway,
            roster,
            steps,
            session: WorkflowSession::new(),
            artifacts: ArtifactStore::new(),
            sink: None,
            cancel: shutdown.child_token(),
            shutdown,
        }
    }

    /// Resume from a persisted session (the host loads the world document).
    pub fn with_session(mut self, session: WorkflowSession) -> Self {
        self.session = session;
        self
    }

    /// Resume with previously persisted artifacts.
    pub fn with_artifacts(mut self, artifacts: ArtifactStore) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Attach a best-effort lifecycle event sink.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.executor = StepExecutor::new(self.gateway.clone()).with_sink(sink.clone());
        self.sink = Some(sink);
        self
    }

    // ---- read access for hosts (persistence, UI) ----

    pub fn session(&self) -> &WorkflowSession {
        &self.session
    }

    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    pub fn roster(&self) -> &AgentRoster {
        &self.roster
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn status(&self) -> WorkflowStatus {
        self.session.status
    }

    // ---- public operations ----

    /// Start a fresh run seeded by `guidance`.
    ///
    /// Preconditions: gateway configured, guidance non-empty, at least one
    /// step, and status idle or completed. Violations reject without
    /// mutating any state. Clears all logs and outputs, then runs step 0
    /// with input = most recent story content (if any) plus the guidance.
    pub async fn start(&mut self, guidance: &str) -> Result<RunOutcome, WorkflowError> {
        if !self.gateway.is_configured() {
            return Err(WorkflowError::GatewayNotConfigured);
        }
        if guidance.trim().is_empty() {
            return Err(WorkflowError::EmptyGuidance);
        }
        if self.steps.is_empty() {
            return Err(WorkflowError::NoSteps);
        }
        if !matches!(
            self.session.status,
            WorkflowStatus::Idle | WorkflowStatus::Completed
        ) {
            return Err(WorkflowError::wrong_status("start", self.session.status));
        }

        self.session.clear_run();
        self.session.story_guidance = guidance.trim().to_string();
        let input = self.first_step_input();
        tracing::info!(steps = self.steps.len(), "workflow run started");
        self.run_step(0, input).await
    }

    /// Advance past a completed step.
    ///
    /// Requires status paused and a completed log for `from_index`; calling
    /// it earlier is a rejected no-op. When `from_index` is the last step,
    /// the workflow transitions to completed instead of running anything.
    pub async fn continue_from(&mut self, from_index: usize) -> Result<RunOutcome, WorkflowError> {
        let step = self
            .steps
            .get(from_index)
            .ok_or(WorkflowError::StepOutOfRange {
                index: from_index,
                len: self.steps.len(),
            })?;
        if self.session.status != WorkflowStatus::Paused {
            return Err(WorkflowError::wrong_status("continue", self.session.status));
        }
        let log = self
            .session
            .log(&step.id)
            .ok_or(WorkflowError::StepNotCompleted { index: from_index })?;
        if log.status != StepStatus::Completed {
            return Err(WorkflowError::StepNotCompleted { index: from_index });
        }

        if from_index + 1 == self.steps.len() {
            self.session.status = WorkflowStatus::Completed;
            tracing::info!("workflow run completed");
            return Ok(RunOutcome::WorkflowCompleted);
        }

        let input = self.step_input(from_index + 1)?;
        self.run_step(from_index + 1, input).await
    }

    /// Re-run a step with the same input it originally received, recomputed
    /// from the prior step's stored output (or the guidance for step 0).
    ///
    /// Allowed from any non-running status for a step that has a log:
    /// failed steps for recovery, completed steps for an explicit re-run
    /// (which appends a fresh artifact).
    pub async fn retry(&mut self, index: usize) -> Result<RunOutcome, WorkflowError> {
        let step = self.steps.get(index).ok_or(WorkflowError::StepOutOfRange {
            index,
            len: self.steps.len(),
        })?;
        if self.session.status == WorkflowStatus::Running {
            return Err(WorkflowError::wrong_status("retry", self.session.status));
        }
        if self.session.log(&step.id).is_none() {
            return Err(WorkflowError::NothingToRetry { index });
        }

        let input = self.step_input(index)?;
        self.run_step(index, input).await
    }

    /// Accept the final content into the story: append to the active
    /// segment (or create one), clear the guidance, and return to idle.
    pub fn apply_result(&mut self, content: &str) -> Result<usize, WorkflowError> {
        if self.session.status == WorkflowStatus::Running {
            return Err(WorkflowError::wrong_status("apply result", self.session.status));
        }
        let title = segment_title(&self.session.story_guidance);
        let index = self.session.append_to_story(&title, content);
        self.session.story_guidance.clear();
        self.session.status = WorkflowStatus::Idle;
        tracing::info!(segment = index, "result applied to story");
        Ok(index)
    }

    /// Request cooperative cancellation of the in-flight step. The step is
    /// recorded as failed at the next await boundary and the workflow
    /// pauses; `retry` is the recovery path.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token a host cancels to stop the engine for good (e.g. on ctrl-c).
    /// Unlike [`Orchestrator::cancel`], this also covers future step runs.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Overwrite the accepted output of a completed step. This is the
    /// host's edit hook between steps; the edited text feeds the next step
    /// on `continue_from`.
    pub fn set_step_output(&mut self, index: usize, content: &str) -> Result<(), WorkflowError> {
        let step = self.steps.get(index).ok_or(WorkflowError::StepOutOfRange {
            index,
            len: self.steps.len(),
        })?;
        if self.session.status == WorkflowStatus::Running {
            return Err(WorkflowError::wrong_status("edit output", self.session.status));
        }
        match self.session.log(&step.id) {
            Some(log) if log.status == StepStatus::Completed => {
                self.session
                    .step_outputs
                    .insert(step.id.clone(), content.to_string());
                Ok(())
            }
            _ => Err(WorkflowError::StepNotCompleted { index }),
        }
    }

    /// Edit an artifact's content (debounce and save tracking belong to the
    /// host, see [`crate::artifact::SaveTracker`]).
    pub fn edit_artifact(&mut self, id: uuid::Uuid, content: &str) -> bool {
        self.artifacts.edit(id, content)
    }

    /// Update the world-context digest included in every generation prompt.
    pub fn set_world_digest(&mut self, digest: &str) {
        self.session.world_digest = digest.to_string();
    }

    /// Reset the whole run state: session, logs, outputs, artifacts.
    pub fn reset(&mut self) -> Result<(), WorkflowError> {
        if self.session.status == WorkflowStatus::Running {
            return Err(WorkflowError::wrong_status("reset", self.session.status));
        }
        self.session.reset();
        self.artifacts.clear();
        Ok(())
    }

    // ---- step list mutation (idle or paused only) ----

    pub fn add_step(&mut self, step: WorkflowStep) -> Result<(), WorkflowError> {
        self.check_editable("add step")?;
        self.steps.push(step);
        Ok(())
    }

    pub fn remove_step(&mut self, index: usize) -> Result<WorkflowStep, WorkflowError> {
        self.check_editable("remove step")?;
        if index >= self.steps.len() {
            return Err(WorkflowError::StepOutOfRange {
                index,
                len: self.steps.len(),
            });
        }
        Ok(self.steps.remove(index))
    }

    /// Swap a step with its neighbor. Ids are never renumbered, so logs,
    /// outputs, and artifacts stay attached to their steps.
    pub fn reorder_step(
        &mut self,
        index: usize,
        direction: MoveDirection,
    ) -> Result<(), WorkflowError> {
        self.check_editable("reorder step")?;
        if index >= self.steps.len() {
            return Err(WorkflowError::StepOutOfRange {
                index,
                len: self.steps.len(),
            });
        }
        let neighbor = match direction {
            MoveDirection::Up => index.checked_sub(1),
            MoveDirection::Down => {
                if index + 1 < self.steps.len() {
                    Some(index + 1)
                } else {
                    None
                }
            }
        };
        let neighbor = neighbor.ok_or_else(|| WorkflowError::InvalidReorder {
            index,
            direction: direction.to_string(),
        })?;
        self.steps.swap(index, neighbor);
        Ok(())
    }

    pub fn edit_step(&mut self, index: usize, edit: StepEdit) -> Result<(), WorkflowError> {
        self.check_editable("edit step")?;
        let len = self.steps.len();
        let step = self
            .steps
            .get_mut(index)
            .ok_or(WorkflowError::StepOutOfRange { index, len })?;
        if let Some(name) = edit.name {
            step.name = name;
        }
        if let Some(agent_id) = edit.agent_id {
            step.agent_id = agent_id;
        }
        if let Some(instruction) = edit.instruction {
            step.instruction = instruction;
        }
        if let Some(validation) = edit.validation {
            step.validation = validation;
        }
        if let Some(kind) = edit.artifact_kind {
            step.artifact_kind = kind;
        }
        Ok(())
    }

    fn check_editable(&self, operation: &str) -> Result<(), WorkflowError> {
        match self.session.status {
            WorkflowStatus::Idle | WorkflowStatus::Paused => Ok(()),
            status => Err(WorkflowError::wrong_status(operation, status)),
        }
    }

    // ---- internals ----

    /// Input for step 0: the latest accepted story content (if any)
    /// followed by the guidance.
    fn first_step_input(&self) -> String {
        match self.session.latest_segment_content() {
            Some(prior) if !prior.is_empty() => {
                format!("{}\n\n{}", prior, self.session.story_guidance)
            }
            _ => self.session.story_guidance.clone(),
        }
    }

    /// Recompute the input a step originally received.
    fn step_input(&self, index: usize) -> Result<String, WorkflowError> {
        if index == 0 {
            return Ok(self.first_step_input());
        }
        let prior = &self.steps[index - 1];
        self.session
            .step_outputs
            .get(&prior.id)
            .cloned()
            .ok_or(WorkflowError::StepNotCompleted { index: index - 1 })
    }

    fn resolve_personas(
        &self,
        step: &WorkflowStep,
    ) -> Result<(StoryAgent, Option<StoryAgent>), WorkflowError> {
        let agent = self
            .roster
            .get(&step.agent_id)
            .cloned()
            .ok_or_else(|| WorkflowError::UnknownAgent {
                id: step.agent_id.clone(),
            })?;
        let reviewer = match &step.validation {
            Some(validation) => Some(
                self.roster
                    .get(&validation.reviewer_id)
                    .cloned()
                    .ok_or_else(|| WorkflowError::UnknownAgent {
                        id: validation.reviewer_id.clone(),
                    })?,
            ),
            None => None,
        };
        Ok((agent, reviewer))
    }

    /// Drive one step, then pause. The only place that sets `Running`.
    async fn run_step(&mut self, index: usize, input: String) -> Result<RunOutcome, WorkflowError> {
        let step = self.steps[index].clone();
        let (agent, reviewer_agent) = self.resolve_personas(&step)?;

        self.cancel = self.shutdown.child_token();
        self.session.status = WorkflowStatus::Running;
        self.session.current_step_index = index as i32;
        // Discard any prior log for this step; the run record is fresh.
        self.session.logs.remove(&step.id);
        self.emit(WorkflowEvent::Started {
            step_id: step.id.clone(),
            step_index: index,
        });

        let cancel = self.cancel.clone();
        let run = self
            .executor
            .execute(
                &step,
                &agent,
                reviewer_agent.as_ref(),
                &input,
                &self.session.world_digest,
                &cancel,
            )
            .await;

        let outcome = match run.accepted_output {
            Some(output) => {
                self.session
                    .step_outputs
                    .insert(step.id.clone(), output.clone());
                self.artifacts.create(
                    &step.id,
                    &step.name,
                    step.artifact_kind.unwrap_or_default(),
                    &output,
                );
                self.emit(WorkflowEvent::Completed {
                    step_id: step.id.clone(),
                    step_index: index,
                });
                RunOutcome::StepCompleted { index }
            }
            None => {
                let error = run
                    .log
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string());
                self.emit(WorkflowEvent::Failed {
                    step_id: step.id.clone(),
                    error: error.clone(),
                });
                RunOutcome::StepFailed { index, error }
            }
        };

        self.session.logs.insert(step.id.clone(), run.log);
        // Pause invariant: every step ending yields control to the user.
        self.session.status = WorkflowStatus::Paused;
        Ok(outcome)
    }

    fn emit(&self, event: WorkflowEvent) {
        if let Some(sink) = &self.sink {
            sink.on_event(&event);
        }
    }
}

/// Derive a display title for a new segment from the guidance text.
fn segment_title(guidance: &str) -> String {
    let trimmed = guidance.trim();
    if trimmed.is_empty() {
        return "Untitled segment".to_string();
    }
    const MAX: usize = 48;
    if trimmed.chars().count() <= MAX {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(MAX).collect();
        format!("{}…", cut.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::default_agents;
    use crate::errors::GatewayError;
    use crate::gateway::GenerateRequest;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedGateway {
        script: Mutex<VecDeque<Result<String, String>>>,
        calls: Mutex<Vec<GenerateRequest>>,
    }

    impl ScriptedGateway {
        fn new(script: Vec<Result<&str, &str>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(
                    script
                        .into_iter()
                        .map(|r| r.map(String::from).map_err(String::from))
                        .collect(),
                ),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmGateway for ScriptedGateway {
        async fn generate(&self, request: &GenerateRequest) -> Result<String, GatewayError> {
            self.calls.lock().unwrap().push(request.clone());
            match self.script.lock().unwrap().pop_front() {
                Some(Ok(text)) => Ok(text),
                Some(Err(message)) => Err(GatewayError::Api {
                    status: 503,
                    message,
                }),
                None => panic!("gateway called more times than scripted"),
            }
        }
    }

    /// Gateway that reports missing credentials.
    struct UnconfiguredGateway;

    #[async_trait]
    impl LlmGateway for UnconfiguredGateway {
        async fn generate(&self, _request: &GenerateRequest) -> Result<String, GatewayError> {
            Err(GatewayError::MissingCredentials {
                env_var: "LOOM_API_KEY".into(),
            })
        }

        fn is_configured(&self) -> bool {
            false
        }
    }

    fn two_step_workflow() -> Vec<WorkflowStep> {
        vec![
            WorkflowStep::new("Concept", "concept-writer", "develop the concept"),
            WorkflowStep::new("Outline", "outliner", "outline the concept").with_validation(
                StepValidation::new("story-editor", "scenes have viewpoints", 2),
            ),
        ]
    }

    fn orchestrator(script: Vec<Result<&str, &str>>) -> (Orchestrator, Arc<ScriptedGateway>) {
        let gateway = ScriptedGateway::new(script);
        let orch = Orchestrator::new(
            gateway.clone(),
            AgentRoster::new(default_agents()),
            two_step_workflow(),
        );
        (orch, gateway)
    }

    // ── start preconditions ───────────────────────────────────────────────

    #[tokio::test]
    async fn start_rejects_empty_guidance_without_mutating_state() {
        let (mut orch, gateway) = orchestrator(vec![]);
        let err = orch.start("   ").await.unwrap_err();
        assert!(matches!(err, WorkflowError::EmptyGuidance));
        assert_eq!(orch.status(), WorkflowStatus::Idle);
        assert_eq!(orch.session().current_step_index, -1);
        assert_eq!(gateway.calls.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn start_rejects_unconfigured_gateway() {
        let mut orch = Orchestrator::new(
            Arc::new(UnconfiguredGateway),
            AgentRoster::new(default_agents()),
            two_step_workflow(),
        );
        let err = orch.start("write about a drought").await.unwrap_err();
        assert!(matches!(err, WorkflowError::GatewayNotConfigured));
        assert_eq!(orch.status(), WorkflowStatus::Idle);
    }

    #[tokio::test]
    async fn start_rejects_while_paused() {
        let (mut orch, _) = orchestrator(vec![Ok("concept text")]);
        orch.start("write about a drought").await.unwrap();
        assert_eq!(orch.status(), WorkflowStatus::Paused);

        let err = orch.start("another run").await.unwrap_err();
        assert!(matches!(err, WorkflowError::WrongStatus { .. }));
    }

    #[tokio::test]
    async fn start_rejects_empty_workflow() {
        let gateway = ScriptedGateway::new(vec![]);
        let mut orch =
            Orchestrator::new(gateway, AgentRoster::new(default_agents()), Vec::new());
        let err = orch.start("guidance").await.unwrap_err();
        assert!(matches!(err, WorkflowError::NoSteps));
    }

    // ── pause invariant and sequencing ────────────────────────────────────

    #[tokio::test]
    async fn completed_step_pauses_and_never_auto_advances() {
        let (mut orch, gateway) = orchestrator(vec![Ok("concept text")]);
        let outcome = orch.start("write about a drought").await.unwrap();

        assert_eq!(outcome, RunOutcome::StepCompleted { index: 0 });
        assert_eq!(orch.status(), WorkflowStatus::Paused);
        assert_eq!(orch.session().current_step_index, 0);
        // Only step 0's generation happened; step 1 was not invoked
        assert_eq!(gateway.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn continue_before_completion_is_rejected_noop() {
        let (mut orch, _) = orchestrator(vec![Ok("concept text")]);
        orch.start("guidance").await.unwrap();

        // Step 1 has no log yet; continuing from it must not run anything
        let err = orch.continue_from(1).await.unwrap_err();
        assert!(matches!(err, WorkflowError::StepNotCompleted { index: 1 }));
        assert_eq!(orch.status(), WorkflowStatus::Paused);
    }

    #[tokio::test]
    async fn continue_feeds_prior_output_to_next_step() {
        let (mut orch, gateway) = orchestrator(vec![
            Ok("concept text"),
            Ok("outline text"),
            Ok("VERDICT: PASS\nfine"),
        ]);
        orch.start("guidance").await.unwrap();
        let outcome = orch.continue_from(0).await.unwrap();

        assert_eq!(outcome, RunOutcome::StepCompleted { index: 1 });
        let calls = gateway.calls.lock().unwrap();
        assert_eq!(calls[1].input_context, "concept text");
    }

    #[tokio::test]
    async fn edited_output_feeds_the_next_step() {
        let (mut orch, gateway) = orchestrator(vec![
            Ok("concept text"),
            Ok("outline text"),
            Ok("VERDICT: PASS\nfine"),
        ]);
        orch.start("guidance").await.unwrap();
        orch.set_step_output(0, "concept text, hand-tuned").unwrap();
        orch.continue_from(0).await.unwrap();

        let calls = gateway.calls.lock().unwrap();
        assert_eq!(calls[1].input_context, "concept text, hand-tuned");
    }

    #[tokio::test]
    async fn continue_past_last_step_completes_workflow() {
        let (mut orch, _) = orchestrator(vec![
            Ok("concept text"),
            Ok("outline text"),
            Ok("VERDICT: PASS\nfine"),
        ]);
        orch.start("guidance").await.unwrap();
        orch.continue_from(0).await.unwrap();
        let outcome = orch.continue_from(1).await.unwrap();

        assert_eq!(outcome, RunOutcome::WorkflowCompleted);
        assert_eq!(orch.status(), WorkflowStatus::Completed);
    }

    // ── failure handling and retry ────────────────────────────────────────

    #[tokio::test]
    async fn failed_step_pauses_with_error_and_no_artifact() {
        let (mut orch, _) = orchestrator(vec![Err("connection reset")]);
        let outcome = orch.start("guidance").await.unwrap();

        match outcome {
            RunOutcome::StepFailed { index, error } => {
                assert_eq!(index, 0);
                assert!(error.contains("connection reset"));
            }
            other => panic!("expected StepFailed, got {other:?}"),
        }
        assert_eq!(orch.status(), WorkflowStatus::Paused);
        let log = orch.session().log(&orch.steps()[0].id).unwrap();
        assert_eq!(log.status, StepStatus::Failed);
        assert!(orch.artifacts().is_empty());
    }

    #[tokio::test]
    async fn retry_reuses_the_original_input() {
        let (mut orch, gateway) = orchestrator(vec![Err("boom"), Ok("concept text")]);
        orch.start("write about a drought").await.unwrap();
        let outcome = orch.retry(0).await.unwrap();

        assert_eq!(outcome, RunOutcome::StepCompleted { index: 0 });
        let calls = gateway.calls.lock().unwrap();
        assert_eq!(calls[0].input_context, "write about a drought");
        assert_eq!(calls[1].input_context, "write about a drought");
    }

    #[tokio::test]
    async fn retry_without_log_is_rejected() {
        let (mut orch, _) = orchestrator(vec![]);
        let err = orch.retry(0).await.unwrap_err();
        assert!(matches!(err, WorkflowError::NothingToRetry { index: 0 }));
    }

    #[tokio::test]
    async fn retry_of_completed_step_appends_fresh_artifact() {
        let (mut orch, _) = orchestrator(vec![Ok("take one"), Ok("take two")]);
        orch.start("guidance").await.unwrap();
        orch.retry(0).await.unwrap();

        let step_id = orch.steps()[0].id.clone();
        let artifacts = orch.artifacts().for_step(&step_id);
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].content, "take one");
        assert_eq!(artifacts[1].content, "take two");
        // The fresh run discarded the prior log: one attempt, not two
        assert_eq!(orch.session().log(&step_id).unwrap().attempts.len(), 1);
    }

    // ── apply_result ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn apply_result_appends_segment_and_returns_to_idle() {
        let (mut orch, _) = orchestrator(vec![
            Ok("concept text"),
            Ok("outline text"),
            Ok("VERDICT: PASS\nfine"),
        ]);
        orch.start("write about a drought").await.unwrap();
        orch.continue_from(0).await.unwrap();
        orch.continue_from(1).await.unwrap();

        orch.apply_result("outline text").unwrap();
        assert_eq!(orch.status(), WorkflowStatus::Idle);
        assert!(orch.session().story_guidance.is_empty());
        assert_eq!(orch.session().segments.len(), 1);
        assert_eq!(orch.session().segments[0].content, "outline text");
        assert_eq!(orch.session().segments[0].title, "write about a drought");
    }

    #[tokio::test]
    async fn next_run_seeds_step_zero_with_latest_segment() {
        let (mut orch, gateway) = orchestrator(vec![
            Ok("concept text"),
            Ok("outline text"),
            Ok("VERDICT: PASS\nfine"),
            Ok("second concept"),
        ]);
        orch.start("first guidance").await.unwrap();
        orch.continue_from(0).await.unwrap();
        orch.continue_from(1).await.unwrap();
        orch.apply_result("chapter one prose").unwrap();

        orch.start("second guidance").await.unwrap();
        let calls = gateway.calls.lock().unwrap();
        assert_eq!(
            calls[3].input_context,
            "chapter one prose\n\nsecond guidance"
        );
    }

    // ── step list mutation guards ─────────────────────────────────────────

    #[tokio::test]
    async fn step_mutation_allowed_while_paused() {
        let (mut orch, _) = orchestrator(vec![Ok("concept text")]);
        orch.start("guidance").await.unwrap();

        orch.add_step(WorkflowStep::new("Epilogue", "prose-writer", "wrap up"))
            .unwrap();
        assert_eq!(orch.steps().len(), 3);
    }

    #[test]
    fn reorder_swaps_adjacent_and_keeps_ids() {
        let (mut orch, _) = orchestrator(vec![]);
        let ids: Vec<String> = orch.steps().iter().map(|s| s.id.clone()).collect();

        orch.reorder_step(0, MoveDirection::Down).unwrap();
        assert_eq!(orch.steps()[0].id, ids[1]);
        assert_eq!(orch.steps()[1].id, ids[0]);

        orch.reorder_step(1, MoveDirection::Up).unwrap();
        assert_eq!(orch.steps()[0].id, ids[0]);
    }

    #[test]
    fn reorder_at_edges_is_rejected() {
        let (mut orch, _) = orchestrator(vec![]);
        assert!(matches!(
            orch.reorder_step(0, MoveDirection::Up),
            Err(WorkflowError::InvalidReorder { .. })
        ));
        assert!(matches!(
            orch.reorder_step(1, MoveDirection::Down),
            Err(WorkflowError::InvalidReorder { .. })
        ));
    }

    #[test]
    fn edit_step_updates_only_requested_fields() {
        let (mut orch, _) = orchestrator(vec![]);
        orch.edit_step(
            0,
            StepEdit {
                instruction: Some("sharper concept".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(orch.steps()[0].instruction, "sharper concept");
        assert_eq!(orch.steps()[0].name, "Concept");
    }

    #[test]
    fn remove_step_out_of_range_is_rejected() {
        let (mut orch, _) = orchestrator(vec![]);
        assert!(matches!(
            orch.remove_step(9),
            Err(WorkflowError::StepOutOfRange { index: 9, len: 2 })
        ));
    }

    // ── misc ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn unknown_agent_is_rejected_before_any_call() {
        let gateway = ScriptedGateway::new(vec![]);
        let steps = vec![WorkflowStep::new("Concept", "nobody", "write")];
        let mut orch =
            Orchestrator::new(gateway.clone(), AgentRoster::new(default_agents()), steps);
        let err = orch.start("guidance").await.unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownAgent { .. }));
        assert_eq!(gateway.calls.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn reset_clears_session_and_artifacts() {
        let (mut orch, _) = orchestrator(vec![Ok("concept text")]);
        orch.start("guidance").await.unwrap();
        assert_eq!(orch.artifacts().len(), 1);

        orch.reset().unwrap();
        assert_eq!(orch.status(), WorkflowStatus::Idle);
        assert!(orch.session().logs.is_empty());
        assert!(orch.artifacts().is_empty());
    }

    #[tokio::test]
    async fn shutdown_token_cancels_the_next_step_run() {
        let (mut orch, gateway) = orchestrator(vec![]);
        orch.shutdown_token().cancel();

        let outcome = orch.start("guidance").await.unwrap();
        match outcome {
            RunOutcome::StepFailed { index: 0, error } => {
                assert!(error.to_lowercase().contains("cancelled"));
            }
            other => panic!("expected cancelled failure, got {other:?}"),
        }
        assert_eq!(orch.status(), WorkflowStatus::Paused);
        assert_eq!(gateway.calls.lock().unwrap().len(), 0);
    }

    #[test]
    fn segment_title_truncates_long_guidance() {
        let long = "a".repeat(100);
        let title = segment_title(&long);
        assert!(title.chars().count() <= 49);
        assert!(title.ends_with('…'));
        assert_eq!(segment_title("short"), "short");
        assert_eq!(segment_title("  "), "Untitled segment");
    }
}
