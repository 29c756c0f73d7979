//! Single-step execution: the generate→review→revise loop.
//!
//! The executor produces accepted output for one step, applying an internal
//! quality-gated revision loop bounded by the step's retry budget. Two very
//! different failure kinds are kept apart on purpose:
//!
//! - **Content rejection** (reviewer FAIL) is expected control flow: the
//!   critique feeds the next round, up to `max_retries` extra rounds.
//! - **Infrastructure failure** (gateway or reviewer throws) stops the loop
//!   immediately and marks the step failed; recovery is a user-initiated
//!   retry, never an automatic one. Auto-retrying transport errors would
//!   mask real outages behind a budget meant for content quality.
//!
//! Exhausting the round budget without a PASS still completes the step with
//! the last generated content; the final FAIL verdict stays in the log.

use crate::agent::StoryAgent;
use crate::errors::GatewayError;
use crate::events::{EventSink, WorkflowEvent};
use crate::gateway::{GenerateRequest, LlmGateway};
use crate::reviewer::Reviewer;
use crate::session::{StepAttempt, StepExecutionLog, StepStatus};
use crate::step::WorkflowStep;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Outcome of one step execution.
#[derive(Debug)]
pub struct StepRun {
    /// The fresh execution log for this run.
    pub log: StepExecutionLog,
    /// Accepted output when the log completed; `None` on failure.
    pub accepted_output: Option<String>,
}

impl StepRun {
    fn failed(mut log: StepExecutionLog, error: &GatewayError) -> Self {
        log.status = StepStatus::Failed;
        log.error = Some(error.to_string());
        Self {
            log,
            accepted_output: None,
        }
    }
}

/// Runs one workflow step to completion or failure.
pub struct StepExecutor {
    gateway: Arc<dyn LlmGateway>,
    reviewer: Reviewer,
    sink: Option<Arc<dyn EventSink>>,
}

impl StepExecutor {
    pub fn new(gateway: Arc<dyn LlmGateway>) -> Self {
        let reviewer = Reviewer::new(gateway.clone());
        Self {
            gateway,
            reviewer,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Execute `step` with `input` as its upstream context.
    ///
    /// `reviewer_agent` must be present when the step declares validation;
    /// the orchestrator resolves both personas before calling. The cancel
    /// token is honored at every await boundary: a cancelled step is
    /// recorded as failed so the user's forward path is `retry`.
    pub async fn execute(
        &self,
        step: &WorkflowStep,
        agent: &StoryAgent,
        reviewer_agent: Option<&StoryAgent>,
        input: &str,
        world_digest: &str,
        cancel: &CancellationToken,
    ) -> StepRun {
        let mut log = StepExecutionLog::default();
        let mut critique: Option<String> = None;
        let mut approved = false;
        let mut round: u32 = 1;
        let max_rounds = step.max_rounds();

        while !approved && round <= max_rounds {
            if cancel.is_cancelled() {
                return StepRun::failed(log, &GatewayError::Cancelled);
            }

            log.status = if round == 1 {
                StepStatus::Generating
            } else {
                StepStatus::Revising
            };
            self.emit_progress(&step.id, round, log.status);

            let request = GenerateRequest {
                persona: agent.clone(),
                instruction: step.instruction.clone(),
                input_context: input.to_string(),
                world_digest: world_digest.to_string(),
                prior_critique: critique.clone(),
            };

            let output = match self.gateway.generate(&request).await {
                Ok(output) => output,
                Err(err) => {
                    tracing::warn!(step = %step.id, round, error = %err, "generation failed");
                    return StepRun::failed(log, &err);
                }
            };
            log.record_attempt(StepAttempt::new(round, &output));

            match (&step.validation, reviewer_agent) {
                (Some(validation), Some(reviewer_agent)) => {
                    if cancel.is_cancelled() {
                        return StepRun::failed(log, &GatewayError::Cancelled);
                    }

                    log.status = StepStatus::Reviewing;
                    self.emit_progress(&step.id, round, log.status);

                    let outcome = match self
                        .reviewer
                        .review(reviewer_agent, &output, &validation.criteria)
                        .await
                    {
                        Ok(outcome) => outcome,
                        Err(err) => {
                            // No partial credit for a generated-but-unreviewed
                            // attempt: the round that failed review transport
                            // fails the step.
                            tracing::warn!(step = %step.id, round, error = %err, "review failed");
                            return StepRun::failed(log, &err);
                        }
                    };

                    log.record_review(round, &outcome.feedback, outcome.verdict);
                    if outcome.verdict.is_pass() {
                        approved = true;
                    } else {
                        critique = Some(outcome.feedback);
                        round += 1;
                    }
                }
                _ => {
                    // No reviewer gate: the single generation is accepted.
                    approved = true;
                }
            }
        }

        if !approved {
            tracing::info!(
                step = %step.id,
                rounds = max_rounds,
                "revision budget exhausted; completing with last attempt"
            );
        }

        log.status = StepStatus::Completed;
        StepRun {
            accepted_output: Some(log.output.clone()),
            log,
        }
    }

    fn emit_progress(&self, step_id: &str, round: u32, status: StepStatus) {
        if let Some(sink) = &self.sink {
            sink.on_event(&WorkflowEvent::Progress {
                step_id: step_id.to_string(),
                round,
                status,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepValidation;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Gateway double that replays a fixed script of responses. Generation
    /// and review calls consume from the same queue in call order.
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

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LlmGateway for ScriptedGateway {
        async fn generate(&self, request: &GenerateRequest) -> Result<String, GatewayError> {
            self.calls.lock().unwrap().push(request.clone());
            match self.script.lock().unwrap().pop_front() {
                Some(Ok(text)) => Ok(text),
                Some(Err(message)) => Err(GatewayError::Api {
                    status: 500,
                    message,
                }),
                None => panic!("gateway called more times than scripted"),
            }
        }
    }

    fn agent() -> StoryAgent {
        StoryAgent::new("outliner", "Outliner", "Structure", "You outline.")
    }

    fn editor() -> StoryAgent {
        StoryAgent::new("story-editor", "Editor", "Review", "You edit.")
    }

    fn gated_step(max_retries: u32) -> WorkflowStep {
        WorkflowStep::new("Outline", "outliner", "outline it").with_validation(
            StepValidation::new("story-editor", "scenes have viewpoints", max_retries),
        )
    }

    #[tokio::test]
    async fn ungated_step_completes_after_one_generation() {
        let gateway = ScriptedGateway::new(vec![Ok("the concept")]);
        let executor = StepExecutor::new(gateway.clone());
        let step = WorkflowStep::new("Concept", "outliner", "write");

        let run = executor
            .execute(&step, &agent(), None, "guidance", "", &CancellationToken::new())
            .await;

        assert_eq!(run.log.status, StepStatus::Completed);
        assert_eq!(run.accepted_output.as_deref(), Some("the concept"));
        assert_eq!(run.log.attempts.len(), 1);
        assert!(run.log.attempts[0].verdict.is_none());
        assert_eq!(gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn fail_fail_pass_produces_three_attempts() {
        let gateway = ScriptedGateway::new(vec![
            Ok("draft 1"),
            Ok("VERDICT: FAIL\nno viewpoints"),
            Ok("draft 2"),
            Ok("VERDICT: FAIL\nstill no viewpoints"),
            Ok("draft 3"),
            Ok("VERDICT: PASS\ngood"),
        ]);
        let executor = StepExecutor::new(gateway.clone());

        let run = executor
            .execute(
                &gated_step(2),
                &agent(),
                Some(&editor()),
                "the concept",
                "",
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(run.log.status, StepStatus::Completed);
        assert_eq!(run.log.attempts.len(), 3);
        assert_eq!(run.accepted_output.as_deref(), Some("draft 3"));
        assert_eq!(
            run.log.attempts[2].verdict,
            Some(crate::reviewer::ReviewVerdict::Pass)
        );
        // Critique from round 1 must reach round 2's generation request
        let calls = gateway.calls.lock().unwrap();
        assert_eq!(
            calls[2].prior_critique.as_deref(),
            Some("no viewpoints"),
            "revision round must carry the prior critique"
        );
    }

    #[tokio::test]
    async fn round_bound_is_max_retries_plus_one() {
        // Reviewer always fails; max_retries = 2 → exactly 3 generations
        let gateway = ScriptedGateway::new(vec![
            Ok("draft 1"),
            Ok("VERDICT: FAIL\nbad"),
            Ok("draft 2"),
            Ok("VERDICT: FAIL\nbad"),
            Ok("draft 3"),
            Ok("VERDICT: FAIL\nbad"),
        ]);
        let executor = StepExecutor::new(gateway.clone());

        let run = executor
            .execute(
                &gated_step(2),
                &agent(),
                Some(&editor()),
                "input",
                "",
                &CancellationToken::new(),
            )
            .await;

        // Soft failure: completed with the last rejected content
        assert_eq!(run.log.status, StepStatus::Completed);
        assert_eq!(run.accepted_output.as_deref(), Some("draft 3"));
        assert_eq!(run.log.attempts.len(), 3);
        assert_eq!(
            run.log.attempts[2].verdict,
            Some(crate::reviewer::ReviewVerdict::Fail)
        );
        assert_eq!(gateway.call_count(), 6);
    }

    #[tokio::test]
    async fn zero_retries_reviews_once_advisory_only() {
        let gateway = ScriptedGateway::new(vec![Ok("only draft"), Ok("VERDICT: FAIL\nmeh")]);
        let executor = StepExecutor::new(gateway.clone());

        let run = executor
            .execute(
                &gated_step(0),
                &agent(),
                Some(&editor()),
                "input",
                "",
                &CancellationToken::new(),
            )
            .await;

        // One generation round; the verdict is recorded but never revised
        assert_eq!(run.log.status, StepStatus::Completed);
        assert_eq!(run.log.attempts.len(), 1);
        assert_eq!(
            run.log.attempts[0].verdict,
            Some(crate::reviewer::ReviewVerdict::Fail)
        );
        assert_eq!(run.log.attempts[0].critique.as_deref(), Some("meh"));
        assert_eq!(gateway.call_count(), 2);
    }

    #[tokio::test]
    async fn generation_error_fails_step_without_retry() {
        let gateway = ScriptedGateway::new(vec![Err("connection reset")]);
        let executor = StepExecutor::new(gateway.clone());

        let run = executor
            .execute(
                &gated_step(2),
                &agent(),
                Some(&editor()),
                "input",
                "",
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(run.log.status, StepStatus::Failed);
        assert!(run.accepted_output.is_none());
        assert!(run.log.error.as_deref().unwrap().contains("connection reset"));
        assert!(run.log.attempts.is_empty());
        // Transport errors never consume the revision budget
        assert_eq!(gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn review_error_fails_the_round_with_no_partial_credit() {
        let gateway = ScriptedGateway::new(vec![Ok("draft"), Err("reviewer timed out")]);
        let executor = StepExecutor::new(gateway.clone());

        let run = executor
            .execute(
                &gated_step(2),
                &agent(),
                Some(&editor()),
                "input",
                "",
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(run.log.status, StepStatus::Failed);
        assert!(run.accepted_output.is_none());
        assert!(run.log.error.as_deref().unwrap().contains("reviewer timed out"));
    }

    #[tokio::test]
    async fn cancelled_token_fails_before_first_call() {
        let gateway = ScriptedGateway::new(vec![]);
        let executor = StepExecutor::new(gateway.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let run = executor
            .execute(&gated_step(1), &agent(), Some(&editor()), "input", "", &cancel)
            .await;

        assert_eq!(run.log.status, StepStatus::Failed);
        assert!(run.log.error.as_deref().unwrap().contains("cancelled"));
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn world_digest_reaches_generation_but_not_review() {
        let gateway = ScriptedGateway::new(vec![Ok("draft"), Ok("VERDICT: PASS\nok")]);
        let executor = StepExecutor::new(gateway.clone());

        executor
            .execute(
                &gated_step(1),
                &agent(),
                Some(&editor()),
                "input",
                "magic is outlawed",
                &CancellationToken::new(),
            )
            .await;

        let calls = gateway.calls.lock().unwrap();
        assert_eq!(calls[0].world_digest, "magic is outlawed");
        // The review call grades content against criteria only
        assert!(calls[1].world_digest.is_empty());
        assert_eq!(calls[1].input_context, "draft");
    }
}
