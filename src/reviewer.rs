//! LLM-backed reviewer: grades a step's output against stated criteria.
//!
//! The reviewer prompt demands a machine-readable first line:
//!
//! ```text
//! VERDICT: PASS
//! ```
//!
//! followed by free-form feedback. Parsing is lenient — the first PASS/FAIL
//! token anywhere in the response wins, and an unparseable response is a
//! FAIL with the raw text as feedback, never an error. Transport failures
//! from the underlying gateway propagate unchanged; they are infrastructure
//! failures, not verdicts.

use crate::agent::StoryAgent;
use crate::errors::GatewayError;
use crate::gateway::{GenerateRequest, LlmGateway};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Binary quality judgment driving the revision loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReviewVerdict {
    Pass,
    Fail,
}

impl ReviewVerdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, ReviewVerdict::Pass)
    }
}

impl std::fmt::Display for ReviewVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReviewVerdict::Pass => write!(f, "PASS"),
            ReviewVerdict::Fail => write!(f, "FAIL"),
        }
    }
}

/// Verdict plus the feedback that accompanies it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewOutcome {
    pub verdict: ReviewVerdict,
    pub feedback: String,
}

/// Reviewer wrapping an LLM gateway.
pub struct Reviewer {
    gateway: Arc<dyn LlmGateway>,
}

impl Reviewer {
    pub fn new(gateway: Arc<dyn LlmGateway>) -> Self {
        Self { gateway }
    }

    /// Grade `content` against `criteria` using the reviewer persona.
    pub async fn review(
        &self,
        persona: &StoryAgent,
        content: &str,
        criteria: &str,
    ) -> Result<ReviewOutcome, GatewayError> {
        let request = GenerateRequest {
            persona: persona.clone(),
            instruction: review_instruction(criteria),
            input_context: content.to_string(),
            world_digest: String::new(),
            prior_critique: None,
        };

        let response = self.gateway.generate(&request).await?;
        let outcome = parse_review_response(&response);
        tracing::debug!(
            reviewer = %persona.id,
            verdict = %outcome.verdict,
            "review complete"
        );
        Ok(outcome)
    }
}

fn review_instruction(criteria: &str) -> String {
    format!(
        "Review the input above against these criteria:\n\n{}\n\n\
         Respond with a first line of exactly 'VERDICT: PASS' or 'VERDICT: FAIL', \
         then explain. On FAIL, give concrete, actionable feedback for every \
         unmet criterion.",
        criteria.trim()
    )
}

/// Extract the verdict and feedback from a raw reviewer response.
///
/// The first PASS or FAIL token (whole word, any line) decides; feedback is
/// everything after the verdict line, or the whole response if no verdict
/// line was found.
pub fn parse_review_response(response: &str) -> ReviewOutcome {
    for (idx, line) in response.lines().enumerate() {
        let upper = line.to_uppercase();
        let verdict = if contains_token(&upper, "PASS") {
            Some(ReviewVerdict::Pass)
        } else if contains_token(&upper, "FAIL") {
            Some(ReviewVerdict::Fail)
        } else {
            None
        };

        if let Some(verdict) = verdict {
            let feedback: String = response
                .lines()
                .skip(idx + 1)
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string();
            let feedback = if feedback.is_empty() {
                response.trim().to_string()
            } else {
                feedback
            };
            return ReviewOutcome { verdict, feedback };
        }
    }

    // No verdict token at all: treat as a failure so the loop revises
    // rather than silently accepting unreviewed content.
    ReviewOutcome {
        verdict: ReviewVerdict::Fail,
        feedback: response.trim().to_string(),
    }
}

fn contains_token(haystack: &str, token: &str) -> bool {
    haystack.split(|c: char| !c.is_ascii_alphabetic()).any(|w| w == token)
}
