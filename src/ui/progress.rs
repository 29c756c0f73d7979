//! Terminal progress rendering for a workflow run.

use crate::events::{EventSink, WorkflowEvent};
use crate::session::StepStatus;
use crate::ui::icons::{CHECK, CROSS, PEN, REVIEW};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Terminal UI for a workflow run, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Step bar — tracks how many steps have completed this run
/// - Round bar — spinner with the current generation/review round
///
/// Implements [`EventSink`], so the orchestrator drives it directly.
pub struct WorkflowUi {
    multi: MultiProgress,
    step_bar: ProgressBar,
    round_bar: ProgressBar,
}

impl WorkflowUi {
    pub fn new(total_steps: u64) -> Self {
        let multi = MultiProgress::new();

        let step_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let step_bar = multi.add(ProgressBar::new(total_steps));
        step_bar.set_style(step_style);
        step_bar.set_prefix("Steps");

        let round_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let round_bar = multi.add(ProgressBar::new_spinner());
        round_bar.set_style(round_style);
        round_bar.set_prefix("Round");

        Self {
            multi,
            step_bar,
            round_bar,
        }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` if the
    /// rich UI fails.
    pub fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn step_complete(&self, name: &str) {
        self.round_bar.disable_steady_tick();
        self.round_bar.set_message(String::new());
        self.step_bar.inc(1);
        self.print_line(format!("{}{}", CHECK, style(name).green()));
    }

    pub fn step_failed(&self, name: &str, error: &str) {
        self.round_bar.disable_steady_tick();
        self.round_bar.set_message(String::new());
        self.print_line(format!("{}{}: {}", CROSS, style(name).red(), error));
    }

    pub fn finish(&self) {
        self.step_bar.finish_and_clear();
        self.round_bar.finish_and_clear();
    }
}

impl EventSink for WorkflowUi {
    fn on_event(&self, event: &WorkflowEvent) {
        match event {
            WorkflowEvent::Started { step_index, .. } => {
                self.step_bar.set_position(*step_index as u64);
                self.round_bar.enable_steady_tick(Duration::from_millis(100));
                self.round_bar
                    .set_message(format!("step {} starting", step_index + 1));
            }
            WorkflowEvent::Progress { round, status, .. } => {
                let label = match status {
                    StepStatus::Generating => format!("{}drafting (round {round})", PEN),
                    StepStatus::Revising => format!("{}revising (round {round})", PEN),
                    StepStatus::Reviewing => format!("{}reviewing (round {round})", REVIEW),
                    other => format!("{other} (round {round})"),
                };
                self.round_bar.set_message(label);
            }
            WorkflowEvent::Completed { .. } | WorkflowEvent::Failed { .. } => {
                // Terminal lines are printed by the command loop, which
                // knows the step name; just stop the spinner here.
                self.round_bar.disable_steady_tick();
            }
        }
    }
}
