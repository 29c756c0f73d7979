//! Workflow execution — `loom run`.
//!
//! Drives the orchestrator one step at a time and stops at every pause
//! point. Each pause offers continue / edit / retry / stop; `--yes`
//! auto-continues past completed steps but never past a failed one.

use anyhow::Result;
use console::style;
use dialoguer::{theme::ColorfulTheme, Editor, Select};
use std::path::Path;
use std::sync::Arc;

use super::super::Cli;
use storyloom::config::{load_dotenv, LoomConfig, ProjectPaths};
use storyloom::gateway::{HttpGateway, LlmGateway};
use storyloom::orchestrator::{Orchestrator, RunOutcome};
use storyloom::session::{StepStatus, WorkflowStatus};
use storyloom::ui::WorkflowUi;
use storyloom::world::WorldFile;

pub async fn run_workflow(cli: &Cli, project_dir: &Path, guidance: Option<&str>) -> Result<()> {
    let paths = ProjectPaths::new(project_dir.to_path_buf())?;
    if !paths.world_file.exists() {
        anyhow::bail!("Project not initialized. Run 'loom init' first.");
    }

    load_dotenv(&paths.project_dir);
    let config = LoomConfig::load(&paths.project_dir)?;
    let world = WorldFile::load(&paths.world_file)?;

    let gateway = Arc::new(HttpGateway::new(config.llm.clone()));
    if !gateway.is_configured() {
        anyhow::bail!(
            "No API key found. Set {} in the environment or a .env file.",
            config.llm.api_key_env
        );
    }

    let ui = Arc::new(WorkflowUi::new(world.workflow.len() as u64));
    let mut orchestrator = Orchestrator::new(gateway, world.agents.clone(), world.workflow.clone())
        .with_session(world.session.clone())
        .with_artifacts(world.artifacts.clone())
        .with_sink(ui.clone());

    // Ctrl-c cancels the in-flight step at its next await boundary; the
    // step is recorded as failed and the run stays resumable.
    let shutdown = orchestrator.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    let mut outcome = initial_outcome(&mut orchestrator, guidance).await?;

    loop {
        persist(&orchestrator, &paths)?;

        match outcome {
            RunOutcome::StepCompleted { index } => {
                let step_name = orchestrator.steps()[index].name.clone();
                ui.step_complete(&step_name);

                if cli.yes {
                    outcome = orchestrator.continue_from(index).await?;
                    continue;
                }

                let step_id = orchestrator.steps()[index].id.clone();
                let output = orchestrator
                    .session()
                    .step_outputs
                    .get(&step_id)
                    .cloned()
                    .unwrap_or_default();
                print_output_preview(&ui, &step_name, &output);

                match prompt_after_completion(&step_name)? {
                    AfterStep::Continue => {
                        outcome = orchestrator.continue_from(index).await?;
                    }
                    AfterStep::Edit => {
                        if let Some(edited) = Editor::new().edit(&output)? {
                            orchestrator.set_step_output(index, &edited)?;
                            persist(&orchestrator, &paths)?;
                        }
                        outcome = orchestrator.continue_from(index).await?;
                    }
                    AfterStep::Retry => {
                        outcome = orchestrator.retry(index).await?;
                    }
                    AfterStep::Stop => {
                        ui.finish();
                        println!("Paused. Run {} to resume.", style("loom run").cyan());
                        return Ok(());
                    }
                }
            }
            RunOutcome::StepFailed { index, ref error } => {
                let step_name = orchestrator.steps()[index].name.clone();
                ui.step_failed(&step_name, error);

                if cli.yes {
                    // Transport failures never auto-retry; surface and stop.
                    ui.finish();
                    println!(
                        "Step failed. Run {} to retry once the problem is fixed.",
                        style("loom run").cyan()
                    );
                    return Ok(());
                }

                match prompt_after_failure(&step_name)? {
                    AfterFailure::Retry => {
                        outcome = orchestrator.retry(index).await?;
                    }
                    AfterFailure::Stop => {
                        ui.finish();
                        println!("Paused. Run {} to retry later.", style("loom run").cyan());
                        return Ok(());
                    }
                }
            }
            RunOutcome::WorkflowCompleted => {
                ui.finish();
                let final_output = final_output(&orchestrator);
                println!("{}", style("Workflow complete.").green().bold());
                println!();
                println!("{final_output}");
                println!();

                let apply = cli.yes || prompt_apply()?;
                if apply {
                    orchestrator.apply_result(&final_output)?;
                    persist(&orchestrator, &paths)?;
                    println!(
                        "Applied to story ({} segment(s) total).",
                        orchestrator.session().segments.len()
                    );
                } else {
                    persist(&orchestrator, &paths)?;
                    println!("Result left unapplied; the run remains completed.");
                }
                return Ok(());
            }
        }
    }
}

/// Decide the first move: start fresh with guidance, or resume the pause.
async fn initial_outcome(
    orchestrator: &mut Orchestrator,
    guidance: Option<&str>,
) -> Result<RunOutcome> {
    if let Some(guidance) = guidance {
        return Ok(orchestrator.start(guidance).await?);
    }

    match orchestrator.status() {
        WorkflowStatus::Paused => {
            let index = orchestrator.session().current_step_index.max(0) as usize;
            let Some(step) = orchestrator.steps().get(index) else {
                anyhow::bail!("Paused step no longer exists; run 'loom reset' to start over.");
            };
            let log_status = orchestrator.session().log(&step.id).map(|l| l.status);
            match log_status {
                Some(StepStatus::Completed) => {
                    // Re-enter the pause point so the user gets the same menu
                    Ok(RunOutcome::StepCompleted { index })
                }
                _ => Ok(orchestrator.retry(index).await?),
            }
        }
        status => anyhow::bail!(
            "Workflow is {status}; provide guidance to start a run: loom run \"<guidance>\""
        ),
    }
}

enum AfterStep {
    Continue,
    Edit,
    Retry,
    Stop,
}

fn prompt_after_completion(step_name: &str) -> Result<AfterStep> {
    let options = &[
        "Continue to the next step",
        "Edit the output, then continue",
        "Retry this step",
        "Stop here (stay paused)",
    ];
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("'{step_name}' completed. What next?"))
        .items(options)
        .default(0)
        .interact()?;
    Ok(match selection {
        0 => AfterStep::Continue,
        1 => AfterStep::Edit,
        2 => AfterStep::Retry,
        _ => AfterStep::Stop,
    })
}

enum AfterFailure {
    Retry,
    Stop,
}

fn prompt_after_failure(step_name: &str) -> Result<AfterFailure> {
    let options = &["Retry the step", "Stop here (stay paused)"];
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("'{step_name}' failed. What next?"))
        .items(options)
        .default(0)
        .interact()?;
    Ok(match selection {
        0 => AfterFailure::Retry,
        _ => AfterFailure::Stop,
    })
}

fn prompt_apply() -> Result<bool> {
    use dialoguer::Confirm;
    Ok(Confirm::new()
        .with_prompt("Apply this result to the story?")
        .default(true)
        .interact()?)
}

fn print_output_preview(ui: &WorkflowUi, step_name: &str, output: &str) {
    ui.print_line(format!("\n{}", style(step_name).bold().underlined()));
    const PREVIEW_LINES: usize = 20;
    let lines: Vec<&str> = output.lines().collect();
    for line in lines.iter().take(PREVIEW_LINES) {
        ui.print_line(*line);
    }
    if lines.len() > PREVIEW_LINES {
        ui.print_line(format!(
            "{}",
            style(format!("... ({} more lines)", lines.len() - PREVIEW_LINES)).dim()
        ));
    }
}

/// The last step's accepted output, the candidate for `apply_result`.
fn final_output(orchestrator: &Orchestrator) -> String {
    orchestrator
        .steps()
        .last()
        .and_then(|step| orchestrator.session().step_outputs.get(&step.id))
        .cloned()
        .unwrap_or_default()
}

/// Write the whole orchestrator state back to the world file.
fn persist(orchestrator: &Orchestrator, paths: &ProjectPaths) -> Result<()> {
    let mut world = WorldFile::new();
    world.agents = orchestrator.roster().clone();
    world.workflow = orchestrator.steps().to_vec();
    world.session = orchestrator.session().clone();
    world.artifacts = orchestrator.artifacts().clone();
    world.save(&paths.world_file)
}
