//! Project lifecycle commands: `init`, `status`, `steps`, `agents`, `reset`.

use anyhow::Result;
use console::style;
use std::path::Path;

use storyloom::config::{LoomConfig, ProjectPaths, CONFIG_FILE};
use storyloom::session::{StepStatus, WorkflowStatus};
use storyloom::world::WorldFile;

pub fn cmd_init(project_dir: &Path) -> Result<()> {
    let paths = ProjectPaths::new(project_dir.to_path_buf())?;
    if paths.world_file.exists() {
        println!("Project already initialized at {}", paths.loom_dir.display());
        return Ok(());
    }
    paths.ensure_directories()?;

    let config = LoomConfig::default();
    if !paths.loom_dir.join(CONFIG_FILE).exists() {
        config.save(&paths.project_dir)?;
    }
    WorldFile::new().save(&paths.world_file)?;

    println!("Initialized loom project in {}", paths.loom_dir.display());
    println!();
    println!(
        "  Set {} (or add it to .env), then run:",
        style(&config.llm.api_key_env).yellow()
    );
    println!("    loom run \"<guidance for your first segment>\"");
    Ok(())
}

pub fn cmd_status(project_dir: &Path) -> Result<()> {
    let world = load_world(project_dir)?;

    println!("{} {}", style("Workflow:").bold(), world.session.status);
    if world.session.current_step_index >= 0 {
        let index = world.session.current_step_index as usize;
        if let Some(step) = world.workflow.get(index) {
            println!("{} {} ({})", style("Current step:").bold(), step.name, index + 1);
        }
    }
    if !world.session.story_guidance.is_empty() {
        println!("{} {}", style("Guidance:").bold(), world.session.story_guidance);
    }

    println!();
    for (index, step) in world.workflow.iter().enumerate() {
        let marker = match world.session.log(&step.id).map(|l| l.status) {
            Some(StepStatus::Completed) => style("done").green(),
            Some(StepStatus::Failed) => style("failed").red(),
            Some(_) => style("in progress").yellow(),
            None => style("pending").dim(),
        };
        println!("  {}. {} [{}]", index + 1, step.name, marker);
    }

    println!();
    println!(
        "{} {} segment(s), {} artifact(s)",
        style("Story:").bold(),
        world.session.segments.len(),
        world.artifacts.len()
    );
    if world.session.status == WorkflowStatus::Paused {
        println!("\nRun {} to resume.", style("loom run").cyan());
    }
    Ok(())
}

pub fn cmd_steps(project_dir: &Path) -> Result<()> {
    let world = load_world(project_dir)?;
    for (index, step) in world.workflow.iter().enumerate() {
        println!(
            "{}. {} {}",
            index + 1,
            style(&step.name).bold(),
            style(format!("({})", step.agent_id)).dim()
        );
        println!("   {}", step.instruction);
        match &step.validation {
            Some(validation) => println!(
                "   gated by {} (up to {} revision(s)): {}",
                validation.reviewer_id, validation.max_retries, validation.criteria
            ),
            None => println!("   {}", style("ungated").dim()),
        }
    }
    Ok(())
}

pub fn cmd_agents(project_dir: &Path) -> Result<()> {
    let world = load_world(project_dir)?;
    for agent in world.agents.iter() {
        println!(
            "{} {} {}",
            agent.icon,
            style(&agent.name).bold(),
            style(format!("({})", agent.id)).dim()
        );
        println!("   {}", agent.role);
    }
    Ok(())
}

pub fn cmd_reset(project_dir: &Path, force: bool) -> Result<()> {
    use dialoguer::Confirm;

    let paths = ProjectPaths::new(project_dir.to_path_buf())?;
    let mut world = WorldFile::load(&paths.world_file)?;

    if !force {
        let confirm = Confirm::new()
            .with_prompt("This will discard all run state, artifacts, and story segments. Are you sure?")
            .default(false)
            .interact()
            .unwrap_or(false);
        if !confirm {
            println!("Reset cancelled");
            return Ok(());
        }
    }

    world.session.reset();
    world.artifacts.clear();
    world.save(&paths.world_file)?;
    println!("Reset complete");
    Ok(())
}

fn load_world(project_dir: &Path) -> Result<WorldFile> {
    let paths = ProjectPaths::new(project_dir.to_path_buf())?;
    if !paths.world_file.exists() {
        anyhow::bail!("Project not initialized. Run 'loom init' first.");
    }
    WorldFile::load(&paths.world_file)
}
