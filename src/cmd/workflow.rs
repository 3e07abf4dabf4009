//! Project and workflow lifecycle commands.

use anyhow::{Context, Result};
use console::style;
use serde::Serialize;
use std::path::Path;

use quire::backend::TokenUsage;
use quire::config::QuireToml;
use quire::stage::{Stage, StageStatus};
use quire::workflow::{ProjectStore, ReportStatus, WorkflowReport};

use super::Project;

pub fn cmd_init(project_dir: &Path) -> Result<()> {
    let quire_dir = project_dir.join(".quire");
    let store = ProjectStore::new(quire_dir.clone());
    store.init()?;

    let config_path = quire_dir.join("quire.toml");
    if config_path.exists() {
        println!("quire.toml already exists at {}", config_path.display());
    } else {
        QuireToml::default().save(&config_path)?;
        println!("Created {}", config_path.display());
    }
    println!(
        "{} Initialized quire project in {}",
        style("✓").green(),
        quire_dir.display()
    );
    Ok(())
}

pub fn cmd_start(project: &Project, manuscript_id: &str) -> Result<()> {
    if let Some(existing) = project.store.load_workflow(manuscript_id)? {
        project.editor.restore(existing);
    }
    let state = project.editor.start(manuscript_id)?;
    project.store.save_workflow(&state)?;

    println!(
        "{} Started workflow for {}",
        style("✓").green(),
        style(manuscript_id).bold()
    );
    if let Some(stage) = state.current_stage() {
        println!("  First stage: {} ({})", stage, stage.reviewer());
    }
    Ok(())
}

/// `status --json`: the report plus accumulated backend usage.
#[derive(Serialize)]
struct StatusOutput<'a> {
    #[serde(flatten)]
    report: &'a WorkflowReport,
    usage: TokenUsage,
}

pub fn cmd_status(project: &Project, manuscript_id: Option<&str>, json: bool) -> Result<()> {
    let Some(manuscript_id) = manuscript_id else {
        return list_workflows(project);
    };

    project.load(manuscript_id)?;
    let report = project
        .editor
        .report(manuscript_id)
        .context("Workflow disappeared after loading")?;
    let usage = project.store.load_usage(manuscript_id)?;

    if json {
        let output = StatusOutput {
            report: &report,
            usage,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialize report")?
        );
    } else {
        print_report(&report, &usage);
    }
    Ok(())
}

fn list_workflows(project: &Project) -> Result<()> {
    let states = project.store.load_all_workflows()?;
    if states.is_empty() {
        println!("No workflows. Run 'quire start <id>' to begin one.");
        return Ok(());
    }

    println!();
    println!("{:<24} {:<16} {:>7} {:>7}", "Manuscript", "Stage", "Issues", "Fixes");
    println!("{:<24} {:<16} {:>7} {:>7}", "-".repeat(24), "-".repeat(16), "------", "-----");
    for state in states {
        let stage = match state.current_stage() {
            Some(stage) => stage.to_string(),
            None => "complete".to_string(),
        };
        println!(
            "{:<24} {:<16} {:>7} {:>7}",
            state.manuscript_id, stage, state.total_issues_found, state.total_fixes_applied
        );
    }
    println!();
    Ok(())
}

fn print_report(report: &WorkflowReport, usage: &TokenUsage) {
    println!();
    println!("Manuscript: {}", style(&report.manuscript_id).bold());
    let headline = match report.status {
        ReportStatus::Complete => style("complete".to_string()).green(),
        ReportStatus::InProgress => style("in progress".to_string()).yellow(),
    };
    println!("Status:     {}", headline);
    if let Some(stage) = report.current_stage {
        println!("Next stage: {} ({})", stage, stage.reviewer());
    }
    println!();

    for (stage, status) in &report.stages {
        let marker = match status {
            StageStatus::Completed => style("✓").green(),
            StageStatus::Skipped => style("-").dim(),
            StageStatus::InProgress => style("…").yellow(),
            StageStatus::NotStarted => style("·").dim(),
        };
        println!("  {} {:<14} {}", marker, stage.as_str(), status);
    }
    println!();
    println!("Issues found:  {}", report.total_issues_found);
    println!("Fixes applied: {}", report.total_fixes_applied);
    if let Some(start) = report.started_at {
        println!("Started:       {}", start.to_rfc3339());
    }
    if let Some(end) = report.completed_at {
        println!("Completed:     {}", end.to_rfc3339());
    }
    if let Some(hours) = report.duration_hours {
        println!("Duration:      {hours:.2}h");
    }
    if !usage.is_empty() {
        println!("Backend usage: {}", usage);
    }
    println!();
}

pub fn cmd_skip(project: &Project, manuscript_id: &str, stage: Stage) -> Result<()> {
    project.load(manuscript_id)?;
    let state = project.editor.skip(manuscript_id, stage)?;
    project.save(manuscript_id)?;

    println!("{} Skipped {}", style("✓").green(), stage);
    match state.current_stage() {
        Some(next) => println!("  Next stage: {}", next),
        None => println!("  Workflow complete"),
    }
    Ok(())
}

pub fn cmd_reset(project: &Project, manuscript_id: &str) -> Result<()> {
    if project.store.remove_workflow(manuscript_id)? {
        println!("{} Reset workflow for {}", style("✓").green(), manuscript_id);
    } else {
        println!("No workflow for '{}'; nothing to reset.", manuscript_id);
    }
    Ok(())
}
