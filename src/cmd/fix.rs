//! Fix application and issue triage commands.

use anyhow::{Context, Result, bail};
use console::style;
use std::path::Path;

use quire::backend::UsageMeter;
use quire::cancel::CancellationRegistry;
use quire::fix::FixReport;
use quire::issue::{self, Issue};
use quire::pipeline::Pipeline;
use quire::stage::Stage;

use super::Project;

/// Parse `--issues`: `all`, or a comma-separated list of ids.
pub fn parse_issue_list(raw: &str, issues: &[Issue]) -> Result<Vec<u64>> {
    if raw.trim().eq_ignore_ascii_case("all") {
        return Ok(issues.iter().filter(|i| i.is_open()).map(|i| i.id).collect());
    }
    let mut ids = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let id: u64 = part
            .trim_start_matches('#')
            .parse()
            .with_context(|| format!("Invalid issue id '{}'", part))?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    if ids.is_empty() {
        bail!("No issue ids given");
    }
    Ok(ids)
}

pub async fn cmd_fix(
    project: &Project,
    manuscript_id: &str,
    stage: Stage,
    file: &Path,
    selection: &str,
    output: Option<&Path>,
) -> Result<()> {
    project.load(manuscript_id)?;
    let mut issues = project.store.load_issues(manuscript_id, stage)?;
    if issues.is_empty() {
        bail!(
            "No issues stored for {} / {}. Run 'quire review' first.",
            manuscript_id,
            stage
        );
    }
    let selected = parse_issue_list(selection, &issues)?;

    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read manuscript: {}", file.display()))?;

    let registry = CancellationRegistry::new();
    let meter = UsageMeter::new();
    let backend = project.config.build_backend(registry.clone(), meter.clone())?;
    let pipeline = Pipeline::new(
        project.editor.clone(),
        registry,
        backend,
        project.config.extraction_config(),
        project.config.fix_config(),
    );

    let report = {
        let fixes = pipeline.apply_fixes(manuscript_id, stage, &text, &mut issues, &selected);
        tokio::pin!(fixes);
        tokio::select! {
            result = &mut fixes => result,
            _ = tokio::signal::ctrl_c() => {
                println!("{} Cancelling; finished edits are kept", style("!").yellow());
                pipeline.cancel(manuscript_id);
                fixes.await
            }
        }
    };
    let usage = meter.snapshot();
    project.store.record_usage(manuscript_id, &usage)?;
    let report = report?;

    let target = output.unwrap_or(file);
    if report.fixes_applied > 0 || output.is_some() {
        std::fs::write(target, &report.edited_text)
            .with_context(|| format!("Failed to write {}", target.display()))?;
    }
    project.store.save_issues(manuscript_id, stage, &issues)?;
    project.save(manuscript_id)?;
    let log_path = project
        .store
        .save_change_log(manuscript_id, stage, &report)?;

    print_report(&report);
    if !usage.is_empty() {
        println!("Usage: {}", usage);
    }
    println!("Wrote {}", target.display());
    println!("Change log: {}", log_path.display());
    Ok(())
}

fn print_report(report: &FixReport) {
    println!();
    for result in &report.results {
        if result.applied {
            let method = result
                .method
                .map(|m| format!("{:?}", m).to_lowercase())
                .unwrap_or_default();
            println!("  {} #{} ({})", style("✓").green(), result.issue_id, method);
        } else {
            let reason = result.reason.map(|r| r.to_string()).unwrap_or_default();
            println!("  {} #{} {}", style("✗").red(), result.issue_id, style(reason).dim());
        }
    }
    println!();
    println!(
        "Applied {} of {} requested fixes{}",
        report.fixes_applied,
        report.fixes_requested,
        if report.was_cancelled() {
            " (cancelled)"
        } else {
            ""
        }
    );
}

pub fn cmd_ignore(project: &Project, manuscript_id: &str, stage: Stage, id: u64) -> Result<()> {
    let mut issues = project.store.load_issues(manuscript_id, stage)?;
    issue::find_mut(&mut issues, stage, id)?.ignore()?;
    project.store.save_issues(manuscript_id, stage, &issues)?;
    println!("{} Ignored #{} in {}", style("✓").green(), id, stage);
    Ok(())
}

pub fn cmd_unignore(project: &Project, manuscript_id: &str, stage: Stage, id: u64) -> Result<()> {
    let mut issues = project.store.load_issues(manuscript_id, stage)?;
    issue::find_mut(&mut issues, stage, id)?.unignore()?;
    project.store.save_issues(manuscript_id, stage, &issues)?;
    println!("{} Reopened #{} in {}", style("✓").green(), id, stage);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire::issue::Severity;

    fn issues() -> Vec<Issue> {
        let mut ignored = Issue::new(2, Stage::Proof, Severity::Minor, "typo");
        ignored.ignore().unwrap();
        vec![
            Issue::new(1, Stage::Proof, Severity::Minor, "typo"),
            ignored,
            Issue::new(3, Stage::Proof, Severity::Major, "formatting"),
        ]
    }

    #[test]
    fn test_parse_comma_list() {
        assert_eq!(parse_issue_list("1,3", &issues()).unwrap(), vec![1, 3]);
        assert_eq!(parse_issue_list(" 3 , #1,3 ", &issues()).unwrap(), vec![3, 1]);
    }

    #[test]
    fn test_parse_all_selects_open() {
        assert_eq!(parse_issue_list("all", &issues()).unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_issue_list("one,two", &issues()).is_err());
        assert!(parse_issue_list(",", &issues()).is_err());
    }
}
