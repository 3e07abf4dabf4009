//! Series bible extraction and display commands.

use anyhow::{Context, Result, bail};
use console::style;
use std::path::Path;

use quire::backend::UsageMeter;
use quire::bible::BibleExtractor;
use quire::cancel::CancellationRegistry;

use super::Project;

pub async fn cmd_bible_extract(
    project: &Project,
    manuscript_id: &str,
    file: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read manuscript: {}", file.display()))?;

    let registry = CancellationRegistry::new();
    let meter = UsageMeter::new();
    let backend = project.config.build_backend(registry.clone(), meter.clone())?;
    let extractor = BibleExtractor::new(backend, project.config.extraction_config());

    println!(
        "{} Extracting series bible for {}",
        style("▶").cyan(),
        style(manuscript_id).bold()
    );

    let run = extractor.extract(&text, manuscript_id);
    tokio::pin!(run);
    let outcome = tokio::select! {
        result = &mut run => result,
        _ = tokio::signal::ctrl_c() => {
            println!("{} Cancelling; waiting for the in-flight call to finish", style("!").yellow());
            registry.cancel(manuscript_id);
            run.await
        }
    };
    let usage = meter.snapshot();
    project.store.record_usage(manuscript_id, &usage)?;

    let sheet = match outcome {
        Ok(sheet) => sheet,
        Err(_) => bail!("Operation cancelled; no series bible was written"),
    };
    project.store.save_bible(&sheet)?;

    println!(
        "{} {} characters, {} locations, {} timeline events, {} objects",
        style("✓").green(),
        sheet.characters.len(),
        sheet.locations.len(),
        sheet.timeline.len(),
        sheet.objects.len()
    );
    if let Some(path) = output {
        std::fs::write(path, sheet.to_notes())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote notes to {}", path.display());
    }
    if !usage.is_empty() {
        println!("Usage: {}", usage);
    }
    Ok(())
}

pub fn cmd_bible_show(project: &Project, manuscript_id: &str, json: bool) -> Result<()> {
    let Some(sheet) = project.store.load_bible(manuscript_id)? else {
        bail!(
            "No series bible for '{}'. Run 'quire bible extract {} <file>' first.",
            manuscript_id,
            manuscript_id
        );
    };
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&sheet).context("Failed to serialize series bible")?
        );
    } else if sheet.is_empty() {
        println!("Series bible for {} is empty.", manuscript_id);
    } else {
        print!("{}", sheet.to_notes());
    }
    Ok(())
}
