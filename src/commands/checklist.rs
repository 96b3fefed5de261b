use std::fs;
use std::io::Read;
use std::path::Path;

use chrono::Utc;
use serde_json::{Value, json};

use crate::checklist;
use crate::error::Result;
use crate::model::ChecklistKind;
use crate::output::{self, Format};
use crate::store::repo::Repo;

fn read_input(source: &str) -> Result<String> {
    if source == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(fs::read_to_string(source)?)
    }
}

/// Replace a property's checklist with the JSON document in `source`
/// (a path, or `-` for stdin).
pub fn set(repo_root: &Path, id: &str, kind: ChecklistKind, source: &str, format: Format) -> Result<()> {
    let tree: Value = serde_json::from_str(&read_input(source)?)?;
    let repo = Repo::open(repo_root)?;
    let mut property = repo.resolve(id)?;

    let progress = checklist::progress(&tree);
    match kind {
        ChecklistKind::Initial => property.initial_checklist = Some(tree),
        ChecklistKind::Final => property.final_checklist = Some(tree),
    }
    property.updated_at = Utc::now();
    repo.db.update(&property)?;
    tracing::info!(unique_id = %property.unique_id, %kind, percent = progress.percent, "checklist stored");

    print_progress(&property.unique_id, kind, &progress, format)
}

pub fn show(repo_root: &Path, id: &str, kind: Option<ChecklistKind>, format: Format) -> Result<()> {
    let repo = Repo::open(repo_root)?;
    let property = repo.resolve(id)?;
    let kinds = match kind {
        Some(k) => vec![k],
        None => vec![ChecklistKind::Initial, ChecklistKind::Final],
    };
    for kind in kinds {
        let progress = property
            .checklist(kind)
            .map(checklist::progress)
            .unwrap_or_default();
        print_progress(&property.unique_id, kind, &progress, format)?;
    }
    Ok(())
}

fn print_progress(
    unique_id: &str,
    kind: ChecklistKind,
    progress: &checklist::Progress,
    format: Format,
) -> Result<()> {
    match format {
        Format::Json => output::print_json(&json!({
            "unique_id": unique_id,
            "checklist": kind,
            "progress": progress,
        }))?,
        Format::Pretty => {
            println!(
                "{unique_id} {kind} checklist: {}% ({}/{})",
                progress.percent, progress.completed, progress.total
            );
            for section in &progress.sections {
                println!(
                    "  {:24} {:>3}% ({}/{})",
                    section.name, section.percent, section.completed, section.total
                );
            }
        }
        Format::Minimal => println!("{unique_id} {kind} {}", progress.percent),
    }
    Ok(())
}
