use std::path::Path;

use serde_json::json;

use crate::error::Result;
use crate::model::{ChangeSource, Phase};
use crate::output::{self, Format};
use crate::phase::{AliasTable, MatchKind, PhaseWriter, check_manual};
use crate::store::repo::{self, Repo};

/// Manual correction to any pipeline phase, including the way out of
/// `orphaned`.
pub fn set(repo_root: &Path, id: &str, target: Phase, reason: Option<String>, format: Format) -> Result<()> {
    check_manual(target)?;
    let repo = Repo::open(repo_root)?;
    let mut property = repo.resolve(id)?;

    let crm = repo.crm()?;
    PhaseWriter::new(&repo.db, crm.as_ref(), repo.retry_policy()).write(
        &mut property,
        target,
        ChangeSource::Manual,
        reason.as_deref(),
    )?;

    output::print_property(&property, format)
}

/// Show how a piece of CRM status text is classified. Uses the workspace
/// alias table when run inside one, the built-in table otherwise.
pub fn classify(text: &str, format: Format) -> Result<()> {
    let table = match repo::find_repo_root() {
        Ok(root) => Repo::open(&root)?.aliases,
        Err(_) => AliasTable::builtin(),
    };
    let c = table.classify(text);
    match format {
        Format::Json => output::print_json(&c)?,
        _ => {
            let how = match c.matched_by {
                MatchKind::Exact => "exact label".to_string(),
                MatchKind::Alias(ref alias) => format!("alias '{alias}'"),
                MatchKind::Unmatched => "no match".to_string(),
            };
            println!("{} -> {} ({how})", c.input, c.phase);
        }
    }
    Ok(())
}

/// The canonical label of every phase.
pub fn labels(format: Format) -> Result<()> {
    match format {
        Format::Json => {
            let rows: Vec<_> = Phase::ALL
                .iter()
                .map(|p| {
                    json!({
                        "phase": p,
                        "label": p.canonical_label(),
                        "ordinal": p.ordinal(),
                    })
                })
                .collect();
            output::print_json(&rows)?;
        }
        _ => {
            for p in Phase::ALL {
                println!("{:24} {}", p.slug(), p.canonical_label());
            }
        }
    }
    Ok(())
}
