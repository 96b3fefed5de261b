use std::path::Path;

use crate::error::Result;
use crate::output::{self, Format};
use crate::store::repo::Repo;
use crate::sync;

pub fn run(repo_root: &Path, format: Format) -> Result<()> {
    let repo = Repo::open(repo_root)?;
    let _lock = repo.lock()?;
    let crm = repo.crm()?;
    let report = sync::pull(&repo.db, crm.as_ref(), &repo.aliases, repo.retry_policy())?;

    match format {
        Format::Json => output::print_json(&report)?,
        _ => {
            println!(
                "fetched {}  created {}  updated {}  unchanged {}  skipped {}",
                report.fetched, report.created, report.updated, report.unchanged, report.skipped
            );
            if !report.orphaned.is_empty() {
                println!("orphaned: {}", report.orphaned.join(", "));
            }
            if !report.duplicates.is_empty() {
                println!("duplicate unique ids in crm: {}", report.duplicates.join(", "));
            }
            if !report.overwritten_pending.is_empty() {
                println!(
                    "pending phase writes overwritten (run `reno resume`): {}",
                    report.overwritten_pending.join(", ")
                );
            }
        }
    }
    Ok(())
}
