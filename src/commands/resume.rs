use std::path::Path;

use crate::error::Result;
use crate::output::{self, Format};
use crate::phase::PhaseWriter;
use crate::store::repo::Repo;

/// Finish phase writes interrupted between the CRM and the local store.
pub fn run(repo_root: &Path, format: Format) -> Result<()> {
    let repo = Repo::open(repo_root)?;
    let _lock = repo.lock()?;
    let crm = repo.crm()?;
    let outcomes = PhaseWriter::new(&repo.db, crm.as_ref(), repo.retry_policy()).resume()?;

    match format {
        Format::Json => output::print_json(&outcomes)?,
        _ => {
            if outcomes.is_empty() {
                println!("no pending phase writes");
            }
            for o in &outcomes {
                match o.error {
                    Some(ref err) => println!("{} -> {}: failed: {err}", o.unique_id, o.target),
                    None => println!("{} -> {}: done", o.unique_id, o.target),
                }
            }
        }
    }
    Ok(())
}
