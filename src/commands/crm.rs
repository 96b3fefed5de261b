use std::path::Path;

use crate::config::CrmBackend;
use crate::crm::snapshot::SnapshotCrm;
use crate::crm::{CrmError, CrmRecord};
use crate::error::Result;
use crate::output::{self, Format};
use crate::store::repo::Repo;

pub fn list(repo_root: &Path, format: Format) -> Result<()> {
    let repo = Repo::open(repo_root)?;
    let crm = repo.crm()?;
    let records = repo.retry_policy().run("list_records", || crm.list_records())?;

    match format {
        Format::Json => output::print_json(&records)?,
        _ => {
            for r in &records {
                let status = r.status.as_deref().unwrap_or("<empty>");
                println!(
                    "{:12} {:36} -> {}",
                    r.key().unwrap_or("<no id>"),
                    status,
                    repo.aliases.phase_for(status)
                );
            }
        }
    }
    Ok(())
}

/// Write status text straight to the CRM, bypassing the local store. Used to
/// mirror edits made on the CRM side.
pub fn set_status(repo_root: &Path, unique_id: &str, status: &str, format: Format) -> Result<()> {
    let repo = Repo::open(repo_root)?;
    let crm = repo.crm()?;
    repo.retry_policy()
        .run("update_status", || crm.update_status(unique_id, status))?;

    match format {
        Format::Json => output::print_json(&serde_json::json!({
            "unique_id": unique_id,
            "status": status,
        }))?,
        _ => println!("{unique_id}: {status}"),
    }
    Ok(())
}

/// Insert or replace a record in the snapshot table.
pub fn add(repo_root: &Path, record: CrmRecord, format: Format) -> Result<()> {
    let repo = Repo::open(repo_root)?;
    if repo.config.crm.backend != CrmBackend::Snapshot {
        return Err(CrmError::Misconfigured(
            "records can only be added to the snapshot backend".into(),
        )
        .into());
    }
    let snapshot = SnapshotCrm::new(repo.root().join(&repo.config.crm.snapshot_path));
    snapshot.upsert(record.clone())?;
    tracing::debug!(path = %snapshot.path().display(), "snapshot record written");
    match format {
        Format::Json => output::print_json(&record)?,
        _ => println!(
            "{}: {}",
            record.key().unwrap_or("<no id>"),
            record.status.as_deref().unwrap_or("<empty>")
        ),
    }
    Ok(())
}
