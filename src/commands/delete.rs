use std::path::Path;

use serde_json::json;

use crate::error::Result;
use crate::output::{self, Format};
use crate::store::repo::Repo;

/// Remove a property and its history from the local store. The CRM record
/// is left alone; the next `sync` recreates the property if it still exists
/// there.
pub fn run(repo_root: &Path, id: &str, format: Format) -> Result<()> {
    let repo = Repo::open(repo_root)?;
    let property = repo.resolve(id)?;
    repo.db.delete(property.id)?;
    tracing::info!(unique_id = %property.unique_id, "property deleted");

    match format {
        Format::Json => output::print_json(&json!({
            "deleted": property.unique_id,
            "id": property.id,
        }))?,
        _ => println!("deleted {}", property.unique_id),
    }
    Ok(())
}
