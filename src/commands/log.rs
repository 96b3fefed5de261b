use std::path::Path;

use crate::error::Result;
use crate::output::{self, Format};
use crate::store::repo::Repo;

/// Phase history of one property, oldest first.
pub fn run(repo_root: &Path, id: &str, format: Format) -> Result<()> {
    let repo = Repo::open(repo_root)?;
    let property = repo.resolve(id)?;
    let entries = repo.db.history(property.id)?;
    output::print_history(&property.unique_id, &entries, format)
}
