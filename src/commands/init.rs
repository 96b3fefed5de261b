use std::path::Path;

use crate::error::Result;
use crate::store::repo::Repo;

pub fn run(repo_root: &Path) -> Result<()> {
    let repo = Repo::init(repo_root)?;
    eprintln!("Initialized .reno/ in {}", repo_root.display());
    eprintln!(
        "CRM backend: {} (edit {} to change)",
        repo.config.crm.backend,
        repo.root().join(crate::config::CONFIG_FILE).display()
    );
    Ok(())
}
