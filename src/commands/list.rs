use std::path::Path;

use crate::board::BoardFilter;
use crate::error::Result;
use crate::model::Phase;
use crate::output::{self, Format};
use crate::store::repo::Repo;

pub fn run(repo_root: &Path, phase: Option<Phase>, filter: BoardFilter, format: Format) -> Result<()> {
    let repo = Repo::open(repo_root)?;

    let mut properties = match phase {
        Some(phase) => repo.db.list_by_phase(phase)?,
        None => repo.db.list_all()?,
    };
    if !filter.is_empty() {
        properties.retain(|p| filter.matches(p));
    }

    output::print_properties(&properties, format)
}
