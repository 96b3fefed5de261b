use std::path::Path;

use chrono::{NaiveDate, Utc};

use crate::commands::create::PropertyFields;
use crate::error::Result;
use crate::output::{self, Format};
use crate::store::repo::Repo;

/// Update descriptive fields. The phase is never edited here; it only moves
/// through `act`, `phase set`, `sync` and `reconcile --apply`.
pub fn run(
    repo_root: &Path,
    id: &str,
    fields: PropertyFields,
    visit_date: Option<NaiveDate>,
    format: Format,
) -> Result<()> {
    let repo = Repo::open(repo_root)?;
    let mut property = repo.resolve(id)?;

    fields.apply_to(&mut property);
    if let Some(date) = visit_date {
        property.estimated_visit_date = Some(date);
    }
    property.normalize();
    property.updated_at = Utc::now();
    repo.db.update(&property)?;

    output::print_property(&property, format)
}
