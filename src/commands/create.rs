use std::path::Path;

use crate::error::Result;
use crate::model::Property;
use crate::output::{self, Format};
use crate::store::repo::{self, Repo};

/// Descriptive fields shared by `create` and `edit`.
#[derive(Debug, Clone, Default)]
pub struct PropertyFields {
    pub address: Option<String>,
    pub area: Option<String>,
    pub renovator: Option<String>,
    pub technical_constructor: Option<String>,
}

impl PropertyFields {
    pub fn apply_to(self, property: &mut Property) {
        if let Some(v) = self.address {
            property.address = Some(v);
        }
        if let Some(v) = self.area {
            property.area = Some(v);
        }
        if let Some(v) = self.renovator {
            property.renovator = Some(v);
        }
        if let Some(v) = self.technical_constructor {
            property.technical_constructor = Some(v);
        }
    }
}

/// Register a property locally. It starts in the first pipeline phase; the
/// CRM record is expected to exist under the same Unique ID.
pub fn run(repo_root: &Path, unique_id: String, fields: PropertyFields, format: Format) -> Result<()> {
    let unique_id = unique_id.trim().to_string();
    repo::validate_unique_id(&unique_id)?;
    let repo = Repo::open(repo_root)?;

    let mut property = Property::new(unique_id);
    fields.apply_to(&mut property);
    property.normalize();
    repo.db.insert(&property)?;
    tracing::info!(unique_id = %property.unique_id, id = %property.id, "property created");

    output::print_property(&property, format)
}
