use serde::Serialize;

use crate::model::{Phase, Property};

/// Narrowing applied before properties are placed in columns.
#[derive(Debug, Clone, Default)]
pub struct BoardFilter {
    pub renovator: Option<String>,
    pub constructor: Option<String>,
    pub area: Option<String>,
    /// Substring over Unique ID and address.
    pub search: Option<String>,
}

fn same_text(value: Option<&str>, wanted: &str) -> bool {
    value.is_some_and(|v| v.trim().eq_ignore_ascii_case(wanted.trim()))
}

impl BoardFilter {
    pub fn is_empty(&self) -> bool {
        self.renovator.is_none()
            && self.constructor.is_none()
            && self.area.is_none()
            && self.search.is_none()
    }

    pub fn matches(&self, property: &Property) -> bool {
        let field_ok = |wanted: &Option<String>, value: Option<&str>| {
            wanted.as_deref().is_none_or(|w| same_text(value, w))
        };
        if !field_ok(&self.renovator, property.renovator.as_deref())
            || !field_ok(&self.constructor, property.technical_constructor.as_deref())
            || !field_ok(&self.area, property.area.as_deref())
        {
            return false;
        }
        match self.search {
            Some(ref q) => {
                let needle = q.trim().to_lowercase();
                property.unique_id.to_lowercase().contains(&needle)
                    || property
                        .address
                        .as_deref()
                        .is_some_and(|a| a.to_lowercase().contains(&needle))
            }
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Column {
    pub phase: Phase,
    pub label: &'static str,
    pub properties: Vec<Property>,
}

/// Kanban view: one column per pipeline phase plus a separate bucket for
/// properties whose CRM status could not be classified.
#[derive(Debug, Clone, Serialize)]
pub struct Board {
    pub columns: Vec<Column>,
    pub orphaned: Vec<Property>,
}

impl Board {
    pub fn build(properties: Vec<Property>, filter: &BoardFilter) -> Self {
        let mut columns: Vec<Column> = Phase::pipeline()
            .iter()
            .map(|phase| Column {
                phase: *phase,
                label: phase.canonical_label(),
                properties: Vec::new(),
            })
            .collect();
        let mut orphaned = Vec::new();

        for property in properties.into_iter().filter(|p| filter.matches(p)) {
            match property.phase.ordinal() {
                Some(idx) => columns[idx].properties.push(property),
                None => orphaned.push(property),
            }
        }
        for column in &mut columns {
            column.properties.sort_by(|a, b| a.unique_id.cmp(&b.unique_id));
        }
        orphaned.sort_by(|a, b| a.unique_id.cmp(&b.unique_id));

        Self { columns, orphaned }
    }

    pub fn total(&self) -> usize {
        self.columns.iter().map(|c| c.properties.len()).sum::<usize>() + self.orphaned.len()
    }

    pub fn column(&self, phase: Phase) -> Option<&Column> {
        self.columns.iter().find(|c| c.phase == phase)
    }
}
