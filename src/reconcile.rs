//! Batch comparison of the CRM table against the internal store, keyed by
//! Unique ID.
//!
//! [`diff`] never drops a disagreement: every mismatch is listed and every
//! count is present in the report even when zero.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use serde::Serialize;

use crate::crm::CrmRecord;
use crate::error::Result;
use crate::model::{ChangeSource, Phase, PhaseIntent, Property};
use crate::phase::AliasTable;
use crate::store::db::PropertyDb;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub unique_id: String,
    pub crm_status: Option<String>,
    pub crm_phase: Phase,
    pub local_phase: Phase,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanedStatus {
    pub unique_id: String,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub crm_records: usize,
    pub local_properties: usize,
    pub matched: usize,
    pub mismatched: usize,
    pub missing_locally: usize,
    pub missing_in_crm: usize,
    pub orphaned: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub pending_intents: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub counts: Counts,
    pub mismatches: Vec<Mismatch>,
    pub missing_locally: Vec<String>,
    pub missing_in_crm: Vec<String>,
    pub orphaned: Vec<OrphanedStatus>,
    pub duplicates: Vec<String>,
    pub pending_intents: Vec<PhaseIntent>,
}

impl ReconcileReport {
    pub fn has_mismatches(&self) -> bool {
        !self.mismatches.is_empty()
    }
}

pub fn diff(
    records: &[CrmRecord],
    properties: &[Property],
    aliases: &AliasTable,
    intents: Vec<PhaseIntent>,
) -> ReconcileReport {
    let local: BTreeMap<&str, &Property> = properties
        .iter()
        .map(|p| (p.unique_id.as_str(), p))
        .collect();

    let mut report = ReconcileReport::default();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut matched = 0;
    let mut skipped = 0;

    for record in records {
        let Some(key) = record.key() else {
            skipped += 1;
            continue;
        };
        if !seen.insert(key) {
            report.duplicates.push(key.to_string());
            continue;
        }
        let crm_phase = aliases.phase_for(record.status.as_deref().unwrap_or(""));
        if crm_phase == Phase::Orphaned {
            report.orphaned.push(OrphanedStatus {
                unique_id: key.to_string(),
                status: record.status.clone(),
            });
        }
        match local.get(key) {
            None => report.missing_locally.push(key.to_string()),
            Some(property) if property.phase == crm_phase => matched += 1,
            Some(property) => report.mismatches.push(Mismatch {
                unique_id: key.to_string(),
                crm_status: record.status.clone(),
                crm_phase,
                local_phase: property.phase,
            }),
        }
    }

    report.missing_in_crm = local
        .keys()
        .filter(|uid| !seen.contains(*uid))
        .map(|uid| uid.to_string())
        .collect();
    report.pending_intents = intents;

    report.counts = Counts {
        crm_records: records.len(),
        local_properties: properties.len(),
        matched,
        mismatched: report.mismatches.len(),
        missing_locally: report.missing_locally.len(),
        missing_in_crm: report.missing_in_crm.len(),
        orphaned: report.orphaned.len(),
        duplicates: report.duplicates.len(),
        skipped,
        pending_intents: report.pending_intents.len(),
    };

    if report.has_mismatches() {
        tracing::warn!(
            mismatched = report.counts.mismatched,
            matched,
            "crm and local phases disagree"
        );
    }
    report
}

/// Overwrite local phases with the CRM phase for every mismatch in `report`.
/// Each correction commits on its own with a `reconcile` history row.
pub fn apply(db: &PropertyDb, report: &ReconcileReport) -> Result<Vec<Mismatch>> {
    let mut corrected = Vec::new();
    for mismatch in &report.mismatches {
        let Some(mut property) = db.get_by_unique_id(&mismatch.unique_id)? else {
            tracing::warn!(unique_id = %mismatch.unique_id, "property vanished before correction");
            continue;
        };
        let from = property.phase;
        property.phase = mismatch.crm_phase;
        property.set_up_status = mismatch.crm_status.clone();
        property.updated_at = Utc::now();
        let note = format!(
            "crm status '{}'",
            mismatch.crm_status.as_deref().unwrap_or("")
        );
        db.apply_phase(&property, Some(from), ChangeSource::Reconcile, Some(note.as_str()))?;
        tracing::info!(
            unique_id = %mismatch.unique_id,
            from = %from,
            to = %mismatch.crm_phase,
            "phase corrected from crm"
        );
        corrected.push(mismatch.clone());
    }
    Ok(corrected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn property(uid: &str, phase: Phase) -> Property {
        let mut p = Property::new(uid);
        p.phase = phase;
        p
    }

    #[test]
    fn agreement_has_no_mismatches() {
        let records = vec![
            CrmRecord::new("SP-1", "Initial Check"),
            CrmRecord::new("SP-2", "reno finished"),
        ];
        let properties = vec![
            property("SP-1", Phase::InitialCheck),
            property("SP-2", Phase::Done),
        ];
        let report = diff(&records, &properties, &AliasTable::builtin(), vec![]);
        assert!(!report.has_mismatches());
        assert_eq!(report.counts.matched, 2);
        assert_eq!(report.counts.mismatched, 0);
    }

    #[test]
    fn reports_every_kind_of_disagreement() {
        let mut blank = CrmRecord::new("", "Final Check");
        blank.unique_id = None;
        let records = vec![
            CrmRecord::new("SP-1", "Final Check"),
            CrmRecord::new("SP-2", "???"),
            CrmRecord::new("SP-3", "Initial Check"),
            CrmRecord::new("SP-3", "Reno In Progress"),
            blank,
        ];
        let properties = vec![
            property("SP-1", Phase::RenoInProgress),
            property("SP-2", Phase::Orphaned),
            property("SP-9", Phase::Done),
        ];

        let report = diff(&records, &properties, &AliasTable::builtin(), vec![]);

        assert_eq!(
            report.mismatches,
            vec![Mismatch {
                unique_id: "SP-1".into(),
                crm_status: Some("Final Check".into()),
                crm_phase: Phase::FinalCheck,
                local_phase: Phase::RenoInProgress,
            }]
        );
        assert_eq!(report.counts.matched, 1);
        assert_eq!(report.missing_locally, ["SP-3"]);
        assert_eq!(report.missing_in_crm, ["SP-9"]);
        assert_eq!(report.orphaned.len(), 1);
        assert_eq!(report.duplicates, ["SP-3"]);
        assert_eq!(report.counts.skipped, 1);
        assert_eq!(report.counts.crm_records, 5);
    }

    #[test]
    fn pending_intents_are_reported() {
        let stuck = property("SP-1", Phase::UpcomingSettlements);
        let intent = PhaseIntent {
            property_id: stuck.id,
            unique_id: stuck.unique_id.clone(),
            target: Phase::InitialCheck,
            source: ChangeSource::Action,
            created_at: Utc::now(),
        };
        let records = vec![CrmRecord::new("SP-1", "Initial Check")];

        let report = diff(&records, &[stuck], &AliasTable::builtin(), vec![intent.clone()]);

        assert_eq!(report.counts.pending_intents, 1);
        assert_eq!(report.pending_intents.len(), 1);
        assert_eq!(report.pending_intents[0].property_id, intent.property_id);
        assert_eq!(report.pending_intents[0].target, Phase::InitialCheck);
        assert_eq!(report.counts.mismatched, 1);
    }

    #[test]
    fn apply_makes_local_follow_crm() {
        let db = PropertyDb::open_memory().unwrap();
        let local = property("SP-1", Phase::RenoInProgress);
        db.insert(&local).unwrap();
        let records = vec![CrmRecord::new("SP-1", "Final Check")];

        let report = diff(&records, &db.list_all().unwrap(), &AliasTable::builtin(), vec![]);
        let corrected = apply(&db, &report).unwrap();
        assert_eq!(corrected.len(), 1);

        let stored = db.get(local.id).unwrap();
        assert_eq!(stored.phase, Phase::FinalCheck);
        let history = db.history(local.id).unwrap();
        assert_eq!(history.last().unwrap().source, ChangeSource::Reconcile);

        let again = diff(&records, &db.list_all().unwrap(), &AliasTable::builtin(), vec![]);
        assert!(!again.has_mismatches());
    }
}
