//! Pull the CRM table into the internal store.
//!
//! The CRM's status text is authoritative: after a pull every property that
//! exists in both stores carries the phase its CRM status maps to.

use std::collections::HashSet;

use chrono::Utc;
use serde::Serialize;

use crate::crm::{Crm, CrmRecord, RetryPolicy};
use crate::error::Result;
use crate::model::{ChangeSource, HistoryEntry, Phase, Property};
use crate::phase::AliasTable;
use crate::store::db::PropertyDb;

pub const LAST_SYNC_KEY: &str = "last_sync_at";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub fetched: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Records without a Unique ID.
    pub skipped: usize,
    /// Later records repeating an already-seen Unique ID.
    pub duplicates: Vec<String>,
    /// Unique IDs whose status text classified as orphaned.
    pub orphaned: Vec<String>,
    /// Unique IDs whose phase was overwritten while a phase write was still
    /// pending; `reno resume` will write the CRM again for them.
    pub overwritten_pending: Vec<String>,
}

/// Fetch every CRM record and upsert the store in one transaction.
pub fn pull(
    db: &PropertyDb,
    crm: &dyn Crm,
    aliases: &AliasTable,
    retry: RetryPolicy,
) -> Result<SyncReport> {
    let records = retry.run("list_records", || crm.list_records())?;
    let mut report = SyncReport {
        fetched: records.len(),
        ..SyncReport::default()
    };

    let pending: HashSet<String> = db.intents()?.into_iter().map(|i| i.unique_id).collect();

    let tx = db.transaction()?;
    let mut seen: HashSet<String> = HashSet::new();
    for record in &records {
        let Some(key) = record.key() else {
            report.skipped += 1;
            continue;
        };
        if !seen.insert(key.to_string()) {
            tracing::warn!(unique_id = key, "duplicate unique id in crm; keeping first record");
            report.duplicates.push(key.to_string());
            continue;
        }

        let status = record.status.as_deref().unwrap_or("");
        let phase = aliases.phase_for(status);
        if phase == Phase::Orphaned {
            tracing::warn!(unique_id = key, status, "crm status does not map to a phase");
            report.orphaned.push(key.to_string());
        }

        match db.get_by_unique_id(key)? {
            None => {
                let mut property = Property::new(key);
                apply_record(&mut property, record, phase);
                property.normalize();
                db.insert(&property)?;
                db.append_history(&HistoryEntry {
                    property_id: property.id,
                    from: None,
                    to: phase,
                    source: ChangeSource::Sync,
                    note: Some(format!("imported with status '{status}'")),
                    at: property.updated_at,
                })?;
                report.created += 1;
            }
            Some(mut property) => {
                let before = property.clone();
                apply_record(&mut property, record, phase);
                property.normalize();
                if property == before {
                    report.unchanged += 1;
                    continue;
                }
                property.updated_at = Utc::now();
                db.update(&property)?;
                if before.phase != property.phase {
                    if pending.contains(key) {
                        tracing::warn!(
                            unique_id = key,
                            from = %before.phase,
                            to = %property.phase,
                            "phase overwritten while a phase write is pending; resume will rewrite the crm"
                        );
                        report.overwritten_pending.push(key.to_string());
                    }
                    db.append_history(&HistoryEntry {
                        property_id: property.id,
                        from: Some(before.phase),
                        to: property.phase,
                        source: ChangeSource::Sync,
                        note: Some(format!("crm status '{status}'")),
                        at: property.updated_at,
                    })?;
                }
                report.updated += 1;
            }
        }
    }
    db.set_metadata(LAST_SYNC_KEY, &Utc::now().to_rfc3339())?;
    tx.commit()?;

    tracing::info!(
        crm = crm.name(),
        fetched = report.fetched,
        created = report.created,
        updated = report.updated,
        skipped = report.skipped,
        orphaned = report.orphaned.len(),
        "sync finished"
    );
    Ok(report)
}

/// Copy CRM-owned fields onto a property. Descriptive fields the CRM leaves
/// blank keep their local value.
fn apply_record(property: &mut Property, record: &CrmRecord, phase: Phase) {
    property.phase = phase;
    property.set_up_status = record.status.clone();
    for (local, remote) in [
        (&mut property.address, &record.address),
        (&mut property.area, &record.area),
        (&mut property.renovator, &record.renovator),
        (&mut property.technical_constructor, &record.technical_constructor),
    ] {
        if let Some(value) = remote.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            *local = Some(value.to_string());
        }
    }
}
