use chrono::Utc;

use crate::crm::{Crm, RetryPolicy};
use crate::error::Result;
use crate::model::{ChangeSource, Phase, PhaseIntent, Property};
use crate::store::db::PropertyDb;

/// Writes a phase change to both stores: CRM label first, internal enum
/// second.
///
/// An intent row is recorded before the CRM call and removed in the same
/// SQLite transaction that stores the new phase. If the process dies between
/// the two writes the intent survives and [`PhaseWriter::resume`] finishes
/// the job. The same holds when the CRM write fails transiently, since the
/// update may have been applied. On a permanent CRM failure the intent is
/// dropped. In every failure case the local phase is left untouched.
pub struct PhaseWriter<'a> {
    db: &'a PropertyDb,
    crm: &'a dyn Crm,
    retry: RetryPolicy,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ResumeOutcome {
    pub unique_id: String,
    pub target: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<'a> PhaseWriter<'a> {
    pub fn new(db: &'a PropertyDb, crm: &'a dyn Crm, retry: RetryPolicy) -> Self {
        Self { db, crm, retry }
    }

    pub fn write(
        &self,
        property: &mut Property,
        target: Phase,
        source: ChangeSource,
        note: Option<&str>,
    ) -> Result<()> {
        let from = property.phase;
        self.db.put_intent(&PhaseIntent {
            property_id: property.id,
            unique_id: property.unique_id.clone(),
            target,
            source,
            created_at: Utc::now(),
        })?;

        let label = target.canonical_label();
        if let Err(err) = self
            .retry
            .run("update_status", || self.crm.update_status(&property.unique_id, label))
        {
            // A transient failure may have landed in the CRM; the intent stays
            // for `resume`.
            if err.is_retryable() {
                tracing::warn!(
                    unique_id = %property.unique_id,
                    target = %target,
                    error = %err,
                    "crm write outcome unknown; intent kept for resume"
                );
            } else {
                tracing::warn!(
                    unique_id = %property.unique_id,
                    target = %target,
                    error = %err,
                    "crm rejected phase write; local phase unchanged"
                );
                self.db.clear_intent(property.id)?;
            }
            return Err(err.into());
        }

        self.commit_local(property, from, target, source, note)?;
        tracing::info!(
            unique_id = %property.unique_id,
            from = %from,
            to = %target,
            source = %source,
            "phase written"
        );
        Ok(())
    }

    fn commit_local(
        &self,
        property: &mut Property,
        from: Phase,
        target: Phase,
        source: ChangeSource,
        note: Option<&str>,
    ) -> Result<()> {
        property.phase = target;
        property.set_up_status = Some(target.canonical_label().to_string());
        property.updated_at = Utc::now();
        self.db.apply_phase(property, Some(from), source, note)
    }

    /// Re-apply every pending intent: CRM write again (idempotent), then the
    /// local write. Failures are reported per intent and leave it pending.
    pub fn resume(&self) -> Result<Vec<ResumeOutcome>> {
        let mut outcomes = Vec::new();
        for intent in self.db.intents()? {
            let mut property = match self.db.get(intent.property_id) {
                Ok(p) => p,
                Err(err) => {
                    self.db.clear_intent(intent.property_id)?;
                    outcomes.push(ResumeOutcome {
                        unique_id: intent.unique_id,
                        target: intent.target,
                        error: Some(err.to_string()),
                    });
                    continue;
                }
            };
            let label = intent.target.canonical_label();
            let result = self.retry.run("update_status", || {
                self.crm.update_status(&property.unique_id, label)
            });
            let error = match result {
                Ok(()) => {
                    let from = property.phase;
                    let note = format!("resumed {} write", intent.source);
                    self.commit_local(
                        &mut property,
                        from,
                        intent.target,
                        ChangeSource::Resume,
                        Some(note.as_str()),
                    )?;
                    None
                }
                Err(err) => Some(err.to_string()),
            };
            outcomes.push(ResumeOutcome {
                unique_id: intent.unique_id,
                target: intent.target,
                error,
            });
        }
        Ok(outcomes)
    }
}
