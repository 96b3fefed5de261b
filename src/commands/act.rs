use std::path::Path;

use chrono::NaiveDate;

use crate::checklist;
use crate::error::{RenoError, Result};
use crate::model::{ChangeSource, Phase, Property};
use crate::output::{self, Format};
use crate::phase::{Action, PhaseWriter, transition};
use crate::store::repo::Repo;

/// Validate `action` against the property and stage any field it sets.
/// Returns the phase the property moves to.
pub fn prepare(property: &mut Property, action: Action, visit_date: Option<NaiveDate>) -> Result<Phase> {
    let target = transition(property.phase, action)?;

    if let Some(kind) = action.required_checklist() {
        let progress = property
            .checklist(kind)
            .map(checklist::progress)
            .unwrap_or_default();
        if !progress.is_complete() {
            return Err(RenoError::ChecklistIncomplete(kind.to_string(), progress.percent));
        }
    }

    if action == Action::ScheduleVisit {
        let date = visit_date
            .or(property.estimated_visit_date)
            .ok_or(RenoError::MissingVisitDate)?;
        property.estimated_visit_date = Some(date);
    }
    Ok(target)
}

pub fn run(
    repo_root: &Path,
    id: &str,
    action: Action,
    visit_date: Option<NaiveDate>,
    format: Format,
) -> Result<()> {
    let repo = Repo::open(repo_root)?;
    let mut property = repo.resolve(id)?;
    let target = prepare(&mut property, action, visit_date)?;

    let crm = repo.crm()?;
    let note = action.to_string();
    PhaseWriter::new(&repo.db, crm.as_ref(), repo.retry_policy()).write(
        &mut property,
        target,
        ChangeSource::Action,
        Some(note.as_str()),
    )?;

    output::print_property(&property, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(phase: Phase) -> Property {
        let mut p = Property::new("SP-1");
        p.phase = phase;
        p
    }

    #[test]
    fn schedule_visit_needs_a_date() {
        let mut p = at(Phase::UpcomingSettlements);
        let err = prepare(&mut p, Action::ScheduleVisit, None).unwrap_err();
        assert!(matches!(err, RenoError::MissingVisitDate));

        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let target = prepare(&mut p, Action::ScheduleVisit, Some(date)).unwrap();
        assert_eq!(target, Phase::InitialCheck);
        assert_eq!(p.estimated_visit_date, Some(date));
    }

    #[test]
    fn checklist_gates_inspection_actions() {
        let mut p = at(Phase::InitialCheck);
        let err = prepare(&mut p, Action::CompleteInitialCheck, None).unwrap_err();
        assert!(matches!(err, RenoError::ChecklistIncomplete(_, 0)));

        p.initial_checklist = Some(json!({"kitchen": [{"status": "ok"}, {"status": "pending"}]}));
        let err = prepare(&mut p, Action::CompleteInitialCheck, None).unwrap_err();
        assert!(matches!(err, RenoError::ChecklistIncomplete(_, 50)));

        p.initial_checklist = Some(json!({"kitchen": [{"status": "ok"}]}));
        assert_eq!(
            prepare(&mut p, Action::CompleteInitialCheck, None).unwrap(),
            Phase::RenoBudgetRenovator
        );
    }

    #[test]
    fn wrong_phase_is_rejected_before_checklist() {
        let mut p = at(Phase::RenoInProgress);
        let err = prepare(&mut p, Action::CompleteFinalCheck, None).unwrap_err();
        assert_eq!(err.code(), "invalid_transition");
    }
}
