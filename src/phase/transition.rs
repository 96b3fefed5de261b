use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{RenoError, Result};
use crate::model::{ChecklistKind, Phase};

/// User actions that move a property one step down the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[clap(rename_all = "kebab-case")]
pub enum Action {
    ScheduleVisit,
    CompleteInitialCheck,
    SubmitRenovatorBudget,
    ApproveBudget,
    StartReno,
    FinishReno,
    FinishCleaning,
    CompleteFinalCheck,
}

impl Action {
    pub const ALL: [Action; 8] = [
        Action::ScheduleVisit,
        Action::CompleteInitialCheck,
        Action::SubmitRenovatorBudget,
        Action::ApproveBudget,
        Action::StartReno,
        Action::FinishReno,
        Action::FinishCleaning,
        Action::CompleteFinalCheck,
    ];

    /// The only phase this action may be taken from.
    pub fn from_phase(self) -> Phase {
        match self {
            Self::ScheduleVisit => Phase::UpcomingSettlements,
            Self::CompleteInitialCheck => Phase::InitialCheck,
            Self::SubmitRenovatorBudget => Phase::RenoBudgetRenovator,
            Self::ApproveBudget => Phase::RenoBudgetClient,
            Self::StartReno => Phase::RenoBudgetStart,
            Self::FinishReno => Phase::RenoInProgress,
            Self::FinishCleaning => Phase::FurnishingCleaning,
            Self::CompleteFinalCheck => Phase::FinalCheck,
        }
    }

    /// Checklist that must be fully completed before the action is allowed.
    pub fn required_checklist(self) -> Option<ChecklistKind> {
        match self {
            Self::CompleteInitialCheck => Some(ChecklistKind::Initial),
            Self::CompleteFinalCheck => Some(ChecklistKind::Final),
            _ => None,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ScheduleVisit => "schedule-visit",
            Self::CompleteInitialCheck => "complete-initial-check",
            Self::SubmitRenovatorBudget => "submit-renovator-budget",
            Self::ApproveBudget => "approve-budget",
            Self::StartReno => "start-reno",
            Self::FinishReno => "finish-reno",
            Self::FinishCleaning => "finish-cleaning",
            Self::CompleteFinalCheck => "complete-final-check",
        };
        f.write_str(s)
    }
}

/// Resolve the target phase of `action` taken while in `current`.
pub fn transition(current: Phase, action: Action) -> Result<Phase> {
    let target = if current == action.from_phase() {
        current.next()
    } else {
        None
    };
    target.ok_or_else(|| RenoError::InvalidTransition {
        action: action.to_string(),
        from: current.to_string(),
    })
}

/// Manual corrections may go to any pipeline phase, never to `Orphaned`.
pub fn check_manual(target: Phase) -> Result<()> {
    if target == Phase::Orphaned {
        return Err(RenoError::InvalidManualPhase(target.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_action_advances_exactly_one_step() {
        for action in Action::ALL {
            let from = action.from_phase();
            let to = transition(from, action).unwrap();
            assert_eq!(to.ordinal(), from.ordinal().map(|o| o + 1), "{action}");
        }
    }

    #[test]
    fn actions_cover_the_whole_pipeline() {
        let froms: Vec<Phase> = Action::ALL.iter().map(|a| a.from_phase()).collect();
        assert_eq!(froms, Phase::pipeline()[..8].to_vec());
    }

    #[test]
    fn action_from_wrong_phase_is_rejected() {
        let err = transition(Phase::Done, Action::StartReno).unwrap_err();
        assert!(matches!(err, RenoError::InvalidTransition { .. }));
        assert_eq!(err.code(), "invalid_transition");

        for action in Action::ALL {
            assert!(transition(Phase::Orphaned, action).is_err());
        }
    }

    #[test]
    fn checklist_gates() {
        assert_eq!(
            Action::CompleteInitialCheck.required_checklist(),
            Some(ChecklistKind::Initial)
        );
        assert_eq!(
            Action::CompleteFinalCheck.required_checklist(),
            Some(ChecklistKind::Final)
        );
        assert_eq!(Action::StartReno.required_checklist(), None);
    }

    #[test]
    fn manual_correction_cannot_orphan() {
        assert!(check_manual(Phase::InitialCheck).is_ok());
        assert!(matches!(
            check_manual(Phase::Orphaned),
            Err(RenoError::InvalidManualPhase(_))
        ));
    }
}
