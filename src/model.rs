use chrono::{DateTime, NaiveDate, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Position of a property in the renovation pipeline.
///
/// Variants are declared in pipeline order; `Orphaned` is the terminal
/// catch-all for status text that does not map to any known stage.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
#[clap(rename_all = "kebab-case")]
pub enum Phase {
    UpcomingSettlements,
    InitialCheck,
    RenoBudgetRenovator,
    RenoBudgetClient,
    RenoBudgetStart,
    RenoInProgress,
    FurnishingCleaning,
    FinalCheck,
    Done,
    Orphaned,
}

impl Phase {
    pub const ALL: [Phase; 10] = [
        Phase::UpcomingSettlements,
        Phase::InitialCheck,
        Phase::RenoBudgetRenovator,
        Phase::RenoBudgetClient,
        Phase::RenoBudgetStart,
        Phase::RenoInProgress,
        Phase::FurnishingCleaning,
        Phase::FinalCheck,
        Phase::Done,
        Phase::Orphaned,
    ];

    /// Board columns, in pipeline order. Excludes `Orphaned`.
    pub fn pipeline() -> &'static [Phase] {
        &Self::ALL[..9]
    }

    /// The single label the CRM "Set Up Status" field carries for this phase.
    pub fn canonical_label(self) -> &'static str {
        match self {
            Self::UpcomingSettlements => "Upcoming Settlements",
            Self::InitialCheck => "Initial Check",
            Self::RenoBudgetRenovator => "Pending to Budget (from Renovator)",
            Self::RenoBudgetClient => "Pending to Budget (from Client)",
            Self::RenoBudgetStart => "Reno to Start",
            Self::RenoInProgress => "Reno In Progress",
            Self::FurnishingCleaning => "Furnishing/Cleaning",
            Self::FinalCheck => "Final Check",
            Self::Done => "Reno Finished",
            Self::Orphaned => "Orphaned",
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            Self::UpcomingSettlements => "upcoming-settlements",
            Self::InitialCheck => "initial-check",
            Self::RenoBudgetRenovator => "reno-budget-renovator",
            Self::RenoBudgetClient => "reno-budget-client",
            Self::RenoBudgetStart => "reno-budget-start",
            Self::RenoInProgress => "reno-in-progress",
            Self::FurnishingCleaning => "furnishing-cleaning",
            Self::FinalCheck => "final-check",
            Self::Done => "done",
            Self::Orphaned => "orphaned",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Phase> {
        Self::ALL.into_iter().find(|p| p.slug() == slug)
    }

    /// Zero-based position in the pipeline; `None` for `Orphaned`.
    pub fn ordinal(self) -> Option<usize> {
        Self::pipeline().iter().position(|p| *p == self)
    }

    /// The stage that follows this one, if any.
    pub fn next(self) -> Option<Phase> {
        let idx = self.ordinal()?;
        Self::pipeline().get(idx + 1).copied()
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

/// Which of the two inspection checklists a document belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[clap(rename_all = "snake_case")]
pub enum ChecklistKind {
    Initial,
    Final,
}

impl std::fmt::Display for ChecklistKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::Final => write!(f, "final"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Property {
    pub id: Uuid,
    /// Business key shared with the CRM.
    pub unique_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renovator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_constructor: Option<String>,
    pub phase: Phase,
    /// Last status text written to or read from the CRM.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_up_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_visit_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_checklist: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_checklist: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Property {
    pub fn new(unique_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            unique_id: unique_id.into(),
            address: None,
            area: None,
            renovator: None,
            technical_constructor: None,
            phase: Phase::UpcomingSettlements,
            set_up_status: None,
            estimated_visit_date: None,
            initial_checklist: None,
            final_checklist: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn checklist(&self, kind: ChecklistKind) -> Option<&serde_json::Value> {
        match kind {
            ChecklistKind::Initial => self.initial_checklist.as_ref(),
            ChecklistKind::Final => self.final_checklist.as_ref(),
        }
    }

    /// Trim free-text fields and drop the ones left empty.
    pub fn normalize(&mut self) {
        self.unique_id = self.unique_id.trim().to_string();
        for field in [
            &mut self.address,
            &mut self.area,
            &mut self.renovator,
            &mut self.technical_constructor,
        ] {
            if let Some(value) = field.take() {
                let trimmed = value.trim();
                if !trimmed.is_empty() {
                    *field = Some(trimmed.to_string());
                }
            }
        }
    }
}

/// Who caused a recorded phase change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    Action,
    Manual,
    Sync,
    Reconcile,
    Resume,
}

impl std::fmt::Display for ChangeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Action => write!(f, "action"),
            Self::Manual => write!(f, "manual"),
            Self::Sync => write!(f, "sync"),
            Self::Reconcile => write!(f, "reconcile"),
            Self::Resume => write!(f, "resume"),
        }
    }
}

impl std::str::FromStr for ChangeSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "action" => Ok(Self::Action),
            "manual" => Ok(Self::Manual),
            "sync" => Ok(Self::Sync),
            "reconcile" => Ok(Self::Reconcile),
            "resume" => Ok(Self::Resume),
            other => Err(format!("unknown change source '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub property_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Phase>,
    pub to: Phase,
    pub source: ChangeSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub at: DateTime<Utc>,
}

/// A phase write that reached (or was about to reach) the CRM but has not
/// yet been committed to the internal store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseIntent {
    pub property_id: Uuid,
    pub unique_id: String,
    pub target: Phase,
    pub source: ChangeSource,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_serializes_kebab_case() {
        let json = serde_json::to_string(&Phase::RenoBudgetRenovator).unwrap();
        assert_eq!(json, r#""reno-budget-renovator""#);
    }

    #[test]
    fn slug_round_trips_for_every_phase() {
        for phase in Phase::ALL {
            assert_eq!(Phase::from_slug(phase.slug()), Some(phase));
            assert_eq!(phase.to_string(), phase.slug());
        }
    }

    #[test]
    fn pipeline_is_ordered_and_excludes_orphaned() {
        let pipeline = Phase::pipeline();
        assert_eq!(pipeline.len(), 9);
        assert!(!pipeline.contains(&Phase::Orphaned));
        assert!(pipeline.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(Phase::Orphaned.ordinal(), None);
    }

    #[test]
    fn next_walks_the_pipeline() {
        assert_eq!(Phase::UpcomingSettlements.next(), Some(Phase::InitialCheck));
        assert_eq!(Phase::FinalCheck.next(), Some(Phase::Done));
        assert_eq!(Phase::Done.next(), None);
        assert_eq!(Phase::Orphaned.next(), None);
    }

    #[test]
    fn canonical_labels_are_distinct() {
        let mut labels: Vec<&str> = Phase::ALL.iter().map(|p| p.canonical_label()).collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), Phase::ALL.len());
    }

    #[test]
    fn minimal_property_omits_optional_fields() {
        let property = Property::new("SP-0001");
        let json = serde_json::to_string(&property).unwrap();
        assert!(!json.contains("address"));
        assert!(!json.contains("renovator"));
        assert!(!json.contains("initial_checklist"));
        assert!(json.contains(r#""phase":"upcoming-settlements""#));
    }

    #[test]
    fn normalize_trims_and_drops_blank_fields() {
        let mut property = Property::new("  SP-0002 ");
        property.address = Some("  Calle Mayor 1 ".into());
        property.area = Some("   ".into());
        property.normalize();
        assert_eq!(property.unique_id, "SP-0002");
        assert_eq!(property.address.as_deref(), Some("Calle Mayor 1"));
        assert_eq!(property.area, None);
    }
}
