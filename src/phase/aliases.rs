use std::collections::BTreeMap;
use std::sync::LazyLock;

use serde::Serialize;

use crate::error::{RenoError, Result};
use crate::model::Phase;

/// Built-in alias keys per phase, in normalized form.
const BUILTIN_ALIASES: &[(Phase, &[&str])] = &[
    (
        Phase::UpcomingSettlements,
        &["upcoming settlements", "upcoming settlement", "pending to visit", "settlement"],
    ),
    (
        Phase::InitialCheck,
        &["initial check", "check inicial", "pending initial check"],
    ),
    (
        Phase::RenoBudgetRenovator,
        &["budget from renovator", "renovator budget", "pending to budget renovator"],
    ),
    (
        Phase::RenoBudgetClient,
        &["budget from client", "client budget", "pending to budget client"],
    ),
    (
        Phase::RenoBudgetStart,
        &["reno to start", "pending to start", "budget approved"],
    ),
    (
        Phase::RenoInProgress,
        &["reno in progress", "renovation in progress", "in progress", "obra en curso"],
    ),
    (
        Phase::FurnishingCleaning,
        &["furnishing cleaning", "furnishing", "cleaning"],
    ),
    (
        Phase::FinalCheck,
        &["final check", "check final", "pending final check"],
    ),
    (Phase::Done, &["reno finished", "finished", "completed", "done"]),
];

static DEFAULT_TABLE: LazyLock<AliasTable> = LazyLock::new(AliasTable::builtin);

/// Map free CRM status text to a phase using the built-in alias table.
///
/// Never fails: text that matches nothing is `Phase::Orphaned`.
pub fn map_status_to_phase(label: &str) -> Phase {
    DEFAULT_TABLE.classify(label).phase
}

/// Lowercase, turn every non-alphanumeric run into a single space, trim.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        if !out.is_empty() {
            out.push(' ');
        }
        out.extend(word.chars().flat_map(char::to_lowercase));
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "alias", rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Alias(String),
    Unmatched,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub input: String,
    pub normalized: String,
    pub phase: Phase,
    pub matched_by: MatchKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum AliasProblem {
    EmptyAlias { phase: Phase },
    Conflict { alias: String, first: Phase, second: Phase },
    OrphanedTarget { alias: String },
    CanonicalShadowed { phase: Phase, resolved: Phase, alias: String },
}

impl std::fmt::Display for AliasProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyAlias { phase } => write!(f, "empty alias configured for {phase}"),
            Self::Conflict {
                alias,
                first,
                second,
            } => write!(f, "alias '{alias}' maps to both {first} and {second}"),
            Self::OrphanedTarget { alias } => {
                write!(f, "alias '{alias}' targets orphaned")
            }
            Self::CanonicalShadowed {
                phase,
                resolved,
                alias,
            } => write!(
                f,
                "canonical label of {phase} resolves to {resolved} via alias '{alias}'"
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AliasEntry {
    pub alias: String,
    pub phase: Phase,
}

/// Canonical labels plus the substring-fallback alias table.
///
/// Aliases are kept ordered longest-key-first (ties by pipeline order, then
/// alphabetically), so the most specific alias wins.
#[derive(Debug, Clone)]
pub struct AliasTable {
    canonical: Vec<(String, Phase)>,
    entries: Vec<AliasEntry>,
    problems: Vec<AliasProblem>,
}

impl AliasTable {
    pub fn builtin() -> Self {
        Self::build(&BTreeMap::new())
    }

    /// Built-in aliases extended with configured ones. Problems are recorded,
    /// not raised; see [`AliasTable::validate`].
    pub fn build(extra: &BTreeMap<Phase, Vec<String>>) -> Self {
        let canonical = Phase::ALL
            .iter()
            .map(|p| (normalize(p.canonical_label()), *p))
            .collect();

        let mut problems = Vec::new();
        let mut by_alias: BTreeMap<String, Phase> = BTreeMap::new();

        let builtin = BUILTIN_ALIASES
            .iter()
            .flat_map(|(phase, keys)| keys.iter().map(move |k| (*phase, k.to_string())));
        let configured = extra
            .iter()
            .flat_map(|(phase, keys)| keys.iter().map(move |k| (*phase, k.clone())));

        for (phase, raw) in builtin.chain(configured) {
            let alias = normalize(&raw);
            if alias.is_empty() {
                problems.push(AliasProblem::EmptyAlias { phase });
                continue;
            }
            if phase == Phase::Orphaned {
                problems.push(AliasProblem::OrphanedTarget { alias });
                continue;
            }
            match by_alias.get(&alias) {
                Some(existing) if *existing != phase => {
                    problems.push(AliasProblem::Conflict {
                        alias,
                        first: *existing,
                        second: phase,
                    });
                }
                Some(_) => {}
                None => {
                    by_alias.insert(alias, phase);
                }
            }
        }

        let mut entries: Vec<AliasEntry> = by_alias
            .into_iter()
            .map(|(alias, phase)| AliasEntry { alias, phase })
            .collect();
        entries.sort_by(|a, b| {
            b.alias
                .chars()
                .count()
                .cmp(&a.alias.chars().count())
                .then(a.phase.cmp(&b.phase))
                .then(a.alias.cmp(&b.alias))
        });

        let mut table = Self {
            canonical,
            entries,
            problems,
        };
        table.check_canonical_labels();
        table
    }

    /// Build from configuration and refuse to continue on any problem.
    pub fn load(extra: &BTreeMap<Phase, Vec<String>>) -> Result<Self> {
        let table = Self::build(extra);
        if let Err(problems) = table.validate() {
            let joined = problems
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(RenoError::InvalidAliasTable(joined));
        }
        Ok(table)
    }

    pub fn validate(&self) -> std::result::Result<(), Vec<AliasProblem>> {
        if self.problems.is_empty() {
            Ok(())
        } else {
            Err(self.problems.clone())
        }
    }

    // Every canonical label must land on its own phase even when the exact
    // match is skipped (CRM-side punctuation edits take the fallback path).
    fn check_canonical_labels(&mut self) {
        let mut shadowed = Vec::new();
        for (label, phase) in &self.canonical {
            let (resolved, alias) = match self.fallback(label) {
                Some(entry) => (entry.phase, entry.alias.clone()),
                None => (Phase::Orphaned, String::new()),
            };
            if resolved != *phase {
                shadowed.push(AliasProblem::CanonicalShadowed {
                    phase: *phase,
                    resolved,
                    alias,
                });
            }
        }
        self.problems.extend(shadowed);
    }

    fn fallback(&self, normalized: &str) -> Option<&AliasEntry> {
        let haystack = format!(" {normalized} ");
        self.entries
            .iter()
            .find(|entry| haystack.contains(&format!(" {} ", entry.alias)))
    }

    pub fn classify(&self, label: &str) -> Classification {
        let normalized = normalize(label);
        if let Some((_, phase)) = self.canonical.iter().find(|(c, _)| *c == normalized) {
            return Classification {
                input: label.to_string(),
                normalized,
                phase: *phase,
                matched_by: MatchKind::Exact,
            };
        }
        let (phase, matched_by) = match self.fallback(&normalized) {
            Some(entry) => (entry.phase, MatchKind::Alias(entry.alias.clone())),
            None => (Phase::Orphaned, MatchKind::Unmatched),
        };
        Classification {
            input: label.to_string(),
            normalized,
            phase,
            matched_by,
        }
    }

    pub fn phase_for(&self, label: &str) -> Phase {
        self.classify(label).phase
    }

    pub fn entries(&self) -> &[AliasEntry] {
        &self.entries
    }
}

impl Default for AliasTable {
    fn default() -> Self {
        DEFAULT_TABLE.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_phase_label_is_identity() {
        for phase in Phase::ALL {
            let label = phase.canonical_label();
            assert_eq!(map_status_to_phase(label), phase, "label {label:?}");
            assert_eq!(map_status_to_phase(label).canonical_label(), label);
        }
    }

    #[test]
    fn canonical_labels_match_exactly() {
        let table = AliasTable::builtin();
        for phase in Phase::ALL {
            let c = table.classify(phase.canonical_label());
            assert_eq!(c.matched_by, MatchKind::Exact);
        }
    }

    #[test]
    fn builtin_table_is_valid() {
        assert_eq!(AliasTable::builtin().validate(), Ok(()));
    }

    #[test]
    fn casing_and_punctuation_do_not_matter() {
        assert_eq!(map_status_to_phase("  reno IN progress!! "), Phase::RenoInProgress);
        assert_eq!(map_status_to_phase("FURNISHING - cleaning"), Phase::FurnishingCleaning);
        assert_eq!(
            map_status_to_phase("pending to budget: from renovator"),
            Phase::RenoBudgetRenovator
        );
    }

    #[test]
    fn substring_fallback_prefers_longest_alias() {
        let table = AliasTable::builtin();
        let c = table.classify("2. Reno in progress (delayed)");
        assert_eq!(c.phase, Phase::RenoInProgress);
        assert_eq!(c.matched_by, MatchKind::Alias("reno in progress".into()));
    }

    #[test]
    fn fallback_respects_word_boundaries() {
        assert_eq!(map_status_to_phase("Abandoned"), Phase::Orphaned);
        assert_eq!(map_status_to_phase("in progression"), Phase::Orphaned);
    }

    #[test]
    fn unknown_or_garbled_text_is_orphaned() {
        for text in ["", "   ", "???", "Reno in progres", "\u{0}\u{7f}", "ñandú"] {
            let c = AliasTable::builtin().classify(text);
            assert_eq!(c.phase, Phase::Orphaned, "text {text:?}");
            assert_eq!(c.matched_by, MatchKind::Unmatched);
        }
    }

    #[test]
    fn entries_are_ordered_longest_first() {
        let table = AliasTable::builtin();
        let lengths: Vec<usize> = table
            .entries()
            .iter()
            .map(|e| e.alias.chars().count())
            .collect();
        assert!(lengths.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn configured_alias_extends_table() {
        let mut extra = BTreeMap::new();
        extra.insert(Phase::RenoInProgress, vec!["Obras!".to_string()]);
        let table = AliasTable::load(&extra).unwrap();
        assert_eq!(table.phase_for("obras"), Phase::RenoInProgress);
    }

    #[test]
    fn conflicting_alias_is_rejected() {
        let mut extra = BTreeMap::new();
        extra.insert(Phase::Done, vec!["In Progress".to_string()]);
        let table = AliasTable::build(&extra);
        let problems = table.validate().unwrap_err();
        assert!(problems.iter().any(|p| matches!(
            p,
            AliasProblem::Conflict { alias, first: Phase::RenoInProgress, second: Phase::Done }
                if alias == "in progress"
        )));
        assert!(matches!(
            AliasTable::load(&extra),
            Err(RenoError::InvalidAliasTable(_))
        ));
    }

    #[test]
    fn empty_and_orphaned_aliases_are_rejected() {
        let mut extra = BTreeMap::new();
        extra.insert(Phase::FinalCheck, vec!["--".to_string()]);
        extra.insert(Phase::Orphaned, vec!["lost".to_string()]);
        let problems = AliasTable::build(&extra).validate().unwrap_err();
        assert!(problems.contains(&AliasProblem::EmptyAlias {
            phase: Phase::FinalCheck
        }));
        assert!(problems.contains(&AliasProblem::OrphanedTarget {
            alias: "lost".into()
        }));
    }

    #[test]
    fn alias_shadowing_a_canonical_label_is_rejected() {
        let mut extra = BTreeMap::new();
        extra.insert(Phase::Done, vec!["pending to budget from client".to_string()]);
        let problems = AliasTable::build(&extra).validate().unwrap_err();
        assert!(problems.contains(&AliasProblem::CanonicalShadowed {
            phase: Phase::RenoBudgetClient,
            resolved: Phase::Done,
            alias: "pending to budget from client".into(),
        }));
    }

    #[test]
    fn normalize_collapses_separators() {
        assert_eq!(normalize("  Furnishing/Cleaning  "), "furnishing cleaning");
        assert_eq!(normalize("Pending to Budget (from Client)"), "pending to budget from client");
        assert_eq!(normalize("--"), "");
    }
}
