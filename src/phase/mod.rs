//! Renovation phase state machine: status-text mapping, transition rules,
//! and the two-store phase writer.

pub mod aliases;
pub mod transition;
pub mod writer;

pub use aliases::{AliasTable, Classification, MatchKind, map_status_to_phase, normalize};
pub use transition::{Action, check_manual, transition};
pub use writer::PhaseWriter;
