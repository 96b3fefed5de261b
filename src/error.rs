use thiserror::Error;

use crate::crm::CrmError;

#[derive(Debug, Error)]
pub enum RenoError {
    #[error("not a reno workspace (run `reno init` first)")]
    NotInitialized,

    #[error("reno already initialized in this directory")]
    AlreadyInitialized,

    #[error("property '{0}' not found")]
    PropertyNotFound(String),

    #[error("property id prefix '{0}' is ambiguous; matches: {1}")]
    PropertyAmbiguous(String, String),

    #[error("a property with unique id '{0}' already exists")]
    DuplicateUniqueId(String),

    #[error("invalid unique id '{0}': {1}")]
    InvalidUniqueId(String, String),

    #[error("invalid phase transition: {action} is not allowed from {from}")]
    InvalidTransition { action: String, from: String },

    #[error("cannot set phase manually to {0}")]
    InvalidManualPhase(String),

    #[error("schedule-visit needs an estimated visit date (--date YYYY-MM-DD)")]
    MissingVisitDate,

    #[error("{0} checklist is incomplete ({1}%)")]
    ChecklistIncomplete(String, u32),

    #[error("invalid alias table: {0}")]
    InvalidAliasTable(String),

    #[error("invalid config '{0}': {1}")]
    InvalidConfig(String, String),

    #[error("locked by another process: {0}")]
    Locked(String),

    #[error("crm error: {0}")]
    Crm(#[from] CrmError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

impl RenoError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotInitialized => "not_initialized",
            Self::AlreadyInitialized => "already_initialized",
            Self::PropertyNotFound(_) => "property_not_found",
            Self::PropertyAmbiguous(_, _) => "property_ambiguous",
            Self::DuplicateUniqueId(_) => "duplicate_unique_id",
            Self::InvalidUniqueId(_, _) => "invalid_unique_id",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::InvalidManualPhase(_) => "invalid_manual_phase",
            Self::MissingVisitDate => "missing_visit_date",
            Self::ChecklistIncomplete(_, _) => "checklist_incomplete",
            Self::InvalidAliasTable(_) => "invalid_alias_table",
            Self::InvalidConfig(_, _) => "invalid_config",
            Self::Locked(_) => "locked",
            Self::Crm(_) => "crm_error",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
            Self::Yaml(_) => "yaml_error",
            Self::Db(_) => "db_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, RenoError>;
