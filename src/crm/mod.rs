//! Access to the external CRM table that owns the "Set Up Status" field.
//!
//! Two backends ship with the tool: [`airtable::AirtableCrm`] talks to the
//! Airtable REST API, [`snapshot::SnapshotCrm`] works against a local JSON
//! export. [`memory::MemoryCrm`] keeps records in process and can inject
//! failures.

pub mod airtable;
pub mod memory;
pub mod snapshot;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{Config, CrmBackend};
use crate::error::{RenoError, Result};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CrmError {
    /// Worth retrying: timeouts, rate limits, 5xx, lock contention.
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("{0}")]
    Permanent(String),

    #[error("record with unique id '{0}' not found in crm")]
    RecordNotFound(String),

    #[error("crm misconfigured: {0}")]
    Misconfigured(String),
}

impl CrmError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

pub type CrmResult<T> = std::result::Result<T, CrmError>;

/// One row of the CRM table, reduced to the columns sync cares about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrmRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(default)]
    pub unique_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renovator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_constructor: Option<String>,
}

impl CrmRecord {
    pub fn new(unique_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            record_id: None,
            unique_id: Some(unique_id.into()),
            status: Some(status.into()),
            address: None,
            area: None,
            renovator: None,
            technical_constructor: None,
        }
    }

    /// Trimmed, non-empty Unique ID.
    pub fn key(&self) -> Option<&str> {
        self.unique_id
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

pub trait Crm {
    fn name(&self) -> &str;

    fn list_records(&self) -> CrmResult<Vec<CrmRecord>>;

    /// Overwrite the status text of the record carrying `unique_id`.
    fn update_status(&self, unique_id: &str, status: &str) -> CrmResult<()>;
}

/// Exponential backoff for transient CRM failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.sync.max_attempts.max(1),
            initial_backoff: config.sync.initial_backoff(),
        }
    }

    /// No sleeping between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::ZERO,
        }
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub fn run<T>(&self, what: &str, mut op: impl FnMut() -> CrmResult<T>) -> CrmResult<T> {
        let mut attempt = 0;
        let mut backoff = self.initial_backoff;
        loop {
            attempt += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    tracing::warn!(
                        operation = what,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "crm call failed, retrying"
                    );
                    if !backoff.is_zero() {
                        std::thread::sleep(backoff);
                    }
                    backoff = backoff.saturating_mul(2);
                }
                Err(err) => {
                    tracing::debug!(operation = what, attempt, error = %err, "crm call gave up");
                    return Err(err);
                }
            }
        }
    }
}

/// Build the configured CRM backend for a workspace rooted at `reno_dir`.
pub fn open(config: &Config, reno_dir: &Path) -> Result<Box<dyn Crm>> {
    match config.crm.backend {
        CrmBackend::Snapshot => Ok(Box::new(snapshot::SnapshotCrm::new(
            reno_dir.join(&config.crm.snapshot_path),
        ))),
        CrmBackend::Airtable => {
            let token = Config::airtable_token().ok_or_else(|| {
                RenoError::Crm(CrmError::Misconfigured(format!(
                    "{} is not set",
                    crate::config::ENV_AIRTABLE_TOKEN
                )))
            })?;
            Ok(Box::new(airtable::AirtableCrm::new(&config.crm, token)?))
        }
    }
}
