use std::fs;
use std::path::{Path, PathBuf};

use super::{Crm, CrmError, CrmRecord, CrmResult};
use crate::store::lock;

/// CRM table kept as a JSON array of records in a local file.
///
/// A missing file is an empty table. Writes replace the file atomically
/// while holding `<file>.lock`.
pub struct SnapshotCrm {
    path: PathBuf,
}

impl SnapshotCrm {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn read(&self) -> CrmResult<Vec<CrmRecord>> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(CrmError::Transient(err.to_string())),
        };
        if data.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&data).map_err(|e| {
            CrmError::Permanent(format!("corrupt snapshot {}: {e}", self.path.display()))
        })
    }

    fn write(&self, records: &[CrmRecord]) -> CrmResult<()> {
        let json = serde_json::to_string_pretty(records)
            .map_err(|e| CrmError::Permanent(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| CrmError::Transient(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| CrmError::Transient(e.to_string()))?;
        Ok(())
    }

    /// Insert or replace the record with the same Unique ID.
    pub fn upsert(&self, record: CrmRecord) -> CrmResult<()> {
        let _guard = lock::acquire_lock(&self.lock_path())
            .map_err(|e| CrmError::Transient(e.to_string()))?;
        let mut records = self.read()?;
        match records
            .iter_mut()
            .find(|r| r.key().is_some() && r.key() == record.key())
        {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        self.write(&records)
    }
}

impl Crm for SnapshotCrm {
    fn name(&self) -> &str {
        "snapshot"
    }

    fn list_records(&self) -> CrmResult<Vec<CrmRecord>> {
        self.read()
    }

    fn update_status(&self, unique_id: &str, status: &str) -> CrmResult<()> {
        let _guard = lock::acquire_lock(&self.lock_path())
            .map_err(|e| CrmError::Transient(e.to_string()))?;
        let mut records = self.read()?;
        let record = records
            .iter_mut()
            .find(|r| r.key() == Some(unique_id))
            .ok_or_else(|| CrmError::RecordNotFound(unique_id.to_string()))?;
        record.status = Some(status.to_string());
        self.write(&records)?;
        tracing::debug!(unique_id, status, "snapshot status updated");
        Ok(())
    }
}
