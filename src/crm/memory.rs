use std::sync::Mutex;

use super::{Crm, CrmError, CrmRecord, CrmResult};

#[derive(Debug, Default)]
struct State {
    records: Vec<CrmRecord>,
    fail_next_updates: u32,
    fail_permanently: bool,
    lose_next_responses: u32,
    update_calls: u32,
}

/// In-process CRM table. Failures can be queued to exercise retry and
/// partial-write paths.
#[derive(Debug, Default)]
pub struct MemoryCrm {
    state: Mutex<State>,
}

impl MemoryCrm {
    pub fn new(records: Vec<CrmRecord>) -> Self {
        Self {
            state: Mutex::new(State {
                records,
                ..State::default()
            }),
        }
    }

    /// Make the next `n` status updates fail with a transient error.
    pub fn fail_next_updates(&self, n: u32) {
        self.lock().fail_next_updates = n;
    }

    /// Make every status update fail with a permanent error.
    pub fn fail_permanently(&self, on: bool) {
        self.lock().fail_permanently = on;
    }

    /// Apply the next `n` status updates, then report a transient error as
    /// if the response had been lost.
    pub fn lose_next_responses(&self, n: u32) {
        self.lock().lose_next_responses = n;
    }

    pub fn update_calls(&self) -> u32 {
        self.lock().update_calls
    }

    pub fn status_of(&self, unique_id: &str) -> Option<String> {
        self.lock()
            .records
            .iter()
            .find(|r| r.key() == Some(unique_id))
            .and_then(|r| r.status.clone())
    }

    pub fn push(&self, record: CrmRecord) {
        self.lock().records.push(record);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned table is still usable in tests; keep the data.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Crm for MemoryCrm {
    fn name(&self) -> &str {
        "memory"
    }

    fn list_records(&self) -> CrmResult<Vec<CrmRecord>> {
        Ok(self.lock().records.clone())
    }

    fn update_status(&self, unique_id: &str, status: &str) -> CrmResult<()> {
        let mut state = self.lock();
        state.update_calls += 1;
        if state.fail_permanently {
            return Err(CrmError::Permanent("update rejected".into()));
        }
        if state.fail_next_updates > 0 {
            state.fail_next_updates -= 1;
            return Err(CrmError::Transient("simulated outage".into()));
        }
        let record = state
            .records
            .iter_mut()
            .find(|r| r.key() == Some(unique_id))
            .ok_or_else(|| CrmError::RecordNotFound(unique_id.to_string()))?;
        record.status = Some(status.to_string());
        if state.lose_next_responses > 0 {
            state.lose_next_responses -= 1;
            return Err(CrmError::Transient("response lost".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_overwrites_status() {
        let crm = MemoryCrm::new(vec![CrmRecord::new("SP-1", "Initial Check")]);
        crm.update_status("SP-1", "Final Check").unwrap();
        assert_eq!(crm.status_of("SP-1").as_deref(), Some("Final Check"));
        assert_eq!(crm.update_calls(), 1);
    }

    #[test]
    fn queued_failures_are_transient() {
        let crm = MemoryCrm::new(vec![CrmRecord::new("SP-1", "Initial Check")]);
        crm.fail_next_updates(1);
        assert!(matches!(
            crm.update_status("SP-1", "Final Check"),
            Err(CrmError::Transient(_))
        ));
        assert!(crm.update_status("SP-1", "Final Check").is_ok());
    }

    #[test]
    fn lost_response_still_applies_update() {
        let crm = MemoryCrm::new(vec![CrmRecord::new("SP-1", "Initial Check")]);
        crm.lose_next_responses(1);
        assert!(matches!(
            crm.update_status("SP-1", "Final Check"),
            Err(CrmError::Transient(_))
        ));
        assert_eq!(crm.status_of("SP-1").as_deref(), Some("Final Check"));
    }

    #[test]
    fn unknown_record_is_not_found() {
        let crm = MemoryCrm::new(vec![]);
        assert_eq!(
            crm.update_status("SP-9", "Done"),
            Err(CrmError::RecordNotFound("SP-9".into()))
        );
    }
}
