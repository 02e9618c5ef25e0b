use crate::error::{CoordinatorError, CoordinatorResult};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
enum Entry {
    InFlight,
    Finished(Instant),
}

pub struct PendingOperationLedger {
    cooldown: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl PendingOperationLedger {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn try_begin(&self, action: &str, now: Instant) -> CoordinatorResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CoordinatorError::internal("operation ledger poisoned"))?;
        let cooldown = self.cooldown;
        entries.retain(|_, entry| match entry {
            Entry::InFlight => true,
            Entry::Finished(at) => now.saturating_duration_since(*at) < cooldown,
        });

        if entries.contains_key(action) {
            return Err(CoordinatorError::OperationInProgress(action.to_string()));
        }
        entries.insert(action.to_string(), Entry::InFlight);
        Ok(())
    }

    pub fn complete(&self, action: &str, now: Instant) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(action.to_string(), Entry::Finished(now));
        }
    }

    pub fn outstanding(&self) -> usize {
        self.entries.lock().map(|m| m.len()).unwrap_or(0)
    }
}
