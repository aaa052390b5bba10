use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use super::{BeaconStatus, ProgressStore};
use crate::models::{EnrollmentId, LessonId, ProgressRecord, SavedProgress};

type ProgressKey = (EnrollmentId, LessonId);

/// In-process progress store. Beacons are applied synchronously.
#[derive(Debug)]
pub struct MemoryProgressStore {
    records: Mutex<HashMap<ProgressKey, ProgressRecord>>,
    beacon_enabled: bool,
}

impl Default for MemoryProgressStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            beacon_enabled: true,
        }
    }

    pub fn without_beacon(mut self) -> Self {
        self.beacon_enabled = false;
        self
    }

    /// Pre-populate a record, as if saved by an earlier session
    pub fn insert(&self, record: ProgressRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.insert(
                (record.enrollment_id.clone(), record.lesson_id.clone()),
                record,
            );
        }
    }

    pub fn get(&self, enrollment_id: &EnrollmentId, lesson_id: &LessonId) -> Option<ProgressRecord> {
        self.records
            .lock()
            .ok()?
            .get(&(enrollment_id.clone(), lesson_id.clone()))
            .cloned()
    }

    fn store(&self, record: &ProgressRecord) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| anyhow!("progress map poisoned"))?;
        records.insert(
            (record.enrollment_id.clone(), record.lesson_id.clone()),
            record.clone(),
        );
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn fetch_progress(
        &self,
        enrollment_id: &EnrollmentId,
        lesson_id: &LessonId,
    ) -> Result<Option<SavedProgress>> {
        Ok(self.get(enrollment_id, lesson_id).map(|record| SavedProgress {
            time_spent: record.time_spent,
            last_position: record.last_position,
            progress_percentage: record.progress_percentage,
            duration_seconds: record.duration_seconds,
        }))
    }

    async fn save_progress(&self, record: &ProgressRecord) -> Result<()> {
        debug!(
            "Stored progress {}% for lesson {}",
            record.progress_percentage, record.lesson_id
        );
        self.store(record)
    }

    fn send_beacon(&self, record: &ProgressRecord) -> BeaconStatus {
        if !self.beacon_enabled {
            return BeaconStatus::Unsupported;
        }
        match self.store(record) {
            Ok(()) => BeaconStatus::Queued,
            Err(_) => BeaconStatus::Rejected,
        }
    }
}
