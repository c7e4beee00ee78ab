//! The append-only bounded-ring usage tracker (spec §4.D).

use ovp_core::{UsageRecord, BOOTSTRAP_KEY_ID};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

pub const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct UsageStats {
    pub total: usize,
    pub success: usize,
    pub error: usize,
    pub by_key: HashMap<String, usize>,
    pub by_provider: HashMap<String, usize>,
    pub by_path: HashMap<String, usize>,
    pub by_status: HashMap<u16, usize>,
}

pub struct UsageTracker {
    capacity: usize,
    records: Mutex<VecDeque<UsageRecord>>,
}

impl UsageTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// The master bootstrap key is a synthetic identity and must never
    /// show up in usage aggregations.
    pub fn record(&self, event: UsageRecord) {
        if event.key_id == BOOTSTRAP_KEY_ID {
            return;
        }

        let mut records = self.records.lock();
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(event);
    }

    pub fn stats(&self, since: Option<chrono::DateTime<chrono::Utc>>) -> UsageStats {
        let records = self.records.lock();
        let mut stats = UsageStats::default();

        for record in records.iter() {
            if let Some(since) = since {
                if record.timestamp < since {
                    continue;
                }
            }

            stats.total += 1;
            if record.is_success() {
                stats.success += 1;
            } else {
                stats.error += 1;
            }

            *stats.by_key.entry(record.key_id.clone()).or_insert(0) += 1;
            *stats.by_provider.entry(record.provider.clone()).or_insert(0) += 1;
            *stats.by_path.entry(record.path.clone()).or_insert(0) += 1;
            *stats.by_status.entry(record.status).or_insert(0) += 1;
        }

        stats
    }
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record(key_id: &str, status: u16) -> UsageRecord {
        UsageRecord {
            key_id: key_id.to_string(),
            provider: "mock".to_string(),
            path: "/v1/text-to-speech/mock-voice".to_string(),
            character_count: 10,
            elapsed_ms: 5,
            status,
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn bootstrap_key_is_filtered_out() {
        let tracker = UsageTracker::new(10);
        tracker.record(make_record(BOOTSTRAP_KEY_ID, 200));
        assert_eq!(tracker.stats(None).total, 0);
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let tracker = UsageTracker::new(2);
        tracker.record(make_record("k1", 200));
        tracker.record(make_record("k2", 200));
        tracker.record(make_record("k3", 200));

        let stats = tracker.stats(None);
        assert_eq!(stats.total, 2);
        assert!(!stats.by_key.contains_key("k1"));
    }

    #[test]
    fn splits_success_and_error() {
        let tracker = UsageTracker::new(10);
        tracker.record(make_record("k1", 200));
        tracker.record(make_record("k1", 404));
        tracker.record(make_record("k1", 500));

        let stats = tracker.stats(None);
        assert_eq!(stats.success, 1);
        assert_eq!(stats.error, 2);
        assert_eq!(*stats.by_status.get(&404).unwrap(), 1);
    }
}
