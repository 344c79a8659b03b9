//! Last-sample store for every monitored counter stream.
//!
//! A stream is identified by a string such as `cpu:global`, `disk:dm-5` or
//! `net:wlan0`. Each `store` replaces the previous sample and hands it back,
//! which is all a delta computation needs.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

/// One observation of a stream's cumulative counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSample {
    pub stream_id: String,
    pub counters: BTreeMap<String, i64>,
    /// Monotonic milliseconds, see [`crate::collector::Clock`].
    pub timestamp_ms: i64,
}

impl CounterSample {
    pub fn new(stream_id: impl Into<String>, timestamp_ms: i64) -> Self {
        Self {
            stream_id: stream_id.into(),
            counters: BTreeMap::new(),
            timestamp_ms,
        }
    }

    /// Builder-style counter insertion.
    pub fn with(mut self, name: &str, value: i64) -> Self {
        self.counters.insert(name.to_string(), value);
        self
    }

    pub fn counter(&self, name: &str) -> Option<i64> {
        self.counters.get(name).copied()
    }
}

/// Keyed store of the most recent sample per stream.
///
/// A single mutex guards the whole table. Its scope is one call: `store`
/// holds it across the swap of a stream's previous and new sample, so two
/// threads storing to the same stream each get a distinct previous sample.
#[derive(Debug, Default)]
pub struct SampleHistory {
    streams: Mutex<HashMap<String, CounterSample>>,
}

impl SampleHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the stored sample for `stream_id` and returns the previous one.
    ///
    /// No validation is performed; the caller decides whether the previous
    /// sample is usable.
    pub fn store(&self, stream_id: &str, sample: CounterSample) -> Option<CounterSample> {
        let mut streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        streams.insert(stream_id.to_string(), sample)
    }

    /// Returns a copy of the stored sample.
    pub fn get(&self, stream_id: &str) -> Option<CounterSample> {
        let streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        streams.get(stream_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops streams under `prefix` whose id is not in `live`.
    ///
    /// Meant for streams keyed by short-lived identities (process ids) after
    /// a scan. Returns the number of evicted streams.
    pub fn evict_absent(&self, prefix: &str, live: &[&str]) -> usize {
        let mut streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        let before = streams.len();
        streams.retain(|id, _| !id.starts_with(prefix) || live.contains(&id.as_str()));
        before - streams.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_store_returns_previous() {
        let history = SampleHistory::new();
        let first = CounterSample::new("disk:sda", 0).with("sectors_read", 1000);
        let second = CounterSample::new("disk:sda", 1000).with("sectors_read", 3000);

        assert!(history.store("disk:sda", first.clone()).is_none());
        assert_eq!(history.store("disk:sda", second.clone()), Some(first));
        assert_eq!(history.get("disk:sda"), Some(second));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_streams_are_independent() {
        let history = SampleHistory::new();
        history.store("net:wlan0", CounterSample::new("net:wlan0", 0).with("rx", 1));
        assert!(history.store("net:rmnet0", CounterSample::new("net:rmnet0", 0)).is_none());
        assert_eq!(history.get("net:wlan0").unwrap().counter("rx"), Some(1));
        assert_eq!(history.get("net:wlan0").unwrap().counter("tx"), None);
        assert!(history.get("net:eth0").is_none());
    }

    #[test]
    fn test_evict_absent_only_touches_prefix() {
        let history = SampleHistory::new();
        for id in ["proc:1", "proc:42", "proc:77", "cpu:global"] {
            history.store(id, CounterSample::new(id, 0));
        }
        assert_eq!(history.evict_absent("proc:", &["proc:42"]), 2);
        assert!(history.get("proc:42").is_some());
        assert!(history.get("proc:1").is_none());
        assert!(history.get("cpu:global").is_some());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_concurrent_stores_hand_out_each_sample_once() {
        let history = Arc::new(SampleHistory::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let history = Arc::clone(&history);
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    for i in 0..100 {
                        let ts = t * 1000 + i;
                        if let Some(prev) = history.store("cpu:global", CounterSample::new("cpu:global", ts)) {
                            seen.push(prev.timestamp_ms);
                        }
                    }
                    seen
                })
            })
            .collect();

        let mut returned: Vec<i64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        returned.push(history.get("cpu:global").unwrap().timestamp_ms);
        returned.sort();
        returned.dedup();
        // Every stored sample is either returned exactly once or still stored
        assert_eq!(returned.len(), 800);
    }
}
