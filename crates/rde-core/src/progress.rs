//! Progress tracker (C4, §4.3): per-stream counters with rate/ETA, fanned
//! out to a single subscriber callback rather than an unbounded queue.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// A point-in-time snapshot of one entity's progress, keyed by the caller
/// under an entity URI (`source+<vendor>://...` or `destination+<vendor>://...`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub processed: i64,
    /// -1 while the total is unknown (count query still running).
    pub total: i64,
    pub percent: Option<f64>,
    pub rate_rps: Option<f64>,
    pub eta_seconds: Option<f64>,
    pub message: Option<String>,
}

/// A callback invoked synchronously on every `update()`. Boxed so the
/// tracker can be shared behind an `Arc` without generic parameters leaking
/// into every caller.
pub type ProgressCallback = Box<dyn Fn(&ProgressSnapshot) + Send + Sync>;

struct ProgressState {
    processed: i64,
    total: i64,
    started_at: Instant,
    message: Option<String>,
}

/// Tracks one entity's processed/total counters and derives rate/ETA from
/// wall-clock time since the first `update()`.
pub struct Progress {
    state: Mutex<ProgressState>,
    subscriber: Mutex<Option<ProgressCallback>>,
}

impl Progress {
    pub fn new(total: i64) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ProgressState {
                processed: 0,
                total,
                started_at: Instant::now(),
                message: None,
            }),
            subscriber: Mutex::new(None),
        })
    }

    /// Replaces the single callback slot. Only one subscriber is supported at
    /// a time (§9 "Progress subscribers"); a later `subscribe` call displaces
    /// an earlier one rather than stacking.
    pub fn subscribe(&self, cb: ProgressCallback) {
        *self.subscriber.lock().unwrap() = Some(cb);
    }

    pub fn set_total(&self, total: i64) {
        self.state.lock().unwrap().total = total;
    }

    /// Advances `processed` by `delta` and notifies the subscriber.
    pub fn advance(&self, delta: i64) {
        self.update(delta, None)
    }

    pub fn message(&self, message: impl Into<String>) {
        self.update(0, Some(message.into()))
    }

    fn update(&self, delta: i64, message: Option<String>) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            state.processed += delta;
            if let Some(m) = message {
                state.message = Some(m);
            }
            self.snapshot_locked(&state)
        };
        if let Some(cb) = self.subscriber.lock().unwrap().as_ref() {
            cb(&snapshot);
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.state.lock().unwrap();
        self.snapshot_locked(&state)
    }

    fn snapshot_locked(&self, state: &ProgressState) -> ProgressSnapshot {
        let elapsed = state.started_at.elapsed().as_secs_f64();
        let rate_rps = if elapsed > 0.0 {
            Some(state.processed as f64 / elapsed)
        } else {
            None
        };
        let percent = if state.total > 0 {
            Some((state.processed as f64 / state.total as f64 * 100.0).min(100.0))
        } else {
            None
        };
        let eta_seconds = match (rate_rps, state.total) {
            (Some(rate), total) if total >= 0 && rate > 0.0 => {
                Some(((total - state.processed).max(0)) as f64 / rate)
            }
            _ => None,
        };
        ProgressSnapshot {
            processed: state.processed,
            total: state.total,
            percent,
            rate_rps,
            eta_seconds,
            message: state.message.clone(),
        }
    }
}

/// Aggregates a whole run's per-entity snapshots into the payload shape the
/// control plane's `output.progress` field expects, and sums `processed`
/// across every `destination+...` entity for row-count telemetry (§4.7).
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ProgressReport {
    pub entities: std::collections::BTreeMap<String, ProgressSnapshot>,
}

impl ProgressReport {
    pub fn record(&mut self, entity_uri: impl Into<String>, snapshot: ProgressSnapshot) {
        self.entities.insert(entity_uri.into(), snapshot);
    }

    /// Sum of `processed` across every entity whose URI begins with
    /// `destination` — the row-count aggregation the transfer command
    /// reports for telemetry.
    pub fn destination_rows_processed(&self) -> i64 {
        self.entities
            .iter()
            .filter(|(uri, _)| uri.starts_with("destination"))
            .map(|(_, s)| s.processed)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    #[test]
    fn advance_updates_rate_and_percent() {
        let progress = Progress::new(10);
        progress.advance(5);
        let snap = progress.snapshot();
        assert_eq!(snap.processed, 5);
        assert_eq!(snap.percent, Some(50.0));
    }

    #[test]
    fn subscriber_is_invoked_synchronously() {
        let progress = Progress::new(2);
        let seen = Arc::new(AtomicI64::new(0));
        let seen2 = seen.clone();
        progress.subscribe(Box::new(move |snap| {
            seen2.store(snap.processed, Ordering::SeqCst);
        }));
        progress.advance(2);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn destination_rows_sum_ignores_source_entities() {
        let mut report = ProgressReport::default();
        report.record(
            "source+memory://ns/public/events",
            ProgressSnapshot {
                processed: 100,
                total: 100,
                percent: Some(100.0),
                rate_rps: None,
                eta_seconds: None,
                message: None,
            },
        );
        report.record(
            "destination+console://ns/public/events",
            ProgressSnapshot {
                processed: 29,
                total: 100,
                percent: Some(29.0),
                rate_rps: None,
                eta_seconds: None,
                message: None,
            },
        );
        assert_eq!(report.destination_rows_processed(), 29);
    }
}
