use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::results::{AggregateSnapshot, FileOutcome};

/// Receives progress from a running scan.
///
/// Implemented by whatever presents the scan: a terminal, a GUI, a test.
/// Every method except [`on_input_error`](Self::on_input_error) is called from
/// the coordinator's thread, one call at a time, in the order events occur.
/// All methods default to doing nothing.
pub trait ProgressSink: Send + Sync {
    /// The scan was accepted; the total is not known yet
    fn on_scan_started(&self, _total_unknown: bool) {}

    /// Enumeration finished with `total` files
    fn on_total_known(&self, _total: u64) {}

    /// One file's outcome, in arrival order
    fn on_file_outcome(&self, _outcome: &FileOutcome) {}

    /// Statistics after the most recent outcome
    fn on_aggregate_update(&self, _snapshot: &AggregateSnapshot) {}

    /// Every discovered file has been observed
    fn on_scan_finished(&self) {}

    /// The request was rejected before anything started
    fn on_input_error(&self, _message: &str) {}
}

/// A [`ProgressSink`] callback captured as a value
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    Started { total_unknown: bool },
    TotalKnown(u64),
    FileOutcome(FileOutcome),
    AggregateUpdate(AggregateSnapshot),
    Finished,
    InputError(String),
}

/// Forwards every callback over a channel.
///
/// Suits a UI thread that drains events once per frame. With a bounded
/// channel a stalled reader eventually stalls the scan instead of growing
/// memory. Events sent after the receiver is gone are discarded.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<ScanEvent>,
}

impl ChannelSink {
    pub fn new(tx: Sender<ScanEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: ScanEvent) {
        let _ = self.tx.send(event);
    }
}

impl ProgressSink for ChannelSink {
    fn on_scan_started(&self, total_unknown: bool) {
        self.send(ScanEvent::Started { total_unknown });
    }

    fn on_total_known(&self, total: u64) {
        self.send(ScanEvent::TotalKnown(total));
    }

    fn on_file_outcome(&self, outcome: &FileOutcome) {
        self.send(ScanEvent::FileOutcome(outcome.clone()));
    }

    fn on_aggregate_update(&self, snapshot: &AggregateSnapshot) {
        self.send(ScanEvent::AggregateUpdate(*snapshot));
    }

    fn on_scan_finished(&self) {
        self.send(ScanEvent::Finished);
    }

    fn on_input_error(&self, message: &str) {
        self.send(ScanEvent::InputError(message.to_string()));
    }
}

/// Records every event in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ScanEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ScanEvent> {
        self.events.lock().clone()
    }

    pub fn outcomes(&self) -> Vec<FileOutcome> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ScanEvent::FileOutcome(o) => Some(o.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_snapshot(&self) -> Option<AggregateSnapshot> {
        self.events.lock().iter().rev().find_map(|e| match e {
            ScanEvent::AggregateUpdate(s) => Some(*s),
            _ => None,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.events.lock().contains(&ScanEvent::Finished)
    }

    fn push(&self, event: ScanEvent) {
        self.events.lock().push(event);
    }
}

impl ProgressSink for MemorySink {
    fn on_scan_started(&self, total_unknown: bool) {
        self.push(ScanEvent::Started { total_unknown });
    }

    fn on_total_known(&self, total: u64) {
        self.push(ScanEvent::TotalKnown(total));
    }

    fn on_file_outcome(&self, outcome: &FileOutcome) {
        self.push(ScanEvent::FileOutcome(outcome.clone()));
    }

    fn on_aggregate_update(&self, snapshot: &AggregateSnapshot) {
        self.push(ScanEvent::AggregateUpdate(*snapshot));
    }

    fn on_scan_finished(&self) {
        self.push(ScanEvent::Finished);
    }

    fn on_input_error(&self, message: &str) {
        self.push(ScanEvent::InputError(message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_channel_sink_forwards_in_order() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let sink = ChannelSink::new(tx);

        sink.on_scan_started(true);
        sink.on_total_known(1);
        sink.on_file_outcome(&FileOutcome::success("a", 1, Duration::ZERO));
        sink.on_scan_finished();

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events[0], ScanEvent::Started { total_unknown: true });
        assert_eq!(events[1], ScanEvent::TotalKnown(1));
        assert!(matches!(events[2], ScanEvent::FileOutcome(_)));
        assert_eq!(events[3], ScanEvent::Finished);
    }

    #[test]
    fn test_channel_sink_ignores_closed_receiver() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        drop(rx);
        ChannelSink::new(tx).on_scan_finished();
    }

    #[test]
    fn test_memory_sink_queries() {
        let sink = MemorySink::new();
        assert_eq!(sink.last_snapshot(), None);

        sink.on_file_outcome(&FileOutcome::failure("x", "boom"));
        sink.on_aggregate_update(&AggregateSnapshot {
            files_completed: 1,
            files_failed: 1,
            ..AggregateSnapshot::default()
        });
        sink.on_scan_finished();

        assert_eq!(sink.outcomes().len(), 1);
        assert_eq!(sink.last_snapshot().unwrap().files_failed, 1);
        assert!(sink.is_finished());
    }
}
