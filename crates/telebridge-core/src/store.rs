//! The process-wide telemetry store.

use parking_lot::RwLock;

use crate::snapshot::{DeviceStatus, Fields, Snapshot};

/// Receives every snapshot produced by a store mutation.
///
/// Implementations must not block: the caller is the device loop.
pub trait SnapshotPublisher: Send + Sync {
    /// Deliver `snapshot` to all current subscribers.
    fn publish(&self, snapshot: &Snapshot);
}

/// Single owned copy of the merged telemetry state.
///
/// All access goes through the internal lock; every mutation returns the
/// resulting snapshot so the caller can publish exactly that state.
pub struct TelemetryStore {
    snapshot: RwLock<Snapshot>,
}

impl TelemetryStore {
    /// Create a store holding [`Snapshot::initial`].
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Snapshot::initial()),
        }
    }

    /// Copy of the current state, for late subscribers.
    pub fn current_snapshot(&self) -> Snapshot {
        self.snapshot.read().clone()
    }

    /// Overlay `fields` onto the current state. Fields absent from the update
    /// keep their previous value.
    pub fn merge(&self, fields: Fields) -> Snapshot {
        self.mutate(|snap| snap.overlay(fields))
    }

    /// Replace the link status.
    pub fn set_status(&self, status: DeviceStatus) -> Snapshot {
        self.mutate(|snap| snap.set_status(status))
    }

    /// Merge a device frame and mark the link as receiving, as one mutation.
    pub fn merge_receiving(&self, fields: Fields) -> Snapshot {
        self.mutate(|snap| {
            snap.overlay(fields);
            snap.set_status(DeviceStatus::Receiving);
        })
    }

    fn mutate(&self, apply: impl FnOnce(&mut Snapshot)) -> Snapshot {
        let mut snap = self.snapshot.write();
        apply(&mut snap);
        snap.bump_revision();
        snap.clone()
    }
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Number;

    fn fields(pairs: &[(&str, f64)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), Number::from_f64(*v).unwrap()))
            .collect()
    }

    #[test]
    fn merge_keeps_absent_fields() {
        let store = TelemetryStore::new();
        let _ = store.merge(fields(&[("DC", 3.3), ("Amp", 0.5)]));
        let snap = store.merge(fields(&[("DC", 1.1)]));
        assert_eq!(snap.get("DC"), Some(1.1));
        assert_eq!(snap.get("Amp"), Some(0.5));
        assert_eq!(snap.get("Freq"), Some(0.0));
    }

    #[test]
    fn merge_adds_unknown_keys() {
        let store = TelemetryStore::new();
        let snap = store.merge(fields(&[("Vrms", 2.0)]));
        assert_eq!(snap.get("Vrms"), Some(2.0));
        assert!(snap.fields().contains_key("DC"));
    }

    #[test]
    fn merge_does_not_change_status() {
        let store = TelemetryStore::new();
        let snap = store.merge(fields(&[("DC", 1.0)]));
        assert_eq!(snap.status(), &DeviceStatus::AwaitingDevice);
    }

    #[test]
    fn merge_receiving_sets_status() {
        let store = TelemetryStore::new();
        let _ = store.set_status(DeviceStatus::Connected("10.0.0.2:4000".parse().unwrap()));
        let snap = store.merge_receiving(fields(&[("Freq", 50.0)]));
        assert_eq!(snap.status(), &DeviceStatus::Receiving);
        assert_eq!(snap.get("Freq"), Some(50.0));
    }

    #[test]
    fn every_mutation_bumps_revision() {
        let store = TelemetryStore::new();
        assert_eq!(store.current_snapshot().revision(), 0);
        assert_eq!(store.set_status(DeviceStatus::Disconnected).revision(), 1);
        assert_eq!(store.merge(Fields::new()).revision(), 2);
        assert_eq!(store.merge_receiving(Fields::new()).revision(), 3);
        assert_eq!(store.current_snapshot().revision(), 3);
    }

    #[test]
    fn returned_snapshot_matches_current() {
        let store = TelemetryStore::new();
        let snap = store.merge(fields(&[("Amp", 0.25)]));
        assert_eq!(snap, store.current_snapshot());
    }
}
