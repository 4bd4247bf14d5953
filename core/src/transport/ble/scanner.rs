/// Discovery bookkeeping for the central role
///
/// Every peer sighted during a scan gets one entry, kept in discovery order.
/// The entry's status follows what the handshake decided about that peer.

use crate::message::PeerIdentifier;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// What the central decided about a discovered peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanStatus {
    /// Seen, no decision yet
    Loading,
    /// Chosen for (or completed) a handshake
    Accepted,
    /// Declined, or the peer declined us
    Rejected,
}

/// One discovered peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub peer: PeerIdentifier,
    pub status: ScanStatus,
    /// Discovery order, starting at 0
    pub sequence: u64,
    /// Unix seconds of the first sighting
    pub discovered_at: u64,
}

impl ScanResult {
    fn new(peer: PeerIdentifier, sequence: u64) -> Self {
        let discovered_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            peer,
            status: ScanStatus::Loading,
            sequence,
            discovered_at,
        }
    }
}

/// Ordered, de-duplicated list of discovered peers
#[derive(Debug, Clone, Default)]
pub struct ScanList {
    results: Vec<ScanResult>,
    next_sequence: u64,
}

impl ScanList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sighting. Returns true only on the first sighting of `peer`.
    pub fn record(&mut self, peer: PeerIdentifier) -> bool {
        if self.contains(&peer) {
            return false;
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.results.push(ScanResult::new(peer, sequence));
        true
    }

    /// Update the status of a known peer. Returns false for unknown peers.
    pub fn set_status(&mut self, peer: &PeerIdentifier, status: ScanStatus) -> bool {
        match self.results.iter_mut().find(|r| &r.peer == peer) {
            Some(result) => {
                result.status = status;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, peer: &PeerIdentifier) -> Option<&ScanResult> {
        self.results.iter().find(|r| &r.peer == peer)
    }

    pub fn contains(&self, peer: &PeerIdentifier) -> bool {
        self.get(peer).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScanResult> {
        self.results.iter()
    }

    /// Earliest discovered peer with the given status
    pub fn first_with_status(&self, status: ScanStatus) -> Option<&ScanResult> {
        self.results.iter().find(|r| r.status == status)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn clear(&mut self) {
        self.results.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(id: &str) -> PeerIdentifier {
        PeerIdentifier::new(id).expect("valid identifier")
    }

    #[test]
    fn test_record_deduplicates() {
        let mut list = ScanList::new();
        assert!(list.record(peer("AA")));
        assert!(!list.record(peer("AA")));
        assert!(list.record(peer("BB")));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_discovery_order_is_kept() {
        let mut list = ScanList::new();
        list.record(peer("CC"));
        list.record(peer("AA"));
        list.record(peer("BB"));

        let order: Vec<_> = list.iter().map(|r| r.peer.as_str().to_string()).collect();
        assert_eq!(order, vec!["CC", "AA", "BB"]);

        let sequences: Vec<_> = list.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[test]
    fn test_new_results_are_loading() {
        let mut list = ScanList::new();
        list.record(peer("AA"));
        assert_eq!(list.get(&peer("AA")).map(|r| r.status), Some(ScanStatus::Loading));
    }

    #[test]
    fn test_set_status() {
        let mut list = ScanList::new();
        list.record(peer("AA"));
        list.record(peer("BB"));

        assert!(list.set_status(&peer("BB"), ScanStatus::Rejected));
        assert!(!list.set_status(&peer("ZZ"), ScanStatus::Accepted));

        assert_eq!(
            list.first_with_status(ScanStatus::Rejected).map(|r| r.peer.clone()),
            Some(peer("BB"))
        );
        assert_eq!(
            list.first_with_status(ScanStatus::Loading).map(|r| r.peer.clone()),
            Some(peer("AA"))
        );
    }

    #[test]
    fn test_sequence_survives_clear() {
        let mut list = ScanList::new();
        list.record(peer("AA"));
        list.clear();
        assert!(list.is_empty());

        list.record(peer("AA"));
        assert_eq!(list.get(&peer("AA")).map(|r| r.sequence), Some(1));
    }
}
