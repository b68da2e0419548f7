use crate::types::PeerNode;
use std::collections::HashMap;

/// This node's view of the network, keyed by `ip:port`.
#[derive(Clone, Debug, Default)]
pub struct PeerDirectory {
    peers: HashMap<String, PeerNode>,
}

impl PeerDirectory {
    pub fn new(bootstrap: PeerNode) -> Self {
        let mut directory = Self::default();
        directory.add(bootstrap);
        directory
    }

    /// Insert or replace the entry for `peer`.
    pub fn add(&mut self, peer: PeerNode) {
        self.peers.insert(peer.tcp_address(), peer);
    }

    pub fn remove(&mut self, address: &str) -> Option<PeerNode> {
        self.peers.remove(address)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.peers.contains_key(address)
    }

    pub fn mark_connected(&mut self, address: &str) -> bool {
        match self.peers.get_mut(address) {
            Some(peer) => {
                peer.connected = true;
                true
            }
            None => false,
        }
    }

    /// Entries sorted by address, for a stable pass over the directory.
    pub fn snapshot(&self) -> Vec<PeerNode> {
        let mut peers: Vec<PeerNode> = self.peers.values().cloned().collect();
        peers.sort_by_key(|peer| peer.tcp_address());
        peers
    }

    pub fn known_peers(&self) -> HashMap<String, PeerNode> {
        self.peers.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_with_bootstrap() {
        let directory = PeerDirectory::new(PeerNode::new("127.0.0.1", 8080, true, false));
        let peers = directory.known_peers();
        assert_eq!(peers.len(), 1);
        assert!(directory.contains("127.0.0.1:8080"));
        assert!(peers["127.0.0.1:8080"].is_bootstrap);
    }

    #[test]
    fn test_add_remove_and_connect() {
        let mut directory = PeerDirectory::default();
        assert!(directory.snapshot().is_empty());
        directory.add(PeerNode::new("10.0.0.2", 9000, false, false));
        directory.add(PeerNode::new("10.0.0.1", 9000, false, false));
        // Same identity replaces the entry.
        directory.add(PeerNode::new("10.0.0.1", 9000, true, false));
        assert_eq!(directory.known_peers().len(), 2);

        let order: Vec<String> = directory.snapshot().iter().map(|p| p.tcp_address()).collect();
        assert_eq!(order, vec!["10.0.0.1:9000", "10.0.0.2:9000"]);

        assert!(directory.mark_connected("10.0.0.2:9000"));
        assert!(directory.known_peers()["10.0.0.2:9000"].connected);
        assert!(!directory.mark_connected("10.0.0.3:9000"));

        assert!(directory.remove("10.0.0.1:9000").is_some());
        assert!(directory.remove("10.0.0.1:9000").is_none());
        assert_eq!(directory.known_peers().len(), 1);
    }
}
