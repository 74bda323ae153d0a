//! Known-peer bookkeeping: the set of reachable peer base URLs plus a
//! strike counter used to ban peers that keep sending invalid blocks
//! (§4.7 `PeerSet`).

use std::collections::{HashMap, HashSet};

pub const MAX_PEER_STRIKES: u32 = 3;
pub const MIN_VERSION: &str = "0.2";
pub const PROTOCOL_VERSION: &str = "0.2";

#[derive(Debug, Default)]
pub struct PeerSet {
    peers: HashSet<String>,
    strikes: HashMap<String, u32>,
}

impl PeerSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_saved(peers: Vec<String>) -> Self {
        Self {
            peers: peers.into_iter().collect(),
            strikes: HashMap::new(),
        }
    }

    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        self.peers.contains(url)
    }

    /// Registers `url` as a known peer. Returns `true` if it was not
    /// already known (used to decide whether to propagate its arrival).
    pub fn insert(&mut self, url: String) -> bool {
        self.peers.insert(url)
    }

    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.peers.iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn reset_strikes(&mut self, url: &str) {
        self.strikes.remove(url);
    }

    /// Records one strike against `url` for sending an invalid block.
    /// Bans (removes) the peer once it crosses `MAX_PEER_STRIKES`.
    /// Returns `true` if the peer was banned as a result of this call.
    pub fn strike(&mut self, url: &str) -> bool {
        let count = self.strikes.entry(url.to_string()).or_insert(0);
        *count += 1;
        if *count >= MAX_PEER_STRIKES {
            self.peers.remove(url);
            self.strikes.remove(url);
            true
        } else {
            false
        }
    }

    /// Rejects peers announcing a protocol version below `MIN_VERSION`.
    #[must_use]
    pub fn is_version_acceptable(version: &str) -> bool {
        fn parts(v: &str) -> Vec<u32> {
            v.split('.').filter_map(|p| p.parse().ok()).collect()
        }
        parts(version) >= parts(MIN_VERSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strike_bans_after_threshold() {
        let mut peers = PeerSet::new();
        peers.insert("http://127.0.0.1:9001".to_string());
        assert!(!peers.strike("http://127.0.0.1:9001"));
        assert!(!peers.strike("http://127.0.0.1:9001"));
        assert!(peers.strike("http://127.0.0.1:9001"));
        assert!(!peers.contains("http://127.0.0.1:9001"));
    }

    #[test]
    fn version_check_rejects_older_protocol() {
        assert!(PeerSet::is_version_acceptable("0.2"));
        assert!(PeerSet::is_version_acceptable("0.3"));
        assert!(!PeerSet::is_version_acceptable("0.1"));
    }
}
