use crate::error::Result;
use crate::peers::PeerDirectory;
use crate::protocol::StatusRes;
use crate::storage::StorageInterface;
use crate::types::PeerNode;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

pub fn this_peer_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join("this_peer.json")
}

/// Read the address record a running node left in `data_dir`.
pub fn load_this_peer(data_dir: &Path) -> Result<PeerNode> {
    let content = fs::read(this_peer_file_path(data_dir))?;
    Ok(serde_json::from_slice(&content)?)
}

/// Everything a running node owns: its identity, the ledger handle and the peer directory.
/// Cheap to clone; clones share the same ledger and directory.
#[derive(Clone)]
pub struct Node {
    ip: String,
    port: u16,
    data_dir: PathBuf,
    storage: StorageInterface,
    peers: Arc<Mutex<PeerDirectory>>,
}

impl Node {
    pub fn new(
        storage: StorageInterface,
        ip: impl Into<String>,
        port: u16,
        bootstrap: PeerNode,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            ip: ip.into(),
            port,
            data_dir: data_dir.into(),
            storage,
            peers: Arc::new(Mutex::new(PeerDirectory::new(bootstrap))),
        }
    }

    pub fn storage(&self) -> &StorageInterface {
        &self.storage
    }

    pub fn this_peer(&self) -> PeerNode {
        PeerNode::new(self.ip.clone(), self.port, false, false)
    }

    pub fn is_self(&self, peer: &PeerNode) -> bool {
        peer.ip == self.ip && peer.port == self.port
    }

    /// Record this node's address so local tools can find it.
    pub fn write_this_peer(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        let content = serde_json::to_vec(&self.this_peer())?;
        fs::write(this_peer_file_path(&self.data_dir), content)?;
        Ok(())
    }

    pub async fn add_peer(&self, peer: PeerNode) {
        self.peers.lock().await.add(peer);
    }

    pub async fn remove_peer(&self, address: &str) -> Option<PeerNode> {
        self.peers.lock().await.remove(address)
    }

    pub async fn mark_connected(&self, address: &str) -> bool {
        self.peers.lock().await.mark_connected(address)
    }

    /// This node counts as known so it never adds itself.
    pub async fn is_known_peer(&self, peer: &PeerNode) -> bool {
        self.is_self(peer) || self.peers.lock().await.contains(&peer.tcp_address())
    }

    pub async fn peers_snapshot(&self) -> Vec<PeerNode> {
        self.peers.lock().await.snapshot()
    }

    pub async fn known_peers(&self) -> HashMap<String, PeerNode> {
        self.peers.lock().await.known_peers()
    }

    pub async fn status(&self) -> Result<StatusRes> {
        let tip = self.storage.get_tip().await?;
        Ok(StatusRes {
            block_hash: tip.hash,
            block_number: tip.block_number,
            peers_known: self.known_peers().await,
        })
    }
}
