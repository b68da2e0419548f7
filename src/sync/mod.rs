pub mod client;

use crate::error::{Error, Result};
use crate::node::Node;
use crate::protocol::StatusRes;
use crate::sync::client::PeerClient;
use crate::types::PeerNode;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(45);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    pub interval: Duration,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SYNC_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// What one pass over the peer directory did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub removed: Vec<String>,
    pub joined: Vec<String>,
    pub failed: Vec<String>,
    pub imported_blocks: u64,
    pub discovered: Vec<String>,
}

/// Keeps the local ledger and peer directory converging with every reachable peer.
pub struct Syncer<Client>
where
    Client: PeerClient,
{
    node: Node,
    client: Client,
    interval: Duration,
    token: CancellationToken,
}

impl<Client> Syncer<Client>
where
    Client: PeerClient,
{
    pub fn new(node: Node, client: Client, interval: Duration, token: CancellationToken) -> Self {
        Self {node, client, interval, token}
    }

    /// Run a cycle right away and then once per interval until cancelled. Cancellation
    /// abandons a cycle in flight.
    pub async fn run(&self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                _ = self.token.cancelled() => {
                    log::debug!("Sync cycle interrupted");
                    break;
                }
                report = self.do_sync() => {
                    log::debug!("Sync cycle done: {:?}", report);
                }
            }
        }
        log::debug!("Sync stopped");
    }

    /// One pass over the peers known at the start of the call. Peers discovered during the
    /// pass are visited by the next one.
    pub async fn do_sync(&self) -> CycleReport {
        let mut report = CycleReport::default();
        for peer in self.node.peers_snapshot().await {
            if self.node.is_self(&peer) {
                continue;
            }
            self.sync_peer(&peer, &mut report).await;
        }
        report
    }

    async fn sync_peer(&self, peer: &PeerNode, report: &mut CycleReport) {
        let address = peer.tcp_address();
        log::debug!("Searching for new peers and blocks at {}", address);
        let status = match self.client.status(peer).await {
            Ok(status) => status,
            Err(error) => {
                log::warn!("{}", error);
                log::info!("Peer {} was removed from known peers", address);
                self.node.remove_peer(&address).await;
                report.removed.push(address);
                return;
            }
        };

        if !peer.connected {
            if let Err(error) = self.join_known_peers(peer).await {
                log::warn!("{}", error);
                report.failed.push(address);
                return;
            }
            report.joined.push(address.clone());
        }

        match self.sync_blocks(peer, &status).await {
            Ok(imported) => report.imported_blocks += imported,
            Err(error) => {
                log::warn!("Block sync with {} failed: {}", address, error);
                report.failed.push(address);
                return;
            }
        }

        for known in status.peers_known.values() {
            if !self.node.is_known_peer(known).await {
                log::info!("Found new peer {}", known.tcp_address());
                self.node.add_peer(PeerNode::new(known.ip.clone(), known.port, known.is_bootstrap, false)).await;
                report.discovered.push(known.tcp_address());
            }
        }
    }

    async fn join_known_peers(&self, peer: &PeerNode) -> Result<()> {
        let address = peer.tcp_address();
        let response = self.client.join(peer, &self.node.this_peer()).await?;
        if !response.error.is_empty() {
            return Err(Error::PeerRegistration(address, response.error));
        }
        if !response.success {
            return Err(Error::PeerRegistration(address, "registration refused".to_string()));
        }
        self.node.mark_connected(&address).await;
        Ok(())
    }

    /// Pull and apply every block the peer has beyond the local tip. Stops at the first
    /// block that does not apply; blocks applied before it stay.
    async fn sync_blocks(&self, peer: &PeerNode, status: &StatusRes) -> Result<u64> {
        let storage = self.node.storage();
        let local = storage.get_tip().await?;
        if status.block_hash.is_empty() {
            return Ok(0);
        }
        if status.block_number < local.block_number {
            return Ok(0);
        }
        if status.block_number == 0 && local.has_genesis_block {
            return Ok(0);
        }
        if status.block_hash == local.hash {
            return Ok(0);
        }

        let expected = if local.has_genesis_block {
            status.block_number - local.block_number
        } else {
            status.block_number.saturating_add(1)
        };
        log::info!("Found {} new blocks from peer {}", expected, peer.tcp_address());

        let blocks = self.client.blocks_after(peer, local.hash).await?;
        let mut imported = 0;
        for block in blocks {
            let number = block.header.block_number;
            if let Err(error) = storage.add_block(block).await {
                if error.is_rejection() {
                    log::warn!("Rejected block {} from {}: {}", number, peer.tcp_address(), error);
                    break;
                }
                return Err(error);
            }
            imported += 1;
        }
        Ok(imported)
    }
}
