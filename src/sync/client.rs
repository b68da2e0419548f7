use crate::error::{Error, Result};
use crate::protocol::{
    AddPeerRes, ErrRes, StatusRes, SyncRes, ENDPOINT_ADD_PEER, ENDPOINT_ADD_PEER_QUERY_KEY_IP,
    ENDPOINT_ADD_PEER_QUERY_KEY_PORT, ENDPOINT_STATUS, ENDPOINT_SYNC,
    ENDPOINT_SYNC_QUERY_KEY_FROM_BLOCK,
};
use crate::types::{Block, Hash, PeerNode};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;

/// The calls a synchronization cycle makes against a remote node.
pub trait PeerClient {
    fn status(&self, peer: &PeerNode) -> impl Future<Output = Result<StatusRes>> + Send;
    /// Register `this_peer` in the known peers of `peer`.
    fn join(&self, peer: &PeerNode, this_peer: &PeerNode) -> impl Future<Output = Result<AddPeerRes>> + Send;
    fn blocks_after(&self, peer: &PeerNode, from: Hash) -> impl Future<Output = Result<Vec<Block>>> + Send;
}

/// [`PeerClient`] speaking JSON over HTTP. Every call is bounded by the request timeout,
/// and connection setup by the shorter connect timeout.
#[derive(Clone, Debug)]
pub struct HttpPeerClient {
    client: Client,
}

impl HttpPeerClient {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;
        Ok(Self {client})
    }
}

fn url(peer: &PeerNode, endpoint: &str) -> String {
    format!("http://{}{}", peer.tcp_address(), endpoint)
}

async fn read_res<Type: DeserializeOwned>(peer: &PeerNode, response: Response) -> Result<Type> {
    let status = response.status();
    if !status.is_success() {
        let reason = match response.json::<ErrRes>().await {
            Ok(body) => body.error,
            Err(_) => status.to_string(),
        };
        return Err(Error::RemoteError(peer.tcp_address(), reason));
    }
    Ok(response.json::<Type>().await?)
}

impl PeerClient for HttpPeerClient {
    async fn status(&self, peer: &PeerNode) -> Result<StatusRes> {
        let response = self.client
            .get(url(peer, ENDPOINT_STATUS))
            .send()
            .await
            .map_err(|error| Error::PeerUnreachable(peer.tcp_address(), error.to_string()))?;
        read_res(peer, response).await
    }

    async fn join(&self, peer: &PeerNode, this_peer: &PeerNode) -> Result<AddPeerRes> {
        let response = self.client
            .get(url(peer, ENDPOINT_ADD_PEER))
            .query(&[
                (ENDPOINT_ADD_PEER_QUERY_KEY_IP, this_peer.ip.clone()),
                (ENDPOINT_ADD_PEER_QUERY_KEY_PORT, this_peer.port.to_string()),
            ])
            .send()
            .await
            .map_err(|error| Error::PeerRegistration(peer.tcp_address(), error.to_string()))?;
        read_res(peer, response).await
    }

    async fn blocks_after(&self, peer: &PeerNode, from: Hash) -> Result<Vec<Block>> {
        log::debug!("Importing blocks from peer {}", peer.tcp_address());
        let response = self.client
            .get(url(peer, ENDPOINT_SYNC))
            .query(&[(ENDPOINT_SYNC_QUERY_KEY_FROM_BLOCK, from.to_hex())])
            .send()
            .await?;
        let sync_res: SyncRes = read_res(peer, response).await?;
        Ok(sync_res.blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_peer_is_reported() {
        let client = HttpPeerClient::new(Duration::from_millis(200), Duration::from_millis(500)).unwrap();
        // Port 9 (discard) on localhost is not served by anything in the test environment.
        let peer = PeerNode::new("127.0.0.1", 9, false, false);
        match client.status(&peer).await {
            Err(Error::PeerUnreachable(address, _)) => assert_eq!(address, "127.0.0.1:9"),
            other => panic!("unexpected result {:?}", other.map(|s| s.block_number)),
        }
        let this_peer = PeerNode::new("127.0.0.1", 8081, false, false);
        assert!(matches!(
            client.join(&peer, &this_peer).await,
            Err(Error::PeerRegistration(_, _))
        ));
    }

    #[test]
    fn test_url() {
        let peer = PeerNode::new("10.1.2.3", 8080, true, false);
        assert_eq!(url(&peer, ENDPOINT_STATUS), "http://10.1.2.3:8080/node/status");
    }
}
