//! JSON bodies exchanged between nodes and with local clients.

use crate::types::{Account, Block, Hash, PeerNode, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const ENDPOINT_BALANCES_LIST: &str = "/balances/list";
pub const ENDPOINT_TX_ADD: &str = "/tx/add";
pub const ENDPOINT_STATUS: &str = "/node/status";
pub const ENDPOINT_SYNC: &str = "/node/sync";
pub const ENDPOINT_SYNC_QUERY_KEY_FROM_BLOCK: &str = "fromBlock";
pub const ENDPOINT_ADD_PEER: &str = "/node/peer";
pub const ENDPOINT_ADD_PEER_QUERY_KEY_IP: &str = "ip";
pub const ENDPOINT_ADD_PEER_QUERY_KEY_PORT: &str = "port";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ErrRes {
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct BalancesRes {
    pub block_hash: Hash,
    pub balances: BTreeMap<Account, u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TxAddReq {
    pub from: Account,
    pub to: Account,
    pub value: u64,
    #[serde(default)]
    pub data: String,
}

impl From<TxAddReq> for Transaction {
    fn from(request: TxAddReq) -> Self {
        Transaction::new(request.from, request.to, request.value, request.data)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TxAddRes {
    pub block_hash: Hash,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct StatusRes {
    pub block_hash: Hash,
    pub block_number: u64,
    pub peers_known: HashMap<String, PeerNode>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct SyncRes {
    pub blocks: Vec<Block>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AddPeerRes {
    pub success: bool,
    pub error: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SyncQuery {
    #[serde(rename = "fromBlock", default)]
    pub from_block: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AddPeerQuery {
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub port: String,
}
