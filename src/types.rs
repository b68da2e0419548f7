use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

pub type Account = String;

/// `Data` marker of a transaction that mints value instead of transferring it.
pub const REWARD_DATA: &str = "reward";

/// SHA-256 digest, encoded as 64 lowercase hex characters on the wire.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Hash([u8; 32]);

impl Hash {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl FromStr for Hash {
    type Err = Error;

    /// Either hex case is accepted; the hash always prints back in lowercase.
    fn from_str(text: &str) -> Result<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(text, &mut bytes)
            .map_err(|error| Error::InvalidHash(format!("'{}': {}", text, error)))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Proof-of-work predicate: the first two bytes of the hash are zero.
pub fn is_block_hash_valid(hash: &Hash) -> bool {
    hash.0[..2] == [0, 0]
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Transaction {
    pub from: Account,
    pub to: Account,
    pub value: u64,
    pub data: String,
}

impl Transaction {
    pub fn new(from: impl Into<Account>, to: impl Into<Account>, value: u64, data: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            value,
            data: data.into(),
        }
    }

    pub fn reward(to: impl Into<Account>, value: u64) -> Self {
        Self::new(String::new(), to, value, REWARD_DATA)
    }

    pub fn is_reward(&self) -> bool {
        self.data == REWARD_DATA
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct BlockHeader {
    pub parent: Hash,
    #[serde(rename = "number")]
    pub block_number: u64,
    pub nonce: u32,
    pub time: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Block {
    pub header: BlockHeader,
    #[serde(rename = "payload")]
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(parent: Hash, block_number: u64, nonce: u32, time: u64, transactions: Vec<Transaction>) -> Self {
        Self {
            header: BlockHeader {
                parent,
                block_number,
                nonce,
                time,
            },
            transactions,
        }
    }

    /// Digest of the block's canonical JSON form.
    pub fn hash(&self) -> Result<Hash> {
        let encoded = serde_json::to_vec(self)?;
        Ok(Hash(Sha256::digest(&encoded).into()))
    }
}

/// One line of the block log.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct BlockRecord {
    #[serde(rename = "hash")]
    pub key: Hash,
    #[serde(rename = "block")]
    pub value: Block,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct PeerNode {
    pub ip: String,
    pub port: u16,
    pub is_bootstrap: bool,
    /// Set once this node registered itself with the peer. Never leaves the process.
    #[serde(skip)]
    pub connected: bool,
}

impl PeerNode {
    pub fn new(ip: impl Into<String>, port: u16, is_bootstrap: bool, connected: bool) -> Self {
        Self {
            ip: ip.into(),
            port,
            is_bootstrap,
            connected,
        }
    }

    pub fn tcp_address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}
