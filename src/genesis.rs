use crate::error::Result;
use crate::types::Account;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const CHAIN_ID: &str = "the-refactored-blockchain-bar-ledger";
const GENESIS_TIME: &str = "2021-03-01T00:00:00.000000000Z";

/// The balance snapshot every ledger starts from.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Genesis {
    #[serde(default)]
    pub genesis_time: String,
    #[serde(default)]
    pub chain_id: String,
    pub balances: BTreeMap<Account, u64>,
}

impl Default for Genesis {
    fn default() -> Self {
        Self {
            genesis_time: GENESIS_TIME.to_string(),
            chain_id: CHAIN_ID.to_string(),
            balances: BTreeMap::from([("andrej".to_string(), 10_000), ("tim".to_string(), 20_000)]),
        }
    }
}

pub fn load_genesis(path: &Path) -> Result<Genesis> {
    let content = fs::read(path)?;
    Ok(serde_json::from_slice(&content)?)
}

pub fn write_genesis(path: &Path, genesis: &Genesis) -> Result<()> {
    let mut content = serde_json::to_vec_pretty(genesis)?;
    content.push(b'\n');
    fs::write(path, content)?;
    Ok(())
}
