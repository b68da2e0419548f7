use crate::error::{Error, Result};
use crate::genesis::{load_genesis, write_genesis, Genesis};
use crate::storage::block_log::BlockLog;
use crate::storage::{
    block_log_file_path, database_dir_path, genesis_file_path, BalancesAt, ChainTip, Storage,
};
use crate::types::{Account, Block, BlockRecord, Hash, Transaction};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Balances, mempool and tip of the chain, rebuilt from the block log at startup.
///
/// `balances` always equals the genesis balances with every logged block applied in order,
/// plus whatever is pending in the mempool.
pub struct State {
    balances: BTreeMap<Account, u64>,
    mempool: Vec<Transaction>,
    latest_block: Block,
    latest_block_hash: Hash,
    has_genesis_block: bool,
    data_dir: PathBuf,
    log: BlockLog,
}

/// Create the database directory, genesis file and empty block log if missing.
pub fn init_data_dir(data_dir: &Path) -> Result<()> {
    fs::create_dir_all(database_dir_path(data_dir))?;
    let genesis_path = genesis_file_path(data_dir);
    if !genesis_path.exists() {
        log::info!("Writing default genesis to {:?}", genesis_path);
        write_genesis(&genesis_path, &Genesis::default())?;
    }
    let block_log_path = block_log_file_path(data_dir);
    if !block_log_path.exists() {
        fs::write(&block_log_path, b"")?;
    }
    Ok(())
}

fn apply_tx(balances: &mut BTreeMap<Account, u64>, tx: &Transaction) -> Result<()> {
    let to_balance = balances.get(&tx.to).copied().unwrap_or_default();
    if tx.is_reward() {
        let credited = to_balance
            .checked_add(tx.value)
            .ok_or_else(|| Error::BalanceOverflow(tx.to.clone()))?;
        balances.insert(tx.to.clone(), credited);
        return Ok(());
    }

    let from_balance = balances.get(&tx.from).copied().unwrap_or_default();
    if from_balance < tx.value {
        return Err(Error::InsufficientBalance {
            account: tx.from.clone(),
            balance: from_balance,
            value: tx.value,
        });
    }
    if tx.from == tx.to {
        return Ok(());
    }
    let credited = to_balance
        .checked_add(tx.value)
        .ok_or_else(|| Error::BalanceOverflow(tx.to.clone()))?;
    balances.insert(tx.from.clone(), from_balance - tx.value);
    balances.insert(tx.to.clone(), credited);
    Ok(())
}

impl State {
    /// Bootstrap `data_dir` if needed and replay its block log on top of the genesis balances.
    pub fn load_from_disk(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        init_data_dir(&data_dir)?;
        let genesis = load_genesis(&genesis_file_path(&data_dir))?;
        let mut log = BlockLog::open(block_log_file_path(&data_dir))?;
        let records = log.read_records()?;

        let mut state = Self {
            balances: genesis.balances,
            mempool: Vec::new(),
            latest_block: Block::default(),
            latest_block_hash: Hash::default(),
            has_genesis_block: false,
            data_dir,
            log,
        };
        let replayed = records.len();
        for (index, record) in records.into_iter().enumerate() {
            let hash = record.value.hash()?;
            if hash != record.key {
                return Err(Error::CorruptRecord {
                    line: index + 1,
                    reason: format!("recorded hash {} differs from block hash {}", record.key, hash),
                });
            }
            let balances = state.stage_block(&record.value)?;
            state.advance(record.value, hash, balances);
        }
        log::info!(
            "Loaded ledger from {:?}: {} blocks, tip {}",
            state.data_dir,
            replayed,
            state.latest_block_hash
        );
        Ok(state)
    }

    pub fn balances(&self) -> &BTreeMap<Account, u64> {
        &self.balances
    }

    pub fn mempool(&self) -> &[Transaction] {
        &self.mempool
    }

    pub fn latest_block(&self) -> &Block {
        &self.latest_block
    }

    pub fn latest_block_hash(&self) -> Hash {
        self.latest_block_hash
    }

    pub fn has_genesis_block(&self) -> bool {
        self.has_genesis_block
    }

    /// Number the next block on top of the tip must carry.
    pub fn next_block_number(&self) -> Result<u64> {
        if !self.has_genesis_block {
            return Ok(0);
        }
        let tip = self.latest_block.header.block_number;
        tip.checked_add(1).ok_or(Error::BlockNumberExhausted(tip))
    }

    fn validate_block(&self, block: &Block) -> Result<()> {
        // A block without a possible successor would end the chain.
        if block.header.block_number == u64::MAX {
            return Err(Error::BlockNumberExhausted(block.header.block_number));
        }
        if !self.has_genesis_block {
            return Ok(());
        }
        let expected = self.next_block_number()?;
        if block.header.block_number != expected {
            return Err(Error::BlockNumberMismatch {
                expected,
                got: block.header.block_number,
            });
        }
        // Checked from block 1 on: block 0 is the only one without a parent.
        if block.header.parent != self.latest_block_hash {
            return Err(Error::ParentMismatch {
                expected: self.latest_block_hash,
                got: block.header.parent,
            });
        }
        Ok(())
    }

    /// Balances that would result from accepting `block`. Live state is not touched.
    fn stage_block(&self, block: &Block) -> Result<BTreeMap<Account, u64>> {
        self.validate_block(block)?;
        let mut balances = self.balances.clone();
        for tx in &block.transactions {
            apply_tx(&mut balances, tx)?;
        }
        Ok(balances)
    }

    fn advance(&mut self, block: Block, hash: Hash, balances: BTreeMap<Account, u64>) {
        self.balances = balances;
        self.latest_block = block;
        self.latest_block_hash = hash;
        self.has_genesis_block = true;
    }
}

impl Storage for State {
    fn add_block(&mut self, block: Block) -> Result<Hash> {
        let balances = self.stage_block(&block)?;
        let hash = block.hash()?;
        self.log.append(&BlockRecord {
            key: hash,
            value: block.clone(),
        })?;
        log::debug!("Block {} accepted: {}", block.header.block_number, hash);
        self.advance(block, hash, balances);
        Ok(hash)
    }

    fn add_tx(&mut self, transaction: Transaction) -> Result<()> {
        apply_tx(&mut self.balances, &transaction)?;
        self.mempool.push(transaction);
        Ok(())
    }

    fn submit_tx(&mut self, transaction: Transaction, time: u64) -> Result<Hash> {
        let block = Block::new(
            self.latest_block_hash,
            self.next_block_number()?,
            0,
            time,
            vec![transaction],
        );
        self.add_block(block)
    }

    fn persist(&mut self, time: u64) -> Result<Option<Hash>> {
        if self.mempool.is_empty() {
            return Ok(None);
        }
        let pending = self.mempool.clone();
        let block = Block::new(
            self.latest_block_hash,
            self.next_block_number()?,
            0,
            time,
            pending,
        );
        let hash = block.hash()?;
        self.log.append(&BlockRecord {
            key: hash,
            value: block.clone(),
        })?;
        // Mempool transactions are already reflected in the balances.
        let balances = std::mem::take(&mut self.balances);
        self.advance(block, hash, balances);
        self.mempool.clear();
        Ok(Some(hash))
    }

    fn get_balances(&self) -> Result<BalancesAt> {
        Ok(BalancesAt {
            hash: self.latest_block_hash,
            balances: self.balances.clone(),
        })
    }

    fn get_tip(&self) -> Result<ChainTip> {
        Ok(ChainTip {
            hash: self.latest_block_hash,
            block_number: self.latest_block.header.block_number,
            has_genesis_block: self.has_genesis_block,
        })
    }

    fn get_blocks_after(&self, hash: &Hash) -> Result<Vec<Block>> {
        self.log.blocks_after(hash)
    }

    fn close(self) -> Result<()> {
        log::debug!("Closing block log {:?}", self.log.path());
        self.log.close()
    }
}
