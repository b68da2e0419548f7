pub mod block_log;
pub mod state;

use crate::error::{Error, Result};
use crate::types::{Account, Block, Hash, Transaction};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const COMMAND_CHANNEL_CAPACITY: usize = 64;

pub type AddBlockResult = Result<Hash>;
pub type AddTxResult = Result<()>;
pub type PersistResult = Result<Option<Hash>>;
pub type GetBalancesResult = Result<BalancesAt>;
pub type GetTipResult = Result<ChainTip>;
pub type GetBlocksResult = Result<Vec<Block>>;

pub fn database_dir_path(data_dir: &Path) -> PathBuf {
    data_dir.join("db")
}

pub fn genesis_file_path(data_dir: &Path) -> PathBuf {
    database_dir_path(data_dir).join("genesis.json")
}

pub fn block_log_file_path(data_dir: &Path) -> PathBuf {
    database_dir_path(data_dir).join("block.db")
}

/// Current wall clock as unix seconds.
pub fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

/// Balances as of the block with hash `hash`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalancesAt {
    pub hash: Hash,
    pub balances: BTreeMap<Account, u64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChainTip {
    pub hash: Hash,
    pub block_number: u64,
    pub has_genesis_block: bool,
}

async fn receive<Type>(sender: &str, receiver: oneshot::Receiver<Type>) -> Result<Type> {
    receiver.await.map_err(|error| {
        Error::ChannelFailure(sender.to_string(), error.to_string())
    })
}

pub enum StorageCommand {
    AddBlock(Block, oneshot::Sender<AddBlockResult>),
    AddTx(Transaction, oneshot::Sender<AddTxResult>),
    SubmitTx(Transaction, u64, oneshot::Sender<AddBlockResult>),
    Persist(oneshot::Sender<PersistResult>),
    GetBalances(oneshot::Sender<GetBalancesResult>),
    GetTip(oneshot::Sender<GetTipResult>),
    GetBlocksAfter(Hash, oneshot::Sender<GetBlocksResult>),
}

impl StorageCommand {
    pub async fn send(self, from: &str, sender: mpsc::Sender<StorageCommand>) -> Result<()> {
        sender.send(self).await.map_err(|error| {
            Error::ChannelFailure(from.to_string(), error.to_string())
        })?;
        Ok(())
    }
}

/// Cloneable handle to the task that owns the ledger. Every call is queued behind the
/// previous ones, so no caller ever observes a partially applied block.
#[derive(Clone)]
pub struct StorageInterface {
    pub command_tx: mpsc::Sender<StorageCommand>,
}

impl StorageInterface {
    pub fn new(command_tx: mpsc::Sender<StorageCommand>) -> Self {
        Self {command_tx}
    }
    pub async fn add_block(&self, block: Block) -> AddBlockResult {
        let (tx, rx) = oneshot::channel();
        let command = StorageCommand::AddBlock(block, tx);
        command.send("add_block", self.command_tx.clone()).await?;
        receive("add_block", rx).await?
    }
    pub async fn add_tx(&self, transaction: Transaction) -> AddTxResult {
        let (tx, rx) = oneshot::channel();
        let command = StorageCommand::AddTx(transaction, tx);
        command.send("add_tx", self.command_tx.clone()).await?;
        receive("add_tx", rx).await?
    }
    /// Wrap `transaction` in a block on top of the current tip and add it.
    pub async fn submit_tx(&self, transaction: Transaction) -> AddBlockResult {
        let (tx, rx) = oneshot::channel();
        let command = StorageCommand::SubmitTx(transaction, unix_time(), tx);
        command.send("submit_tx", self.command_tx.clone()).await?;
        receive("submit_tx", rx).await?
    }
    pub async fn persist(&self) -> PersistResult {
        let (tx, rx) = oneshot::channel();
        let command = StorageCommand::Persist(tx);
        command.send("persist", self.command_tx.clone()).await?;
        receive("persist", rx).await?
    }
    pub async fn get_balances(&self) -> GetBalancesResult {
        let (tx, rx) = oneshot::channel();
        let command = StorageCommand::GetBalances(tx);
        command.send("get_balances", self.command_tx.clone()).await?;
        receive("get_balances", rx).await?
    }
    pub async fn get_tip(&self) -> GetTipResult {
        let (tx, rx) = oneshot::channel();
        let command = StorageCommand::GetTip(tx);
        command.send("get_tip", self.command_tx.clone()).await?;
        receive("get_tip", rx).await?
    }
    pub async fn get_blocks_after(&self, hash: Hash) -> GetBlocksResult {
        let (tx, rx) = oneshot::channel();
        let command = StorageCommand::GetBlocksAfter(hash, tx);
        command.send("get_blocks_after", self.command_tx.clone()).await?;
        receive("get_blocks_after", rx).await?
    }
}

fn reply<Type>(command: &str, sender: oneshot::Sender<Type>, result: Type) {
    if sender.send(result).is_err() {
        log::debug!("Caller of {} went away before the reply", command);
    }
}

pub trait Storage {
    fn add_block(&mut self, block: Block) -> Result<Hash>;
    fn add_tx(&mut self, transaction: Transaction) -> Result<()>;
    fn submit_tx(&mut self, transaction: Transaction, time: u64) -> Result<Hash>;
    fn persist(&mut self, time: u64) -> Result<Option<Hash>>;
    fn get_balances(&self) -> Result<BalancesAt>;
    fn get_tip(&self) -> Result<ChainTip>;
    fn get_blocks_after(&self, hash: &Hash) -> Result<Vec<Block>>;
    fn close(self) -> Result<()> where Self: Sized;

    /// Serve commands until every handle is dropped or `token` is cancelled, then persist
    /// the mempool and close.
    fn run(
        mut self,
        mut receiver: mpsc::Receiver<StorageCommand>,
        token: CancellationToken,
    ) -> impl Future<Output = Result<()>> + Send
    where
        Self: Sized + Send,
    {
        async move {
            loop {
                let command = tokio::select! {
                    command = receiver.recv() => command,
                    _ = token.cancelled() => None,
                };
                let Some(command) = command else {
                    break;
                };
                match command {
                    StorageCommand::AddBlock(block, sender) => {
                        reply("add_block", sender, self.add_block(block));
                    }
                    StorageCommand::AddTx(transaction, sender) => {
                        reply("add_tx", sender, self.add_tx(transaction));
                    }
                    StorageCommand::SubmitTx(transaction, time, sender) => {
                        reply("submit_tx", sender, self.submit_tx(transaction, time));
                    }
                    StorageCommand::Persist(sender) => {
                        reply("persist", sender, self.persist(unix_time()));
                    }
                    StorageCommand::GetBalances(sender) => {
                        reply("get_balances", sender, self.get_balances());
                    }
                    StorageCommand::GetTip(sender) => {
                        reply("get_tip", sender, self.get_tip());
                    }
                    StorageCommand::GetBlocksAfter(hash, sender) => {
                        reply("get_blocks_after", sender, self.get_blocks_after(&hash));
                    }
                }
            }
            log::debug!("Storage stopping");
            match self.persist(unix_time()) {
                Ok(Some(hash)) => log::info!("Persisted mempool as block {}", hash),
                Ok(None) => {}
                Err(error) => log::error!("Failed to persist mempool: {}", error),
            }
            self.close()
        }
    }
}

/// Move `storage` onto its own task and hand back the handle to talk to it.
pub fn spawn_storage<S>(storage: S, token: CancellationToken) -> (StorageInterface, JoinHandle<Result<()>>)
where
    S: Storage + Send + 'static,
{
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let task = tokio::spawn(storage.run(command_rx, token));
    (StorageInterface::new(command_tx), task)
}
