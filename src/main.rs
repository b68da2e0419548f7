use clap::Parser;
use ledger_node::api::run_api;
use ledger_node::config::{Args, Commands, NodeConfig, TxArgs};
use ledger_node::error::{Error, Result};
use ledger_node::node::{load_this_peer, Node};
use ledger_node::protocol::{BalancesRes, ErrRes, TxAddReq, TxAddRes, ENDPOINT_BALANCES_LIST, ENDPOINT_TX_ADD};
use ledger_node::storage::state::State;
use ledger_node::storage::{spawn_storage, unix_time, Storage};
use ledger_node::sync::client::HttpPeerClient;
use ledger_node::sync::{Syncer, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use ledger_node::types::{Account, Hash, Transaction};
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::exit;
use tokio::signal;
use tokio_util::sync::CancellationToken;

fn init_logger(verbose: bool) {
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    SimpleLogger::new()
        .with_level(LevelFilter::Error)
        .with_module_level("ledger_node", level)
        .init()
        .expect("simple_logger init failed");
}

fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .timeout(DEFAULT_REQUEST_TIMEOUT)
        .build()?)
}

async fn run(config: NodeConfig) {
    log::info!("Starting node {} with data in {:?}", config.api_address(), config.data_dir);
    let state = match State::load_from_disk(&config.data_dir) {
        Ok(state) => state,
        Err(error) => {
            log::error!("Failed to load ledger from {:?}: {}", config.data_dir, error);
            exit(1);
        }
    };
    let token = CancellationToken::new();
    log::debug!("Create storage task");
    let (storage_interface, storage_task) = spawn_storage(state, token.clone());
    let node = Node::new(
        storage_interface,
        config.ip.to_string(),
        config.port,
        config.bootstrap.clone(),
        config.data_dir.clone(),
    );
    if let Err(error) = node.write_this_peer() {
        log::error!("Failed to write this-node record: {}", error);
        exit(1);
    }
    let client = match HttpPeerClient::new(config.sync.connect_timeout, config.sync.request_timeout) {
        Ok(client) => client,
        Err(error) => {
            log::error!("Failed to create peer client: {}", error);
            exit(1);
        }
    };
    log::debug!("Create and start sync");
    let syncer = Syncer::new(node.clone(), client, config.sync.interval, token.clone());
    let sync_task = tokio::spawn(async move { syncer.run().await });
    log::debug!("Create and start API");
    let api_token = token.clone();
    let api_task = tokio::spawn(run_api(config.api_address(), node, api_token));

    let shutdown_token = token.clone();
    let shutdown_task = tokio::spawn(async move {
        tokio::select! {
            result = signal::ctrl_c() => {
                if let Err(error) = result {
                    log::error!("Failed to listen for shutdown signal: {}", error);
                }
                log::debug!("Shutdown signal received!");
            }
            _ = shutdown_token.cancelled() => {}
        }
        shutdown_token.cancel();
    });

    let api_result = api_task.await;
    // A failed API stops the rest of the node as well.
    token.cancel();
    let (storage_result, _, _) = tokio::join!(storage_task, sync_task, shutdown_task);
    match api_result {
        Ok(Err(error)) => log::error!("API failed: {}", error),
        Err(error) => log::error!("API task failed: {}", error),
        Ok(Ok(())) => {}
    }
    match storage_result {
        Ok(Err(error)) => log::error!("Storage failed to shut down cleanly: {}", error),
        Err(error) => log::error!("Storage task failed: {}", error),
        Ok(Ok(())) => {}
    }
    log::debug!("Done!");
}

async fn fetch_balances(data_dir: &Path) -> Result<BalancesRes> {
    let this_peer = load_this_peer(data_dir)?;
    let url = format!("http://{}{}", this_peer.tcp_address(), ENDPOINT_BALANCES_LIST);
    Ok(http_client()?.get(url).send().await?.error_for_status()?.json().await?)
}

fn print_balances(hash: &Hash, balances: &BTreeMap<Account, u64>) {
    println!("Accounts balances at {}:", hash);
    println!("__________________");
    println!();
    for (account, balance) in balances {
        println!("{:<16} {:>12}", account, balance);
    }
}

async fn balances(data_dir: &Path) -> Result<()> {
    match fetch_balances(data_dir).await {
        Ok(response) => {
            print_balances(&response.block_hash, &response.balances);
            return Ok(());
        }
        Err(error) => log::debug!("Local node not reachable, replaying {:?}: {}", data_dir, error),
    }
    let state = State::load_from_disk(data_dir)?;
    print_balances(&state.latest_block_hash(), state.balances());
    state.close()
}

async fn submit_remote(data_dir: &Path, request: &TxAddReq) -> Result<Hash> {
    let this_peer = load_this_peer(data_dir)?;
    let url = format!("http://{}{}", this_peer.tcp_address(), ENDPOINT_TX_ADD);
    let response = http_client()?.post(url).json(request).send().await?;
    if !response.status().is_success() {
        let status = response.status();
        let reason = match response.json::<ErrRes>().await {
            Ok(body) => body.error,
            Err(_) => status.to_string(),
        };
        return Err(Error::RemoteError(this_peer.tcp_address(), reason));
    }
    Ok(response.json::<TxAddRes>().await?.block_hash)
}

async fn tx(data_dir: &Path, args: TxArgs) -> Result<()> {
    let request = TxAddReq {
        from: args.from,
        to: args.to,
        value: args.value,
        data: args.data,
    };
    if args.offline {
        let mut state = State::load_from_disk(data_dir)?;
        state.add_tx(Transaction::from(request))?;
        if let Some(hash) = state.persist(unix_time())? {
            println!("Transaction persisted in block {}", hash);
        }
        return state.close();
    }
    let hash = submit_remote(data_dir, &request).await?;
    println!("Transaction added in block {}", hash);
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let result = match args.command {
        Commands::Run(run_args) => {
            let config = NodeConfig::from_args(args.datadir, &run_args);
            init_logger(config.verbose);
            run(config).await;
            Ok(())
        }
        Commands::Balances => {
            init_logger(false);
            balances(&args.datadir).await
        }
        Commands::Tx(tx_args) => {
            init_logger(false);
            tx(&args.datadir, tx_args).await
        }
        Commands::Version => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };
    if let Err(error) = result {
        eprintln!("{}", error);
        exit(1);
    }
}
