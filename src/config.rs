use crate::sync::SyncConfig;
use crate::types::PeerNode;
use clap::{Parser, Subcommand};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(version, about, long_about = "Replicated ledger node with HTTP peer synchronization")]
pub struct Args {
    /// Directory holding the genesis file, the block log and the this-node record.
    #[arg(short, long, global = true, default_value = "./data")]
    pub datadir: PathBuf,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the node: HTTP API plus periodic peer synchronization.
    Run(RunArgs),
    /// Print the balances of the local node.
    Balances,
    /// Submit a transaction to the local node.
    Tx(TxArgs),
    /// Print the version.
    Version,
}

#[derive(Clone, Debug, clap::Args)]
pub struct RunArgs {
    /// The IP address this node listens on and announces to peers.
    #[arg(long, default_value = "127.0.0.1")]
    pub ip: IpAddr,
    /// The port of the HTTP API.
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,
    /// IP address of the bootstrap peer.
    #[arg(long, default_value = "127.0.0.1")]
    pub bootstrap_ip: String,
    /// Port of the bootstrap peer.
    #[arg(long, default_value_t = 8080)]
    pub bootstrap_port: u16,
    /// Seconds between two synchronization cycles.
    #[arg(long, default_value_t = 45)]
    pub sync_interval: u64,
    /// Upper bound in milliseconds for a single request to a peer.
    #[arg(long, default_value_t = 5000)]
    pub peer_timeout_ms: u64,
    /// Upper bound in milliseconds for connecting to a peer.
    #[arg(long, default_value_t = 1000)]
    pub connect_timeout_ms: u64,
    /// Log debug output of this node.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Clone, Debug, clap::Args)]
pub struct TxArgs {
    #[arg(long)]
    pub from: String,
    #[arg(long)]
    pub to: String,
    #[arg(long)]
    pub value: u64,
    #[arg(long, default_value = "")]
    pub data: String,
    /// Apply the transaction directly to the data directory instead of sending it to the
    /// running node. The node must not be running.
    #[arg(long)]
    pub offline: bool,
}

/// Settings of a running node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeConfig {
    pub ip: IpAddr,
    pub port: u16,
    pub bootstrap: PeerNode,
    pub data_dir: PathBuf,
    pub sync: SyncConfig,
    pub verbose: bool,
}

impl NodeConfig {
    pub fn from_args(data_dir: PathBuf, args: &RunArgs) -> Self {
        Self {
            ip: args.ip,
            port: args.port,
            bootstrap: PeerNode::new(args.bootstrap_ip.clone(), args.bootstrap_port, true, false),
            data_dir,
            sync: SyncConfig {
                interval: Duration::from_secs(args.sync_interval),
                request_timeout: Duration::from_millis(args.peer_timeout_ms),
                connect_timeout: Duration::from_millis(args.connect_timeout_ms),
            },
            verbose: args.verbose,
        }
    }

    pub fn api_address(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SYNC_INTERVAL};

    fn run_config(arguments: &[&str]) -> NodeConfig {
        let args = Args::try_parse_from(arguments).unwrap();
        match args.command {
            Commands::Run(run) => NodeConfig::from_args(args.datadir, &run),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_run_defaults() {
        let config = run_config(&["ledger_node", "run"]);
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.api_address(), "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.bootstrap, PeerNode::new("127.0.0.1", 8080, true, false));
        assert_eq!(config.sync, SyncConfig::default());
        assert_eq!(config.sync.interval, DEFAULT_SYNC_INTERVAL);
        assert_eq!(config.sync.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.sync.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert!(!config.verbose);
    }

    #[test]
    fn test_run_overrides() {
        let config = run_config(&[
            "ledger_node", "run", "-d", "/tmp/node2", "-p", "8081", "--bootstrap-ip", "10.0.0.1",
            "--bootstrap-port", "9000", "--sync-interval", "5", "--peer-timeout-ms", "250", "-v",
        ]);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/node2"));
        assert_eq!(config.port, 8081);
        assert_eq!(config.bootstrap.tcp_address(), "10.0.0.1:9000");
        assert_eq!(config.sync.interval, Duration::from_secs(5));
        assert_eq!(config.sync.request_timeout, Duration::from_millis(250));
        assert!(config.verbose);
    }

    #[test]
    fn test_invalid_port_is_refused() {
        assert!(Args::try_parse_from(["ledger_node", "run", "--port", "70000"]).is_err());
    }

    #[test]
    fn test_tx_command() {
        let args = Args::try_parse_from([
            "ledger_node", "tx", "--from", "andrej", "--to", "babayaga", "--value", "5", "--offline",
        ])
        .unwrap();
        match args.command {
            Commands::Tx(tx) => {
                assert_eq!(tx.from, "andrej");
                assert_eq!(tx.to, "babayaga");
                assert_eq!(tx.value, 5);
                assert!(tx.data.is_empty());
                assert!(tx.offline);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
