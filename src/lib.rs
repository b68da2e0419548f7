pub mod api;
pub mod config;
pub mod error;
pub mod genesis;
pub mod node;
pub mod peers;
pub mod protocol;
pub mod storage;
pub mod sync;
pub mod types;
