pub mod client;
pub mod error;

pub use client::{ExplorerClient, ExplorerClientBuilder, ExplorerTransaction, TransactionHistory, TxListQuery};
