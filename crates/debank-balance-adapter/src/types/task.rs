/*
[INPUT]:  Wallet/chain work items produced by the orchestrator
[OUTPUT]: Fetch tasks, result keys and typed task outputs
[POS]:    Data layer - unit of work exchanged between pool and executor
[UPDATE]: When adding new query kinds
*/

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use super::coin::{Coin, MinUsdFilter};

/// One balance query for one wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchTask {
    /// Token balances of a wallet on one chain
    ChainBalance {
        wallet: String,
        chain: String,
        ticker: Option<String>,
        min_usd: MinUsdFilter,
    },
    /// Liquidity-pool holdings of a wallet across all protocols
    PoolBalance { wallet: String },
    /// Total USD value of a wallet across all chains
    WalletTotal { wallet: String },
    /// Chains a wallet has ever used
    UsedChains { wallet: String },
}

impl FetchTask {
    pub fn wallet(&self) -> &str {
        match self {
            FetchTask::ChainBalance { wallet, .. }
            | FetchTask::PoolBalance { wallet }
            | FetchTask::WalletTotal { wallet }
            | FetchTask::UsedChains { wallet } => wallet,
        }
    }

    pub fn key(&self) -> TaskKey {
        match self {
            FetchTask::ChainBalance { wallet, chain, .. } => TaskKey::ChainBalance {
                wallet: wallet.clone(),
                chain: chain.clone(),
            },
            FetchTask::PoolBalance { wallet } => TaskKey::PoolBalance {
                wallet: wallet.clone(),
            },
            FetchTask::WalletTotal { wallet } => TaskKey::WalletTotal {
                wallet: wallet.clone(),
            },
            FetchTask::UsedChains { wallet } => TaskKey::UsedChains {
                wallet: wallet.clone(),
            },
        }
    }
}

/// Attribution key of a task's result
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskKey {
    ChainBalance { wallet: String, chain: String },
    PoolBalance { wallet: String },
    WalletTotal { wallet: String },
    UsedChains { wallet: String },
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKey::ChainBalance { wallet, chain } => write!(f, "chain_balance({wallet}, {chain})"),
            TaskKey::PoolBalance { wallet } => write!(f, "pool_balance({wallet})"),
            TaskKey::WalletTotal { wallet } => write!(f, "wallet_total({wallet})"),
            TaskKey::UsedChains { wallet } => write!(f, "used_chains({wallet})"),
        }
    }
}

/// Decoded result of a fetch task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutput {
    ChainBalance {
        chain: String,
        wallet: String,
        coins: Vec<Coin>,
    },
    PoolBalance {
        wallet: String,
        pools: BTreeMap<String, Vec<Coin>>,
    },
    WalletTotal {
        wallet: String,
        total_usd: Decimal,
    },
    UsedChains {
        wallet: String,
        chains: Vec<String>,
    },
}

impl TaskOutput {
    pub fn key(&self) -> TaskKey {
        match self {
            TaskOutput::ChainBalance { chain, wallet, .. } => TaskKey::ChainBalance {
                wallet: wallet.clone(),
                chain: chain.clone(),
            },
            TaskOutput::PoolBalance { wallet, .. } => TaskKey::PoolBalance {
                wallet: wallet.clone(),
            },
            TaskOutput::WalletTotal { wallet, .. } => TaskKey::WalletTotal {
                wallet: wallet.clone(),
            },
            TaskOutput::UsedChains { wallet, .. } => TaskKey::UsedChains {
                wallet: wallet.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_key_matches_task_key() {
        let task = FetchTask::ChainBalance {
            wallet: "0xabc".to_string(),
            chain: "eth".to_string(),
            ticker: None,
            min_usd: MinUsdFilter::NONE,
        };
        let output = TaskOutput::ChainBalance {
            chain: "eth".to_string(),
            wallet: "0xabc".to_string(),
            coins: Vec::new(),
        };

        assert_eq!(task.key(), output.key());
        assert_eq!(task.wallet(), "0xabc");
    }

    #[test]
    fn key_display_names_wallet_and_chain() {
        let key = TaskKey::ChainBalance {
            wallet: "0xabc".to_string(),
            chain: "bsc".to_string(),
        };
        assert_eq!(key.to_string(), "chain_balance(0xabc, bsc)");
    }
}
