/*
[INPUT]:  Wallets, chains, pool selection, ticker/min-USD filters, a running WorkerPool
[OUTPUT]: BalanceAccumulator keyed by wallet/chain/pool, with failed task keys recorded
[POS]:    Orchestration layer - two-phase fan-out and single-writer result folding
[UPDATE]: When changing phase ordering, pool filtering or failure accounting
*/

use anyhow::Result;
use debank_balance_adapter::{Coin, FetchTask, MinUsdFilter, TaskKey, TaskOutput, ticker_matches};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::pool::{PoolSummary, TaskOutcome, WorkerPool};

/// Which liquidity pools end up in the accumulator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PoolSelection {
    #[default]
    All,
    None,
    /// Only these pool keys, e.g. `Uniswap V3 (eth)`
    Only(BTreeSet<String>),
}

impl PoolSelection {
    /// Whether pool queries are issued at all
    pub fn enabled(&self) -> bool {
        !matches!(self, PoolSelection::None)
    }

    pub fn retains(&self, pool_key: &str) -> bool {
        match self {
            PoolSelection::All => true,
            PoolSelection::None => false,
            PoolSelection::Only(keys) => keys.contains(pool_key),
        }
    }
}

/// Everything collected in one run.
///
/// `BTreeMap` everywhere, so equality does not depend on arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BalanceAccumulator {
    /// wallet -> chain -> coins
    pub chains: BTreeMap<String, BTreeMap<String, Vec<Coin>>>,
    /// pool key -> wallet -> coins
    pub pools: BTreeMap<String, BTreeMap<String, Vec<Coin>>>,
    /// wallet -> total USD across all chains
    pub totals: BTreeMap<String, Decimal>,
    /// Tasks that produced no data
    pub failures: BTreeSet<TaskKey>,
}

impl BalanceAccumulator {
    pub fn total_for(&self, wallet: &str) -> Decimal {
        self.totals.get(wallet).copied().unwrap_or(Decimal::ZERO)
    }

    /// Fold one outcome in. Failed chain and pool queries leave an empty
    /// entry; failed totals count as zero.
    pub fn apply(&mut self, outcome: TaskOutcome, pools: &PoolSelection, ticker: Option<&str>) {
        match outcome {
            TaskOutcome::Completed(executed) => self.apply_output(executed.output, pools, ticker),
            TaskOutcome::Failed { key, error } => {
                match &key {
                    TaskKey::ChainBalance { wallet, chain } => {
                        self.chain_entry(wallet, chain);
                    }
                    TaskKey::WalletTotal { wallet } => {
                        tracing::warn!(wallet = %wallet, error = %error, "wallet total unavailable, counting as zero");
                        self.totals.insert(wallet.clone(), Decimal::ZERO);
                    }
                    TaskKey::PoolBalance { .. } | TaskKey::UsedChains { .. } => {}
                }
                self.failures.insert(key);
            }
        }
    }

    fn apply_output(&mut self, output: TaskOutput, selection: &PoolSelection, ticker: Option<&str>) {
        match output {
            TaskOutput::ChainBalance {
                chain,
                wallet,
                coins,
            } => {
                self.chain_entry(&wallet, &chain).extend(coins);
            }
            TaskOutput::PoolBalance { wallet, pools } => {
                for (pool_key, coins) in pools {
                    if !selection.retains(&pool_key) {
                        continue;
                    }
                    let coins = coins
                        .into_iter()
                        .filter(|coin| ticker_matches(ticker, &coin.ticker));
                    self.pools
                        .entry(pool_key)
                        .or_default()
                        .entry(wallet.clone())
                        .or_default()
                        .extend(coins);
                }
            }
            TaskOutput::WalletTotal { wallet, total_usd } => {
                self.totals.insert(wallet, total_usd);
            }
            TaskOutput::UsedChains { wallet, .. } => {
                tracing::debug!(wallet = %wallet, "used chains result ignored during balance run");
            }
        }
    }

    fn chain_entry(&mut self, wallet: &str, chain: &str) -> &mut Vec<Coin> {
        self.chains
            .entry(wallet.to_string())
            .or_default()
            .entry(chain.to_string())
            .or_default()
    }

    /// Give every wallet an entry, possibly empty, in every observed pool
    fn fill_pool_gaps(&mut self, wallets: &[String]) {
        for holders in self.pools.values_mut() {
            for wallet in wallets {
                holders.entry(wallet.clone()).or_default();
            }
        }
    }
}

/// Drives a worker pool through the balance and total phases.
#[derive(Debug)]
pub struct Aggregator {
    pool: WorkerPool,
    min_usd: MinUsdFilter,
}

impl Aggregator {
    pub fn new(pool: WorkerPool) -> Self {
        Self {
            pool,
            min_usd: MinUsdFilter::NONE,
        }
    }

    pub fn with_min_usd(mut self, min_usd: MinUsdFilter) -> Self {
        self.min_usd = min_usd;
        self
    }

    /// Run both phases and shut the pool down.
    ///
    /// Phase 2 (wallet totals) only starts once every phase 1 outcome is in.
    pub async fn run(
        self,
        wallets: &[String],
        chains: &[String],
        pools: PoolSelection,
        ticker: Option<&str>,
    ) -> Result<BalanceAccumulator> {
        let (accumulator, _summary) = self.run_with_summary(wallets, chains, pools, ticker).await?;
        Ok(accumulator)
    }

    /// Same as [`Aggregator::run`], also returning how the pool shut down
    pub async fn run_with_summary(
        mut self,
        wallets: &[String],
        chains: &[String],
        pools: PoolSelection,
        ticker: Option<&str>,
    ) -> Result<(BalanceAccumulator, PoolSummary)> {
        let mut accumulator = BalanceAccumulator::default();
        let ticker_owned = ticker.map(str::to_string);

        let mut balance_tasks = Vec::with_capacity(wallets.len() * (chains.len() + 1));
        for wallet in wallets {
            for chain in chains {
                balance_tasks.push(FetchTask::ChainBalance {
                    wallet: wallet.clone(),
                    chain: chain.clone(),
                    ticker: ticker_owned.clone(),
                    min_usd: self.min_usd,
                });
            }
            if pools.enabled() {
                balance_tasks.push(FetchTask::PoolBalance {
                    wallet: wallet.clone(),
                });
            }
        }

        tracing::info!(
            wallets = wallets.len(),
            chains = chains.len(),
            tasks = balance_tasks.len(),
            "phase 1: fetching balances"
        );
        self.phase(balance_tasks, &mut accumulator, &pools, ticker)
            .await;
        accumulator.fill_pool_gaps(wallets);

        let total_tasks: Vec<FetchTask> = wallets
            .iter()
            .map(|wallet| FetchTask::WalletTotal {
                wallet: wallet.clone(),
            })
            .collect();
        tracing::info!(tasks = total_tasks.len(), "phase 2: fetching wallet totals");
        self.phase(total_tasks, &mut accumulator, &pools, ticker)
            .await;

        if let Err(err) = self.pool.finish() {
            tracing::warn!(error = %err, "workers already stopped, report is partial");
        }
        let summary = self.pool.drain().await;
        while let Some(outcome) = self.pool.recv().await {
            tracing::warn!(key = %outcome.key(), "late outcome after drain");
            accumulator.apply(outcome, &pools, ticker);
        }

        if !accumulator.failures.is_empty() {
            tracing::warn!(failed = accumulator.failures.len(), "some queries produced no data");
        }
        Ok((accumulator, summary))
    }

    /// Submit a batch and wait for exactly one outcome per distinct task.
    ///
    /// Once the queue is closed (every worker gone) the remaining tasks are
    /// recorded as failed instead of sent.
    async fn phase(
        &mut self,
        tasks: Vec<FetchTask>,
        accumulator: &mut BalanceAccumulator,
        pools: &PoolSelection,
        ticker: Option<&str>,
    ) {
        let mut pending = BTreeSet::new();
        let mut unsent = BTreeSet::new();
        for task in tasks {
            let key = task.key();
            if pending.contains(&key) || unsent.contains(&key) {
                continue;
            }
            if !unsent.is_empty() {
                unsent.insert(key);
                continue;
            }
            match self.pool.submit(task) {
                Ok(()) => {
                    pending.insert(key);
                }
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "queue closed, remaining tasks not sent");
                    unsent.insert(key);
                }
            }
        }

        while !pending.is_empty() {
            let Some(outcome) = self.pool.recv().await else {
                tracing::error!(missing = pending.len(), "result channel closed before all outcomes arrived");
                break;
            };
            let key = outcome.key();
            if !pending.remove(&key) {
                tracing::warn!(key = %key, "outcome for a task not in this phase");
            }
            accumulator.apply(outcome, pools, ticker);
        }

        for (key, error) in pending
            .into_iter()
            .map(|key| (key, "no outcome received"))
            .chain(unsent.into_iter().map(|key| (key, "not sent: task queue closed")))
        {
            accumulator.apply(
                TaskOutcome::Failed {
                    key,
                    error: error.to_string(),
                },
                pools,
                ticker,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use debank_balance_adapter::{BalanceError, Executed, TaskRunner};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn coin(ticker: &str, amount: i64, price: Option<i64>) -> Coin {
        Coin {
            ticker: ticker.to_string(),
            name: ticker.to_string(),
            amount: Decimal::from(amount),
            price: price.map(Decimal::from),
            logo_url: None,
        }
    }

    /// Deterministic runner; per-wallet jitter scrambles arrival order
    #[derive(Debug, Default)]
    struct StubRunner;

    #[async_trait]
    impl TaskRunner for StubRunner {
        async fn run(&mut self, task: &FetchTask) -> debank_balance_adapter::Result<Executed> {
            let delay = (task.wallet().len() as u64 * 3) % 7;
            tokio::time::sleep(Duration::from_millis(delay)).await;

            let output = match task {
                FetchTask::ChainBalance { wallet, chain, .. } => TaskOutput::ChainBalance {
                    chain: chain.clone(),
                    wallet: wallet.clone(),
                    coins: vec![coin("ETH", 1, Some(2))],
                },
                FetchTask::PoolBalance { wallet } if wallet == "0xaa" => TaskOutput::PoolBalance {
                    wallet: wallet.clone(),
                    pools: BTreeMap::from([
                        ("Uniswap V3 (eth)".to_string(), vec![coin("ETH", 1, Some(2)), coin("USDC", 5, Some(1))]),
                        ("Curve (eth)".to_string(), vec![coin("USDC", 3, Some(1))]),
                    ]),
                },
                FetchTask::PoolBalance { wallet } => TaskOutput::PoolBalance {
                    wallet: wallet.clone(),
                    pools: BTreeMap::new(),
                },
                FetchTask::WalletTotal { wallet } if wallet == "0xdead" => {
                    return Err(BalanceError::ExhaustedRetries {
                        attempts: 3,
                        last: Box::new(BalanceError::RateLimited { status: 429 }),
                    });
                }
                FetchTask::WalletTotal { wallet } => TaskOutput::WalletTotal {
                    wallet: wallet.clone(),
                    total_usd: Decimal::from(wallet.len() as i64),
                },
                FetchTask::UsedChains { wallet } => TaskOutput::UsedChains {
                    wallet: wallet.clone(),
                    chains: Vec::new(),
                },
            };
            Ok(Executed { output, attempts: 1 })
        }
    }

    async fn collect(
        wallets: &[&str],
        chains: &[&str],
        pools: PoolSelection,
        ticker: Option<&str>,
    ) -> (BalanceAccumulator, PoolSummary) {
        let root = CancellationToken::new();
        let pool = WorkerPool::spawn(3, &root, |_| Ok(StubRunner)).unwrap();
        let wallets: Vec<String> = wallets.iter().map(|w| w.to_string()).collect();
        let chains: Vec<String> = chains.iter().map(|c| c.to_string()).collect();
        Aggregator::new(pool)
            .run_with_summary(&wallets, &chains, pools, ticker)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_every_wallet_chain_pair_is_keyed() {
        let (acc, summary) = collect(&["0xaa", "0xbbbb"], &["eth", "bsc", "arb"], PoolSelection::None, None).await;

        assert_eq!(acc.chains.len(), 2);
        for chains in acc.chains.values() {
            assert_eq!(chains.keys().collect::<Vec<_>>(), vec!["arb", "bsc", "eth"]);
        }
        assert_eq!(acc.totals.len(), 2);
        assert_eq!(acc.total_for("0xbbbb"), Decimal::from(6));
        assert!(acc.pools.is_empty());
        assert!(acc.failures.is_empty());
        assert_eq!(summary.done_republished, 3);
    }

    #[tokio::test]
    async fn test_runs_are_idempotent() {
        let wallets = ["0xaa", "0xbbbb", "0xccccc"];
        let chains = ["eth", "bsc"];
        let (first, _) = collect(&wallets, &chains, PoolSelection::All, None).await;
        let (second, _) = collect(&wallets, &chains, PoolSelection::All, None).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_failed_total_counts_as_zero() {
        let (acc, _) = collect(&["0xaa", "0xdead"], &["eth"], PoolSelection::None, None).await;

        assert_eq!(acc.totals.get("0xdead"), Some(&Decimal::ZERO));
        assert!(acc.failures.contains(&TaskKey::WalletTotal {
            wallet: "0xdead".into()
        }));
        assert_eq!(acc.failures.len(), 1);
    }

    #[tokio::test]
    async fn test_pool_entries_cover_every_wallet() {
        let (acc, _) = collect(&["0xaa", "0xbbbb"], &[], PoolSelection::All, None).await;

        assert_eq!(acc.pools.len(), 2);
        for holders in acc.pools.values() {
            assert!(holders.contains_key("0xaa"));
            assert_eq!(holders.get("0xbbbb"), Some(&Vec::new()));
        }
    }

    #[tokio::test]
    async fn test_pool_selection_and_ticker_filter() {
        let only = PoolSelection::Only(BTreeSet::from(["Uniswap V3 (eth)".to_string()]));
        let (acc, _) = collect(&["0xaa"], &[], only, Some("USDC")).await;

        assert_eq!(acc.pools.keys().collect::<Vec<_>>(), vec!["Uniswap V3 (eth)"]);
        let coins = &acc.pools["Uniswap V3 (eth)"]["0xaa"];
        assert_eq!(coins.len(), 1);
        assert_eq!(coins[0].ticker, "USDC");
    }

    /// Balances succeed; the first wallet total cancels the whole run
    #[derive(Debug)]
    struct CancelOnTotal {
        root: CancellationToken,
    }

    #[async_trait]
    impl TaskRunner for CancelOnTotal {
        async fn run(&mut self, task: &FetchTask) -> debank_balance_adapter::Result<Executed> {
            match task {
                FetchTask::ChainBalance { wallet, chain, .. } => Ok(Executed {
                    output: TaskOutput::ChainBalance {
                        chain: chain.clone(),
                        wallet: wallet.clone(),
                        coins: vec![coin("ETH", 1, Some(2))],
                    },
                    attempts: 1,
                }),
                _ => {
                    self.root.cancel();
                    Err(BalanceError::Cancelled)
                }
            }
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_run_yields_failed_keys() {
        let root = CancellationToken::new();
        let pool = WorkerPool::spawn(2, &root, |_| Ok(StubRunner)).unwrap();
        root.cancel();

        let wallets = vec!["0xaa".to_string(), "0xbbbb".to_string()];
        let chains = vec!["eth".to_string(), "bsc".to_string()];
        let acc = Aggregator::new(pool)
            .run(&wallets, &chains, PoolSelection::None, None)
            .await
            .unwrap();

        assert_eq!(acc.failures.len(), 6);
        assert_eq!(acc.chains["0xaa"]["eth"], Vec::<Coin>::new());
        assert_eq!(acc.total_for("0xbbbb"), Decimal::ZERO);
        assert_eq!(acc.totals.len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_during_totals_keeps_balances() {
        let root = CancellationToken::new();
        let pool = WorkerPool::spawn(2, &root, |_| {
            Ok(CancelOnTotal { root: root.clone() })
        })
        .unwrap();

        let wallets = vec!["0xaa".to_string(), "0xbbbb".to_string(), "0xccc".to_string()];
        let chains = vec!["eth".to_string()];
        let acc = Aggregator::new(pool)
            .run(&wallets, &chains, PoolSelection::None, None)
            .await
            .unwrap();

        assert!(root.is_cancelled());
        for wallet in &wallets {
            assert_eq!(acc.chains[wallet]["eth"].len(), 1);
            assert_eq!(acc.total_for(wallet), Decimal::ZERO);
            assert!(acc.failures.contains(&TaskKey::WalletTotal { wallet: wallet.clone() }));
        }
        assert_eq!(acc.failures.len(), wallets.len());
    }

    #[test]
    fn test_failed_chain_leaves_empty_entry() {
        let mut acc = BalanceAccumulator::default();
        acc.apply(
            TaskOutcome::Failed {
                key: TaskKey::ChainBalance {
                    wallet: "0xaa".into(),
                    chain: "eth".into(),
                },
                error: "gave up".into(),
            },
            &PoolSelection::All,
            None,
        );
        assert_eq!(acc.chains["0xaa"]["eth"], Vec::<Coin>::new());
        assert_eq!(acc.failures.len(), 1);
    }
}
