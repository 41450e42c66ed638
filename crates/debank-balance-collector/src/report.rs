/*
[INPUT]:  BalanceAccumulator from a finished run, wallets in input order
[OUTPUT]: Serializable compact / detailed / summary views
[POS]:    Presentation layer - report shaping (no I/O)
[UPDATE]: When changing report fields or subtotal rules
*/

use debank_balance_adapter::{Coin, known_usd_total, ticker_matches};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::aggregator::BalanceAccumulator;

/// Rendered in place of a USD value when the price is unknown
pub const UNKNOWN_USD: &str = "?";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompactEntry {
    pub wallet: String,
    pub total_all_chains: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoinLine {
    pub ticker: String,
    pub name: String,
    pub amount: Decimal,
    pub price: Option<Decimal>,
    /// Two-decimal USD value, or `"?"`
    pub usd: String,
}

impl From<&Coin> for CoinLine {
    fn from(coin: &Coin) -> Self {
        Self {
            ticker: coin.ticker.clone(),
            name: coin.name.clone(),
            amount: coin.amount,
            price: coin.price,
            usd: coin
                .usd_value()
                .map(|value| value.to_string())
                .unwrap_or_else(|| UNKNOWN_USD.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionDetail {
    pub coins: Vec<CoinLine>,
    /// Sum over coins with a known price
    pub total_in_usd: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletDetail {
    pub wallet: String,
    pub chains: BTreeMap<String, SectionDetail>,
    pub pools: BTreeMap<String, SectionDetail>,
    /// Chains plus pools, known prices only
    pub total_in_usd: Decimal,
    pub total_all_chains: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub wallets: usize,
    pub total_balance: Decimal,
    pub nonzero_wallets: usize,
    pub failed_queries: usize,
}

/// One line per wallet, in the order the wallets were given
pub fn compact(acc: &BalanceAccumulator, wallets: &[String]) -> Vec<CompactEntry> {
    wallets
        .iter()
        .map(|wallet| CompactEntry {
            wallet: wallet.clone(),
            total_all_chains: acc.total_for(wallet),
        })
        .collect()
}

/// Per-wallet coins by chain and pool, in wallet input order. With a ticker,
/// other coins and sections left empty by the filter are dropped.
pub fn detailed(
    acc: &BalanceAccumulator,
    wallets: &[String],
    ticker: Option<&str>,
) -> Vec<WalletDetail> {
    wallets
        .iter()
        .map(|wallet| {
            let chains: BTreeMap<String, SectionDetail> = acc
                .chains
                .get(wallet)
                .into_iter()
                .flatten()
                .filter_map(|(chain, coins)| {
                    section(coins, ticker).map(|detail| (chain.clone(), detail))
                })
                .collect();

            let pools: BTreeMap<String, SectionDetail> = acc
                .pools
                .iter()
                .filter_map(|(pool, holders)| {
                    let coins = holders.get(wallet)?;
                    section(coins, ticker).map(|detail| (pool.clone(), detail))
                })
                .collect();

            let total_in_usd = chains
                .values()
                .chain(pools.values())
                .fold(Decimal::ZERO, |sum, detail| sum.saturating_add(detail.total_in_usd));

            WalletDetail {
                wallet: wallet.clone(),
                chains,
                pools,
                total_in_usd,
                total_all_chains: acc.total_for(wallet),
            }
        })
        .collect()
}

pub fn summary(acc: &BalanceAccumulator) -> Summary {
    Summary {
        wallets: acc.totals.len(),
        total_balance: acc
            .totals
            .values()
            .fold(Decimal::ZERO, |sum, total| sum.saturating_add(*total)),
        nonzero_wallets: acc.totals.values().filter(|total| **total > Decimal::ZERO).count(),
        failed_queries: acc.failures.len(),
    }
}

fn section(coins: &[Coin], ticker: Option<&str>) -> Option<SectionDetail> {
    let selected: Vec<&Coin> = coins
        .iter()
        .filter(|coin| ticker_matches(ticker, &coin.ticker))
        .collect();
    if ticker.is_some() && selected.is_empty() {
        return None;
    }
    Some(SectionDetail {
        total_in_usd: known_usd_total(selected.iter().copied()),
        coins: selected.into_iter().map(CoinLine::from).collect(),
    })
}
