/*
[INPUT]:  One TaskRunner and the wallet list
[OUTPUT]: Union of chain ids the wallets have used
[POS]:    Orchestration layer - chain discovery before the balance run
[UPDATE]: When changing how chains are picked when none are configured
*/

use debank_balance_adapter::{FetchTask, TaskOutput, TaskRunner};
use std::collections::BTreeSet;

/// Ask for each wallet's used chains, one request at a time.
///
/// The chain-list query is rate limited more strictly than balance queries,
/// so this runs on a single runner. Wallets whose query fails are skipped.
pub async fn discover_used_chains<R: TaskRunner>(runner: &mut R, wallets: &[String]) -> BTreeSet<String> {
    let mut chains = BTreeSet::new();

    for (index, wallet) in wallets.iter().enumerate() {
        let task = FetchTask::UsedChains {
            wallet: wallet.clone(),
        };
        match runner.run(&task).await {
            Ok(executed) => {
                if let TaskOutput::UsedChains { chains: used, .. } = executed.output {
                    tracing::debug!(wallet = %wallet, count = used.len(), "used chains fetched");
                    chains.extend(used.into_iter().map(|chain| chain.to_lowercase()));
                }
            }
            Err(err) => {
                tracing::warn!(wallet = %wallet, error = %err, "used chains unavailable, skipping wallet");
            }
        }
        tracing::info!(done = index + 1, total = wallets.len(), "chain discovery progress");
    }

    tracing::info!(chains = chains.len(), "chain discovery finished");
    chains
}
