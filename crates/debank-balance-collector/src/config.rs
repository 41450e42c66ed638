/*
[INPUT]:  YAML configuration file, optional wallets file, CLI overrides
[OUTPUT]: Parsed collector configuration and the executor/retry/signer settings derived from it
[POS]:    Configuration layer - run setup
[UPDATE]: When adding new configuration options
*/

use anyhow::{Context as _, Result, anyhow, bail};
use clap::ValueEnum;
use debank_balance_adapter::{
    ClientConfig, DEFAULT_BASE_URL, MinUsdFilter, NativeSigner, RequestExecutor, RetryPolicy,
    Session, Signer, SubprocessConfig, SubprocessSigner,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::aggregator::PoolSelection;

/// Executor type produced from configuration
pub type ConfiguredExecutor = RequestExecutor<Box<dyn Signer>>;

/// Top-level configuration for a collection run
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectorConfig {
    /// Number of concurrent workers
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Minimum USD value for listed chain coins; 0 disables the filter
    #[serde(default)]
    pub min_amount_usd: Decimal,
    /// Restrict chain and pool coins to one ticker
    #[serde(default)]
    pub ticker: Option<String>,
    /// Report view printed on completion
    #[serde(default)]
    pub mode: ReportMode,
    /// `all`, `none`, or a list of pool keys such as `Uniswap V3 (eth)`
    #[serde(default)]
    pub pools: PoolsConfig,
    /// Chains to query; empty means discover from the wallets' used chains
    #[serde(default)]
    pub chains: Vec<String>,
    /// Wallet addresses
    #[serde(default)]
    pub wallets: Vec<String>,
    /// Optional file with one wallet address per line
    #[serde(default)]
    pub wallets_file: Option<PathBuf>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub signer: SignerConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportMode {
    /// Per-wallet totals plus coins per chain and pool
    #[default]
    Detailed,
    /// Per-wallet totals only
    Compact,
}

/// Pool selection as written in YAML
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PoolsConfig {
    Keyword(PoolsKeyword),
    Only(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolsKeyword {
    All,
    None,
}

impl Default for PoolsConfig {
    fn default() -> Self {
        PoolsConfig::Keyword(PoolsKeyword::All)
    }
}

impl PoolsConfig {
    pub fn selection(&self) -> PoolSelection {
        match self {
            PoolsConfig::Keyword(PoolsKeyword::All) => PoolSelection::All,
            PoolsConfig::Keyword(PoolsKeyword::None) => PoolSelection::None,
            PoolsConfig::Only(names) if names.is_empty() => PoolSelection::None,
            PoolsConfig::Only(names) => {
                PoolSelection::Only(names.iter().map(|name| name.trim().to_string()).collect())
            }
        }
    }
}

/// Backoff settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_jitter_ms: default_max_jitter_ms(),
            max_retries: default_max_retries(),
        }
    }
}

/// Balance API connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Which signer backend each worker gets
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignerConfig {
    /// Long-lived helper process speaking the line protocol
    Subprocess {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default = "default_response_timeout_ms")]
        response_timeout_ms: u64,
    },
    /// In-process signing
    Native,
}

impl Default for SignerConfig {
    fn default() -> Self {
        SignerConfig::Subprocess {
            program: "node".to_string(),
            args: vec!["js/main.js".to_string()],
            response_timeout_ms: default_response_timeout_ms(),
        }
    }
}

fn default_workers() -> usize {
    3
}

fn default_base_delay_ms() -> u64 {
    1500
}

fn default_max_jitter_ms() -> u64 {
    500
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_response_timeout_ms() -> u64 {
    5000
}

impl CollectorConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Reject settings that cannot produce a run
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        if self.retry.max_retries == 0 {
            bail!("retry.max_retries must be at least 1");
        }
        if self.api.timeout_secs == 0 {
            bail!("api.timeout_secs must be at least 1");
        }
        check_base_url(&self.api.base_url)?;
        if let SignerConfig::Subprocess { program, .. } = &self.signer {
            if program.trim().is_empty() {
                bail!("signer.program must not be empty");
            }
        }
        Ok(())
    }

    /// Inline wallets followed by those in `wallets_file`; lowercased,
    /// duplicates dropped, first occurrence kept.
    pub fn load_wallets(&self) -> Result<Vec<String>> {
        let mut raw = self.wallets.clone();
        if let Some(path) = &self.wallets_file {
            raw.extend(read_wallets_file(path)?);
        }

        let mut seen = HashSet::new();
        let wallets: Vec<String> = raw
            .iter()
            .map(|wallet| wallet.trim().to_lowercase())
            .filter(|wallet| !wallet.is_empty())
            .filter(|wallet| seen.insert(wallet.clone()))
            .collect();

        if wallets.is_empty() {
            bail!("no wallets configured (set `wallets` or `wallets_file`)");
        }
        Ok(wallets)
    }

    /// Configured chains, normalized and deduplicated; empty means discovery
    pub fn chain_list(&self) -> Vec<String> {
        let set: BTreeSet<String> = self
            .chains
            .iter()
            .map(|chain| chain.trim().to_lowercase())
            .filter(|chain| !chain.is_empty())
            .collect();
        set.into_iter().collect()
    }

    pub fn min_usd_filter(&self) -> MinUsdFilter {
        MinUsdFilter::from_user_input(self.min_amount_usd)
    }

    pub fn ticker_filter(&self) -> Option<&str> {
        self.ticker
            .as_deref()
            .map(str::trim)
            .filter(|ticker| !ticker.is_empty())
    }

    pub fn pool_selection(&self) -> PoolSelection {
        self.pools.selection()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_jitter: Duration::from_millis(self.retry.max_jitter_ms),
            max_retries: self.retry.max_retries,
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.api.timeout_secs),
            connect_timeout: Duration::from_secs(self.api.connect_timeout_secs),
        }
    }

    /// Start a signer for one worker
    pub fn build_signer(&self) -> Result<Box<dyn Signer>> {
        match &self.signer {
            SignerConfig::Subprocess {
                program,
                args,
                response_timeout_ms,
            } => {
                let mut config = SubprocessConfig::new(program.clone(), args.clone());
                config.response_timeout = Duration::from_millis(*response_timeout_ms);
                let signer = SubprocessSigner::spawn(config)
                    .with_context(|| format!("start signer process `{program}`"))?;
                Ok(Box::new(signer))
            }
            SignerConfig::Native => Ok(Box::new(NativeSigner::new())),
        }
    }

    /// Build one executor with its own session and signer
    pub fn build_executor(&self, cancel: CancellationToken) -> Result<ConfiguredExecutor> {
        let session = Session::with_config_and_base_url(self.client_config(), &self.api.base_url)
            .context("build balance API session")?;
        let signer = self.build_signer()?;
        Ok(RequestExecutor::new(session, signer, self.retry_policy()).with_cancellation(cancel))
    }
}

fn check_base_url(base_url: &str) -> Result<()> {
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(anyhow!("api.base_url must be an http(s) URL: {base_url}"));
    }
    Ok(())
}

fn read_wallets_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read wallets file {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
