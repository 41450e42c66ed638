/*
[INPUT]:  Test configuration and mock server requirements
[OUTPUT]: Shared test utilities, fixtures, and mock helpers
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for debank-balance-adapter tests

use async_trait::async_trait;
use debank_balance_adapter::{
    BalanceError, ClientConfig, RequestExecutor, RetryPolicy, Session, SignRequest, Signature,
    Signer,
};
use std::collections::VecDeque;
use std::time::Duration;
use wiremock::MockServer;

/// Setup a mock HTTP server for testing
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Retry policy with millisecond delays and no jitter
pub fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        base_delay: Duration::from_millis(1),
        max_jitter: Duration::ZERO,
        max_retries,
    }
}

/// Fixed signature returned once the script is exhausted
#[allow(dead_code)]
pub fn mock_signature() -> Signature {
    Signature {
        nonce: "n_testnonce".to_string(),
        signature: "deadbeef".to_string(),
        ts: 1_700_000_000,
    }
}

/// Signer that replays scripted results, then signs successfully forever
#[derive(Debug, Default)]
pub struct ScriptedSigner {
    script: VecDeque<Result<Signature, BalanceError>>,
    pub calls: u32,
    pub closed: bool,
}

#[allow(dead_code)]
impl ScriptedSigner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_fail(mut self, error: BalanceError) -> Self {
        self.script.push_back(Err(error));
        self
    }
}

#[async_trait]
impl Signer for ScriptedSigner {
    async fn sign(&mut self, _request: &SignRequest<'_>) -> Result<Signature, BalanceError> {
        self.calls += 1;
        self.script.pop_front().unwrap_or_else(|| Ok(mock_signature()))
    }

    async fn close(&mut self) -> Result<(), BalanceError> {
        self.closed = true;
        Ok(())
    }
}

/// Executor against the mock server
#[allow(dead_code)]
pub fn executor(
    server: &MockServer,
    signer: ScriptedSigner,
    policy: RetryPolicy,
) -> RequestExecutor<ScriptedSigner> {
    executor_with_config(server, signer, policy, ClientConfig::default())
}

#[allow(dead_code)]
pub fn executor_with_config(
    server: &MockServer,
    signer: ScriptedSigner,
    policy: RetryPolicy,
    config: ClientConfig,
) -> RequestExecutor<ScriptedSigner> {
    let session = Session::with_config_and_base_url(config, &server.uri()).expect("session");
    RequestExecutor::new(session, signer, policy)
}
