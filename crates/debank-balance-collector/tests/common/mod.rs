/*
[INPUT]:  Mock server URI and run parameters
[OUTPUT]: Collector configs and API fixtures for pipeline tests
[POS]:    Test infrastructure - shared across collector integration tests
[UPDATE]: When configuration fields or API payload fixtures change
*/

//! Common test utilities for debank-balance-collector tests

use debank_balance_collector::CollectorConfig;
use serde_json::{Value, json};
use wiremock::MockServer;

/// Setup a mock HTTP server for testing
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Native signer, millisecond backoff, no jitter, pointed at `server`
pub fn test_config(server: &MockServer, workers: usize, wallets: &[&str], chains: &[&str]) -> CollectorConfig {
    let yaml = format!(
        r#"
workers: {workers}
pools: none
wallets: {wallets}
chains: {chains}
retry:
  base_delay_ms: 1
  max_jitter_ms: 0
  max_retries: 3
api:
  base_url: "{uri}"
  timeout_secs: 5
  connect_timeout_secs: 5
signer:
  kind: native
"#,
        wallets = json!(wallets),
        chains = json!(chains),
        uri = server.uri(),
    );
    let config = CollectorConfig::from_yaml(&yaml).expect("test config should parse");
    config.validate().expect("test config should be valid");
    config
}

/// `/token/balance_list` body with one priced token
pub fn balance_list(symbol: &str, amount: f64, price: f64) -> Value {
    json!({
        "data": [{
            "amount": amount,
            "price": price,
            "name": symbol,
            "symbol": symbol,
            "optimized_symbol": symbol,
            "logo_url": null,
        }],
        "error_code": 0,
    })
}

/// `/asset/net_curve_24h` body ending at `usd`
pub fn net_curve(usd: f64) -> Value {
    json!({
        "data": {"usd_value_list": [[1700000000, 0.0], [1700000300, usd]]},
        "error_code": 0,
    })
}
