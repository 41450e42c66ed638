/*
[INPUT]:  Signer backends and mock API responses
[OUTPUT]: Test results for request signing end to end
[POS]:    Integration tests - authentication
[UPDATE]: When signer backends or signing headers change
*/

mod common;

use common::{fast_policy, setup_mock_server};
use debank_balance_adapter::{
    BalanceError, ClientConfig, FetchTask, NativeSigner, RequestExecutor, Session, SignRequest,
    Signer,
};
use reqwest::Method;
use tokio_test::assert_ok;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_native_signer_produces_fresh_nonces() {
    let mut signer = NativeSigner::new();
    let payload = serde_json::json!({"user_addr": "0xabc"});
    let request = SignRequest {
        payload: &payload,
        method: &Method::GET,
        path: "/asset/net_curve_24h",
    };

    let first = assert_ok!(signer.sign(&request).await);
    let second = assert_ok!(signer.sign(&request).await);

    assert!(first.nonce.starts_with("n_"));
    assert_ne!(first.nonce, second.nonce);
    assert_eq!(first.signature.len(), 64);
}

#[tokio::test]
async fn test_native_signer_headers_reach_server() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/user/used_chains"))
        .and(header_exists("x-api-sign"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"chains": []},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = assert_ok!(Session::with_config_and_base_url(
        ClientConfig::default(),
        &server.uri()
    ));
    let mut executor = RequestExecutor::new(session, NativeSigner::new(), fast_policy(1));
    let task = FetchTask::UsedChains {
        wallet: "0xabc".into(),
    };
    let _executed = assert_ok!(executor.execute(&task).await);

    let requests = server.received_requests().await.expect("recording enabled");
    let nonce = requests[0].headers.get("x-api-nonce").expect("nonce header");
    assert!(nonce.to_str().unwrap().starts_with("n_"));
}

#[cfg(unix)]
mod subprocess {
    use super::*;
    use debank_balance_adapter::{SubprocessConfig, SubprocessSigner};
    use std::time::Duration;

    fn shell(script: &str) -> SubprocessConfig {
        SubprocessConfig::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_subprocess_signer_drives_executor() {
        let server = setup_mock_server().await;
        Mock::given(method("GET"))
            .and(path("/asset/net_curve_24h"))
            .and(wiremock::matchers::header("x-api-sign", "cafe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"usd_value_list": [[1700000000, 1.0]]},
            })))
            .expect(1)
            .mount(&server)
            .await;

        let script = r#"while read line; do echo '{"nonce":"n_sub","signature":"cafe","ts":1700000000}'; done"#;
        let signer = assert_ok!(SubprocessSigner::spawn(shell(script)));
        let session = assert_ok!(Session::with_config_and_base_url(
            ClientConfig::default(),
            &server.uri()
        ));
        let mut executor = RequestExecutor::new(session, signer, fast_policy(1));
        let task = FetchTask::WalletTotal {
            wallet: "0xabc".into(),
        };

        let executed = assert_ok!(executor.execute(&task).await);
        assert_eq!(executed.attempts, 1);
        assert_ok!(executor.shutdown().await);
    }

    #[tokio::test]
    async fn test_malformed_subprocess_reply_is_retried() {
        let server = setup_mock_server().await;
        Mock::given(method("GET"))
            .and(path("/asset/net_curve_24h"))
            .and(wiremock::matchers::header("x-api-nonce", "n_second"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"usd_value_list": [[1700000000, 12.5]]},
            })))
            .expect(1)
            .mount(&server)
            .await;

        let script = r#"read line; echo 'not json'; while read line; do echo '{"nonce":"n_second","signature":"beef","ts":1700000000}'; done"#;
        let signer = assert_ok!(SubprocessSigner::spawn(shell(script)));
        let session = assert_ok!(Session::with_config_and_base_url(
            ClientConfig::default(),
            &server.uri()
        ));
        let mut executor = RequestExecutor::new(session, signer, fast_policy(3));
        let task = FetchTask::WalletTotal {
            wallet: "0xabc".into(),
        };

        let executed = assert_ok!(executor.execute(&task).await);
        assert_eq!(executed.attempts, 2);
        assert_ok!(executor.shutdown().await);
    }

    #[tokio::test]
    async fn test_silent_subprocess_times_out() {
        let mut config = shell("while read line; do sleep 5; done");
        config.response_timeout = Duration::from_millis(100);
        let mut signer = assert_ok!(SubprocessSigner::spawn(config));

        let payload = serde_json::json!({});
        let request = SignRequest {
            payload: &payload,
            method: &Method::GET,
            path: "/user/used_chains",
        };
        let err = signer.sign(&request).await.unwrap_err();
        assert!(matches!(err, BalanceError::SignerUnavailable(_)));
        assert_ok!(signer.close().await);
    }
}
