/*
[INPUT]:  Request payload, HTTP method and API path
[OUTPUT]: Nonce/signature/timestamp computed in-process
[POS]:    Auth layer - native port of the web client's request signing
[UPDATE]: When the API changes its signing scheme
*/

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::auth::signer::{SignRequest, Signature, Signer};
use crate::http::{BalanceError, Result};

type HmacSha256 = Hmac<Sha256>;

const NONCE_PREFIX: &str = "n_";
const NONCE_LEN: usize = 40;
const SIGNING_DOMAIN: &str = "debank-api";

/// In-process signer; no child process required.
#[derive(Debug, Default, Clone)]
pub struct NativeSigner;

impl NativeSigner {
    pub fn new() -> Self {
        Self
    }

    /// Deterministic part of signing, exposed for fixed-vector tests
    pub fn sign_with(request: &SignRequest<'_>, nonce: &str, ts: i64) -> Result<String> {
        let key = sha256_hex(format!("{SIGNING_DOMAIN}\n{nonce}\n{ts}").as_bytes());
        let message = sha256_hex(
            format!(
                "{}\n{}\n{}",
                request.method.as_str().to_uppercase(),
                request.path.to_lowercase(),
                sorted_query(request.payload)
            )
            .as_bytes(),
        );
        let mac = hmac_sha256(key.as_bytes(), message.as_bytes())?;
        Ok(hex::encode(mac))
    }
}

#[async_trait]
impl Signer for NativeSigner {
    async fn sign(&mut self, request: &SignRequest<'_>) -> Result<Signature> {
        let nonce = random_nonce();
        let ts = chrono::Utc::now().timestamp();
        let signature = Self::sign_with(request, &nonce, ts)?;
        Ok(Signature {
            nonce,
            signature,
            ts,
        })
    }
}

fn random_nonce() -> String {
    let body: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect();
    format!("{NONCE_PREFIX}{body}")
}

/// `k1=v1&k2=v2` with keys sorted; strings are used unquoted.
fn sorted_query(payload: &Value) -> String {
    let Some(object) = payload.as_object() else {
        return String::new();
    };
    let mut pairs: Vec<(&String, String)> = object
        .iter()
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(raw) => raw.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (key, rendered)
        })
        .collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn hmac_sha256(key: &[u8], message: &[u8]) -> Result<Vec<u8>> {
    let mac = HmacSha256::new_from_slice(key)
        .map_err(|err| BalanceError::SignerUnavailable(format!("hmac key rejected: {err}")))?;
    Ok(mac.chain_update(message).finalize().into_bytes().to_vec())
}
