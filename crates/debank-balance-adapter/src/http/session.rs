/*
[INPUT]:  HTTP configuration (base URL, timeouts) and per-attempt signatures
[OUTPUT]: Configured reqwest client + signed request builders
[POS]:    HTTP layer - per-worker session state
[UPDATE]: When adding connection options or changing request headers
*/

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Url};
use serde_json::json;
use std::time::Duration;

use crate::auth::Signature;
use crate::http::endpoint::Endpoint;
use crate::http::{BalanceError, Result};

/// Base URL for the Balance API
pub const DEFAULT_BASE_URL: &str = "https://api.debank.com";
/// Value sent in `x-api-ver`
pub const API_VERSION: &str = "v2";

const HEADER_NONCE: &str = "x-api-nonce";
const HEADER_SIGN: &str = "x-api-sign";
const HEADER_TS: &str = "x-api-ts";
const HEADER_VERSION: &str = "x-api-ver";
const HEADER_ACCOUNT: &str = "account";

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Safari/537.36";

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// One HTTP client plus the signing headers of the current attempt.
///
/// Owned by exactly one executor; never shared between workers.
#[derive(Debug)]
pub struct Session {
    http_client: Client,
    base_url: Url,
    headers: HeaderMap,
}

impl Session {
    /// Create a session against the public API with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Create a session with custom configuration
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        Self::with_config_and_base_url(config, DEFAULT_BASE_URL)
    }

    /// Create a session with custom configuration and base URL (tests, proxies)
    pub fn with_config_and_base_url(config: ClientConfig, base_url: &str) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| BalanceError::Config(format!("build http client: {err}")))?;

        Ok(Self {
            http_client,
            base_url: Url::parse(base_url)?,
            headers: default_headers(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Headers that will be sent with the next request
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Replace signing headers with a fresh signature and account stamp
    pub fn apply_signature(&mut self, signature: &Signature) -> Result<()> {
        self.set_header(HEADER_NONCE, &signature.nonce)?;
        self.set_header(HEADER_SIGN, &signature.signature)?;
        self.set_header(HEADER_TS, &signature.ts.to_string())?;
        self.set_header(HEADER_ACCOUNT, &account_header())?;
        Ok(())
    }

    /// Build a request for an endpoint carrying the current headers
    pub fn request(&self, endpoint: &Endpoint) -> Result<RequestBuilder> {
        let url = self.base_url.join(endpoint.path)?;
        let mut builder = self
            .http_client
            .request(endpoint.method.clone(), url)
            .headers(self.headers.clone());

        if !endpoint.params.is_empty() {
            builder = builder.query(&endpoint.params);
        }
        Ok(builder)
    }

    fn set_header(&mut self, name: &'static str, value: &str) -> Result<()> {
        let value = HeaderValue::from_str(value).map_err(|_| {
            BalanceError::SignerUnavailable(format!("signature field {name} is not a valid header"))
        })?;
        self.headers.insert(HeaderName::from_static(name), value);
        Ok(())
    }
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in [
        ("accept", "*/*"),
        ("cache-control", "no-cache"),
        ("origin", "https://debank.com"),
        ("pragma", "no-cache"),
        ("referer", "https://debank.com/"),
        ("source", "web"),
        (HEADER_VERSION, API_VERSION),
    ] {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    headers
}

/// `{"random_at": "<unix>", "random_id": "<32 hex>", "user_addr": null}`
fn account_header() -> String {
    let random_id = hex::encode(rand::random::<[u8; 16]>());
    json!({
        "random_at": chrono::Utc::now().timestamp().to_string(),
        "random_id": random_id,
        "user_addr": null,
    })
    .to_string()
}
