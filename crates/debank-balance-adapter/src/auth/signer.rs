/*
[INPUT]:  Request payload, HTTP method and API path
[OUTPUT]: One-shot nonce/signature/timestamp triple for request headers
[POS]:    Auth layer - signing capability shared by all signer backends
[UPDATE]: When changing the signing contract or signature shape
*/

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http::Result;

/// Signature headers for a single request attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub nonce: String,
    pub signature: String,
    pub ts: i64,
}

/// What gets signed for one attempt
#[derive(Debug, Clone, Copy)]
pub struct SignRequest<'a> {
    pub payload: &'a Value,
    pub method: &'a Method,
    pub path: &'a str,
}

impl SignRequest<'_> {
    /// Line protocol form: `<payload-json>|<METHOD>|<path>`
    pub fn to_line(&self) -> String {
        format!("{}|{}|{}", self.payload, self.method.as_str(), self.path)
    }
}

/// Signing oracle for API requests.
///
/// `&mut self` keeps at most one signing request in flight per instance.
#[async_trait]
pub trait Signer: Send {
    /// Produce a fresh signature for the request
    async fn sign(&mut self, request: &SignRequest<'_>) -> Result<Signature>;

    /// Release resources held by the signer (child processes, pipes)
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<S: Signer + ?Sized> Signer for Box<S> {
    async fn sign(&mut self, request: &SignRequest<'_>) -> Result<Signature> {
        (**self).sign(request).await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }
}
