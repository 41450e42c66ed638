/*
[INPUT]:  FetchTask, owned Session + Signer, RetryPolicy, CancellationToken
[OUTPUT]: Decoded TaskOutput with attempt count, or a terminal error
[POS]:    HTTP layer - signed request execution with retry/backoff
[UPDATE]: When changing response classification or the retry state machine
*/

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::auth::{SignRequest, Signer};
use crate::http::endpoint::Endpoint;
use crate::http::retry::RetryPolicy;
use crate::http::session::Session;
use crate::http::{BalanceError, Result};
use crate::types::{
    ApiProject, ApiToken, FetchTask, NetCurve, TaskOutput, UsedChains, group_pools, select_coins,
};

/// Successful execution of a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executed {
    pub output: TaskOutput,
    /// Attempts spent, counting the successful one
    pub attempts: u32,
}

/// Anything a worker can hand tasks to
#[async_trait]
pub trait TaskRunner: Send {
    async fn run(&mut self, task: &FetchTask) -> Result<Executed>;

    /// Called once when the owning worker exits
    async fn close(&mut self) {}
}

/// Owns one session and one signer; runs one task at a time.
#[derive(Debug)]
pub struct RequestExecutor<S> {
    session: Session,
    signer: S,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl<S: Signer> RequestExecutor<S> {
    pub fn new(session: Session, signer: S, policy: RetryPolicy) -> Self {
        Self {
            session,
            signer,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort sleeps and in-flight calls when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn signer(&self) -> &S {
        &self.signer
    }

    /// Run a task through the retry state machine.
    ///
    /// Retryable failures stay inside; callers only see success,
    /// `ExhaustedRetries`, `Cancelled` or a non-retryable setup error.
    pub async fn execute(&mut self, task: &FetchTask) -> Result<Executed> {
        let endpoint = Endpoint::for_task(task);
        let max_attempts = self.policy.max_retries.max(1);
        let mut last_error = None;

        for attempt in 0..max_attempts {
            pause(&self.cancel, self.policy.throttle_delay(attempt)).await?;

            match self.attempt(task, &endpoint).await {
                Ok(output) => {
                    tracing::debug!(
                        wallet = %task.wallet(),
                        path = endpoint.path,
                        attempts = attempt + 1,
                        "request succeeded"
                    );
                    return Ok(Executed {
                        output,
                        attempts: attempt + 1,
                    });
                }
                Err(err) if err.is_retryable() => {
                    tracing::warn!(
                        wallet = %task.wallet(),
                        path = endpoint.path,
                        attempt = attempt + 1,
                        max_attempts,
                        error = %err,
                        "request attempt failed"
                    );
                    let has_next = attempt + 1 < max_attempts;
                    if let Some(penalty) = self.policy.penalty(&err, attempt).filter(|_| has_next) {
                        tracing::info!(wait = ?penalty, "backing off before retry");
                        pause(&self.cancel, penalty).await?;
                    }
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        let last = last_error
            .unwrap_or_else(|| BalanceError::Config("retry loop made no attempts".into()));
        tracing::error!(
            wallet = %task.wallet(),
            path = endpoint.path,
            attempts = max_attempts,
            "max retries reached, skipping request"
        );
        Err(BalanceError::ExhaustedRetries {
            attempts: max_attempts,
            last: Box::new(last),
        })
    }

    /// Tear down the signer
    pub async fn shutdown(&mut self) -> Result<()> {
        self.signer.close().await
    }

    async fn attempt(&mut self, task: &FetchTask, endpoint: &Endpoint) -> Result<TaskOutput> {
        let payload = endpoint.payload();
        let request = SignRequest {
            payload: &payload,
            method: &endpoint.method,
            path: endpoint.path,
        };
        let signature = with_cancel(&self.cancel, self.signer.sign(&request)).await??;
        self.session.apply_signature(&signature)?;

        let builder = self.session.request(endpoint)?;
        let response = with_cancel(&self.cancel, builder.send()).await??;
        let status = response.status();
        let body = with_cancel(&self.cancel, response.text()).await??;

        let data = classify(status, &body)?;
        decode(task, data)
    }
}

#[async_trait]
impl<S: Signer> TaskRunner for RequestExecutor<S> {
    async fn run(&mut self, task: &FetchTask) -> Result<Executed> {
        self.execute(task).await
    }

    async fn close(&mut self) {
        if let Err(err) = self.shutdown().await {
            tracing::warn!(error = %err, "signer shutdown failed");
        }
    }
}

async fn with_cancel<F: Future>(token: &CancellationToken, future: F) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(BalanceError::Cancelled),
        output = future => Ok(output),
    }
}

async fn pause(token: &CancellationToken, duration: Duration) -> Result<()> {
    if duration.is_zero() {
        return Ok(());
    }
    with_cancel(token, tokio::time::sleep(duration)).await
}

/// Map a raw response to its `data` payload or a retryable error
fn classify(status: StatusCode, body: &str) -> Result<Value> {
    if status != StatusCode::OK {
        return Err(BalanceError::from_status(status, body));
    }

    let mut value: Value = serde_json::from_str(body)
        .map_err(|err| BalanceError::MalformedResponse(format!("body is not JSON: {err}")))?;

    match value.get_mut("data").map(Value::take) {
        None | Some(Value::Null) => Err(BalanceError::MalformedResponse(
            "response does not include data".into(),
        )),
        Some(data) => Ok(data),
    }
}

fn decode(task: &FetchTask, data: Value) -> Result<TaskOutput> {
    match task {
        FetchTask::ChainBalance {
            wallet,
            chain,
            ticker,
            min_usd,
        } => {
            let tokens: Vec<ApiToken> = parse(data, "token list")?;
            Ok(TaskOutput::ChainBalance {
                chain: chain.clone(),
                wallet: wallet.clone(),
                coins: select_coins(tokens, ticker.as_deref(), *min_usd),
            })
        }
        FetchTask::PoolBalance { wallet } => {
            let projects: Vec<ApiProject> = parse(data, "project list")?;
            Ok(TaskOutput::PoolBalance {
                wallet: wallet.clone(),
                pools: group_pools(projects),
            })
        }
        FetchTask::WalletTotal { wallet } => {
            let curve: NetCurve = parse(data, "net curve")?;
            let total_usd = curve.latest_usd().ok_or_else(|| {
                BalanceError::MalformedResponse("net curve has no usable points".into())
            })?;
            Ok(TaskOutput::WalletTotal {
                wallet: wallet.clone(),
                total_usd,
            })
        }
        FetchTask::UsedChains { wallet } => {
            let used: UsedChains = parse(data, "used chains")?;
            Ok(TaskOutput::UsedChains {
                wallet: wallet.clone(),
                chains: used.chains.iter().map(|entry| entry.id().to_string()).collect(),
            })
        }
    }
}

fn parse<T: DeserializeOwned>(data: Value, what: &str) -> Result<T> {
    serde_json::from_value(data)
        .map_err(|err| BalanceError::MalformedResponse(format!("cannot decode {what}: {err}")))
}
