/*
[INPUT]:  Signer program + args, line-delimited sign requests
[OUTPUT]: Signatures read back from the child's stdout
[POS]:    Auth layer - bridge to an external signing process
[UPDATE]: When changing the bridge protocol or child lifecycle
*/

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::auth::signer::{SignRequest, Signature, Signer};
use crate::http::{BalanceError, Result};

const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// How to launch the signing process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubprocessConfig {
    pub program: String,
    pub args: Vec<String>,
    pub response_timeout: Duration,
}

impl SubprocessConfig {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }
}

#[derive(Debug)]
struct Bridge {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// Long-lived child process speaking `payload|METHOD|path` in, JSON out.
///
/// A bridge that timed out or hit EOF is respawned on the next call, since
/// a late reply would otherwise be read as the answer to a later request.
#[derive(Debug)]
pub struct SubprocessSigner {
    config: SubprocessConfig,
    bridge: Option<Bridge>,
}

impl SubprocessSigner {
    /// Spawn the signing process
    pub fn spawn(config: SubprocessConfig) -> Result<Self> {
        let bridge = Self::launch(&config)?;
        Ok(Self {
            config,
            bridge: Some(bridge),
        })
    }

    pub fn config(&self) -> &SubprocessConfig {
        &self.config
    }

    fn launch(config: &SubprocessConfig) -> Result<Bridge> {
        let mut child = Command::new(&config.program)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                BalanceError::SignerUnavailable(format!("spawn {}: {err}", config.program))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BalanceError::SignerUnavailable("signer stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BalanceError::SignerUnavailable("signer stdout not captured".into()))?;

        tracing::debug!(program = %config.program, pid = ?child.id(), "signer process started");

        Ok(Bridge {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }

    async fn roundtrip(bridge: &mut Bridge, line: &str, timeout: Duration) -> Result<String> {
        let exchange = async {
            bridge.stdin.write_all(line.as_bytes()).await?;
            bridge.stdin.write_all(b"\n").await?;
            bridge.stdin.flush().await?;
            bridge.stdout.next_line().await
        };

        match tokio::time::timeout(timeout, exchange).await {
            Err(_) => Err(BalanceError::SignerUnavailable(format!(
                "no response within {timeout:?}"
            ))),
            Ok(Err(err)) => Err(BalanceError::SignerUnavailable(format!("pipe error: {err}"))),
            Ok(Ok(None)) => Err(BalanceError::SignerUnavailable(
                "signer process closed its output".into(),
            )),
            Ok(Ok(Some(reply))) => Ok(reply),
        }
    }
}

#[async_trait]
impl Signer for SubprocessSigner {
    async fn sign(&mut self, request: &SignRequest<'_>) -> Result<Signature> {
        if self.bridge.is_none() {
            tracing::warn!(program = %self.config.program, "restarting signer process");
            self.bridge = Some(Self::launch(&self.config)?);
        }
        let Some(bridge) = self.bridge.as_mut() else {
            return Err(BalanceError::SignerUnavailable("signer process not running".into()));
        };

        let reply = match Self::roundtrip(bridge, &request.to_line(), self.config.response_timeout).await {
            Ok(reply) => reply,
            Err(err) => {
                // The pipe is out of step with our requests; start fresh next time.
                self.bridge = None;
                return Err(err);
            }
        };

        serde_json::from_str::<Signature>(reply.trim()).map_err(|err| {
            BalanceError::SignerUnavailable(format!("malformed signer response: {err}"))
        })
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut bridge) = self.bridge.take() else {
            return Ok(());
        };
        drop(bridge.stdin);
        if let Err(err) = bridge.child.kill().await {
            tracing::debug!(error = %err, "signer process already gone");
        }
        Ok(())
    }
}
