//! Scoped ownership of a provisioned sandbox.
//!
//! A [`SandboxLease`] is created by provisioning a sandbox and is consumed by
//! [`SandboxLease::run`], which terminates the sandbox on every way out of
//! the session: normal completion, an error, or a shutdown request racing the
//! session body. [`SandboxLease::scoped`] also covers the create call itself,
//! so a shutdown that arrives while the provider is still provisioning tears
//! down whatever it hands back. Leaving the sandbox running has to be asked
//! for explicitly with [`SessionEnd::Detach`].

use super::{CreateSandboxRequest, SandboxClient};
use anyhow::Context as _;
use std::future::Future;
use std::sync::Arc;

/// What the session body wants done with the sandbox once it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Terminate immediately.
    Close,
    /// Keep the sandbox until the shutdown future resolves, then terminate.
    Hold,
    /// Leave the sandbox running; the provider timeout reclaims it.
    Detach,
}

/// How the lease ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseEnd {
    Closed { sandbox_id: String },
    Detached { sandbox_id: String },
}

/// Cheap handle passed to the session body.
#[derive(Clone)]
pub struct SandboxHandle {
    client: Arc<dyn SandboxClient>,
    sandbox_id: String,
}

impl SandboxHandle {
    pub fn client(&self) -> &Arc<dyn SandboxClient> {
        &self.client
    }

    pub fn id(&self) -> &str {
        &self.sandbox_id
    }
}

pub struct SandboxLease {
    client: Arc<dyn SandboxClient>,
    sandbox_id: String,
    settled: bool,
}

impl SandboxLease {
    /// Provision a sandbox and take ownership of it.
    ///
    /// Fails if `client` already drives a live sandbox, which another lease
    /// owns.
    pub async fn acquire(
        client: Arc<dyn SandboxClient>,
        request: &CreateSandboxRequest,
    ) -> anyhow::Result<Self> {
        if let Some(live) = client.current_id() {
            anyhow::bail!("sandbox {live} is still live on this client; release it first");
        }
        let sandbox_id = client
            .create_sandbox(request)
            .await
            .context("Failed to create sandbox")?;
        Ok(Self {
            client,
            sandbox_id,
            settled: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.sandbox_id
    }

    pub fn handle(&self) -> SandboxHandle {
        SandboxHandle {
            client: Arc::clone(&self.client),
            sandbox_id: self.sandbox_id.clone(),
        }
    }

    /// Terminate the sandbox now.
    pub async fn release(mut self) -> anyhow::Result<String> {
        self.settled = true;
        self.client.kill_sandbox().await
    }

    /// Give up ownership without terminating the sandbox.
    pub fn detach(mut self) -> String {
        self.settled = true;
        std::mem::take(&mut self.sandbox_id)
    }

    /// Provision a sandbox, run `body` against it and settle the lease.
    ///
    /// `shutdown` is polled from the start, so it is already armed while the
    /// create call is in flight. If it resolves first the create call is still
    /// awaited and the sandbox it returns is terminated straight away.
    pub async fn scoped<S, F, Fut>(
        client: Arc<dyn SandboxClient>,
        request: &CreateSandboxRequest,
        shutdown: S,
        body: F,
    ) -> anyhow::Result<LeaseEnd>
    where
        S: Future<Output = ()>,
        F: FnOnce(SandboxHandle) -> Fut,
        Fut: Future<Output = anyhow::Result<SessionEnd>>,
    {
        tokio::pin!(shutdown);
        let create = Self::acquire(client, request);
        tokio::pin!(create);

        let lease = tokio::select! {
            biased;
            () = shutdown.as_mut() => {
                let lease = create.await?;
                let sandbox_id = lease.id().to_string();
                tracing::info!(%sandbox_id, "shutdown requested while the sandbox was being created");
                lease.release().await?;
                return Ok(LeaseEnd::Closed { sandbox_id });
            }
            lease = &mut create => lease?,
        };

        lease.run(shutdown, body).await
    }

    /// Run `body` against the sandbox and settle the lease afterwards.
    ///
    /// If `shutdown` resolves first the body is dropped and the sandbox is
    /// terminated. Errors from the body are returned after the sandbox has
    /// been terminated; a failure to terminate in that case is only logged so
    /// the original error is not masked.
    pub async fn run<S, F, Fut>(self, shutdown: S, body: F) -> anyhow::Result<LeaseEnd>
    where
        S: Future<Output = ()>,
        F: FnOnce(SandboxHandle) -> Fut,
        Fut: Future<Output = anyhow::Result<SessionEnd>>,
    {
        tokio::pin!(shutdown);
        let sandbox_id = self.sandbox_id.clone();

        let end = tokio::select! {
            biased;
            () = &mut shutdown => {
                tracing::info!(%sandbox_id, "shutdown requested while session was running");
                Ok(SessionEnd::Close)
            }
            result = body(self.handle()) => result,
        };

        match end {
            Ok(SessionEnd::Detach) => Ok(LeaseEnd::Detached {
                sandbox_id: self.detach(),
            }),
            Ok(SessionEnd::Close) => {
                self.release().await?;
                Ok(LeaseEnd::Closed { sandbox_id })
            }
            Ok(SessionEnd::Hold) => {
                shutdown.await;
                self.release().await?;
                Ok(LeaseEnd::Closed { sandbox_id })
            }
            Err(e) => {
                if let Err(kill_err) = self.release().await {
                    tracing::warn!(%sandbox_id, "failed to terminate sandbox after error: {kill_err}");
                }
                Err(e)
            }
        }
    }
}

impl Drop for SandboxLease {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!(
                sandbox_id = %self.sandbox_id,
                "sandbox lease dropped without release; it stays up until the provider timeout"
            );
        }
    }
}
