//! `create` — provision a sandbox, start the MCP gateway, install the Copilot
//! CLI, and hold the sandbox until Ctrl+C.

use crate::config::{Config, ConfigError};
use crate::install::{InstallOptions, ToolSpec, DEFAULT_VERIFY_TIMEOUT_MS};
use crate::mcp::{McpGateway, McpServers};
use crate::output::{self, ConsoleSink, SandboxSummary};
use crate::sandbox::e2b::E2bSandboxClient;
use crate::sandbox::lease::{LeaseEnd, SandboxHandle, SandboxLease, SessionEnd};
use crate::sandbox::{CreateSandboxRequest, OutputSink, SandboxClient};
use std::future::Future;
use std::sync::Arc;

#[derive(Debug, Clone, Default, clap::Args)]
pub struct CreateArgs {
    /// Sandbox template (overrides E2B_SANDBOX_TEMPLATE)
    #[arg(long)]
    pub template: Option<String>,

    /// Sandbox lifetime in milliseconds (overrides E2B_SANDBOX_TIMEOUT)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_ms: Option<u64>,

    /// Exit after setup and leave the sandbox running until its timeout
    #[arg(long)]
    pub detach: bool,
}

/// Everything the session body needs, owned so it can outlive the caller's borrows.
struct SessionPlan {
    servers: McpServers,
    tool: ToolSpec,
    install: InstallOptions,
    template: String,
    timeout_ms: u64,
    detach: bool,
}

pub async fn run(config: &Config, args: &CreateArgs) -> anyhow::Result<()> {
    println!("🚀 Creating E2B Cloud Sandbox with Docker MCP Gateway...\n");
    super::ensure_valid(config)?;

    let client: Arc<dyn SandboxClient> = Arc::new(E2bSandboxClient::from_config(config)?);
    let timeout_ms = args.timeout_ms.unwrap_or(config.timeout_ms);

    match provision(config, args, client, InstallOptions::default(), shutdown_signal()).await? {
        LeaseEnd::Closed { .. } => println!("✅ Sandbox closed successfully"),
        LeaseEnd::Detached { sandbox_id } => println!("{}", output::detached(&sandbox_id, timeout_ms)),
    }
    Ok(())
}

/// Resolves on Ctrl+C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
    println!("\n\n🛑 Closing sandbox...");
}

/// Provision a sandbox with `client` and run the setup session inside a lease.
pub async fn provision<S>(
    config: &Config,
    args: &CreateArgs,
    client: Arc<dyn SandboxClient>,
    install: InstallOptions,
    shutdown: S,
) -> anyhow::Result<LeaseEnd>
where
    S: Future<Output = ()>,
{
    let plan = SessionPlan {
        servers: McpServers::from_config(config),
        tool: ToolSpec::copilot_cli(),
        install,
        template: args.template.clone().unwrap_or_else(|| config.template.clone()),
        timeout_ms: args.timeout_ms.unwrap_or(config.timeout_ms),
        detach: args.detach,
    };

    // clap range-checks `--timeout-ms`; direct callers are checked here
    if plan.timeout_ms == 0 {
        return Err(ConfigError::InvalidTimeout("0".to_string()).into());
    }

    for name in plan.servers.configured_names() {
        println!("{}", output::server_configured(name));
    }

    println!("\n📦 Initializing E2B sandbox...");
    let request = CreateSandboxRequest::new(&plan.template, plan.timeout_ms);
    SandboxLease::scoped(client, &request, shutdown, |handle| session(handle, plan)).await
}

async fn session(handle: SandboxHandle, plan: SessionPlan) -> anyhow::Result<SessionEnd> {
    println!("✅ Sandbox created: {}\n", handle.id());
    let client = handle.client();

    let gateway = McpGateway::start(client.as_ref(), &plan.servers).await?;
    if let Some(gateway) = &gateway {
        println!("{}", output::gateway_info(gateway.url(), &gateway.fingerprint()));
    }

    println!("📦 Installing {}...", plan.tool.name);
    let sink: Arc<dyn OutputSink> = Arc::new(ConsoleSink);
    let report = plan
        .tool
        .install(client.as_ref(), &plan.install, Some(sink))
        .await?;
    if report.retried() {
        tracing::debug!(first_exit = report.install.exit_code, "install needed a retry");
    }
    println!("{}", output::install_outcome(plan.tool.name, report.outcome));

    println!("🔍 Verifying {}...", plan.tool.name);
    if let Some(version) = plan
        .tool
        .version(client.as_ref(), DEFAULT_VERIFY_TIMEOUT_MS)
        .await?
    {
        println!("✓ {} version: {version}\n", plan.tool.name);
    }

    let summary = SandboxSummary {
        sandbox_id: handle.id().to_string(),
        gateway_url: gateway.as_ref().map(|g| g.url().to_string()),
        template: plan.template,
        timeout_ms: plan.timeout_ms,
    };
    println!("{}", output::ready_summary(&summary));

    if plan.detach {
        Ok(SessionEnd::Detach)
    } else {
        println!("🔄 Sandbox is running. Press Ctrl+C to close and cleanup...\n");
        Ok(SessionEnd::Hold)
    }
}
