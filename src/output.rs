//! User-facing console output.
//!
//! Renderers return `String` and leave printing to the caller. Diagnostics go
//! through `tracing` instead.

use crate::install::InstallOutcome;
use crate::mcp::INTERNAL_GATEWAY_URL;
use crate::sandbox::OutputSink;
use console::style;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

pub fn banner() -> String {
    [
        "╔══════════════════════════════════════════════════════════════╗",
        "║  E2B Cloud Sandbox + Docker MCP Gateway + GitHub Copilot    ║",
        "╚══════════════════════════════════════════════════════════════╝",
        "",
    ]
    .join("\n")
}

pub fn usage() -> String {
    [
        "Usage:",
        "  mcp-sandbox create    Create new E2B sandbox with MCP gateway",
        "  mcp-sandbox list      List active sandboxes",
        "",
        "Run `mcp-sandbox --help` for all options.",
        "",
    ]
    .join("\n")
}

pub fn error_lines(message: &str, hints: &[String]) -> String {
    let mut out = format!("{} {}", style("❌ Error:").red().bold(), message);
    for hint in hints {
        out.push_str(&format!("\n   {hint}"));
    }
    out
}

pub fn warning_lines(lines: &[&str]) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            out.push_str(&format!("{} {line}", style("⚠️  Warning:").yellow()));
        } else {
            out.push_str(&format!("\n   {line}"));
        }
    }
    out
}

pub fn server_configured(name: &str) -> String {
    format!("{} {name} MCP server configured", style("✓").green())
}

pub fn gateway_info(url: &str, fingerprint: &str) -> String {
    [
        "🔗 MCP Gateway Information:".to_string(),
        format!("   URL: {}", style(url).cyan()),
        format!("   Token fingerprint: {fingerprint} (full token hidden)"),
        format!("   Internal URL: {INTERNAL_GATEWAY_URL}"),
        String::new(),
    ]
    .join("\n")
}

pub fn install_outcome(tool: &str, outcome: InstallOutcome) -> String {
    match outcome {
        InstallOutcome::Verified => format!("✅ {tool} installed successfully\n"),
        InstallOutcome::InstalledUnverified => format!(
            "⚠️  {tool} reported a successful install but the binary was not found on PATH. \
             You may need to install it manually.\n"
        ),
        InstallOutcome::Failed => format!(
            "⚠️  {tool} installation failed. You may need to install it manually.\n"
        ),
    }
}

/// Facts shown in the final summary.
#[derive(Debug, Clone)]
pub struct SandboxSummary {
    pub sandbox_id: String,
    pub gateway_url: Option<String>,
    pub template: String,
    pub timeout_ms: u64,
}

pub fn ready_summary(summary: &SandboxSummary) -> String {
    let gateway = summary
        .gateway_url
        .as_deref()
        .unwrap_or("not started (no MCP servers configured)");
    let mcp_url = summary.gateway_url.as_deref().unwrap_or("<mcpUrl>");

    let lines = [
        RULE.to_string(),
        format!("🎉 {}", style("E2B Cloud Sandbox is Ready!").bold()),
        String::new(),
        "📝 Sandbox Details:".to_string(),
        format!("   • Sandbox ID: {}", summary.sandbox_id),
        format!("   • MCP Gateway: {gateway}"),
        format!("   • Template: {}", summary.template),
        format!("   • Timeout: {}ms", summary.timeout_ms),
        String::new(),
        "🛠️  How to Use:".to_string(),
        "   1. Connect to sandbox via SSH or API".to_string(),
        "   2. Use Copilot CLI: copilot /login".to_string(),
        "   3. Access MCP tools via gateway URL".to_string(),
        "   4. Run commands through the E2B API or SDK".to_string(),
        String::new(),
        "💡 Example Commands:".to_string(),
        "   # List available MCP tools".to_string(),
        format!("   curl -H \"Authorization: Bearer <token>\" {mcp_url}/tools"),
        String::new(),
        "   # Use Copilot CLI".to_string(),
        "   copilot suggest -p \"Create a React component\"".to_string(),
        String::new(),
        "   # Run code in sandbox".to_string(),
        "   node your-script.js".to_string(),
        RULE.to_string(),
        String::new(),
    ];
    lines.join("\n")
}

pub fn detached(sandbox_id: &str, timeout_ms: u64) -> String {
    format!(
        "🔓 Leaving sandbox {sandbox_id} running. The provider stops it after {timeout_ms}ms.\n"
    )
}

pub fn list_unsupported() -> String {
    format!(
        "ℹ️  The E2B API does not support listing sandboxes from this tool.\n   \
         Please visit your dashboard to view active sandboxes: {}\n",
        crate::config::DASHBOARD_URL
    )
}

/// Forwards command output to this process's stdout/stderr as it arrives.
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn stdout_line(&self, line: &str) {
        println!("{line}");
    }

    fn stderr_line(&self, line: &str) {
        eprintln!("{line}");
    }
}
