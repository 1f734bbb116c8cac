use mcp_sandbox::commands::create::{provision, CreateArgs};
use mcp_sandbox::install::{install_and_verify, InstallOptions, InstallOutcome, ToolSpec};
use mcp_sandbox::mcp::{McpGateway, McpServers};
use mcp_sandbox::sandbox::e2b::E2bSandboxClient;
use mcp_sandbox::sandbox::lease::LeaseEnd;
use mcp_sandbox::sandbox::{CreateSandboxRequest, OutputSink, RunOptions, SandboxClient};
use mcp_sandbox::Config;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SANDBOX_ID: &str = "sb-1";
const COMMANDS_PATH: &str = "/v0/sandboxes/sb-1/commands";

fn config(server: &MockServer) -> Config {
    Config {
        e2b_api_key: Some("test-key".into()),
        api_url: server.uri(),
        github_token: Some("ghp_test".into()),
        ..Config::default()
    }
}

/// Client with a sandbox provisioned through the mock create endpoint.
async fn live_client(server: &MockServer) -> E2bSandboxClient {
    mount_create(server).await;
    let client = E2bSandboxClient::from_config(&config(server)).unwrap();
    client
        .create_sandbox(&CreateSandboxRequest::new("base", 300_000))
        .await
        .unwrap();
    client
}

/// NDJSON command stream: stdout lines, then an exit event.
fn stream(stdout: &[&str], stderr: &[&str], exit_code: i64) -> ResponseTemplate {
    let mut body = String::new();
    for line in stdout {
        body.push_str(&json!({"type": "stdout", "line": line}).to_string());
        body.push('\n');
    }
    for line in stderr {
        body.push_str(&json!({"type": "stderr", "line": line}).to_string());
        body.push('\n');
    }
    body.push_str(&json!({"type": "exit", "exitCode": exit_code}).to_string());
    body.push('\n');
    ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson")
}

#[derive(Default)]
struct Recorder {
    lines: Mutex<Vec<String>>,
}

impl OutputSink for Recorder {
    fn stdout_line(&self, line: &str) {
        self.lines.lock().unwrap().push(format!("out:{line}"));
    }

    fn stderr_line(&self, line: &str) {
        self.lines.lock().unwrap().push(format!("err:{line}"));
    }
}

async fn mount_create(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v0/sandboxes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sandboxID": SANDBOX_ID})))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn create_sandbox_sends_template_and_timeout_seconds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v0/sandboxes"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"templateID": "base", "timeout": 300})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"sandboxID": SANDBOX_ID, "domain": "e2b.test"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = E2bSandboxClient::from_config(&config(&server)).unwrap();
    let id = client
        .create_sandbox(&CreateSandboxRequest::new("base", 300_000))
        .await
        .unwrap();

    assert_eq!(id, SANDBOX_ID);
    assert_eq!(client.current_id().as_deref(), Some(SANDBOX_ID));
    assert_eq!(client.host(50005).unwrap(), "50005-sb-1.e2b.test");
}

#[tokio::test]
async fn create_sandbox_surfaces_api_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v0/sandboxes"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let client = E2bSandboxClient::from_config(&config(&server)).unwrap();
    let err = client
        .create_sandbox(&CreateSandboxRequest::new("base", 300_000))
        .await
        .unwrap_err()
        .to_string();

    assert!(err.contains("401"), "{err}");
    assert!(err.contains("invalid api key"), "{err}");
    assert!(client.current_id().is_none());
}

#[tokio::test]
async fn streamed_command_forwards_lines_in_order() {
    let server = MockServer::start().await;
    let body = [
        json!({"type": "stdout", "line": "one"}),
        json!({"type": "stderr", "line": "warn"}),
        json!({"type": "keepalive"}),
        json!({"type": "stdout", "line": "two"}),
        json!({"type": "exit", "exitCode": 0}),
    ]
    .iter()
    .map(Value::to_string)
    .collect::<Vec<_>>()
    .join("\n");

    Mock::given(method("POST"))
        .and(path(COMMANDS_PATH))
        .and(body_partial_json(json!({"cmd": "echo hi", "stream": true, "timeout": 5})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .expect(1)
        .mount(&server)
        .await;

    let recorder = Arc::new(Recorder::default());
    let sink: Arc<dyn OutputSink> = recorder.clone();
    let output = live_client(&server)
        .await
        .run_command("echo hi", &RunOptions::with_timeout(5_000).sink(Some(sink)))
        .await
        .unwrap();

    assert_eq!(output.exit_code, 0);
    assert_eq!(output.stdout, "one\ntwo\n");
    assert_eq!(output.stderr, "warn\n");
    assert_eq!(
        *recorder.lines.lock().unwrap(),
        vec!["out:one", "err:warn", "out:two"]
    );
}

#[tokio::test]
async fn json_command_response_is_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMMANDS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"stdout": "a\nb", "stderr": "", "exitCode": 3})),
        )
        .mount(&server)
        .await;

    let recorder = Arc::new(Recorder::default());
    let sink: Arc<dyn OutputSink> = recorder.clone();
    let output = live_client(&server)
        .await
        .run_command("false", &RunOptions::default().sink(Some(sink)))
        .await
        .unwrap();

    assert_eq!(output.exit_code, 3);
    assert_eq!(output.stdout, "a\nb\n");
    assert_eq!(*recorder.lines.lock().unwrap(), vec!["out:a", "out:b"]);
}

#[tokio::test]
async fn stream_without_exit_event_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMMANDS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            json!({"type": "stdout", "line": "partial"}).to_string(),
            "application/x-ndjson",
        ))
        .mount(&server)
        .await;

    let err = live_client(&server)
        .await
        .run_command("sleep 1", &RunOptions::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("without an exit code"));
}

#[tokio::test]
async fn command_http_error_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMMANDS_PATH))
        .respond_with(ResponseTemplate::new(502).set_body_string("sandbox unreachable"))
        .mount(&server)
        .await;

    let err = live_client(&server)
        .await
        .run_command("true", &RunOptions::default())
        .await
        .unwrap_err()
        .to_string();
    assert!(err.contains("502"), "{err}");
}

#[tokio::test]
async fn slow_command_hits_client_side_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMMANDS_PATH))
        .respond_with(stream(&[], &[], 0).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    // 0ms command timeout leaves only the fixed grace period
    let started = std::time::Instant::now();
    let err = live_client(&server)
        .await
        .run_command("sleep 60", &RunOptions::with_timeout(0))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("timed out"));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn kill_treats_not_found_as_gone() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v0/sandboxes/sb-1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = live_client(&server).await;
    let msg = client.kill_sandbox().await.unwrap();
    assert!(msg.contains(SANDBOX_ID));
    assert!(client.current_id().is_none());
}

#[tokio::test]
async fn kill_failure_keeps_sandbox_id() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v0/sandboxes/sb-1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let client = live_client(&server).await;
    assert!(client.kill_sandbox().await.is_err());
    assert_eq!(client.current_id().as_deref(), Some(SANDBOX_ID));
}

#[tokio::test]
async fn install_retries_once_then_verifies_through_api() {
    let server = MockServer::start().await;
    let tool = ToolSpec::copilot_cli();

    Mock::given(method("POST"))
        .and(path(COMMANDS_PATH))
        .and(body_partial_json(json!({"cmd": tool.install_command})))
        .respond_with(stream(&[], &["npm ERR! network timeout"], 1))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMMANDS_PATH))
        .and(body_partial_json(json!({"cmd": tool.install_command})))
        .respond_with(stream(&["added 1 package"], &[], 0))
        .with_priority(2)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMMANDS_PATH))
        .and(body_partial_json(json!({"cmd": tool.verify_command, "timeout": 10})))
        .respond_with(stream(&["/usr/local/bin/copilot"], &[], 0))
        .expect(1)
        .mount(&server)
        .await;

    let recorder = Arc::new(Recorder::default());
    let sink: Arc<dyn OutputSink> = recorder.clone();
    let options = InstallOptions {
        retry_delay: Duration::from_millis(10),
        ..InstallOptions::default()
    };

    let client = live_client(&server).await;
    let report = install_and_verify(
        &client,
        tool.install_command,
        tool.verify_command,
        &options,
        Some(sink),
    )
    .await
    .unwrap();

    assert_eq!(report.outcome, InstallOutcome::Verified);
    assert!(report.retried());
    assert_eq!(report.install.stderr, "npm ERR! network timeout\n");
    assert_eq!(
        *recorder.lines.lock().unwrap(),
        vec!["err:npm ERR! network timeout", "out:added 1 package"]
    );
}

#[tokio::test]
async fn install_reported_ok_but_missing_binary_is_unverified() {
    let server = MockServer::start().await;
    let tool = ToolSpec::copilot_cli();

    Mock::given(method("POST"))
        .and(path(COMMANDS_PATH))
        .and(body_partial_json(json!({"cmd": tool.install_command})))
        .respond_with(stream(&["added 1 package"], &[], 0))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMMANDS_PATH))
        .and(body_partial_json(json!({"cmd": tool.verify_command})))
        .respond_with(stream(&["NOT_FOUND"], &[], 0))
        .expect(1)
        .mount(&server)
        .await;

    let client = live_client(&server).await;
    let report = tool
        .install(&client, &InstallOptions::default(), None)
        .await
        .unwrap();
    assert_eq!(report.outcome, InstallOutcome::InstalledUnverified);
    assert!(!report.retried());
}

#[tokio::test]
async fn gateway_starts_as_root_with_access_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMMANDS_PATH))
        .and(body_partial_json(json!({"user": "root"})))
        .respond_with(stream(&[], &[], 0))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config(&server);
    let client = live_client(&server).await;
    let gateway = McpGateway::start(&client, &McpServers::from_config(&cfg))
        .await
        .unwrap()
        .expect("github token configures a server");

    assert_eq!(gateway.url(), "https://50005-sb-1.e2b.app/mcp");
    assert_eq!(gateway.fingerprint().len(), 8);

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["envs"]["GATEWAY_ACCESS_TOKEN"], gateway.token());
    let cmd = body["cmd"].as_str().unwrap();
    assert!(cmd.starts_with("mcp-gateway --config '"));
    assert!(cmd.contains(r#""github":{"token":"ghp_test"}"#));
}

#[tokio::test]
async fn gateway_failure_reports_stderr() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMMANDS_PATH))
        .respond_with(stream(&[], &["mcp-gateway: command not found"], 127))
        .mount(&server)
        .await;

    let cfg = config(&server);
    let client = live_client(&server).await;
    let err = McpGateway::start(&client, &McpServers::from_config(&cfg))
        .await
        .err()
        .expect("gateway start should fail");
    let err = err.to_string();
    assert!(err.contains("exit 127"), "{err}");
    assert!(err.contains("command not found"), "{err}");
}

#[tokio::test]
async fn provision_detached_runs_full_setup_without_killing() {
    let server = MockServer::start().await;
    let tool = ToolSpec::copilot_cli();
    mount_create(&server).await;

    Mock::given(method("POST"))
        .and(path(COMMANDS_PATH))
        .and(body_partial_json(json!({"user": "root"})))
        .respond_with(stream(&[], &[], 0))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMMANDS_PATH))
        .and(body_partial_json(json!({"cmd": tool.install_command})))
        .respond_with(stream(&["added 1 package"], &[], 0))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMMANDS_PATH))
        .and(body_partial_json(json!({"cmd": tool.verify_command})))
        .respond_with(stream(&["/usr/local/bin/copilot"], &[], 0))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMMANDS_PATH))
        .and(body_partial_json(json!({"cmd": tool.version_command})))
        .respond_with(stream(&["0.0.339"], &[], 0))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let cfg = config(&server);
    let client: Arc<dyn SandboxClient> = Arc::new(E2bSandboxClient::from_config(&cfg).unwrap());
    let args = CreateArgs {
        detach: true,
        ..CreateArgs::default()
    };

    let end = provision(
        &cfg,
        &args,
        client,
        InstallOptions::default(),
        std::future::pending(),
    )
    .await
    .unwrap();

    assert_eq!(
        end,
        LeaseEnd::Detached {
            sandbox_id: SANDBOX_ID.into()
        }
    );
}

#[tokio::test]
async fn provision_kills_sandbox_when_setup_fails() {
    let server = MockServer::start().await;
    mount_create(&server).await;

    Mock::given(method("POST"))
        .and(path(COMMANDS_PATH))
        .respond_with(stream(&[], &["gateway crashed"], 1))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v0/sandboxes/sb-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config(&server);
    let client: Arc<dyn SandboxClient> = Arc::new(E2bSandboxClient::from_config(&cfg).unwrap());

    let err = provision(
        &cfg,
        &CreateArgs::default(),
        client,
        InstallOptions::default(),
        std::future::pending(),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("gateway crashed"));
}

#[tokio::test]
async fn provision_rejects_zero_timeout_before_calling_api() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let cfg = config(&server);
    let client: Arc<dyn SandboxClient> = Arc::new(E2bSandboxClient::from_config(&cfg).unwrap());
    let args = CreateArgs {
        timeout_ms: Some(0),
        ..CreateArgs::default()
    };

    let err = provision(
        &cfg,
        &args,
        client,
        InstallOptions::default(),
        std::future::pending(),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("invalid sandbox timeout"), "{err}");
}

#[tokio::test]
async fn shutdown_while_creating_kills_the_new_sandbox() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v0/sandboxes"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"sandboxID": SANDBOX_ID}))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMMANDS_PATH))
        .respond_with(stream(&[], &[], 0))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v0/sandboxes/sb-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config(&server);
    let client: Arc<dyn SandboxClient> = Arc::new(E2bSandboxClient::from_config(&cfg).unwrap());

    let end = provision(
        &cfg,
        &CreateArgs::default(),
        client,
        InstallOptions::default(),
        std::future::ready(()),
    )
    .await
    .unwrap();

    assert_eq!(
        end,
        LeaseEnd::Closed {
            sandbox_id: SANDBOX_ID.into()
        }
    );
}
