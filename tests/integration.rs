//! End-to-end integration tests for the MCP bridge
//!
//! These tests drive the real binaries: the CLI auto-starts the daemon, the
//! daemon spawns the mock MCP server, and assertions run against CLI output
//! and the raw wire protocol. Each test gets its own port and isolated
//! config/data directories so tests can run in parallel.

use std::env;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::Duration;

/// Test context with isolated directories and a dedicated daemon port
struct TestContext {
    /// Temporary directory for this test
    temp_dir: PathBuf,
    /// Path to the SKILL.md fixture
    skill_path: PathBuf,
    /// Daemon port for this test
    port: u16,
}

impl TestContext {
    fn new(test_name: &str, port: u16) -> Self {
        let temp_dir = env::temp_dir().join("mcp-bridge-tests").join(test_name);

        // Clean up any previous test artifacts
        let _ = fs::remove_dir_all(&temp_dir);
        fs::create_dir_all(&temp_dir).expect("Failed to create temp dir");

        let config_home = temp_dir.join("config");
        let data_home = temp_dir.join("data");
        fs::create_dir_all(config_home.join("mcp-bridge")).expect("Failed to create config dir");
        fs::create_dir_all(&data_home).expect("Failed to create data dir");

        // Settings file with the per-test port
        fs::write(
            config_home.join("mcp-bridge").join("config.toml"),
            format!(
                r#"
[daemon]
port = {port}

[timeouts]
connect_secs = 10
request_secs = 30
spawn_wait_secs = 10
"#
            ),
        )
        .expect("Failed to write config.toml");

        // Skill fixture pointing at the mock MCP server binary
        let mock_server = env!("CARGO_BIN_EXE_mock-mcp-server");
        let skill_path = temp_dir.join("SKILL.md");
        fs::write(
            &skill_path,
            format!(
                r#"---
name: integration-skill
description: Integration test fixture
mcp-servers:
  - name: echo
    command: "{mock_server}"
---

# Integration fixture
"#
            ),
        )
        .expect("Failed to write SKILL.md");

        Self {
            temp_dir,
            skill_path,
            port,
        }
    }

    /// Run a CLI command with this context's isolated environment
    fn run(&self, args: &[&str]) -> Output {
        let mut all_args: Vec<&str> = args.to_vec();
        let skill = self.skill_path.to_str().unwrap();
        all_args.push("--config");
        all_args.push(skill);

        Command::new(env!("CARGO_BIN_EXE_mcp-bridge"))
            .args(&all_args)
            .env("XDG_CONFIG_HOME", self.temp_dir.join("config"))
            .env("XDG_DATA_HOME", self.temp_dir.join("data"))
            .env("HOME", &self.temp_dir)
            .current_dir(&self.temp_dir)
            .output()
            .expect("Failed to run mcp-bridge")
    }

    fn stdout(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "command {:?} failed\nstdout: {}\nstderr: {}",
            args,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).to_string()
    }

    /// Open a raw wire connection to the daemon
    fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(("127.0.0.1", self.port)).expect("Failed to connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();
        stream
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        // Best-effort daemon shutdown so no process outlives the test
        let _ = self.run(&["stop"]);
        let _ = fs::remove_dir_all(&self.temp_dir);
    }
}

#[test]
fn daemon_lifecycle_with_echo_server() {
    let ctx = TestContext::new("daemon_lifecycle", 57871);

    // No daemon yet
    let status = ctx.stdout(&["status"]);
    assert!(status.contains("\"running\": false") || status.contains("\"running\":false"));

    // First call auto-starts the daemon and spawns the echo server
    let result = ctx.stdout(&["call", "echo", "echo", r#"{"message":"hi"}"#]);
    assert!(result.contains("Echo: hi"), "unexpected output: {result}");

    // The server is now warm
    let status: serde_json::Value =
        serde_json::from_str(&ctx.stdout(&["status"])).expect("status should be JSON");
    assert_eq!(status["running"], true);
    assert_eq!(status["totalBackends"], 1);
    assert_eq!(status["runningBackends"], 1);
    assert_eq!(status["skillName"], "integration-skill");

    // A second call reuses the connection
    let again = ctx.stdout(&["call", "echo", "echo", r#"{"message":"again"}"#]);
    assert!(again.contains("Echo: again"));

    // list-servers reports the running state without connecting anything
    let servers: serde_json::Value =
        serde_json::from_str(&ctx.stdout(&["list-servers"])).expect("list should be JSON");
    assert_eq!(servers[0]["name"], "echo");
    assert_eq!(servers[0]["running"], true);
    assert!(servers[0]["lastUsedAt"].is_u64());

    // list-tools exposes the mock server's tools
    let tools = ctx.stdout(&["list-tools", "echo"]);
    assert!(tools.contains("\"echo\""));
    assert!(tools.contains("Echoes back"));

    // Shutdown closes everything
    let stopped = ctx.stdout(&["stop"]);
    assert!(stopped.contains("Daemon stopped"));

    // Give the daemon its grace delay to exit, then confirm it is gone
    std::thread::sleep(Duration::from_millis(500));
    let status = ctx.stdout(&["status"]);
    assert!(status.contains("\"running\": false") || status.contains("\"running\":false"));
}

#[test]
fn unknown_server_and_tool_errors() {
    let ctx = TestContext::new("unknown_server", 57872);

    ctx.stdout(&["start"]);

    let output = ctx.run(&["call", "nope", "echo", r#"{"message":"hi"}"#]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not configured"), "stderr: {stderr}");

    // A bad tool name on a real server surfaces the server's error
    let output = ctx.run(&["call", "echo", "no-such-tool", "{}"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unknown tool"), "stderr: {stderr}");
}

#[test]
fn pipelined_requests_correlate_by_id() {
    let ctx = TestContext::new("pipelining", 57873);

    ctx.stdout(&["start"]);

    let mut stream = ctx.connect();
    let skill = ctx.skill_path.to_str().unwrap();

    // A slow tool call followed by a fast status request; the status
    // response should come back first, each tagged with its own id.
    let slow = format!(
        r#"{{"id":"slow","kind":"call","backendName":"echo","toolName":"sleep","arguments":{{"millis":300}},"configPath":"{skill}"}}"#
    );
    let fast = r#"{"id":"fast","kind":"status"}"#;
    stream
        .write_all(format!("{slow}\n{fast}\n").as_bytes())
        .unwrap();

    let mut reader = BufReader::new(stream);
    let mut first = String::new();
    let mut second = String::new();
    reader.read_line(&mut first).unwrap();
    reader.read_line(&mut second).unwrap();

    let first: serde_json::Value = serde_json::from_str(&first).unwrap();
    let second: serde_json::Value = serde_json::from_str(&second).unwrap();

    assert_eq!(first["id"], "fast");
    assert_eq!(first["success"], true);
    assert_eq!(second["id"], "slow");
    assert_eq!(second["success"], true);
    assert!(second["result"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("Slept 300 ms"));
}

#[test]
fn malformed_request_gets_placeholder_id() {
    let ctx = TestContext::new("malformed", 57874);

    ctx.stdout(&["start"]);

    let mut stream = ctx.connect();
    stream.write_all(b"this is not json\n").unwrap();

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();

    let response: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(response["id"], "unknown");
    assert_eq!(response["success"], false);

    // The connection is still usable afterwards
    reader
        .get_mut()
        .write_all(b"{\"id\":\"ok\",\"kind\":\"status\"}\n")
        .unwrap();
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    let response: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(response["id"], "ok");
    assert_eq!(response["success"], true);
}

#[test]
fn validate_reports_skill_summary() {
    let ctx = TestContext::new("validate", 57875);

    let summary: serde_json::Value =
        serde_json::from_str(&ctx.stdout(&["validate"])).expect("validate should print JSON");
    assert_eq!(summary["success"], true);
    assert_eq!(summary["name"], "integration-skill");
    assert_eq!(summary["servers"][0], "echo");
}
