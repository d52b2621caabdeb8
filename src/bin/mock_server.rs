//! Mock MCP server binary for integration testing
//!
//! Implements a minimal MCP server over stdio (newline-delimited JSON-RPC)
//! without pulling in a server framework. Exposes two tools:
//! - `echo`: returns "Echo: <message>"
//! - `sleep`: waits the given number of milliseconds, then returns

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};

fn main() {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let reader = BufReader::new(stdin.lock());
    let mut writer = stdout.lock();

    for line in reader.lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let message: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                eprintln!("mock-mcp-server: parse error: {}", e);
                continue;
            }
        };

        if let Some(response) = process_message(&message) {
            send_message(&mut writer, &response);
        }
    }
}

fn send_message<W: Write>(writer: &mut W, message: &Value) {
    let body = serde_json::to_string(message).unwrap();
    writer.write_all(body.as_bytes()).ok();
    writer.write_all(b"\n").ok();
    writer.flush().ok();
}

fn process_message(message: &Value) -> Option<Value> {
    let method = message.get("method")?.as_str()?;
    let id = message.get("id").cloned();

    match method {
        "initialize" => Some(response(
            id?,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": { "tools": {} },
                "serverInfo": { "name": "mock-mcp-server", "version": "1.0.0" }
            }),
        )),

        // No response for notifications
        "notifications/initialized" => None,

        "tools/list" => Some(response(
            id?,
            json!({
                "tools": [
                    {
                        "name": "echo",
                        "description": "Echoes back the input message",
                        "inputSchema": {
                            "type": "object",
                            "properties": {
                                "message": { "type": "string" }
                            },
                            "required": ["message"]
                        }
                    },
                    {
                        "name": "sleep",
                        "description": "Waits before responding",
                        "inputSchema": {
                            "type": "object",
                            "properties": {
                                "millis": { "type": "integer" }
                            }
                        }
                    }
                ]
            }),
        )),

        "tools/call" => {
            let id = id?;
            let params = message.get("params").cloned().unwrap_or(json!({}));
            let tool = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
            let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

            match tool {
                "echo" => {
                    let text = arguments
                        .get("message")
                        .and_then(|v| v.as_str())
                        .unwrap_or("No message provided");
                    Some(response(
                        id,
                        json!({
                            "content": [{ "type": "text", "text": format!("Echo: {}", text) }]
                        }),
                    ))
                }
                "sleep" => {
                    let millis = arguments.get("millis").and_then(|v| v.as_u64()).unwrap_or(0);
                    std::thread::sleep(std::time::Duration::from_millis(millis));
                    Some(response(
                        id,
                        json!({
                            "content": [{ "type": "text", "text": format!("Slept {} ms", millis) }]
                        }),
                    ))
                }
                other => Some(error_response(
                    id,
                    -32601,
                    &format!("Unknown tool: {}", other),
                )),
            }
        }

        other => Some(error_response(
            id?,
            -32601,
            &format!("Method not found: {}", other),
        )),
    }
}

fn response(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
}
