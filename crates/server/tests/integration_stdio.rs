mod common;

use anyhow::Context as _;
use hookrelay_test_support::{MockApi, hook_relay_document};
use serde_json::{Value, json};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader, Lines};
use tokio::process::{ChildStdin, ChildStdout, Command};

use common::BIN;

async fn send(stdin: &mut ChildStdin, msg: Value) -> anyhow::Result<()> {
    let mut line = msg.to_string();
    line.push('\n');
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await?;
    Ok(())
}

async fn recv(lines: &mut Lines<BufReader<ChildStdout>>) -> anyhow::Result<Value> {
    let line = tokio::time::timeout(Duration::from_secs(20), lines.next_line())
        .await
        .context("timeout waiting for stdout")??
        .context("stdout closed")?;
    serde_json::from_str(&line).context("stdout line is not JSON-RPC")
}

#[tokio::test]
async fn stdio_session_lists_and_calls_tools() -> anyhow::Result<()> {
    let api = MockApi::start(hook_relay_document()).await?;

    let mut child = Command::new(BIN)
        .env_remove("RUST_LOG")
        .arg("--api-base-url")
        .arg(api.base_url())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .context("spawn hookrelay-mcp-server")?;

    let mut stdin = child.stdin.take().context("stdin")?;
    let stdout = child.stdout.take().context("stdout")?;
    let mut lines = BufReader::new(stdout).lines();

    send(
        &mut stdin,
        json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": { "name": "hookrelay-stdio-test", "version": "0" }
            }
        }),
    )
    .await?;
    let init = recv(&mut lines).await?;
    anyhow::ensure!(init.pointer("/result/serverInfo/name") == Some(&json!("Hook Relay API (v2)")));

    send(&mut stdin, json!({"jsonrpc": "2.0", "method": "notifications/initialized"})).await?;
    send(
        &mut stdin,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": { "name": "deleteHook", "arguments": { "id": "a b" } }
        }),
    )
    .await?;
    let call = recv(&mut lines).await?;
    let text = call
        .pointer("/result/content/0/text")
        .and_then(Value::as_str)
        .context("tools/call missing result.content[0].text")?;
    let echoed: Value = serde_json::from_str(text)?;
    anyhow::ensure!(echoed.get("method") == Some(&json!("DELETE")));
    anyhow::ensure!(echoed.get("path") == Some(&json!("/echo/hooks/a%20b")), "{echoed}");

    drop(stdin);
    let status = tokio::time::timeout(Duration::from_secs(10), child.wait())
        .await
        .context("server did not exit after stdin closed")??;
    anyhow::ensure!(status.success(), "exit status {status}");
    Ok(())
}
