#![allow(dead_code)]

use anyhow::Context as _;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

pub fn pick_unused_port() -> anyhow::Result<u16> {
    hookrelay_test_support::pick_unused_port()
}

pub async fn wait_http_ok(url: &str, timeout_dur: Duration) -> anyhow::Result<()> {
    hookrelay_test_support::wait_http_ok(url, timeout_dur).await
}

pub const BIN: &str = env!("CARGO_BIN_EXE_hookrelay-mcp-server");

/// Start the server on the HTTP transport, pointed at `api_base_url`.
pub fn spawn_http_server(api_base_url: &str, port: u16, extra: &[&str]) -> anyhow::Result<Child> {
    Command::new(BIN)
        .env_remove("RUST_LOG")
        .arg("--api-base-url")
        .arg(api_base_url)
        .arg("--transport")
        .arg("http")
        .arg("--bind")
        .arg(format!("127.0.0.1:{port}"))
        .arg("--log-level")
        .arg("info")
        .args(extra)
        .stdout(Stdio::null())
        .spawn()
        .context("spawn hookrelay-mcp-server")
}
