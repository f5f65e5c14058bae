//! Spawns the server binary against a throwaway config and SQLite file

#![allow(dead_code)]

use std::fs;
use std::net::TcpListener;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::{Child, Command as TokioCommand};

pub struct TestServer {
    pub base: String,
    child: Child,
    _dir: TempDir,
}

impl TestServer {
    /// `extra` is appended verbatim to the generated YAML config
    pub async fn start(extra: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        let dir = temp.path();
        let port = free_port()?;
        let db_file = dir.join("configs.sqlite");

        let cfg = format!(
            "listen: {{ ip: 127.0.0.1, port: {port} }}\nlog_level: warn\n{extra}\n"
        );
        let cfg_path = dir.join("config.yaml");
        fs::write(&cfg_path, cfg)?;

        let bin = assert_cmd::cargo::cargo_bin!("apirelay");
        let child = TokioCommand::new(bin)
            .env("APIRELAY_DB_URL", format!("sqlite:{}", db_file.display()))
            .env("APIRELAY_THREADS", "2")
            .arg("-c")
            .arg(cfg_path.to_string_lossy().to_string())
            .kill_on_drop(true)
            .spawn()?;

        wait_for_ready("127.0.0.1", port, Duration::from_secs(8)).await?;
        Ok(Self {
            base: format!("http://127.0.0.1:{}", port),
            child,
            _dir: temp,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub async fn stop(mut self) {
        let _ = self.child.kill().await;
    }
}

pub fn free_port() -> Result<u16, Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

pub fn client() -> Result<reqwest::Client, Box<dyn std::error::Error>> {
    Ok(reqwest::Client::builder().no_proxy().build()?)
}

async fn wait_for_ready(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = client()?;
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if let Ok(resp) = client
            .get(format!("http://{}:{}/healthz", host, port))
            .send()
            .await
            && resp.status().as_u16() == 200
        {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(120)).await;
    }
    Err("Server did not become ready in time".into())
}
