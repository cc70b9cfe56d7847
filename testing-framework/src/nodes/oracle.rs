// File: testing-framework/src/nodes/oracle.rs
//
// DLC oracle handle
//
// The oracle publishes a signed value at a fixed interval and serves its
// public key, datasources, R points and publications over plain REST.

use std::path::Path;
use std::time::Duration;

use log::{debug, info};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::orchestrator::{NodeProcess, ProcessSpec, RunResources};
use crate::waiters::{wait_until_port_open, WaitPolicy};

/// Reply of `/api/pubkey`
#[derive(Debug, Clone, Deserialize)]
pub struct OraclePubKey {
    /// Hex encoded public key
    #[serde(rename = "A")]
    pub a: String,
}

/// One entry of `/api/datasources`
#[derive(Debug, Clone, Deserialize)]
pub struct Datasource {
    /// Datasource id used in R point requests
    pub id: u64,
    /// Short name
    #[serde(default)]
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: String,
}

/// Reply of `/api/rpoint/{id}/{time}`
#[derive(Debug, Clone, Deserialize)]
pub struct OracleRPoint {
    /// Hex encoded R point
    #[serde(rename = "R")]
    pub r: String,
}

impl OracleRPoint {
    /// Raw R point bytes
    pub fn bytes(&self) -> Result<Vec<u8>> {
        decode_hex("R point", &self.r)
    }
}

/// Reply of `/api/publication/{rpoint}`
#[derive(Debug, Clone, Deserialize)]
pub struct Publication {
    /// Published value
    pub value: u64,
    /// Hex encoded signature over the value
    pub signature: String,
}

impl Publication {
    /// Raw signature bytes
    pub fn signature_bytes(&self) -> Result<Vec<u8>> {
        decode_hex("signature", &self.signature)
    }
}

fn decode_hex(what: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value).map_err(|e| HarnessError::Protocol(format!("invalid {} hex '{}': {}", what, value, e)))
}

/// REST client for an oracle
#[derive(Debug, Clone)]
pub struct OracleClient {
    client: Client,
    base_url: String,
}

impl OracleClient {
    /// Client for `http://host:port`
    pub fn new(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let base_url = format!("http://{}:{}", host, port);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HarnessError::transport(&base_url, e))?;
        Ok(Self { client, base_url })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| HarnessError::transport(&url, e))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| HarnessError::transport(&url, e))?;

        if !status.is_success() {
            return Err(HarnessError::RemoteError {
                method: path.to_string(),
                code: Some(i64::from(status.as_u16())),
                message: String::from_utf8_lossy(&body).trim().to_string(),
            });
        }
        serde_json::from_slice(&body)
            .map_err(|e| HarnessError::Protocol(format!("unexpected reply from {}: {}", path, e)))
    }

    /// Oracle public key
    pub async fn get_pubkey(&self) -> Result<OraclePubKey> {
        self.get("/api/pubkey").await
    }

    /// Datasources the oracle publishes
    pub async fn get_datasources(&self) -> Result<Vec<Datasource>> {
        self.get("/api/datasources").await
    }

    /// R point the oracle commits to for `datasource` at `unix_time`
    pub async fn get_rpoint(&self, datasource: u64, unix_time: u64) -> Result<OracleRPoint> {
        self.get(&format!("/api/rpoint/{}/{}", datasource, unix_time))
            .await
    }

    /// Publication for an R point, an error until the time has passed
    pub async fn get_publication(&self, rpoint: &str) -> Result<Publication> {
        self.get(&format!("/api/publication/{}", rpoint)).await
    }
}

/// A running oracle process
pub struct OracleNode {
    name: String,
    process: NodeProcess,
    http_port: u16,
    client: OracleClient,
    step_timeout: Duration,
}

impl OracleNode {
    /// Spawn an oracle publishing `value` every `interval` seconds
    pub async fn start(
        config: &HarnessConfig,
        resources: &RunResources,
        interval: u64,
        value: u64,
    ) -> Result<Self> {
        let data_dir = resources.workspace.node_dir("oracle")?;
        let name = data_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "oracle".to_string());
        let http_port = resources.ports.next_port()?;

        let spec = ProcessSpec::new(name.clone(), &config.oracle_bin, &data_dir).args([
            format!("--httpport={}", http_port),
            format!("--interval={}", interval),
            format!("--value={}", value),
            format!("--datadir={}", data_dir.display()),
        ]);
        let process = resources.supervisor.start(&spec)?;

        let policy = WaitPolicy::with_timeout(config.startup_timeout())
            .interval(config.poll_interval())
            .message(format!("{} never opened http port {}", name, http_port));
        wait_until_port_open("127.0.0.1", http_port, &policy).await?;
        info!("{} started (http {}, value {})", name, http_port, value);

        Ok(Self {
            name,
            process,
            http_port,
            client: OracleClient::new("127.0.0.1", http_port, config.rpc_timeout())?,
            step_timeout: resources.supervisor.step_timeout(),
        })
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Data directory
    pub fn data_dir(&self) -> &Path {
        self.process.data_dir()
    }

    /// REST port
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// REST client
    pub fn client(&self) -> &OracleClient {
        &self.client
    }

    /// Oracle public key
    pub async fn get_pubkey(&self) -> Result<OraclePubKey> {
        self.client.get_pubkey().await
    }

    /// Datasources the oracle publishes
    pub async fn get_datasources(&self) -> Result<Vec<Datasource>> {
        self.client.get_datasources().await
    }

    /// R point for `datasource` at `unix_time`
    pub async fn get_rpoint(&self, datasource: u64, unix_time: u64) -> Result<OracleRPoint> {
        self.client.get_rpoint(datasource, unix_time).await
    }

    /// Publication for an R point
    pub async fn get_publication(&self, rpoint: &str) -> Result<Publication> {
        self.client.get_publication(rpoint).await
    }

    /// The oracle has no stop endpoint, so this goes straight to signals
    pub async fn shutdown(&mut self) -> Result<()> {
        self.process.terminate(self.step_timeout).await?;
        Ok(())
    }
}
