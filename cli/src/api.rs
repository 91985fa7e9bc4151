// HTTP clients for talking to registry, relay and user nodes
//
// `HttpTransport` and `RegistryClient` plug the core's `Transport` and
// `Directory` seams into plain HTTP/1.1 on localhost.

use anyhow::{Context, Result};
use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Method, Request, StatusCode};
use onionnet_core::{
    Address, Directory, DirectoryError, NodeRecord, Transport, TransportError, MAX_ENVELOPE_SIZE,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub message: String,
    pub destination_user_id: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeRegistryResponse {
    pub nodes: Vec<NodeRecord>,
}

/// Envelope delivery over `POST http://{host}:{address}/message`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client<HttpConnector>,
    host: String,
}

impl HttpTransport {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            host: host.into(),
        }
    }

    fn message_uri(&self, address: Address) -> Result<String, TransportError> {
        let port = u16::try_from(address.get()).map_err(|_| TransportError::Unreachable {
            address,
            reason: "address is not a TCP port".to_string(),
        })?;
        Ok(format!("http://{}:{}/message", self.host, port))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, address: Address, bytes: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        if bytes.len() > MAX_ENVELOPE_SIZE {
            return Err(TransportError::TooLarge {
                size: bytes.len(),
                max: MAX_ENVELOPE_SIZE,
            });
        }

        let unreachable = |reason: String| TransportError::Unreachable { address, reason };

        let req = Request::builder()
            .method(Method::POST)
            .uri(self.message_uri(address)?)
            .header("content-type", "application/octet-stream")
            .body(Body::from(bytes))
            .map_err(|e| unreachable(e.to_string()))?;

        let resp = self
            .client
            .request(req)
            .await
            .map_err(|e| unreachable(e.to_string()))?;
        let status = resp.status();
        let body = hyper::body::to_bytes(resp.into_body())
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        if status.is_success() {
            Ok(body.to_vec())
        } else {
            Err(TransportError::Rejected {
                address,
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            })
        }
    }
}

/// `Directory` backed by the registry's HTTP routes
#[derive(Debug, Clone)]
pub struct RegistryClient {
    client: Client<HttpConnector>,
    base_url: String,
}

impl RegistryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Directory for RegistryClient {
    async fn register(&self, record: NodeRecord) -> Result<(), DirectoryError> {
        let json = serde_json::to_string(&record)
            .map_err(|e| DirectoryError::InvalidResponse(e.to_string()))?;
        let req = Request::builder()
            .method(Method::POST)
            .uri(format!("{}/registerNode", self.base_url))
            .header("content-type", "application/json")
            .body(Body::from(json))
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        let resp = self
            .client
            .request(req)
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(DirectoryError::Unavailable(format!(
                "registry answered {}",
                resp.status()
            )))
        }
    }

    async fn list_nodes(&self) -> Result<Vec<NodeRecord>, DirectoryError> {
        let req = Request::builder()
            .method(Method::GET)
            .uri(format!("{}/getNodeRegistry", self.base_url))
            .body(Body::empty())
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        let resp = self
            .client
            .request(req)
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;
        let body = hyper::body::to_bytes(resp.into_body())
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        let response: NodeRegistryResponse = serde_json::from_slice(&body)
            .map_err(|e| DirectoryError::InvalidResponse(e.to_string()))?;
        Ok(response.nodes)
    }
}

/// Poll `GET {base_url}/status` until it answers `live`
pub async fn wait_until_live(base_url: &str, attempts: u32) -> Result<()> {
    let client = Client::new();
    for _ in 0..attempts {
        if let Ok(uri) = format!("{}/status", base_url).parse::<hyper::Uri>() {
            if let Ok(resp) = client.get(uri).await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    anyhow::bail!("{} did not come up", base_url)
}

/// Ask a running user node to onion-route a message to another user
pub async fn send_message_via_user(user_url: &str, destination_user_id: u32, message: &str) -> Result<String> {
    let client = Client::new();
    let req_body = SendMessageRequest {
        message: message.to_string(),
        destination_user_id,
    };

    let json = serde_json::to_string(&req_body)?;
    let req = Request::builder()
        .method(Method::POST)
        .uri(format!("{}/sendMessage", user_url))
        .header("content-type", "application/json")
        .body(Body::from(json))?;

    let resp = client.request(req).await.context("User node unreachable")?;
    let status = resp.status();
    let body_bytes = hyper::body::to_bytes(resp.into_body()).await?;
    let body = String::from_utf8_lossy(&body_bytes).into_owned();

    if status.is_success() {
        Ok(body)
    } else {
        anyhow::bail!("Failed to send message ({}): {}", status, body)
    }
}
