// File: testing-framework/src/rpc/websocket.rs
//
// Persistent websocket transport for the payment node
//
// The protocol is strict ping-pong: one request frame out, the next text
// frame in is its response. The stream sits behind an async mutex so
// concurrent callers on one handle are serialized instead of interleaving.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{
    ParamStyle, RequestIds, RpcParams, RpcRequest, RpcResponse, RpcTransport, LIT_NAMESPACE,
    REQUEST_ID_BOUND,
};
use crate::error::{HarnessError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Duplex JSON-RPC client over a websocket
pub struct WebSocketRpcClient {
    url: String,
    namespace: Option<String>,
    ids: RequestIds,
    call_timeout: Duration,
    stream: Mutex<Option<WsStream>>,
}

impl WebSocketRpcClient {
    /// Connect to `url`, qualifying methods with `namespace`
    pub async fn connect(url: &str, namespace: Option<&str>, call_timeout: Duration) -> Result<Self> {
        let mut request = url
            .into_client_request()
            .map_err(|e| HarnessError::Config(format!("invalid websocket url '{}': {}", url, e)))?;
        // lit's websocket handler refuses handshakes without an Origin
        request
            .headers_mut()
            .insert("Origin", HeaderValue::from_static("http://127.0.0.1"));

        let (stream, _) = timeout(call_timeout, connect_async(request))
            .await
            .map_err(|_| HarnessError::transport(url, "websocket handshake timed out"))?
            .map_err(|e| HarnessError::transport(url, e))?;
        debug!("Opened websocket to {}", url);

        Ok(Self {
            url: url.to_string(),
            namespace: namespace.map(str::to_string),
            ids: RequestIds::random(REQUEST_ID_BOUND),
            call_timeout,
            stream: Mutex::new(Some(stream)),
        })
    }

    /// Connect to a payment node's `/ws` endpoint
    pub async fn lit(host: &str, port: u16, call_timeout: Duration) -> Result<Self> {
        let url = format!("ws://{}:{}/ws", host, port);
        Self::connect(&url, Some(LIT_NAMESPACE), call_timeout).await
    }

    async fn exchange(&self, stream: &mut WsStream, request: &RpcRequest) -> Result<Value> {
        let payload = serde_json::to_string(request)?;
        stream
            .send(Message::Text(payload))
            .await
            .map_err(|e| HarnessError::transport(&self.url, e))?;

        loop {
            let frame = timeout(self.call_timeout, stream.next())
                .await
                .map_err(|_| {
                    HarnessError::transport(
                        &self.url,
                        format!("no response to {} within {:?}", request.method, self.call_timeout),
                    )
                })?;

            let text = match frame {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Binary(bytes))) => String::from_utf8(bytes)
                    .map_err(|e| HarnessError::Protocol(format!("non-utf8 frame: {}", e)))?,
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {
                    continue
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(HarnessError::transport(&self.url, "connection closed by node"))
                }
                Some(Err(e)) => return Err(HarnessError::transport(&self.url, e)),
            };

            let envelope: RpcResponse = serde_json::from_str(text.trim()).map_err(|e| {
                HarnessError::Protocol(format!("undecodable response to {}: {}", request.method, e))
            })?;
            return envelope.into_result(&request.method, &request.id);
        }
    }
}

#[async_trait]
impl RpcTransport for WebSocketRpcClient {
    async fn call(&self, method: &str, params: RpcParams) -> Result<Value> {
        let request = RpcRequest::new(
            self.namespace.as_deref(),
            method,
            &params,
            ParamStyle::Wrapped,
            self.ids.next_id(),
        )?;
        debug!("WS {} {} id={}", self.url, request.method, request.id);

        let mut guard = self.stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| HarnessError::transport(&self.url, "websocket is closed"))?;

        let result = self.exchange(stream, &request).await;
        if let Err(e) = &result {
            if e.is_transport() || matches!(e, HarnessError::Protocol(_)) {
                // the ping-pong pairing is lost once a frame goes missing or
                // answers something else
                warn!("Dropping websocket to {} after {}", self.url, e);
                *guard = None;
            }
        }
        result
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }

    async fn close(&self) {
        if let Some(mut stream) = self.stream.lock().await.take() {
            let _ = stream.close(None).await;
        }
    }
}
