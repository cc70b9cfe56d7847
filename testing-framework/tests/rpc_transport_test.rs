// Integration tests for the JSON-RPC transports
// Each test stands up a throwaway loopback server speaking just enough HTTP
// or websocket to answer the client.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use lit_testing_framework::rpc::{
    call_typed, HttpRpcClient, RpcParams, RpcTransport, WebSocketRpcClient,
};
use lit_testing_framework::HarnessError;

mod common;
use common::ws_server;

const TIMEOUT: Duration = Duration::from_secs(5);

/// A request as seen by the mock HTTP server
struct Captured {
    head: String,
    body: Value,
}

async fn read_http_request(stream: &mut TcpStream) -> Captured {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed before sending headers");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let length: usize = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse().unwrap())
        })
        .unwrap_or(0);

    while buf.len() < header_end + length {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed mid-body");
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = serde_json::from_slice(&buf[header_end..header_end + length]).unwrap();
    Captured { head, body }
}

/// Serve one HTTP request with `status` and `body`, reporting what arrived
async fn http_server(status: u16, body: String) -> (u16, mpsc::Receiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let captured = read_http_request(&mut stream).await;
        let response = format!(
            "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        let _ = stream.shutdown().await;
        let _ = tx.send(captured).await;
    });

    (port, rx)
}

fn coin_client(port: u16) -> HttpRpcClient {
    HttpRpcClient::coin_node("127.0.0.1", port, "regtestuser", "regtestpass", TIMEOUT).unwrap()
}

#[tokio::test]
async fn test_coin_node_call_sends_positional_params_and_auth() {
    let (port, mut rx) = http_server(
        200,
        json!({"result": ["blockhash"], "error": null, "id": "0"}).to_string(),
    )
    .await;
    let client = coin_client(port);

    let params = RpcParams::positional(vec![json!(1)]);
    let result = client.call("generate", params).await.unwrap();
    assert_eq!(result, json!(["blockhash"]));

    let captured = rx.recv().await.unwrap();
    assert!(captured.head.starts_with("POST / "));
    assert!(captured
        .head
        .to_ascii_lowercase()
        .contains("authorization: basic"));
    assert_eq!(captured.body["method"], "generate");
    assert_eq!(captured.body["params"], json!([1]));
    assert_eq!(captured.body["jsonrpc"], "2.0");
    assert_eq!(captured.body["id"], "0");
}

#[tokio::test]
async fn test_coin_node_error_object_with_http_500() {
    let (port, _rx) = http_server(
        500,
        json!({
            "result": null,
            "error": {"code": -8, "message": "Block height out of range"},
            "id": "0"
        })
        .to_string(),
    )
    .await;

    let err = coin_client(port)
        .call("getblockhash", RpcParams::positional(vec![json!(9999)]))
        .await
        .unwrap_err();
    match &err {
        HarnessError::RemoteError { method, message, .. } => {
            assert_eq!(method, "getblockhash");
            assert_eq!(message, "Block height out of range");
        }
        other => panic!("expected RemoteError, got {:?}", other),
    }
    assert_eq!(err.remote_code(), Some(-8));
}

#[tokio::test]
async fn test_mismatched_id_is_protocol_error() {
    let (port, _rx) = http_server(
        200,
        json!({"result": 5, "error": null, "id": "42"}).to_string(),
    )
    .await;

    let err = coin_client(port)
        .call("getblockcount", RpcParams::None)
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::Protocol(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_non_json_error_status_is_transport_error() {
    let (port, _rx) = http_server(503, "\"warming up\"".to_string()).await;

    let err = coin_client(port)
        .call("getblockcount", RpcParams::None)
        .await
        .unwrap_err();
    assert!(err.is_transport(), "got {:?}", err);
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn test_rejected_credentials_are_unauthorized() {
    let (port, _rx) = http_server(401, String::new()).await;

    let err = coin_client(port)
        .call("getnetworkinfo", RpcParams::None)
        .await
        .unwrap_err();
    match err {
        HarnessError::Unauthorized { endpoint, status } => {
            assert_eq!(status, 401);
            assert_eq!(endpoint, format!("http://127.0.0.1:{}/", port));
        }
        other => panic!("expected Unauthorized, got {:?}", other),
    }
}

#[tokio::test]
async fn test_refused_connection_is_transport_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let err = coin_client(port)
        .call("getblockcount", RpcParams::None)
        .await
        .unwrap_err();
    assert!(err.is_transport());
    assert!(!err.to_string().contains("regtestpass"));
}

#[tokio::test]
async fn test_oneoff_wraps_named_params_and_decodes_typed() {
    #[derive(serde::Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct Reply {
        status: String,
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, mut rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let captured = read_http_request(&mut stream).await;
        let body = json!({
            "result": {"Status": "closed"},
            "error": null,
            "id": captured.body["id"].clone()
        })
        .to_string();
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        let _ = tx.send(captured).await;
    });

    let client = HttpRpcClient::lit_oneoff("127.0.0.1", port, TIMEOUT).unwrap();
    let params = RpcParams::named(json!({"ChanIdx": 1})).unwrap();
    let reply: Reply = call_typed(&client, "CloseChannel", params).await.unwrap();
    assert_eq!(reply.status, "closed");

    let captured = rx.recv().await.unwrap();
    assert!(captured.head.starts_with("POST /oneoff "));
    assert_eq!(captured.body["method"], "LitRPC.CloseChannel");
    assert_eq!(captured.body["params"], json!([{"ChanIdx": 1}]));
}

#[tokio::test]
async fn test_websocket_calls_share_one_connection() {
    let port = ws_server(|request| {
        Some(json!({
            "result": {"Method": request["method"].clone(), "Params": request["params"].clone()},
            "error": null,
            "id": request["id"].clone()
        }))
    })
    .await;

    let client = WebSocketRpcClient::lit("127.0.0.1", port, TIMEOUT).await.unwrap();
    assert_eq!(client.endpoint(), format!("ws://127.0.0.1:{}/ws", port));

    let first = client.call("Balance", RpcParams::None).await.unwrap();
    assert_eq!(first["Method"], "LitRPC.Balance");
    assert_eq!(first["Params"], json!([{}]));

    let params = RpcParams::named(json!({"Peer": 1, "Message": "hello"})).unwrap();
    let second = client.call("Say", params).await.unwrap();
    assert_eq!(second["Method"], "LitRPC.Say");
    assert_eq!(second["Params"][0]["Peer"], 1);
}

#[tokio::test]
async fn test_websocket_error_string_is_remote_error() {
    let port = ws_server(|request| {
        Some(json!({
            "result": null,
            "error": "channel 9 not found",
            "id": request["id"].clone()
        }))
    })
    .await;

    let client = WebSocketRpcClient::lit("127.0.0.1", port, TIMEOUT).await.unwrap();
    let params = RpcParams::named(json!({"ChanIdx": 9})).unwrap();
    match client.call("BreakChannel", params).await {
        Err(HarnessError::RemoteError { code, message, .. }) => {
            assert_eq!(code, None);
            assert_eq!(message, "channel 9 not found");
        }
        other => panic!("expected RemoteError, got {:?}", other),
    }

    // a remote error leaves the connection usable
    let again = client.call("Balance", RpcParams::None).await;
    assert!(matches!(again, Err(HarnessError::RemoteError { .. })));
}

#[tokio::test]
async fn test_websocket_closed_by_node() {
    let port = ws_server(|_| None).await;

    let client = WebSocketRpcClient::lit("127.0.0.1", port, TIMEOUT).await.unwrap();
    let err = client.call("Balance", RpcParams::None).await.unwrap_err();
    assert!(err.is_transport(), "got {:?}", err);

    // the broken stream is dropped, later calls fail fast
    let err = client.call("Balance", RpcParams::None).await.unwrap_err();
    assert!(err.to_string().contains("websocket is closed"));
}

#[tokio::test]
async fn test_websocket_dropped_after_mismatched_id() {
    let port = ws_server(|_| Some(json!({"result": 1, "error": null, "id": -1}))).await;

    let client = WebSocketRpcClient::lit("127.0.0.1", port, TIMEOUT).await.unwrap();
    let err = client.call("Balance", RpcParams::None).await.unwrap_err();
    assert!(matches!(err, HarnessError::Protocol(_)), "got {:?}", err);

    // the next frame could belong to either call, so the stream is gone
    let err = client.call("Balance", RpcParams::None).await.unwrap_err();
    assert!(err.is_transport(), "got {:?}", err);
    assert!(err.to_string().contains("websocket is closed"));
}

#[tokio::test]
async fn test_positional_params_rejected_before_sending() {
    let port = ws_server(|request| Some(json!({"result": 1, "error": null, "id": request["id"].clone()}))).await;

    let client = WebSocketRpcClient::lit("127.0.0.1", port, TIMEOUT).await.unwrap();
    let err = client
        .call("Push", RpcParams::positional(vec![json!(1), json!(1000)]))
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::InvalidInvocation(_)));
}
