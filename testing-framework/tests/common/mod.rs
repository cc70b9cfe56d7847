// Shared helpers for the integration tests
//
// Not every test binary uses every helper.

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

/// Websocket server answering each request through `respond`
///
/// `None` closes the connection instead of answering.
#[allow(dead_code)]
pub async fn ws_server<F>(respond: F) -> u16
where
    F: Fn(&Value) -> Option<Value> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(frame)) = ws.next().await {
            let text = match frame {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            let request: Value = serde_json::from_str(&text).unwrap();
            match respond(&request) {
                Some(reply) => ws.send(Message::Text(reply.to_string())).await.unwrap(),
                None => {
                    let _ = ws.close(None).await;
                    break;
                }
            }
        }
    });

    port
}

