use sitesync::prelude::*;

/// Origin used when `SITESYNC_ORIGIN` is not set.
const DEFAULT_ORIGIN: &str = "http://127.0.0.1:8080";

// ---------------------------------------------------------------------------
// Feed formatting
// ---------------------------------------------------------------------------

fn greeting(client_name: &str) -> Message {
    Message::Unknown(
        RawMessage::new("hello")
            .with("client", client_name)
            .with("version", env!("CARGO_PKG_VERSION")),
    )
}

fn describe(msg: &Message) -> String {
    match msg {
        Message::Change(change) => format!(
            "{:?} {}/{}",
            change.operation, change.collection, change.document_id
        ),
        Message::Error(err) => format!("server error {}: {}", err.code, err.message),
        Message::Unknown(raw) => format!("{} ({} fields)", raw.kind, raw.fields.len()),
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), SitesyncError> {
    sitesync::logging::init("info");

    let origin = std::env::var("SITESYNC_ORIGIN").unwrap_or_else(|_| DEFAULT_ORIGIN.to_string());
    let endpoint = Endpoint::from_origin(&origin)?;
    tracing::info!(%endpoint, "starting site feed");

    let client = TransportClient::websocket(ClientConfig::new(endpoint));
    let feed = client.on_message(|msg: &Message| println!("{}", describe(msg)));

    client.connect().await?;
    // Queued until the connection opens.
    client.send_message(greeting("site-feed"));

    eprintln!("listening for updates, press Ctrl+C to exit");
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl+C; exiting");
    }

    feed.unsubscribe();
    client.disconnect();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc;
    use tokio_tungstenite::WebSocketStream;
    use tokio_tungstenite::tungstenite::Message as Frame;

    const CHANGE: &str =
        r#"{"type":"change","collection":"jobsites","document_id":"j-42","operation":"insert"}"#;

    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin = format!("http://{}", listener.local_addr().unwrap());
        (listener, origin)
    }

    fn client_for(origin: &str, reconnect_ms: u64) -> TransportClient {
        let config = ClientConfig {
            reconnect_delay: Duration::from_millis(reconnect_ms),
            ..ClientConfig::new(Endpoint::from_origin(origin).unwrap())
        };
        TransportClient::websocket(config)
    }

    fn feed(client: &TransportClient) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        client.on_message(move |msg: &Message| {
            let _ = tx.send(describe(msg));
        });
        rx
    }

    async fn next_line(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("message should arrive in time")
            .expect("feed should stay open")
    }

    async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> String {
        loop {
            match ws.next().await.unwrap().unwrap() {
                Frame::Text(text) => return text.as_str().to_string(),
                Frame::Ping(_) | Frame::Pong(_) => continue,
                other => panic!("expected text, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_describe_formats_each_kind() {
        let change: Message = serde_json::from_str(CHANGE).unwrap();
        assert_eq!(describe(&change), "Insert jobsites/j-42");

        let err: Message =
            serde_json::from_str(r#"{"type":"error","code":404,"message":"no such site"}"#).unwrap();
        assert_eq!(describe(&err), "server error 404: no such site");

        assert_eq!(describe(&greeting("t")), "hello (2 fields)");
    }

    #[tokio::test]
    async fn test_queued_greeting_reaches_server_and_push_reaches_feed() {
        let (listener, origin) = listener().await;
        let (greeted_tx, mut greeted_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _ = greeted_tx.send(next_text(&mut ws).await);
            ws.send(Frame::Text(CHANGE.to_string().into())).await.unwrap();
            while ws.next().await.is_some() {}
        });

        let client = client_for(&origin, 3000);
        let mut lines = feed(&client);
        client.send_message(greeting("test"));

        let hello = tokio::time::timeout(Duration::from_secs(5), greeted_rx.recv())
            .await
            .unwrap()
            .unwrap();
        let hello: serde_json::Value = serde_json::from_str(&hello).unwrap();
        assert_eq!(hello["type"], "hello");
        assert_eq!(hello["client"], "test");

        assert_eq!(next_line(&mut lines).await, "Insert jobsites/j-42");
        assert_eq!(client.state().await, ConnectionState::Open);
        client.disconnect();
    }

    #[tokio::test]
    async fn test_reconnects_after_server_drops_connection() {
        let (listener, origin) = listener().await;
        tokio::spawn(async move {
            // First connection: read one frame and vanish without a close frame.
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _ = next_text(&mut ws).await;
            drop(ws);

            // Second connection: push a change.
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Frame::Text(CHANGE.to_string().into())).await.unwrap();
            while ws.next().await.is_some() {}
        });

        let client = client_for(&origin, 50);
        let mut lines = feed(&client);
        client.send_message(greeting("flaky"));

        assert_eq!(next_line(&mut lines).await, "Insert jobsites/j-42");
        client.disconnect();
    }

    #[tokio::test]
    async fn test_disconnect_sends_intentional_close() {
        let (listener, origin) = listener().await;
        let (close_tx, mut close_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _ = close_tx.send(None);
            while let Some(Ok(frame)) = ws.next().await {
                if let Frame::Close(Some(close)) = frame {
                    let code = u16::from(close.code);
                    let _ = close_tx.send(Some((code, close.reason.as_str().to_string())));
                    break;
                }
            }
        });

        let client = client_for(&origin, 3000);
        client.connect().await.unwrap();
        // Wait until the server has accepted before tearing down.
        assert_eq!(
            tokio::time::timeout(Duration::from_secs(5), close_rx.recv()).await.unwrap(),
            Some(None)
        );
        while client.state().await != ConnectionState::Open {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        client.disconnect();

        let close = tokio::time::timeout(Duration::from_secs(5), close_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            close,
            Some((1000, "Client disconnected intentionally".to_string()))
        );
    }
}
